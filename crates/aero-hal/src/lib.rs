//! Hardware Abstraction Layer trait for AeroDesk
//!
//! This crate defines the HAL trait that lets the kernel core run on top of
//! the platform bring-up code (descriptor tables, paging, PIT/PIC) without
//! knowing anything about it.
//!
//! # What the kernel needs from the platform
//!
//! - A periodic tick counter (the timer interrupt)
//! - A way to halt until the next tick or wakeup event
//! - A real register save/restore for context switches
//! - Stack memory for new processes
//! - A debug console (the serial port on x86)
//!
//! Device drivers (I2C/SPI/UART) are not part of the HAL: sensor services
//! reach them through their own `SampleSource` implementations.

#![no_std]

/// Address-space handle owned by a process.
///
/// Processes share the kernel page directory unless they were given their
/// own. The value of `Private` is the platform's page-directory base.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AddressSpace {
    /// Shared kernel page directory
    #[default]
    Kernel,
    /// Process-private page directory
    Private(u64),
}

impl AddressSpace {
    /// Identifier loaded into the MMU root register on a switch.
    ///
    /// `Kernel` maps to 0; the platform substitutes the kernel directory.
    pub fn id(&self) -> u64 {
        match self {
            AddressSpace::Kernel => 0,
            AddressSpace::Private(base) => *base,
        }
    }
}

/// Saved execution context of a suspended process.
///
/// `#[repr(C)]` keeps the field offsets stable for the platform's switch
/// routine:
///
/// | Offset | Field               |
/// |--------|---------------------|
/// | 0      | instruction_pointer |
/// | 8      | stack_pointer       |
/// | 16     | frame_pointer       |
/// | 24     | address_space       |
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(C)]
pub struct CpuContext {
    /// Where execution resumes
    pub instruction_pointer: u64,
    /// Top of the process stack
    pub stack_pointer: u64,
    /// Frame (base) pointer. Zero for fresh processes.
    pub frame_pointer: u64,
    /// Active address-space identifier
    pub address_space: u64,
}

impl CpuContext {
    /// Initial context for a process that has never run.
    pub const fn new(entry: u64, stack_top: u64, address_space: u64) -> Self {
        Self {
            instruction_pointer: entry,
            stack_pointer: stack_top,
            frame_pointer: 0,
            address_space,
        }
    }
}

/// Hardware Abstraction Layer trait
///
/// Implementations provide platform-specific functionality for:
/// - Time (the periodic tick)
/// - Power management (halt until interrupt)
/// - Context switching
/// - Process stack allocation
/// - Debug output
pub trait HAL: Send + Sync + 'static {
    // === Time ===

    /// Number of periodic timer ticks since boot (monotonic)
    fn now_ticks(&self) -> u64;

    // === Power ===

    /// Enter the low-power wait until the next tick or wakeup event
    ///
    /// On x86: `hlt`
    fn wait_for_interrupt(&self);

    // === Context switching ===

    /// Save the live register state into `save` and resume `load`.
    ///
    /// Both contexts belong to process table slots; the kernel calls this
    /// on every switch between two different processes.
    fn switch_context(&self, save: &mut CpuContext, load: &CpuContext);

    // === Memory ===

    /// Allocate a process stack of `size` bytes
    ///
    /// # Returns
    /// * `Ok(stack_top)` - Highest usable address of the new stack
    /// * `Err(HalError::OutOfMemory)` - Allocation failed
    fn allocate_stack(&self, size: usize) -> Result<u64, HalError>;

    // === Debug ===

    /// Write a debug message to the platform console
    ///
    /// On x86: the COM1 serial port
    fn debug_write(&self, msg: &str);
}

/// HAL errors
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum HalError {
    /// Not enough memory available
    #[error("out of memory")]
    OutOfMemory,
    /// Operation not supported on this platform
    #[error("operation not supported")]
    NotSupported,
    /// Invalid argument
    #[error("invalid argument")]
    InvalidArgument,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_space_ids() {
        assert_eq!(AddressSpace::Kernel.id(), 0);
        assert_eq!(AddressSpace::Private(0x8000).id(), 0x8000);
        assert_eq!(AddressSpace::default(), AddressSpace::Kernel);
    }

    #[test]
    fn test_fresh_context_has_clean_frame() {
        let ctx = CpuContext::new(0x10_0000, 0x20_0000, 7);
        assert_eq!(ctx.instruction_pointer, 0x10_0000);
        assert_eq!(ctx.stack_pointer, 0x20_0000);
        assert_eq!(ctx.frame_pointer, 0);
        assert_eq!(ctx.address_space, 7);
    }

    #[test]
    fn test_context_layout_is_four_words() {
        assert_eq!(core::mem::size_of::<CpuContext>(), 32);
        assert_eq!(core::mem::align_of::<CpuContext>(), 8);
    }
}
