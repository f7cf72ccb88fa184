//! Process programs and the syscall surface they run against.
//!
//! A program is resumed once per slice. It issues SAL calls through the
//! `Syscalls` handle and tells the kernel how the slice ended with a
//! `Resume`. Blocking is the pair `receive() == Ok(None)` followed by
//! `Resume::Block`; the kernel resumes the program again once it is Ready.

use alloc::boxed::Box;
use alloc::vec::Vec;

use aero_hal::{AddressSpace, CpuContext, HAL};
use aero_kernel_core::{
    KernelError, KernelState, Message, ProcessId, ProcessState, PublishReport, Source, Subscriber,
    SubscriptionId,
};
use log::warn;

/// Instruction pointer given to fresh contexts: the runtime's resume
/// trampoline at the kernel load address.
pub const PROGRAM_ENTRY: u64 = 0x0010_0000;

/// Default stack size for spawned processes
pub const DEFAULT_STACK_SIZE: usize = 4096;

/// How a slice ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resume {
    /// Still busy; keep running until the tick preempts
    Continue,
    /// Give up the processor voluntarily
    Yield,
    /// A `receive` returned `Ok(None)`; wait for a message or timeout
    Block,
    /// Terminate with a status code
    Exit(i32),
}

/// Code run by a process.
pub trait Program {
    /// Run one slice.
    fn resume(&mut self, sys: &mut Syscalls<'_>) -> Resume;
}

/// Syscall handle passed to a program for the duration of one slice.
pub struct Syscalls<'a> {
    pid: ProcessId,
    state: &'a mut KernelState,
    hal: &'a dyn HAL,
    stack_size: usize,
    spawned: &'a mut Vec<(ProcessId, Box<dyn Program>)>,
}

impl<'a> Syscalls<'a> {
    pub(crate) fn new(
        pid: ProcessId,
        state: &'a mut KernelState,
        hal: &'a dyn HAL,
        stack_size: usize,
        spawned: &'a mut Vec<(ProcessId, Box<dyn Program>)>,
    ) -> Self {
        Self {
            pid,
            state,
            hal,
            stack_size,
            spawned,
        }
    }

    /// Calling process
    pub fn pid(&self) -> ProcessId {
        self.pid
    }

    /// Ticks since boot
    pub fn now(&self) -> u64 {
        self.hal.now_ticks()
    }

    /// Halt until the next tick or wakeup event
    pub fn wait_for_interrupt(&self) {
        self.hal.wait_for_interrupt();
    }

    /// Write a line to the platform console
    pub fn debug(&self, msg: &str) {
        self.hal.debug_write(msg);
    }

    // === SAL ===

    /// Point-to-point send to a pid or reserved channel
    pub fn send(&mut self, destination: u32, tag: u32, payload: &[u8]) -> Result<(), KernelError> {
        self.state.send(self.pid, destination, tag, payload)
    }

    /// Receive with the configured default wait bound
    pub fn receive(&mut self, source: Source) -> Result<Option<Message>, KernelError> {
        self.state.receive(self.pid, source, None)
    }

    /// Receive with an explicit wait bound in ticks
    pub fn receive_with_timeout(
        &mut self,
        source: Source,
        timeout_ticks: u64,
    ) -> Result<Option<Message>, KernelError> {
        self.state.receive(self.pid, source, Some(timeout_ticks))
    }

    /// Publish to every subscriber of `topic`
    pub fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<PublishReport, KernelError> {
        self.state.publish(self.pid, topic, payload)
    }

    /// Register a subscriber owned by the calling process
    pub fn subscribe(
        &mut self,
        topic: &str,
        subscriber: Box<dyn Subscriber>,
    ) -> Result<SubscriptionId, KernelError> {
        self.state.subscribe(self.pid, topic, subscriber)
    }

    /// Remove a subscription
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> Option<Box<dyn Subscriber>> {
        self.state.unsubscribe(id)
    }

    /// Listen on a reserved channel
    pub fn bind_channel(&mut self, channel: u32) -> Result<(), KernelError> {
        self.state.bind_channel(channel, self.pid)
    }

    /// Stop listening on a reserved channel
    pub fn unbind_channel(&mut self, channel: u32) -> Result<(), KernelError> {
        self.state.unbind_channel(channel, self.pid)
    }

    // === Processes ===

    /// Create a Ready process running `program`.
    ///
    /// The program is attached when the current slice ends.
    pub fn spawn(&mut self, name: &str, program: Box<dyn Program>) -> Result<ProcessId, KernelError> {
        let pid = create_process(self.state, self.hal, name, self.stack_size)?;
        self.spawned.push((pid, program));
        Ok(pid)
    }

    /// Lifecycle state of any process
    pub fn process_state(&self, pid: ProcessId) -> Option<ProcessState> {
        self.state.get(pid).map(|p| p.state)
    }
}

/// Allocate a stack and a table slot for a new user process.
pub(crate) fn create_process(
    state: &mut KernelState,
    hal: &dyn HAL,
    name: &str,
    stack_size: usize,
) -> Result<ProcessId, KernelError> {
    if state.processes.user_slots_used() >= state.processes.capacity() {
        return Err(KernelError::ProcessTableFull);
    }
    let stack_top = hal.allocate_stack(stack_size).map_err(|e| {
        warn!(target: "proc", "stack allocation for '{}' failed: {}", name, e);
        KernelError::InvalidState
    })?;
    let space = AddressSpace::Kernel;
    let context = CpuContext::new(PROGRAM_ENTRY, stack_top, space.id());
    state.spawn(name, context, space)
}

/// Body of the idle process: halt, then hand the processor back.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdleProgram;

impl Program for IdleProgram {
    fn resume(&mut self, sys: &mut Syscalls<'_>) -> Resume {
        sys.wait_for_interrupt();
        Resume::Yield
    }
}
