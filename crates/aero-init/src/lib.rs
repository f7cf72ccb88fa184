//! AeroDesk Init (PID 1)
//!
//! Boot sequence and the authentication gate.
//!
//! # Boot order
//!
//! | PID | Process | Started by |
//! |-----|---------|------------|
//! | 0 | `idle` | `boot` |
//! | 1 | `init` (`GateProcess`) | `boot` |
//! | 2 | `auth_service` | init, first slice |
//! | 3, 4 | `hrv_sensor`, `eeg_sensor` | init, when sensors are enabled |
//! | next | `desktop_shell` | init, after a Success |
//!
//! The desktop exists only once the gate has seen a Success from the
//! registered auth service for the configured user. Until then nothing but
//! the boot processes runs.

#![no_std]
extern crate alloc;

pub mod admission;
pub mod config;
pub mod gate;
pub mod process;

use alloc::boxed::Box;
use alloc::string::String;

use aero_hal::HAL;
use aero_ipc::names;
use aero_kernel::{IdleProgram, Kernel, Program};
use aero_kernel_core::{KernelError, ProcessId};
use aero_services::{DesktopShell, EegPublisher, HrvPublisher, Resting, SessionUser};

pub use admission::{Admission, AdmissionFlag, ADMISSION};
pub use config::{BootConfig, GateConfig, SensorConfig};
pub use gate::{AuthGate, GateOutcome, GateState};
pub use process::{GateProcess, GateStatus};

/// Boot errors
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BootError {
    #[error("kernel error: {0}")]
    Kernel(#[from] KernelError),
    #[error("invalid boot configuration: {0}")]
    Config(String),
}

/// A booted system: the kernel plus a view of the gate.
pub struct BootedSystem<H: HAL> {
    pub kernel: Kernel<H>,
    pub init: ProcessId,
    pub gate: GateStatus,
    /// User the desktop shell saw on `auth_success`
    pub session: SessionUser,
}

impl<H: HAL> BootedSystem<H> {
    /// Current gate state
    pub fn gate_state(&self) -> GateState {
        self.gate.get()
    }

    /// User recorded by the desktop shell, once it has been told
    pub fn session_user(&self) -> Option<u32> {
        self.session.get()
    }

    /// Step until the gate is admitted or has failed.
    ///
    /// Returns the terminal state, or `None` if `max_steps` ran out first.
    pub fn run_until_settled(&mut self, max_steps: usize) -> Option<GateState> {
        let gate = self.gate.clone();
        self.kernel
            .run_until(max_steps, |_| gate.get().is_terminal())
            .map(|_| gate.get())
    }
}

/// Bring up the kernel and the boot processes.
///
/// Creates idle (pid 0) and init (pid 1). Init starts `auth_service` and,
/// if configured, the sensor publishers on its first slice.
pub fn boot<H: HAL>(
    hal: H,
    config: &BootConfig,
    auth_service: Box<dyn Program>,
    admission: &'static AdmissionFlag,
) -> Result<BootedSystem<H>, BootError> {
    let mut kernel = Kernel::new(hal, config.kernel.clone());
    kernel.spawn_idle(Box::new(IdleProgram))?;

    let desktop = DesktopShell::new();
    let session = desktop.session_user();
    let mut init = GateProcess::new(&config.gate, auth_service, Box::new(desktop), admission);
    if config.sensors.enabled {
        let period = config.sensors.period_ticks;
        init = init
            .with_sensor(names::HRV_SENSOR, Box::new(HrvPublisher::new(Resting, period)))
            .with_sensor(names::EEG_SENSOR, Box::new(EegPublisher::new(Resting, period)));
    }
    let gate = init.status();
    let init = kernel.spawn(names::INIT, Box::new(init))?;

    Ok(BootedSystem {
        kernel,
        init,
        gate,
        session,
    })
}
