//! Authentication Gate
//!
//! Pure state machine deciding whether boot may proceed to the desktop.
//! It does no I/O; `GateProcess` feeds it results and timeouts.
//!
//! ```text
//!   AwaitingVerification{1} ──denied──► AwaitingVerification{2} ─► ...
//!          │                                                      │
//!       Success                                      retry_limit denials
//!          ▼                                                      ▼
//!    Authenticated ──admit──► DesktopAdmitted              BootFailed
//! ```
//!
//! Transitions are monotonic: nothing leaves `DesktopAdmitted` or
//! `BootFailed`. A Failure, a timeout, and a Success for the wrong user
//! all count as one denied attempt.

use aero_ipc::{AuthKind, AuthMessage};
use aero_kernel_core::{KernelError, ProcessId};
use serde::{Deserialize, Serialize};

use crate::config::GateConfig;

/// Gate state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    /// Waiting for a verdict on attempt `attempt` (1-based)
    AwaitingVerification { attempt: u32 },
    /// Success received; desktop not yet started
    Authenticated,
    /// Desktop started (terminal)
    DesktopAdmitted,
    /// Retry limit reached (terminal)
    BootFailed,
}

impl GateState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, GateState::DesktopAdmitted | GateState::BootFailed)
    }

    pub fn label(&self) -> &'static str {
        match self {
            GateState::AwaitingVerification { .. } => "awaiting_verification",
            GateState::Authenticated => "authenticated",
            GateState::DesktopAdmitted => "desktop_admitted",
            GateState::BootFailed => "boot_failed",
        }
    }
}

/// What an accepted Authentication Message did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateOutcome {
    /// Not from the registered service, or not a verdict
    Ignored,
    /// Verified; the gate is now `Authenticated`
    Authenticated { user_id: u32 },
}

/// The gate
#[derive(Clone, Debug)]
pub struct AuthGate {
    state: GateState,
    retry_limit: u32,
    user_id: u32,
    service: Option<ProcessId>,
    denials: u32,
}

impl AuthGate {
    pub fn new(config: &GateConfig) -> Self {
        Self {
            state: GateState::AwaitingVerification { attempt: 1 },
            retry_limit: config.retry_limit.max(1),
            user_id: config.user_id,
            service: None,
            denials: 0,
        }
    }

    /// Accept verdicts only from `pid` from now on.
    pub fn register_service(&mut self, pid: ProcessId) {
        self.service = Some(pid);
    }

    pub fn service(&self) -> Option<ProcessId> {
        self.service
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn user_id(&self) -> u32 {
        self.user_id
    }

    pub fn retry_limit(&self) -> u32 {
        self.retry_limit
    }

    /// Denied attempts so far
    pub fn denials(&self) -> u32 {
        self.denials
    }

    /// Feed an Authentication Message received on the auth channel.
    ///
    /// Errors:
    /// - `AuthenticationDenied`: attempt denied, gate awaits the next one
    /// - `FatalBootFailure`: that was the last permitted attempt
    /// - `InvalidState`: the gate is not awaiting verification
    pub fn on_result(
        &mut self,
        sender: ProcessId,
        msg: &AuthMessage,
    ) -> Result<GateOutcome, KernelError> {
        self.require_awaiting()?;
        if self.service != Some(sender) {
            return Ok(GateOutcome::Ignored);
        }
        match msg.kind {
            AuthKind::Success if msg.user_id == self.user_id => {
                self.state = GateState::Authenticated;
                Ok(GateOutcome::Authenticated {
                    user_id: msg.user_id,
                })
            }
            AuthKind::Success | AuthKind::Failure => Err(self.deny()),
            AuthKind::VerifyRequest => Ok(GateOutcome::Ignored),
        }
    }

    /// The verification wait expired. Fails closed: counts as a denial.
    pub fn on_timeout(&mut self) -> Result<(), KernelError> {
        self.require_awaiting()?;
        Err(self.deny())
    }

    /// The desktop process exists: enter the terminal state.
    pub fn admit(&mut self) -> Result<(), KernelError> {
        if self.state != GateState::Authenticated {
            return Err(KernelError::InvalidState);
        }
        self.state = GateState::DesktopAdmitted;
        Ok(())
    }

    fn require_awaiting(&self) -> Result<(), KernelError> {
        match self.state {
            GateState::AwaitingVerification { .. } => Ok(()),
            _ => Err(KernelError::InvalidState),
        }
    }

    fn deny(&mut self) -> KernelError {
        self.denials += 1;
        if self.denials >= self.retry_limit {
            self.state = GateState::BootFailed;
            KernelError::FatalBootFailure
        } else {
            self.state = GateState::AwaitingVerification {
                attempt: self.denials + 1,
            };
            KernelError::AuthenticationDenied
        }
    }
}
