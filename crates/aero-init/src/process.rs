//! The init process
//!
//! `GateProcess` runs as pid 1 and drives the [`AuthGate`]:
//!
//! 1. bind the authentication channel, spawn `auth_service` (and the sensor
//!    publishers when enabled)
//! 2. send a Verify-Request to the service, wait on channel 1 with the
//!    verification timeout
//! 3. on a denial or timeout, ask again until the retry limit; then boot
//!    fails and init just idles
//! 4. on Success, spawn `desktop_shell` and set the admission flag
//! 5. once the desktop has taken its first slice (and subscribed), announce
//!    `auth_success`
//!
//! The current gate state is mirrored into a shared [`GateStatus`] cell
//! for whoever booted the system.

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::Cell;

use aero_ipc::{channel, names, topic, AuthMessage, MSG_AUTH};
use aero_kernel::{Program, Resume, Syscalls};
use aero_kernel_core::{KernelError, Message, ProcessId, ProcessState, Source};
use log::{debug, error, info, warn};

use crate::admission::AdmissionFlag;
use crate::config::GateConfig;
use crate::gate::{AuthGate, GateOutcome, GateState};

/// Shared view of the gate state
pub type GateStatus = Rc<Cell<GateState>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Start,
    Request,
    Waiting { deadline: u64 },
    /// Admitted; `auth_success` goes out after the desktop's first slice
    Announce {
        desktop: ProcessId,
        user_id: u32,
        tick: u64,
    },
    /// Admitted or failed; nothing left to drive
    Settled,
}

/// Init program hosting the authentication gate
pub struct GateProcess {
    gate: AuthGate,
    timeout_ticks: u64,
    phase: Phase,
    auth_service: Option<Box<dyn Program>>,
    sensors: Vec<(&'static str, Box<dyn Program>)>,
    desktop: Option<Box<dyn Program>>,
    admission: &'static AdmissionFlag,
    status: GateStatus,
}

impl GateProcess {
    pub fn new(
        config: &GateConfig,
        auth_service: Box<dyn Program>,
        desktop: Box<dyn Program>,
        admission: &'static AdmissionFlag,
    ) -> Self {
        let gate = AuthGate::new(config);
        let status = Rc::new(Cell::new(gate.state()));
        Self {
            gate,
            timeout_ticks: config.verification_timeout_ticks.max(1),
            phase: Phase::Start,
            auth_service: Some(auth_service),
            sensors: Vec::new(),
            desktop: Some(desktop),
            admission,
            status,
        }
    }

    /// Also spawn `program` as `name` right after the auth service.
    pub fn with_sensor(mut self, name: &'static str, program: Box<dyn Program>) -> Self {
        self.sensors.push((name, program));
        self
    }

    /// Handle that follows the gate state
    pub fn status(&self) -> GateStatus {
        self.status.clone()
    }

    fn log(sys: &Syscalls<'_>, msg: &str) {
        sys.debug(&alloc::format!("[init] {}", msg));
    }

    fn sync_status(&self) {
        self.status.set(self.gate.state());
    }

    /// Bind the channel and start the services.
    fn start(&mut self, sys: &mut Syscalls<'_>) -> Result<(), KernelError> {
        Self::log(sys, "AeroDesk init starting (PID 1)");
        sys.bind_channel(channel::AUTH)?;

        let service = self.auth_service.take().ok_or(KernelError::InvalidState)?;
        let pid = sys.spawn(names::AUTH_SERVICE, service)?;
        self.gate.register_service(pid);
        Self::log(sys, &alloc::format!("Spawned {} (PID {})", names::AUTH_SERVICE, pid));

        for (name, program) in self.sensors.drain(..) {
            match sys.spawn(name, program) {
                Ok(pid) => Self::log(sys, &alloc::format!("Spawned {} (PID {})", name, pid)),
                Err(e) => warn!(target: "gate", "sensor '{}' not started: {}", name, e),
            }
        }
        Self::log(sys, "Waiting for biometric authentication...");
        Ok(())
    }

    /// Ask the service for a verdict and arm the timeout.
    fn request(&mut self, sys: &mut Syscalls<'_>) -> Result<(), KernelError> {
        let service = self.gate.service().ok_or(KernelError::InvalidState)?;
        let now = sys.now();
        let req = AuthMessage::verify_request(self.gate.user_id(), now as u32);
        if let GateState::AwaitingVerification { attempt } = self.gate.state() {
            debug!(target: "gate", "verification attempt {} of {}", attempt, self.gate.retry_limit());
        }
        self.phase = Phase::Waiting {
            deadline: now.saturating_add(self.timeout_ticks),
        };
        sys.send(service.0, MSG_AUTH, &req.encode())
    }

    /// Record a denied attempt and choose what happens next.
    fn denied(&mut self, sys: &Syscalls<'_>, err: KernelError) -> Resume {
        self.sync_status();
        match err {
            KernelError::AuthenticationDenied => {
                warn!(
                    target: "gate",
                    "authentication denied ({} of {})",
                    self.gate.denials(), self.gate.retry_limit()
                );
                Self::log(sys, "Authentication denied, retrying");
                self.phase = Phase::Request;
                Resume::Yield
            }
            KernelError::FatalBootFailure => {
                error!(target: "gate", "retry limit reached; desktop will not start");
                Self::log(sys, "FATAL: authentication failed, desktop launch aborted");
                self.phase = Phase::Settled;
                Resume::Yield
            }
            other => {
                error!(target: "gate", "unexpected gate error: {}", other);
                self.phase = Phase::Settled;
                Resume::Yield
            }
        }
    }

    /// No verdict for this attempt; fail closed.
    fn lost_attempt(&mut self, sys: &Syscalls<'_>) -> Resume {
        let err = self.gate.on_timeout().err().unwrap_or(KernelError::InvalidState);
        self.denied(sys, err)
    }

    /// Success: start the desktop and queue the `auth_success` announcement.
    fn admit(&mut self, sys: &mut Syscalls<'_>, user_id: u32) {
        self.sync_status();
        Self::log(sys, "Authentication successful!");
        self.phase = Phase::Settled;

        let Some(desktop) = self.desktop.take() else {
            error!(target: "gate", "no desktop program to start");
            return;
        };
        let pid = match sys.spawn(names::DESKTOP_SHELL, desktop) {
            Ok(pid) => pid,
            Err(e) => {
                error!(target: "gate", "desktop spawn failed: {}", e);
                return;
            }
        };
        if let Err(e) = self.gate.admit() {
            error!(target: "gate", "admission refused: {}", e);
            return;
        }
        self.sync_status();
        let now = sys.now();
        self.admission.admit(user_id, now);
        Self::log(sys, "User authenticated, proceeding with desktop launch");
        info!(target: "gate", "user {} admitted, desktop is pid {}", user_id, pid);
        self.phase = Phase::Announce {
            desktop: pid,
            user_id,
            tick: now,
        };
    }

    /// Publish `auth_success` once the desktop had a chance to subscribe.
    ///
    /// A fresh process is Ready until its first slice; publishing before
    /// that would find no subscriber.
    fn announce(
        &mut self,
        sys: &mut Syscalls<'_>,
        desktop: ProcessId,
        user_id: u32,
        tick: u64,
    ) -> Resume {
        if sys.process_state(desktop) == Some(ProcessState::Ready) {
            return Resume::Yield;
        }
        self.phase = Phase::Settled;

        let event = AuthMessage::success(user_id, tick as u32, &[]);
        match sys.publish(topic::AUTH_SUCCESS, &event.encode()) {
            Ok(report) => debug!(target: "gate", "'{}' published: {:?}", topic::AUTH_SUCCESS, report),
            Err(KernelError::UnknownTopic) => {
                debug!(target: "gate", "'{}' has no subscribers", topic::AUTH_SUCCESS)
            }
            Err(e) => warn!(target: "gate", "'{}' not published: {}", topic::AUTH_SUCCESS, e),
        }
        self.idle(sys)
    }

    /// Handle one message from channel 1.
    fn on_message(&mut self, sys: &mut Syscalls<'_>, msg: Message) -> Option<Resume> {
        if msg.tag != MSG_AUTH {
            debug!(target: "gate", "ignoring tag 0x{:04x} on auth channel", msg.tag);
            return None;
        }
        let auth = match AuthMessage::decode(&msg.data) {
            Ok(auth) => auth,
            Err(e) => {
                warn!(target: "gate", "malformed auth message from pid {}: {}", msg.sender, e);
                return None;
            }
        };
        match self.gate.on_result(msg.sender, &auth) {
            Ok(GateOutcome::Ignored) => {
                warn!(target: "gate", "ignoring {:?} from pid {}", auth.kind, msg.sender);
                None
            }
            Ok(GateOutcome::Authenticated { user_id }) => {
                self.admit(sys, user_id);
                Some(Resume::Yield)
            }
            Err(e) => Some(self.denied(sys, e)),
        }
    }

    /// Wait for the verdict until `deadline`.
    fn wait(&mut self, sys: &mut Syscalls<'_>, deadline: u64) -> Resume {
        loop {
            let remaining = deadline.saturating_sub(sys.now()).max(1);
            match sys.receive_with_timeout(Source::Channel(channel::AUTH), remaining) {
                Ok(Some(msg)) => {
                    if let Some(resume) = self.on_message(sys, msg) {
                        return resume;
                    }
                }
                Ok(None) => return Resume::Block,
                Err(KernelError::Timeout) => {
                    Self::log(sys, "Authentication timed out");
                    return self.lost_attempt(sys);
                }
                Err(e) => {
                    error!(target: "gate", "auth channel receive failed: {}", e);
                    self.phase = Phase::Settled;
                    return Resume::Yield;
                }
            }
        }
    }

    /// After the gate settles, init only drains its queue.
    fn idle(&mut self, sys: &mut Syscalls<'_>) -> Resume {
        loop {
            match sys.receive(Source::Any) {
                Ok(Some(msg)) => {
                    debug!(target: "gate", "init: tag 0x{:04x} from pid {}", msg.tag, msg.sender);
                }
                Ok(None) => return Resume::Block,
                Err(KernelError::Timeout) => continue,
                Err(e) => {
                    warn!(target: "gate", "init receive failed: {}", e);
                    return Resume::Yield;
                }
            }
        }
    }
}

impl Program for GateProcess {
    fn resume(&mut self, sys: &mut Syscalls<'_>) -> Resume {
        if self.phase == Phase::Start {
            if let Err(e) = self.start(sys) {
                error!(target: "gate", "boot services failed: {}", e);
                Self::log(sys, "FATAL: authentication service unavailable");
                self.phase = Phase::Settled;
                return Resume::Yield;
            }
            self.phase = Phase::Request;
        }
        if self.phase == Phase::Request {
            if let Err(e) = self.request(sys) {
                // Unreachable service: the attempt is lost
                warn!(target: "gate", "verify request not sent: {}", e);
                return self.lost_attempt(sys);
            }
        }
        match self.phase {
            Phase::Waiting { deadline } => self.wait(sys, deadline),
            Phase::Announce {
                desktop,
                user_id,
                tick,
            } => self.announce(sys, desktop, user_id, tick),
            _ => self.idle(sys),
        }
    }
}
