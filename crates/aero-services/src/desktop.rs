//! Desktop shell
//!
//! The first process spawned after admission. It announces itself on the
//! console, follows `auth_success` events and otherwise sleeps on its
//! inbound queue.

use alloc::boxed::Box;
use alloc::rc::Rc;
use core::cell::Cell;

use aero_ipc::{topic, AuthKind, AuthMessage};
use aero_kernel::{Program, Resume, Syscalls};
use aero_kernel_core::{DeliveryError, KernelError, Source, Subscriber};
use log::{debug, info, warn};

/// Most recent admitted user, shared with the shell
pub type SessionUser = Rc<Cell<Option<u32>>>;

/// `auth_success` subscriber recording the admitted user
pub struct SessionListener {
    user: SessionUser,
}

impl SessionListener {
    pub fn new(user: SessionUser) -> Self {
        Self { user }
    }
}

impl Subscriber for SessionListener {
    fn deliver(&mut self, _topic: &str, payload: &[u8]) -> Result<(), DeliveryError> {
        let msg = AuthMessage::decode(payload).map_err(|_| DeliveryError::Malformed)?;
        if msg.kind != AuthKind::Success {
            return Err(DeliveryError::Malformed);
        }
        self.user.set(Some(msg.user_id));
        Ok(())
    }
}

/// Desktop shell program
#[derive(Default)]
pub struct DesktopShell {
    started: bool,
    user: SessionUser,
}

impl DesktopShell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to the admitted-user cell
    pub fn session_user(&self) -> SessionUser {
        self.user.clone()
    }
}

impl Program for DesktopShell {
    fn resume(&mut self, sys: &mut Syscalls<'_>) -> Resume {
        if !self.started {
            self.started = true;
            sys.debug("[desktop] Desktop shell running");
            info!(target: "proc", "desktop shell started as pid {}", sys.pid());
            let listener = Box::new(SessionListener::new(self.user.clone()));
            if let Err(e) = sys.subscribe(topic::AUTH_SUCCESS, listener) {
                warn!(target: "proc", "desktop: subscribe to '{}' failed: {}", topic::AUTH_SUCCESS, e);
            }
        }
        loop {
            match sys.receive(Source::Any) {
                Ok(Some(msg)) => {
                    debug!(target: "proc", "desktop: tag 0x{:04x} from pid {}", msg.tag, msg.sender);
                }
                Ok(None) => return Resume::Block,
                Err(KernelError::Timeout) => continue,
                Err(e) => {
                    warn!(target: "proc", "desktop: receive failed: {}", e);
                    return Resume::Exit(1);
                }
            }
        }
    }
}
