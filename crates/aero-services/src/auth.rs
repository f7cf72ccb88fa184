//! Authentication Service
//!
//! Runs as `auth_service` (pid 2 in the standard boot). On its first slice
//! it subscribes a [`SampleCollector`] to the sensor topics; afterwards it
//! serves Verify-Requests:
//!
//! ```text
//!   gate ── VerifyRequest (tag MSG_AUTH) ──► auth_service
//!                                              │ verifier.verify(user, window)
//!   gate ◄── Success / Failure on channel 1 ───┘
//! ```
//!
//! The sample window is cleared after every decision so each attempt is
//! judged on fresh data. While the verifier reports `Insufficient` the
//! request is held and re-checked every `recheck_ticks`; a newer request
//! replaces it.

use alloc::boxed::Box;
use alloc::rc::Rc;
use core::cell::RefCell;

use aero_ipc::{channel, topic, AuthKind, AuthMessage, MSG_AUTH, SECURITY_TOKEN_LEN};
use aero_kernel::{Program, Resume, Syscalls};
use aero_kernel_core::{KernelError, Message, Source};
use log::{debug, info, warn};

use crate::collector::{SampleCollector, SampleWindow, SharedWindow};
use crate::verifier::{BiometricVerifier, Verdict};

/// Default interval between re-checks of a held request
pub const DEFAULT_RECHECK_TICKS: u64 = 10;

/// Authentication Service program
pub struct AuthService<V: BiometricVerifier> {
    verifier: V,
    window: SharedWindow,
    subscribed: bool,
    requests: u32,
    /// Request waiting for more samples
    pending: Option<AuthMessage>,
    recheck_ticks: u64,
}

impl<V: BiometricVerifier> AuthService<V> {
    pub fn new(verifier: V) -> Self {
        Self::with_window(verifier, Rc::new(RefCell::new(SampleWindow::default())))
    }

    /// Use a caller-provided window, e.g. to inspect it from a test.
    pub fn with_window(verifier: V, window: SharedWindow) -> Self {
        Self {
            verifier,
            window,
            subscribed: false,
            requests: 0,
            pending: None,
            recheck_ticks: DEFAULT_RECHECK_TICKS,
        }
    }

    pub fn with_recheck_ticks(mut self, ticks: u64) -> Self {
        self.recheck_ticks = ticks.max(1);
        self
    }

    /// Verify-Requests handled so far
    pub fn requests(&self) -> u32 {
        self.requests
    }

    fn subscribe_sensors(&mut self, sys: &mut Syscalls<'_>) {
        for name in [topic::HEART_RATE, topic::EEG_DATA] {
            let collector = Box::new(SampleCollector::new(self.window.clone()));
            if let Err(e) = sys.subscribe(name, collector) {
                warn!(target: "auth", "subscribe to '{}' failed: {}", name, e);
            }
        }
        self.subscribed = true;
    }

    fn handle(&mut self, sys: &mut Syscalls<'_>, msg: Message) {
        if msg.tag != MSG_AUTH {
            debug!(target: "auth", "ignoring tag 0x{:04x} from pid {}", msg.tag, msg.sender);
            return;
        }
        let request = match AuthMessage::decode(&msg.data) {
            Ok(m) if m.kind == AuthKind::VerifyRequest => m,
            Ok(m) => {
                debug!(target: "auth", "ignoring {:?} from pid {}", m.kind, msg.sender);
                return;
            }
            Err(e) => {
                warn!(target: "auth", "malformed request from pid {}: {}", msg.sender, e);
                return;
            }
        };

        self.requests += 1;
        self.evaluate(sys, request);
    }

    /// Decide `request` now, or hold it until more samples arrive.
    fn evaluate(&mut self, sys: &mut Syscalls<'_>, request: AuthMessage) {
        let verdict = self
            .verifier
            .verify(request.user_id, &self.window.borrow());
        let timestamp = sys.now() as u32;
        let reply = match verdict {
            Verdict::Accept => AuthMessage::success(
                request.user_id,
                timestamp,
                &session_token(request.user_id, timestamp, self.requests),
            ),
            Verdict::Reject => AuthMessage::failure(request.user_id, timestamp),
            Verdict::Insufficient => {
                debug!(target: "auth", "user {}: waiting for samples", request.user_id);
                self.pending = Some(request);
                return;
            }
        };
        self.pending = None;
        self.window.borrow_mut().clear();

        match sys.send(channel::AUTH, MSG_AUTH, &reply.encode()) {
            Ok(()) => info!(
                target: "auth",
                "user {} {:?} (request {})",
                request.user_id, verdict, self.requests
            ),
            Err(e) => warn!(target: "auth", "reply for user {} not delivered: {}", request.user_id, e),
        }
    }
}

impl<V: BiometricVerifier> Program for AuthService<V> {
    fn resume(&mut self, sys: &mut Syscalls<'_>) -> Resume {
        if !self.subscribed {
            self.subscribe_sensors(sys);
        }
        loop {
            let received = if self.pending.is_some() {
                sys.receive_with_timeout(Source::Any, self.recheck_ticks)
            } else {
                sys.receive(Source::Any)
            };
            match received {
                Ok(Some(msg)) => self.handle(sys, msg),
                Ok(None) => return Resume::Block,
                // Re-check time for a held request, else the default bound
                Err(KernelError::Timeout) => {
                    if let Some(request) = self.pending.take() {
                        self.evaluate(sys, request);
                    }
                }
                Err(e) => {
                    warn!(target: "auth", "receive failed: {}", e);
                    return Resume::Exit(1);
                }
            }
        }
    }
}

/// FNV-1a 32-bit offset basis
const FNV_OFFSET: u32 = 0x811c_9dc5;
/// FNV-1a 32-bit prime
const FNV_PRIME: u32 = 0x0100_0193;

/// Fold `bytes` into a running FNV-1a hash.
///
/// Written out to stay `no_std` without extra dependencies. Tokens need no
/// cryptographic strength, so no hashing crate is pulled in.
fn fnv1a(mut hash: u32, bytes: &[u8]) -> u32 {
    for b in bytes {
        hash ^= u32::from(*b);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Session token handed out with a Success.
///
/// FNV-1a over (user, timestamp, counter), stretched to the token length
/// by salting each 4-byte chunk with its index. Identifies the session;
/// it carries no cryptographic strength.
pub fn session_token(user_id: u32, timestamp: u32, counter: u32) -> [u8; SECURITY_TOKEN_LEN] {
    let mut seed = [0u8; 12];
    seed[0..4].copy_from_slice(&user_id.to_le_bytes());
    seed[4..8].copy_from_slice(&timestamp.to_le_bytes());
    seed[8..12].copy_from_slice(&counter.to_le_bytes());

    let mut token = [0u8; SECURITY_TOKEN_LEN];
    let mut hash = FNV_OFFSET;
    for (i, chunk) in token.chunks_mut(4).enumerate() {
        hash = fnv1a(hash ^ i as u32, &seed);
        chunk.copy_from_slice(&hash.to_le_bytes()[..chunk.len()]);
    }
    token
}
