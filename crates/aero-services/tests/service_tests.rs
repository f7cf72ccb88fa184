//! Service integration tests
//!
//! Run the authentication service and the sensor publishers on a real
//! `Kernel` over a mock HAL, with a small requester program standing in
//! for the gate.

extern crate alloc;

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::sync::atomic::{AtomicU64, Ordering};

use aero_hal::{CpuContext, HalError, HAL};
use aero_ipc::{channel, topic, AuthKind, AuthMessage, HrvSample, MSG_AUTH};
use aero_kernel::{IdleProgram, Kernel, Program, Resume, Syscalls};
use aero_kernel_core::{
    check_all_invariants, KernelConfig, KernelError, ProcessId, ProcessState, Source,
};
use aero_services::{
    AuthService, DesktopShell, EegPublisher, EnrolledProfile, HrvPublisher, Resting,
    SampleWindow, ScriptedSource, ScriptedVerifier, SharedWindow, ThresholdVerifier, Verdict,
};

// ============================================================================
// Mock HAL for Testing
// ============================================================================

pub struct MockHal {
    time: AtomicU64,
    next_stack: AtomicU64,
    debug_log: RefCell<Vec<String>>,
}

impl MockHal {
    pub fn new() -> Self {
        Self {
            time: AtomicU64::new(0),
            next_stack: AtomicU64::new(0x0020_0000),
            debug_log: RefCell::new(Vec::new()),
        }
    }

    pub fn log_contains(&self, needle: &str) -> bool {
        self.debug_log.borrow().iter().any(|l| l.contains(needle))
    }
}

unsafe impl Send for MockHal {}
unsafe impl Sync for MockHal {}

impl HAL for MockHal {
    fn now_ticks(&self) -> u64 {
        self.time.load(Ordering::SeqCst)
    }

    fn wait_for_interrupt(&self) {
        self.time.fetch_add(1, Ordering::SeqCst);
    }

    fn switch_context(&self, save: &mut CpuContext, load: &CpuContext) {
        *save = *load;
    }

    fn allocate_stack(&self, size: usize) -> Result<u64, HalError> {
        let base = self.next_stack.fetch_add(size as u64, Ordering::SeqCst);
        Ok(base + size as u64)
    }

    fn debug_write(&self, msg: &str) {
        self.debug_log.borrow_mut().push(String::from(msg));
    }
}

// ============================================================================
// Requester: a minimal stand-in for the gate
// ============================================================================

type Reply = Rc<RefCell<Option<AuthMessage>>>;

enum Phase {
    Sleeping,
    Request,
    Waiting,
}

/// Binds channel 1, optionally sleeps, sends one Verify-Request to the
/// service and records the reply.
struct Requester {
    service: ProcessId,
    user_id: u32,
    delay: u64,
    phase: Phase,
    bound: bool,
    reply: Reply,
}

impl Requester {
    fn new(service: ProcessId, user_id: u32, delay: u64, reply: Reply) -> Self {
        Self {
            service,
            user_id,
            delay,
            phase: if delay > 0 { Phase::Sleeping } else { Phase::Request },
            bound: false,
            reply,
        }
    }
}

impl Program for Requester {
    fn resume(&mut self, sys: &mut Syscalls<'_>) -> Resume {
        if !self.bound {
            sys.bind_channel(channel::AUTH).unwrap();
            self.bound = true;
        }
        if let Phase::Sleeping = self.phase {
            // Nobody is pid u32::MAX, so this only ends by timeout
            match sys.receive_with_timeout(Source::Process(ProcessId(u32::MAX)), self.delay) {
                Ok(None) => return Resume::Block,
                Err(KernelError::Timeout) => self.phase = Phase::Request,
                other => panic!("unexpected sleep result: {:?}", other),
            }
        }
        if let Phase::Request = self.phase {
            let req = AuthMessage::verify_request(self.user_id, sys.now() as u32);
            sys.send(self.service.0, MSG_AUTH, &req.encode()).unwrap();
            self.phase = Phase::Waiting;
        }
        match sys.receive(Source::Channel(channel::AUTH)) {
            Ok(Some(msg)) => {
                assert_eq!(msg.tag, MSG_AUTH);
                *self.reply.borrow_mut() = Some(AuthMessage::decode(&msg.data).unwrap());
                Resume::Exit(0)
            }
            Ok(None) => Resume::Block,
            Err(e) => panic!("receive failed: {}", e),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn booted() -> Kernel<MockHal> {
    let mut kernel = Kernel::new(MockHal::new(), KernelConfig::default());
    kernel.spawn_idle(Box::new(IdleProgram)).unwrap();
    kernel
}

fn reply() -> Reply {
    Rc::new(RefCell::new(None))
}

fn run_until_exit(kernel: &mut Kernel<MockHal>, pid: ProcessId) {
    let done = kernel.run_until(2_000, |s| {
        s.get(pid).map(|p| p.state) == Some(ProcessState::Terminated)
    });
    assert!(done.is_some(), "pid {} never exited", pid);
    let violations = check_all_invariants(kernel.state());
    assert!(violations.is_empty(), "{:?}", violations);
}

// ============================================================================
// Authentication Service
// ============================================================================

#[test]
fn test_service_accepts_with_token() {
    let mut kernel = booted();
    let r = reply();
    let requester = kernel
        .spawn("init", Box::new(Requester::new(ProcessId(2), 1, 0, r.clone())))
        .unwrap();
    kernel
        .spawn("auth_service", Box::new(AuthService::new(ScriptedVerifier::accept())))
        .unwrap();

    run_until_exit(&mut kernel, requester);

    let msg = r.borrow().unwrap();
    assert_eq!(msg.kind, AuthKind::Success);
    assert_eq!(msg.user_id, 1);
    assert_ne!(msg.token(), &[0u8; 32]);
}

#[test]
fn test_service_rejects_with_zero_token() {
    let mut kernel = booted();
    let r = reply();
    let requester = kernel
        .spawn("init", Box::new(Requester::new(ProcessId(2), 1, 0, r.clone())))
        .unwrap();
    kernel
        .spawn("auth_service", Box::new(AuthService::new(ScriptedVerifier::reject())))
        .unwrap();

    run_until_exit(&mut kernel, requester);

    let msg = r.borrow().unwrap();
    assert_eq!(msg.kind, AuthKind::Failure);
    assert_eq!(msg.token(), &[0u8; 32]);
}

#[test]
fn test_service_subscribes_to_sensor_topics() {
    let mut kernel = booted();
    kernel
        .spawn("auth_service", Box::new(AuthService::new(ScriptedVerifier::accept())))
        .unwrap();
    kernel.run(3);

    let topics = &kernel.state().topics;
    assert_eq!(topics.subscriber_count(topic::HEART_RATE), 1);
    assert_eq!(topics.subscriber_count(topic::EEG_DATA), 1);
    assert_eq!(
        kernel.state().get(ProcessId(1)).map(|p| p.state),
        Some(ProcessState::Blocked)
    );
}

#[test]
fn test_threshold_verifier_with_live_sensors() {
    let mut kernel = booted();
    let r = reply();
    let mut verifier = ThresholdVerifier::new();
    verifier
        .enroll(EnrolledProfile {
            min_samples: 3,
            ..EnrolledProfile::default()
        })
        .unwrap();

    let requester = kernel
        .spawn("init", Box::new(Requester::new(ProcessId(2), 1, 40, r.clone())))
        .unwrap();
    kernel
        .spawn("auth_service", Box::new(AuthService::new(verifier)))
        .unwrap();
    kernel
        .spawn("hrv_sensor", Box::new(HrvPublisher::new(Resting, 5)))
        .unwrap();
    kernel
        .spawn("eeg_sensor", Box::new(EegPublisher::new(Resting, 5)))
        .unwrap();

    run_until_exit(&mut kernel, requester);

    assert_eq!(r.borrow().map(|m| m.kind), Some(AuthKind::Success));
    let metrics = kernel.state().topics.metrics(topic::HEART_RATE).unwrap();
    assert!(metrics.delivered >= 3);
}

#[test]
fn test_unknown_user_rejected() {
    let mut kernel = booted();
    let r = reply();
    let mut verifier = ThresholdVerifier::new();
    verifier.enroll(EnrolledProfile::default()).unwrap();

    let requester = kernel
        .spawn("init", Box::new(Requester::new(ProcessId(2), 5, 0, r.clone())))
        .unwrap();
    kernel
        .spawn("auth_service", Box::new(AuthService::new(verifier)))
        .unwrap();

    run_until_exit(&mut kernel, requester);
    assert_eq!(r.borrow().map(|m| m.kind), Some(AuthKind::Failure));
}

#[test]
fn test_request_held_until_samples_arrive() {
    let mut kernel = booted();
    let r = reply();
    let mut verifier = ThresholdVerifier::new();
    verifier
        .enroll(EnrolledProfile {
            min_samples: 4,
            ..EnrolledProfile::default()
        })
        .unwrap();

    let requester = kernel
        .spawn("init", Box::new(Requester::new(ProcessId(2), 1, 0, r.clone())))
        .unwrap();
    kernel
        .spawn(
            "auth_service",
            Box::new(AuthService::new(verifier).with_recheck_ticks(3)),
        )
        .unwrap();

    // No sensors: the request is held, no reply
    kernel.run(40);
    assert!(r.borrow().is_none());
    assert_eq!(
        kernel.state().get(requester).map(|p| p.state),
        Some(ProcessState::Blocked)
    );

    // Samples start flowing; the held request is decided on a re-check
    kernel
        .spawn("hrv_sensor", Box::new(HrvPublisher::new(Resting, 2)))
        .unwrap();
    run_until_exit(&mut kernel, requester);
    assert_eq!(r.borrow().map(|m| m.kind), Some(AuthKind::Success));
}

#[test]
fn test_window_cleared_after_decision() {
    let mut kernel = booted();
    let r = reply();
    let window: SharedWindow = Rc::new(RefCell::new(SampleWindow::default()));
    let service = AuthService::with_window(
        ScriptedVerifier::new([Verdict::Accept], Verdict::Reject),
        window.clone(),
    );

    kernel.spawn("auth_service", Box::new(service)).unwrap();
    kernel
        .spawn("hrv_sensor", Box::new(HrvPublisher::new(Resting, 2)))
        .unwrap();
    let requester = kernel
        .spawn("init", Box::new(Requester::new(ProcessId(1), 1, 11, r.clone())))
        .unwrap();

    run_until_exit(&mut kernel, requester);
    assert_eq!(r.borrow().map(|m| m.kind), Some(AuthKind::Success));
    // Cleared at the decision; anything now held arrived afterwards
    assert!(window.borrow().hrv().len() <= 1);
}

// ============================================================================
// Sensors
// ============================================================================

#[test]
fn test_publisher_without_subscribers_keeps_running() {
    let mut kernel = booted();
    let pid = kernel
        .spawn("hrv_sensor", Box::new(HrvPublisher::new(Resting, 1)))
        .unwrap();
    kernel.run(50);
    assert!(kernel.state().get(pid).is_some_and(|p| p.is_live()));
    assert_eq!(kernel.state().topics.topic_count(), 0);
}

#[test]
fn test_exhausted_source_exits() {
    let mut kernel = booted();
    let pid = kernel
        .spawn(
            "hrv_sensor",
            Box::new(HrvPublisher::new(
                ScriptedSource::new([HrvSample::default(), HrvSample::default()]),
                1,
            )),
        )
        .unwrap();
    run_until_exit(&mut kernel, pid);
    assert_eq!(kernel.state().get(pid).and_then(|p| p.exit_code), Some(0));
}

// ============================================================================
// Desktop
// ============================================================================

#[test]
fn test_desktop_announces_and_blocks() {
    let mut kernel = booted();
    let shell = DesktopShell::new();
    let user = shell.session_user();
    let pid = kernel.spawn("desktop_shell", Box::new(shell)).unwrap();
    kernel.run(2);

    assert!(kernel.hal().log_contains("[desktop] Desktop shell running"));
    assert_eq!(kernel.state().get(pid).map(|p| p.state), Some(ProcessState::Blocked));
    assert_eq!(kernel.state().topics.subscriber_count(topic::AUTH_SUCCESS), 1);

    let success = AuthMessage::success(4, 10, &[1]);
    kernel
        .state_mut()
        .publish(ProcessId::IDLE, topic::AUTH_SUCCESS, &success.encode())
        .unwrap();
    assert_eq!(user.get(), Some(4));
}
