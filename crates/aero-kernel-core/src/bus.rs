//! SAL message bus
//!
//! Point-to-point send/receive over per-process inbound queues, reserved
//! channel bindings, and the process-facing side of publish/subscribe.
//!
//! # Blocking
//!
//! `receive` never waits inside itself. With nothing queued it marks the
//! caller Blocked and returns `Ok(None)`; the caller hands control back to
//! the scheduler and calls `receive` again once it is Ready:
//!
//! ```text
//!   receive ──(queued)──────────────▶ Ok(Some(msg))
//!      │
//!      └─(empty)─▶ Blocked ─(send)──▶ Ready ─▶ receive ─▶ Ok(Some(msg))
//!                     │
//!                     └─(tick ≥ deadline)─▶ Ready ─▶ receive ─▶ Err(Timeout)
//! ```

use alloc::boxed::Box;

use log::{debug, trace};

use crate::error::KernelError;
use crate::state::KernelState;
use crate::topics::{PublishReport, Subscriber, SubscriptionId};
use crate::types::{Message, ProcessId, ProcessState, Source, WakeReason, MAX_MESSAGE_SIZE};

impl KernelState {
    // ========================================================================
    // Channels
    // ========================================================================

    /// Make `pid` the listener of a reserved channel.
    pub fn bind_channel(&mut self, channel: u32, pid: ProcessId) -> Result<(), KernelError> {
        if !aero_ipc::channel::is_reserved(channel) {
            return Err(KernelError::InvalidDestination);
        }
        self.processes.live(pid)?;
        match self.channels.get(&channel) {
            Some(owner) if *owner != pid => return Err(KernelError::InvalidState),
            _ => {}
        }
        self.channels.insert(channel, pid);
        debug!(target: "sal", "channel {} bound to pid {}", channel, pid);
        Ok(())
    }

    /// Release a channel binding held by `pid`.
    pub fn unbind_channel(&mut self, channel: u32, pid: ProcessId) -> Result<(), KernelError> {
        match self.channels.get(&channel) {
            Some(owner) if *owner == pid => {
                self.channels.remove(&channel);
                Ok(())
            }
            _ => Err(KernelError::InvalidState),
        }
    }

    /// Current listener of a reserved channel
    pub fn channel_listener(&self, channel: u32) -> Option<ProcessId> {
        self.channels.get(&channel).copied()
    }

    // ========================================================================
    // Send / receive
    // ========================================================================

    /// Queue `payload` for `destination` (a pid or a bound reserved channel).
    ///
    /// Nothing is queued unless every check passes. A Blocked receiver whose
    /// filter matches is made Ready.
    pub fn send(
        &mut self,
        sender: ProcessId,
        destination: u32,
        tag: u32,
        payload: &[u8],
    ) -> Result<(), KernelError> {
        if payload.len() > MAX_MESSAGE_SIZE {
            return Err(KernelError::PayloadTooLarge);
        }
        self.processes.live(sender)?;

        let (target, channel) = self.resolve(destination)?;
        let capacity = self.config.queue_capacity;
        let receiver = self.processes.live_mut(target)
            .map_err(|_| KernelError::InvalidDestination)?;
        if receiver.inbox.len() >= capacity {
            return Err(KernelError::QueueFull);
        }

        let msg = Message {
            sender,
            destination,
            channel,
            tag,
            data: payload.to_vec(),
        };
        let wakes = receiver.state == ProcessState::Blocked
            && receiver.waiting.is_some_and(|filter| filter.matches(&msg));

        receiver.inbox.push_back(msg);
        receiver.metrics.queue_high_water =
            receiver.metrics.queue_high_water.max(receiver.inbox.len());
        if wakes {
            receiver.state = ProcessState::Ready;
            receiver.deadline = None;
            receiver.wake_reason = Some(WakeReason::Message);
            trace!(target: "sal", "pid {} woken by pid {}", target, sender);
        }

        if let Some(proc) = self.processes.get_mut(sender) {
            proc.metrics.ipc_sent += 1;
            proc.metrics.ipc_bytes_sent += payload.len() as u64;
        }
        self.total_messages += 1;
        trace!(
            target: "sal",
            "send {} -> {} tag 0x{:04x} len {}",
            sender, destination, tag, payload.len()
        );
        Ok(())
    }

    /// Map a destination to its receiving process.
    ///
    /// Reserved channel ids take precedence over pids of the same value.
    fn resolve(&self, destination: u32) -> Result<(ProcessId, Option<u32>), KernelError> {
        if aero_ipc::channel::is_reserved(destination) {
            let listener = self
                .channels
                .get(&destination)
                .ok_or(KernelError::InvalidDestination)?;
            Ok((*listener, Some(destination)))
        } else {
            Ok((ProcessId(destination), None))
        }
    }

    /// Dequeue the first message matching `source`.
    ///
    /// * `Ok(Some(msg))` - a matching message was queued
    /// * `Ok(None)` - nothing matched; the caller is now Blocked
    /// * `Err(Timeout)` - the caller was woken by its deadline
    ///
    /// The wait bound is `timeout` when given, else the configured default.
    pub fn receive(
        &mut self,
        pid: ProcessId,
        source: Source,
        timeout: Option<u64>,
    ) -> Result<Option<Message>, KernelError> {
        let default_timeout = self.config.receive_timeout_ticks;
        let now = self.now;
        let proc = self.processes.live_mut(pid)?;

        if let Some(index) = proc.inbox.iter().position(|m| source.matches(m)) {
            let msg = proc.inbox.remove(index);
            proc.clear_wait();
            if let Some(msg) = &msg {
                proc.metrics.ipc_received += 1;
                proc.metrics.ipc_bytes_received += msg.data.len() as u64;
            }
            return Ok(msg);
        }

        if proc.wake_reason == Some(WakeReason::Timeout) {
            proc.clear_wait();
            debug!(target: "sal", "pid {} receive timed out", pid);
            return Err(KernelError::Timeout);
        }

        proc.state = ProcessState::Blocked;
        proc.waiting = Some(source);
        proc.wake_reason = None;
        proc.deadline = timeout.or(default_timeout).map(|t| now.saturating_add(t));
        self.scheduler.release(pid);
        trace!(target: "sal", "pid {} blocked on {:?}", pid, source);
        Ok(None)
    }

    /// Advance the clock, readying Blocked processes whose deadline passed.
    ///
    /// Returns how many were woken.
    pub fn tick(&mut self, now: u64) -> usize {
        self.now = now;
        let mut woken = 0;
        for proc in self.processes.iter_mut() {
            if proc.state != ProcessState::Blocked {
                continue;
            }
            if proc.deadline.is_some_and(|d| now >= d) {
                proc.state = ProcessState::Ready;
                proc.deadline = None;
                proc.wake_reason = Some(WakeReason::Timeout);
                woken += 1;
            }
        }
        woken
    }

    // ========================================================================
    // Publish / subscribe
    // ========================================================================

    /// Register a subscriber for `topic` on behalf of `pid`.
    pub fn subscribe(
        &mut self,
        pid: ProcessId,
        topic: &str,
        subscriber: Box<dyn Subscriber>,
    ) -> Result<SubscriptionId, KernelError> {
        self.processes.live(pid)?;
        let id = self.topics.subscribe(pid, topic, subscriber)?;
        debug!(target: "sal", "pid {} subscribed to '{}'", pid, topic);
        Ok(id)
    }

    /// Remove one subscription.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> Option<Box<dyn Subscriber>> {
        self.topics.unsubscribe(id)
    }

    /// Publish `payload` from `pid` to every subscriber of `topic`.
    pub fn publish(
        &mut self,
        pid: ProcessId,
        topic: &str,
        payload: &[u8],
    ) -> Result<PublishReport, KernelError> {
        self.processes.live(pid)?;
        let report = self
            .topics
            .publish(topic, payload, self.config.publish_policy)?;
        if let Some(proc) = self.processes.get_mut(pid) {
            proc.metrics.publishes += 1;
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{KernelConfig, PublishPolicy};
    use crate::error::DeliveryError;
    use crate::invariants::check_all_invariants;
    use aero_hal::{AddressSpace, CpuContext};
    use aero_ipc::channel::AUTH;
    use alloc::rc::Rc;
    use alloc::vec;
    use alloc::vec::Vec;
    use core::cell::RefCell;

    fn kernel(config: KernelConfig) -> (KernelState, ProcessId, ProcessId) {
        let mut state = KernelState::new(config);
        state.spawn_idle(CpuContext::default()).unwrap();
        let a = state
            .spawn("a", CpuContext::default(), AddressSpace::Kernel)
            .unwrap();
        let b = state
            .spawn("b", CpuContext::default(), AddressSpace::Kernel)
            .unwrap();
        (state, a, b)
    }

    fn assert_invariants(state: &KernelState) {
        let violations = check_all_invariants(state);
        assert!(violations.is_empty(), "{:?}", violations);
    }

    // ========================================================================
    // Send / receive
    // ========================================================================

    #[test]
    fn test_send_then_receive_is_byte_identical() {
        let (mut state, a, b) = kernel(KernelConfig::default());
        let payload: Vec<u8> = (0..=255u8).cycle().take(MAX_MESSAGE_SIZE).collect();
        state.send(a, b.0, 7, &payload).unwrap();
        let msg = state.receive(b, Source::Process(a), None).unwrap().unwrap();
        assert_eq!(msg.data, payload);
        assert_eq!(msg.len() as usize, payload.len());
        assert_eq!(msg.sender, a);
        assert_eq!(msg.tag, 7);
        assert_invariants(&state);
    }

    #[test]
    fn test_payload_too_large_not_queued() {
        let (mut state, a, b) = kernel(KernelConfig::default());
        let payload = vec![0u8; MAX_MESSAGE_SIZE + 1];
        assert_eq!(
            state.send(a, b.0, 0, &payload),
            Err(KernelError::PayloadTooLarge)
        );
        assert!(state.get(b).unwrap().inbox.is_empty());
    }

    #[test]
    fn test_queue_full_leaves_queue_untouched() {
        let config = KernelConfig {
            queue_capacity: 2,
            ..KernelConfig::default()
        };
        let (mut state, a, b) = kernel(config);
        state.send(a, b.0, 1, b"one").unwrap();
        state.send(a, b.0, 2, b"two").unwrap();
        assert_eq!(state.send(a, b.0, 3, b"three"), Err(KernelError::QueueFull));

        let inbox = &state.get(b).unwrap().inbox;
        assert_eq!(inbox.len(), 2);
        assert_eq!(inbox[0].data, b"one");
        assert_eq!(inbox[1].data, b"two");
        assert_eq!(state.total_messages, 2);
    }

    #[test]
    fn test_invalid_destinations() {
        let (mut state, a, b) = kernel(KernelConfig::default());
        assert_eq!(state.send(a, 99, 0, &[]), Err(KernelError::InvalidDestination));
        // Reserved channel with no listener
        assert_eq!(state.send(a, AUTH, 0, &[]), Err(KernelError::InvalidDestination));
        state.exit(b, 0).unwrap();
        assert_eq!(state.send(a, b.0, 0, &[]), Err(KernelError::InvalidDestination));
        assert_eq!(state.send(b, a.0, 0, &[]), Err(KernelError::ProcessNotFound));
    }

    #[test]
    fn test_receive_filters_fifo_among_matches() {
        let (mut state, a, b) = kernel(KernelConfig::default());
        let c = state
            .spawn("c", CpuContext::default(), AddressSpace::Kernel)
            .unwrap();
        state.send(a, c.0, 1, b"a1").unwrap();
        state.send(b, c.0, 2, b"b1").unwrap();
        state.send(a, c.0, 3, b"a2").unwrap();

        let m = state.receive(c, Source::Process(b), None).unwrap().unwrap();
        assert_eq!(m.data, b"b1");
        let m = state.receive(c, Source::Any, None).unwrap().unwrap();
        assert_eq!(m.data, b"a1");
        let m = state.receive(c, Source::Any, None).unwrap().unwrap();
        assert_eq!(m.data, b"a2");
    }

    // ========================================================================
    // Blocking
    // ========================================================================

    #[test]
    fn test_receive_blocks_and_send_wakes() {
        let (mut state, a, b) = kernel(KernelConfig::default());
        assert_eq!(state.schedule().next(), Some(a));

        assert_eq!(state.receive(a, Source::Any, None), Ok(None));
        assert_eq!(state.get(a).unwrap().state, ProcessState::Blocked);
        assert_eq!(state.current(), None);
        assert_invariants(&state);

        // a is skipped while blocked
        assert_eq!(state.schedule().next(), Some(b));
        assert_eq!(state.schedule().next(), Some(b));

        state.send(b, a.0, 5, b"wake").unwrap();
        assert_eq!(state.get(a).unwrap().state, ProcessState::Ready);
        assert_eq!(state.get(a).unwrap().wake_reason, Some(WakeReason::Message));
        assert_invariants(&state);

        assert_eq!(state.schedule().next(), Some(a));
        let msg = state.receive(a, Source::Any, None).unwrap().unwrap();
        assert_eq!(msg.data, b"wake");
        assert!(state.get(a).unwrap().waiting.is_none());
    }

    #[test]
    fn test_non_matching_send_does_not_wake() {
        let (mut state, a, b) = kernel(KernelConfig::default());
        let c = state
            .spawn("c", CpuContext::default(), AddressSpace::Kernel)
            .unwrap();
        state.receive(a, Source::Process(c), None).unwrap();
        state.send(b, a.0, 0, b"x").unwrap();
        assert_eq!(state.get(a).unwrap().state, ProcessState::Blocked);
        assert_invariants(&state);
        state.send(c, a.0, 0, b"y").unwrap();
        assert_eq!(state.get(a).unwrap().state, ProcessState::Ready);
    }

    #[test]
    fn test_receive_timeout() {
        let (mut state, a, _b) = kernel(KernelConfig::default());
        state.tick(100);
        assert_eq!(state.receive(a, Source::Any, Some(10)), Ok(None));
        assert_eq!(state.get(a).unwrap().deadline, Some(110));

        assert_eq!(state.tick(109), 0);
        assert_eq!(state.get(a).unwrap().state, ProcessState::Blocked);
        assert_eq!(state.tick(110), 1);
        assert_eq!(state.get(a).unwrap().state, ProcessState::Ready);

        assert_eq!(state.receive(a, Source::Any, Some(10)), Err(KernelError::Timeout));
        assert!(state.get(a).unwrap().wake_reason.is_none());
        assert_invariants(&state);
    }

    #[test]
    fn test_default_timeout_from_config() {
        let config = KernelConfig {
            receive_timeout_ticks: Some(5),
            ..KernelConfig::default()
        };
        let (mut state, a, _b) = kernel(config);
        state.receive(a, Source::Any, None).unwrap();
        assert_eq!(state.get(a).unwrap().deadline, Some(5));
    }

    #[test]
    fn test_unbounded_receive_never_times_out() {
        let (mut state, a, _b) = kernel(KernelConfig::default());
        state.receive(a, Source::Any, None).unwrap();
        assert_eq!(state.tick(u64::MAX), 0);
        assert_eq!(state.get(a).unwrap().state, ProcessState::Blocked);
    }

    // ========================================================================
    // Channels
    // ========================================================================

    #[test]
    fn test_channel_routes_to_listener() {
        let (mut state, a, b) = kernel(KernelConfig::default());
        // pid 1 is `a`; channel 1 still goes to its bound listener `b`
        state.bind_channel(AUTH, b).unwrap();
        state.send(a, AUTH, 0x100, b"verdict").unwrap();
        assert!(state.get(a).unwrap().inbox.is_empty());

        assert_eq!(state.receive(b, Source::Process(a), None), Ok(None));
        state.processes.get_mut(b).unwrap().state = ProcessState::Ready;
        let msg = state.receive(b, Source::Channel(AUTH), None).unwrap().unwrap();
        assert_eq!(msg.channel, Some(AUTH));
        assert_eq!(msg.destination, AUTH);
        assert_eq!(msg.sender, a);
    }

    #[test]
    fn test_bind_rules() {
        let (mut state, a, b) = kernel(KernelConfig::default());
        assert_eq!(state.bind_channel(77, a), Err(KernelError::InvalidDestination));
        state.bind_channel(AUTH, a).unwrap();
        state.bind_channel(AUTH, a).unwrap();
        assert_eq!(state.bind_channel(AUTH, b), Err(KernelError::InvalidState));
        assert_eq!(state.unbind_channel(AUTH, b), Err(KernelError::InvalidState));
        state.unbind_channel(AUTH, a).unwrap();
        assert_eq!(state.channel_listener(AUTH), None);
    }

    #[test]
    fn test_exit_releases_bus_resources() {
        let (mut state, a, b) = kernel(KernelConfig::default());
        state.bind_channel(AUTH, a).unwrap();
        state.send(b, a.0, 0, b"pending").unwrap();
        state.subscribe(a, "heart_rate", Box::new(Sink)).unwrap();

        state.exit(a, 0).unwrap();
        assert_eq!(state.channel_listener(AUTH), None);
        assert!(state.get(a).unwrap().inbox.is_empty());
        assert_eq!(state.topics.subscriber_count("heart_rate"), 0);
        assert_invariants(&state);
    }

    // ========================================================================
    // Publish / subscribe
    // ========================================================================

    struct Sink;

    impl Subscriber for Sink {
        fn deliver(&mut self, _topic: &str, _payload: &[u8]) -> Result<(), DeliveryError> {
            Ok(())
        }
    }

    struct Counter(Rc<RefCell<Vec<&'static str>>>, &'static str, bool);

    impl Subscriber for Counter {
        fn deliver(&mut self, _topic: &str, _payload: &[u8]) -> Result<(), DeliveryError> {
            self.0.borrow_mut().push(self.1);
            if self.2 {
                Err(DeliveryError::Malformed)
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_publish_fan_out_isolated_from_failure() {
        let (mut state, a, b) = kernel(KernelConfig::default());
        let seen = Rc::new(RefCell::new(Vec::new()));
        state
            .subscribe(a, "eeg_data", Box::new(Counter(seen.clone(), "first", false)))
            .unwrap();
        state
            .subscribe(b, "eeg_data", Box::new(Counter(seen.clone(), "second", true)))
            .unwrap();
        state
            .subscribe(a, "eeg_data", Box::new(Counter(seen.clone(), "third", false)))
            .unwrap();

        let report = state.publish(b, "eeg_data", &[1, 2, 3]).unwrap();
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(*seen.borrow(), ["first", "second", "third"]);
        assert_eq!(state.system_metrics().delivery_failures, 1);
        assert_eq!(state.get(b).unwrap().metrics.publishes, 1);
    }

    #[test]
    fn test_publish_policy() {
        let (mut state, a, _b) = kernel(KernelConfig::default());
        assert_eq!(
            state.publish(a, "auth_success", &[]),
            Err(KernelError::UnknownTopic)
        );
        state.config.publish_policy = PublishPolicy::Drop;
        assert_eq!(state.publish(a, "auth_success", &[]).unwrap().delivered, 0);
    }

    #[test]
    fn test_subscribe_requires_live_process() {
        let (mut state, a, _b) = kernel(KernelConfig::default());
        state.exit(a, 0).unwrap();
        assert_eq!(
            state.subscribe(a, "heart_rate", Box::new(Sink)).err(),
            Some(KernelError::ProcessNotFound)
        );
    }
}
