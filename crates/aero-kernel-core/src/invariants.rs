//! Kernel invariants
//!
//! Runtime-checkable properties that must hold between any two kernel
//! operations. Integration tests assert `check_all_invariants` is empty
//! after every step; debug builds of the runtime check them each slice.
//!
//! # Invariants
//!
//! 1. **Single Running**: at most one process is Running, and it is the
//!    scheduler's current process
//! 2. **Slot Identity**: every slot's pid equals its index; pid 0 is idle
//! 3. **Capacity**: user slots never exceed the configured capacity
//! 4. **Queue Bounds**: inboxes respect queue capacity and the transport unit
//! 5. **Blocked Consistency**: a Blocked process has a receive filter and no
//!    queued message that matches it
//! 6. **Terminated Clean**: terminated processes hold no messages, channel
//!    bindings or subscriptions
//! 7. **Topic Bounds**: the topic table respects its size and name limits

use alloc::string::String;
use alloc::vec::Vec;

use crate::state::KernelState;
use crate::types::{ProcessId, ProcessState, MAX_MESSAGE_SIZE};

/// An invariant violation with details
#[derive(Clone, Debug)]
pub struct InvariantViolation {
    /// Name of the violated invariant
    pub invariant: &'static str,
    /// Description of what went wrong
    pub description: String,
}

/// Check all kernel invariants.
///
/// Returns a list of violations (empty if all invariants hold).
pub fn check_all_invariants(state: &KernelState) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    violations.extend(check_single_running(state));
    violations.extend(check_slot_identity(state));
    violations.extend(check_capacity(state));
    violations.extend(check_queue_bounds(state));
    violations.extend(check_blocked_consistency(state));
    violations.extend(check_terminated_clean(state));
    violations.extend(check_topic_bounds(state));

    violations
}

/// Invariant 1: at most one Running process, tracked by the scheduler
fn check_single_running(state: &KernelState) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();
    let running: Vec<ProcessId> = state
        .list()
        .iter()
        .filter(|p| p.state == ProcessState::Running)
        .map(|p| p.pid)
        .collect();

    if running.len() > 1 {
        violations.push(InvariantViolation {
            invariant: "single_running",
            description: alloc::format!("{} processes Running: {:?}", running.len(), running),
        });
    }

    let current = state.current();
    if running.first().copied() != current {
        violations.push(InvariantViolation {
            invariant: "single_running",
            description: alloc::format!(
                "scheduler current {:?} but Running set is {:?}",
                current,
                running
            ),
        });
    }

    violations
}

/// Invariant 2: slot index == pid
fn check_slot_identity(state: &KernelState) -> Vec<InvariantViolation> {
    state
        .list()
        .iter()
        .enumerate()
        .filter(|(slot, p)| p.pid.slot() != *slot)
        .map(|(slot, p)| InvariantViolation {
            invariant: "slot_identity",
            description: alloc::format!("slot {} holds pid {}", slot, p.pid),
        })
        .collect()
}

/// Invariant 3: user slots within capacity
fn check_capacity(state: &KernelState) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();
    let used = state.processes.user_slots_used();
    if used > state.processes.capacity() {
        violations.push(InvariantViolation {
            invariant: "capacity",
            description: alloc::format!(
                "{} user slots used, capacity {}",
                used,
                state.processes.capacity()
            ),
        });
    }
    violations
}

/// Invariant 4: inbox sizes and payload sizes
fn check_queue_bounds(state: &KernelState) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();
    for proc in state.list() {
        if proc.inbox.len() > state.config.queue_capacity {
            violations.push(InvariantViolation {
                invariant: "queue_bounds",
                description: alloc::format!(
                    "pid {} has {} queued, capacity {}",
                    proc.pid,
                    proc.inbox.len(),
                    state.config.queue_capacity
                ),
            });
        }
        for msg in &proc.inbox {
            if msg.data.len() > MAX_MESSAGE_SIZE {
                violations.push(InvariantViolation {
                    invariant: "queue_bounds",
                    description: alloc::format!(
                        "pid {} holds a {} byte message",
                        proc.pid,
                        msg.data.len()
                    ),
                });
            }
        }
    }
    violations
}

/// Invariant 5: Blocked processes have nothing they could receive
fn check_blocked_consistency(state: &KernelState) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();
    for proc in state.list() {
        if proc.state != ProcessState::Blocked {
            continue;
        }
        match proc.waiting {
            None => violations.push(InvariantViolation {
                invariant: "blocked_consistency",
                description: alloc::format!("pid {} Blocked without a receive filter", proc.pid),
            }),
            Some(filter) => {
                if proc.inbox.iter().any(|m| filter.matches(m)) {
                    violations.push(InvariantViolation {
                        invariant: "blocked_consistency",
                        description: alloc::format!(
                            "pid {} Blocked with a matching message queued",
                            proc.pid
                        ),
                    });
                }
            }
        }
    }
    violations
}

/// Invariant 6: terminated processes hold no bus resources
fn check_terminated_clean(state: &KernelState) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    for proc in state.list() {
        if proc.state == ProcessState::Terminated && !proc.inbox.is_empty() {
            violations.push(InvariantViolation {
                invariant: "terminated_clean",
                description: alloc::format!("terminated pid {} has queued messages", proc.pid),
            });
        }
    }

    for (channel, pid) in &state.channels {
        let live = state.get(*pid).is_some_and(|p| p.is_live());
        if !live {
            violations.push(InvariantViolation {
                invariant: "terminated_clean",
                description: alloc::format!("channel {} bound to dead pid {}", channel, pid),
            });
        }
    }

    for (topic, owner) in state.topics.owners() {
        let live = state.get(owner).is_some_and(|p| p.is_live());
        if !live {
            violations.push(InvariantViolation {
                invariant: "terminated_clean",
                description: alloc::format!("'{}' subscribed by dead pid {}", topic, owner),
            });
        }
    }

    violations
}

/// Invariant 7: topic table within limits
fn check_topic_bounds(state: &KernelState) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();
    if state.topics.topic_count() > state.topics.max_topics() {
        violations.push(InvariantViolation {
            invariant: "topic_bounds",
            description: alloc::format!(
                "{} topics registered, limit {}",
                state.topics.topic_count(),
                state.topics.max_topics()
            ),
        });
    }
    for (topic, _) in state.topics.owners() {
        if topic.len() > aero_ipc::MAX_TOPIC_NAME_LEN {
            violations.push(InvariantViolation {
                invariant: "topic_bounds",
                description: alloc::format!("topic name '{}' too long", topic),
            });
        }
    }
    violations
}
