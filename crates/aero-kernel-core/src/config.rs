//! Kernel configuration
//!
//! Operator-facing options with their defaults. Every field is optional in
//! serialized form.

use serde::{Deserialize, Serialize};

/// What `publish` does when a topic has no subscribers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishPolicy {
    /// Fail with `UnknownTopic`
    #[default]
    Reject,
    /// Succeed with zero deliveries
    Drop,
}

/// Kernel configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Messages each process may have queued
    pub queue_capacity: usize,
    /// Size of the topic table
    pub max_topics: usize,
    /// Default receive wait bound in ticks (`None` = unbounded)
    pub receive_timeout_ticks: Option<u64>,
    /// Zero-subscriber publish behavior
    pub publish_policy: PublishPolicy,
    /// User-spawned process slots (idle not counted)
    pub max_user_processes: usize,
    /// Ticks a process may run before it is preempted
    pub time_slice_ticks: u64,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 32,
            max_topics: aero_ipc::MAX_TOPICS,
            receive_timeout_ticks: None,
            publish_policy: PublishPolicy::Reject,
            max_user_processes: aero_ipc::MAX_USER_PROCESSES,
            time_slice_ticks: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = KernelConfig::default();
        assert_eq!(config.queue_capacity, 32);
        assert_eq!(config.max_topics, 256);
        assert_eq!(config.receive_timeout_ticks, None);
        assert_eq!(config.publish_policy, PublishPolicy::Reject);
        assert_eq!(config.max_user_processes, 16);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: KernelConfig =
            serde_json::from_str(r#"{"queue_capacity": 4, "publish_policy": "drop"}"#).unwrap();
        assert_eq!(config.queue_capacity, 4);
        assert_eq!(config.publish_policy, PublishPolicy::Drop);
        assert_eq!(config.max_topics, 256);
    }

    #[test]
    fn test_receive_timeout_option() {
        let config: KernelConfig =
            serde_json::from_str(r#"{"receive_timeout_ticks": 50}"#).unwrap();
        assert_eq!(config.receive_timeout_ticks, Some(50));
    }
}
