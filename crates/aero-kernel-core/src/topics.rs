//! Topic registry for SAL publish/subscribe
//!
//! Maps an exact, case-sensitive topic name to an ordered subscriber list.
//! Insertion order is delivery order. A process subscribing twice to the
//! same topic gets two independent delivery slots.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use log::warn;

use crate::config::PublishPolicy;
use crate::error::{DeliveryError, KernelError};
use crate::types::{ProcessId, MAX_MESSAGE_SIZE};

/// Receiver of topic payloads.
///
/// `deliver` runs synchronously on the publisher's time slice.
pub trait Subscriber {
    fn deliver(&mut self, topic: &str, payload: &[u8]) -> Result<(), DeliveryError>;
}

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(pub u64);

struct Subscription {
    id: SubscriptionId,
    owner: ProcessId,
    subscriber: Box<dyn Subscriber>,
}

/// Per-topic counters
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TopicMetrics {
    /// Publishes that reached at least the subscriber list
    pub published: u64,
    /// Successful deliveries
    pub delivered: u64,
    /// Deliveries a subscriber reported as failed
    pub failures: u64,
}

struct Topic {
    subscribers: Vec<Subscription>,
    metrics: TopicMetrics,
}

/// Outcome of a publish
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Subscribers that accepted the payload
    pub delivered: usize,
    /// Subscribers that reported an error
    pub failed: usize,
}

/// Topic table
pub struct TopicRegistry {
    topics: BTreeMap<String, Topic>,
    max_topics: usize,
    next_id: u64,
    /// Delivery failures across all topics
    pub delivery_failures: u64,
}

/// Check a topic name against the naming rules.
pub fn validate_topic_name(name: &str) -> Result<(), KernelError> {
    if name.is_empty() || name.contains('\0') {
        return Err(KernelError::InvalidTopicName);
    }
    if name.len() > aero_ipc::MAX_TOPIC_NAME_LEN {
        return Err(KernelError::TopicNameTooLong);
    }
    Ok(())
}

impl TopicRegistry {
    pub fn new(max_topics: usize) -> Self {
        Self {
            topics: BTreeMap::new(),
            max_topics,
            next_id: 1,
            delivery_failures: 0,
        }
    }

    /// Register `subscriber` for `topic` on behalf of `owner`.
    ///
    /// Creating a new topic fails with `TopicRegistryFull` once the table
    /// holds `max_topics` names.
    pub fn subscribe(
        &mut self,
        owner: ProcessId,
        topic: &str,
        subscriber: Box<dyn Subscriber>,
    ) -> Result<SubscriptionId, KernelError> {
        validate_topic_name(topic)?;
        if !self.topics.contains_key(topic) && self.topics.len() >= self.max_topics {
            return Err(KernelError::TopicRegistryFull);
        }

        let id = SubscriptionId(self.next_id);
        self.next_id += 1;

        let entry = self.topics.entry(String::from(topic)).or_insert_with(|| Topic {
            subscribers: Vec::new(),
            metrics: TopicMetrics::default(),
        });
        entry.subscribers.push(Subscription {
            id,
            owner,
            subscriber,
        });
        Ok(id)
    }

    /// Remove one subscription, handing the subscriber back.
    ///
    /// A topic left without subscribers frees its table entry.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> Option<Box<dyn Subscriber>> {
        let (name, index) = self.topics.iter().find_map(|(name, topic)| {
            topic
                .subscribers
                .iter()
                .position(|s| s.id == id)
                .map(|i| (name.clone(), i))
        })?;
        let topic = self.topics.get_mut(&name)?;
        let sub = topic.subscribers.remove(index);
        if topic.subscribers.is_empty() {
            self.topics.remove(&name);
        }
        Some(sub.subscriber)
    }

    /// Drop every subscription held by `owner`. Returns how many went.
    pub fn remove_owner(&mut self, owner: ProcessId) -> usize {
        let mut removed = 0;
        for topic in self.topics.values_mut() {
            let before = topic.subscribers.len();
            topic.subscribers.retain(|s| s.owner != owner);
            removed += before - topic.subscribers.len();
        }
        self.topics.retain(|_, t| !t.subscribers.is_empty());
        removed
    }

    /// Deliver `payload` to every subscriber of `topic`, in subscription
    /// order. A failing subscriber is counted and skipped; the rest still
    /// receive the payload.
    pub fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        policy: PublishPolicy,
    ) -> Result<PublishReport, KernelError> {
        validate_topic_name(topic)?;
        if payload.len() > MAX_MESSAGE_SIZE {
            return Err(KernelError::PayloadTooLarge);
        }

        let Some(entry) = self.topics.get_mut(topic) else {
            return match policy {
                PublishPolicy::Reject => Err(KernelError::UnknownTopic),
                PublishPolicy::Drop => Ok(PublishReport::default()),
            };
        };

        entry.metrics.published += 1;
        let mut report = PublishReport::default();
        for sub in entry.subscribers.iter_mut() {
            match sub.subscriber.deliver(topic, payload) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        target: "sal",
                        "delivery of '{}' to subscription {} (pid {}) failed: {}",
                        topic, sub.id.0, sub.owner, e
                    );
                }
            }
        }
        entry.metrics.delivered += report.delivered as u64;
        entry.metrics.failures += report.failed as u64;
        self.delivery_failures += report.failed as u64;
        Ok(report)
    }

    /// Registered topic count
    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    /// Topic table size
    pub fn max_topics(&self) -> usize {
        self.max_topics
    }

    /// Subscriber count for `topic` (0 when unknown)
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.get(topic).map_or(0, |t| t.subscribers.len())
    }

    /// Counters for `topic`
    pub fn metrics(&self, topic: &str) -> Option<&TopicMetrics> {
        self.topics.get(topic).map(|t| &t.metrics)
    }

    /// `(topic, owner)` for every subscription
    pub fn owners(&self) -> impl Iterator<Item = (&str, ProcessId)> + '_ {
        self.topics
            .iter()
            .flat_map(|(name, t)| t.subscribers.iter().map(move |s| (name.as_str(), s.owner)))
    }
}
