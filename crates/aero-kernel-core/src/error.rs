//! Kernel error types
//!
//! Transport and registry errors are recoverable: they are returned to the
//! caller, which decides whether to retry, drop or escalate.

/// Errors returned by process-table, scheduler and bus operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum KernelError {
    /// Destination's inbound queue is at capacity
    #[error("destination queue full")]
    QueueFull,

    /// No live process or bound channel owns the destination identifier
    #[error("invalid destination")]
    InvalidDestination,

    /// Payload exceeds the maximum transport unit
    #[error("payload exceeds maximum transport unit")]
    PayloadTooLarge,

    /// Publish to a topic with no subscribers
    #[error("unknown topic")]
    UnknownTopic,

    /// Topic table exhausted
    #[error("topic registry full")]
    TopicRegistryFull,

    /// Topic name longer than the bound
    #[error("topic name too long")]
    TopicNameTooLong,

    /// Empty topic name or embedded NUL
    #[error("invalid topic name")]
    InvalidTopicName,

    /// No free process slot
    #[error("process table full")]
    ProcessTableFull,

    /// Caller or target process does not exist or has terminated
    #[error("process not found")]
    ProcessNotFound,

    /// Operation not legal in the current lifecycle state
    #[error("invalid state for operation")]
    InvalidState,

    /// Receive wait bound elapsed with nothing matching
    #[error("receive timed out")]
    Timeout,

    /// Verification returned a failure
    #[error("authentication denied")]
    AuthenticationDenied,

    /// Retry bound exhausted; the desktop will not be admitted
    #[error("fatal boot failure")]
    FatalBootFailure,
}

/// Error a subscriber reports back from a topic delivery.
///
/// Counted by the registry, never propagated to the publisher.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// Payload could not be decoded by the subscriber
    #[error("malformed payload")]
    Malformed,

    /// Subscriber has no room for the payload
    #[error("subscriber full")]
    Full,

    /// Subscriber is no longer accepting deliveries
    #[error("subscriber closed")]
    Closed,
}
