//! Metric name and label definitions.
//!
//! Every metric parley records is named here so the set of exported series
//! is documented in one place.

/// Dispatcher metrics
pub mod dispatch {
    /// Events accepted by `submit`
    pub const EVENTS_SUBMITTED_TOTAL: &str = "parley_dispatch_events_submitted_total";
    /// Events rejected at submission as malformed
    pub const EVENTS_REJECTED_TOTAL: &str = "parley_dispatch_events_rejected_total";
    /// Queued events discarded by cancellation
    pub const EVENTS_DISCARDED_TOTAL: &str = "parley_dispatch_events_discarded_total";
    /// Pending handles cancelled before they started
    pub const HANDLES_CANCELLED_TOTAL: &str = "parley_dispatch_handles_cancelled_total";
    /// Pipelines that finished without error
    pub const PIPELINE_COMPLETED_TOTAL: &str = "parley_dispatch_pipeline_completed_total";
    /// Pipelines that ended in an error, labelled by stage
    pub const PIPELINE_FAILED_TOTAL: &str = "parley_dispatch_pipeline_failed_total";
    /// Send retries performed after a failed send attempt
    pub const SEND_RETRIES_TOTAL: &str = "parley_dispatch_send_retries_total";
    /// Sends that failed after exhausting retries
    pub const SEND_FAILURES_TOTAL: &str = "parley_dispatch_send_failures_total";
    /// Gate releases without a matching acquire
    pub const GATE_ACCOUNTING_ERRORS_TOTAL: &str = "parley_dispatch_gate_accounting_errors_total";
    /// Conversations currently present in the registry
    pub const CONVERSATIONS_ACTIVE: &str = "parley_dispatch_conversations_active";
    /// Events currently submitted to the execution pool
    pub const IN_FLIGHT: &str = "parley_dispatch_in_flight";
    /// Time from dequeue to pipeline completion, in seconds
    pub const HANDLING_DURATION_SECONDS: &str = "parley_dispatch_handling_duration_seconds";
    /// Time an event waited in its conversation queue, in seconds
    pub const QUEUE_WAIT_SECONDS: &str = "parley_dispatch_queue_wait_seconds";
}

/// Inbound channel metrics
pub mod channels {
    /// Inbound platform messages seen by `compose`
    pub const MESSAGES_RECEIVED_TOTAL: &str = "parley_channel_messages_received_total";
    /// Inbound messages dropped by routing rules
    pub const MESSAGES_IGNORED_TOTAL: &str = "parley_channel_messages_ignored_total";
}

/// Common label keys
pub mod labels {
    pub const CHANNEL: &str = "channel";
    pub const STAGE: &str = "stage";
    pub const PRIORITY: &str = "priority";
    pub const OUTCOME: &str = "outcome";
}

/// Standard histogram buckets
pub mod buckets {
    use once_cell::sync::Lazy;

    /// Handling duration buckets (in seconds).
    /// Covers 10ms to 5 minutes; reply generation can be slow.
    pub static HANDLING_DURATION: Lazy<Vec<f64>> = Lazy::new(|| {
        vec![
            0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0,
        ]
    });

    /// Queue wait buckets (in seconds).
    /// The dispatch tick puts a floor of roughly 0.2s under most waits.
    pub static QUEUE_WAIT: Lazy<Vec<f64>> = Lazy::new(|| {
        vec![
            0.05, 0.1, 0.2, 0.4, 0.8, 1.6, 3.2, 6.4, 12.8, 30.0, 60.0,
        ]
    });
}
