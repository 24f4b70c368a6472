//! Per-conversation event dispatcher.
//!
//! Events from any channel are queued per conversation, admitted under a
//! bounded per-conversation concurrency gate, and executed on a fixed worker
//! pool through a generate → decorate → send pipeline. Ordering holds within
//! a conversation (priority events first, otherwise FIFO); conversations
//! proceed independently of each other.

pub mod dispatcher;
pub mod error;
pub mod gate;
pub mod handle;
pub mod pipeline;
pub mod pool;
pub mod queue;
pub mod registry;

pub use {
    dispatcher::{CancelReport, Dispatcher},
    error::{Error, Result},
    handle::{Handle, HandleState},
    pipeline::{Outcome, Pipeline, RetryPolicy},
};
