//! Metrics collection and export for parley.
//!
//! This crate provides a unified metrics interface using the `metrics` crate facade.
//! When the `prometheus` feature is enabled, metrics are exported in Prometheus format.
//!
//! # Usage
//!
//! ```rust,ignore
//! use parley_metrics::{counter, dispatch, gauge};
//!
//! counter!(dispatch::EVENTS_SUBMITTED_TOTAL).increment(1);
//! gauge!(dispatch::CONVERSATIONS_ACTIVE).set(3.0);
//! ```
//!
//! # Features
//!
//! - `prometheus`: install a Prometheus recorder whose output can be rendered on demand

mod definitions;
mod error;
mod recorder;

pub use {
    definitions::*,
    error::{Error, Result},
    recorder::{MetricsHandle, MetricsRecorderConfig, init_metrics},
};

// Re-export metrics macros for convenience
pub use metrics::{counter, gauge, histogram};
