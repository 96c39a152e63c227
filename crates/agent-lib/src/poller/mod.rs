//! Periodic interface polling
//!
//! The poller owns the write path: counter source, sample stamping and
//! store appends. It runs as one long-lived task until its cancellation
//! token fires.

mod r#loop;


pub use r#loop::{CycleReport, PollOutcome, Poller, PollerBuilder, PollerConfig, SkipReason};
