//! slotgate - a one-shot bounded-concurrency admission gate.
//!
//! A [`Gate`] lets at most `capacity` jobs run at the same time. [`Gate::submit`]
//! starts a job on its own tokio task when a slot is free and otherwise waits,
//! which gives callers back-pressure without any internal queue. Job failures
//! are delivered, best effort, on a bounded [`ErrorStream`]. Panics inside jobs
//! are contained and never leak a slot. [`Gate::close_and_wait`] stops admission,
//! joins every in-flight job and then closes the error stream.
//!
//! # Quick Example
//! ```no_run
//! use slotgate::{Gate, adapters::JobFn};
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let gate = Gate::new(8);
//! let errors = gate.errors();
//! let consumer = tokio::spawn(async move {
//!     while let Some(err) = errors.recv().await {
//!         tracing::warn!("job failed: {err:#}");
//!     }
//! });
//!
//! let cancel = CancellationToken::new();
//! for n in 0..100u32 {
//!     // Waits while all 8 slots are busy.
//!     gate.submit(&cancel, JobFn::new(move |_| async move {
//!         eyre::ensure!(n % 10 != 0, "job {n} failed");
//!         Ok(())
//!     }))
//!     .await?;
//! }
//!
//! gate.close_and_wait().await;
//! consumer.await?;
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! The crate separates **ports** (the [`Job`] trait) from **adapters** (closure and
//! HTTP fetch jobs) while keeping the admission logic inside `core`.
//!
//! # Error Handling
//! Admission errors are returned synchronously as [`GateError`]. Job errors are
//! `eyre::Report`s delivered on the error stream. Application-level APIs
//! (configuration, CLI) return `eyre::Result<T>` with context attached.
//!
//! # Fairness
//! No ordering is promised among callers waiting in `submit`.
pub mod adapters;
pub mod config;
pub mod core;
pub mod metrics;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

// Re-export the specific types needed by the binary crate
pub use crate::{
    core::{ErrorStream, Gate, GateError, GateResult},
    ports::job::{Job, SharedJob},
    utils::{GracefulShutdown, ShutdownReason},
};
