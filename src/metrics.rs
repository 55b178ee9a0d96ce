//! Lightweight metrics helpers for slotgate.
//!
//! This module exposes a small set of convenience functions and an RAII timer
//! wrapping the `metrics` crate macros. It intentionally avoids embedding a
//! concrete exporter (the application can install any compatible recorder)
//! while still documenting and describing slotgate-specific metric names.
//!
//! Provided metrics (all labelled by `gate`):
//! * `slotgate_jobs_admitted_total` (counter)
//! * `slotgate_jobs_rejected_total` (counter, label `reason`)
//! * `slotgate_job_errors_total` (counter)
//! * `slotgate_job_errors_dropped_total` (counter)
//! * `slotgate_job_panics_total` (counter)
//! * `slotgate_slots_in_use` (gauge)
//! * `slotgate_job_duration_seconds` (histogram)
use std::time::Instant;

use metrics::{
    Unit, counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram,
};
use once_cell::sync::Lazy;

pub const SLOTGATE_JOBS_ADMITTED_TOTAL: &str = "slotgate_jobs_admitted_total";
pub const SLOTGATE_JOBS_REJECTED_TOTAL: &str = "slotgate_jobs_rejected_total"; // labels: reason
pub const SLOTGATE_JOB_ERRORS_TOTAL: &str = "slotgate_job_errors_total";
pub const SLOTGATE_JOB_ERRORS_DROPPED_TOTAL: &str = "slotgate_job_errors_dropped_total";
pub const SLOTGATE_JOB_PANICS_TOTAL: &str = "slotgate_job_panics_total";
pub const SLOTGATE_SLOTS_IN_USE: &str = "slotgate_slots_in_use";
pub const SLOTGATE_JOB_DURATION_SECONDS: &str = "slotgate_job_duration_seconds";

/// Registers metric descriptions on first use.
static DESCRIPTIONS: Lazy<()> = Lazy::new(|| {
    describe_counter!(
        SLOTGATE_JOBS_ADMITTED_TOTAL,
        Unit::Count,
        "Total number of jobs admitted by a gate."
    );
    describe_counter!(
        SLOTGATE_JOBS_REJECTED_TOTAL,
        Unit::Count,
        "Submissions rejected by a gate (by reason)."
    );
    describe_counter!(
        SLOTGATE_JOB_ERRORS_TOTAL,
        Unit::Count,
        "Jobs that finished with an error."
    );
    describe_counter!(
        SLOTGATE_JOB_ERRORS_DROPPED_TOTAL,
        Unit::Count,
        "Job errors dropped because the error stream buffer was full."
    );
    describe_counter!(
        SLOTGATE_JOB_PANICS_TOTAL,
        Unit::Count,
        "Job panics contained by a gate."
    );
    describe_gauge!(
        SLOTGATE_SLOTS_IN_USE,
        "Number of slots currently held by running jobs."
    );
    describe_histogram!(
        SLOTGATE_JOB_DURATION_SECONDS,
        Unit::Seconds,
        "Wall-clock run time of admitted jobs."
    );
});

/// Count a successful admission.
pub fn increment_admitted(gate: &str) {
    counter!(SLOTGATE_JOBS_ADMITTED_TOTAL, "gate" => gate.to_string()).increment(1);
}

/// Count a rejected submission. `reason` is the short error kind.
pub fn increment_rejected(gate: &str, reason: &'static str) {
    counter!(
        SLOTGATE_JOBS_REJECTED_TOTAL,
        "gate" => gate.to_string(),
        "reason" => reason
    )
    .increment(1);
}

/// Count a job that returned an error.
pub fn increment_job_error(gate: &str) {
    counter!(SLOTGATE_JOB_ERRORS_TOTAL, "gate" => gate.to_string()).increment(1);
}

/// Count a job error lost to a full error stream.
pub fn increment_dropped_error(gate: &str) {
    counter!(SLOTGATE_JOB_ERRORS_DROPPED_TOTAL, "gate" => gate.to_string()).increment(1);
}

/// Count a contained job panic.
pub fn increment_panic(gate: &str) {
    counter!(SLOTGATE_JOB_PANICS_TOTAL, "gate" => gate.to_string()).increment(1);
}

/// Set the current number of occupied slots.
pub fn set_slots_in_use(gate: &str, in_use: usize) {
    gauge!(SLOTGATE_SLOTS_IN_USE, "gate" => gate.to_string()).set(in_use as f64);
}

/// RAII helper measuring a job's run time.
pub struct JobTimer {
    start: Instant,
    gate: String,
}

impl JobTimer {
    pub fn new(gate: &str) -> Self {
        Self {
            start: Instant::now(),
            gate: gate.to_string(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Drop for JobTimer {
    fn drop(&mut self) {
        histogram!(SLOTGATE_JOB_DURATION_SECONDS, "gate" => self.gate.clone())
            .record(self.start.elapsed().as_secs_f64());
    }
}

/// Initialize metric descriptions (idempotent).
pub fn init_metrics() -> eyre::Result<()> {
    tracing::info!("Initializing slotgate metrics");

    // Force lazy initialization of metrics descriptions
    Lazy::force(&DESCRIPTIONS);

    tracing::info!("slotgate metrics initialized");
    Ok(())
}
