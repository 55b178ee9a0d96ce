pub mod fetch_job;
pub mod job_fn;

/// Re-export commonly used types from adapters
pub use fetch_job::{FetchError, FetchJob, FetchOutcome};
pub use job_fn::JobFn;
