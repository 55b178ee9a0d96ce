pub mod job;

pub use job::{Job, SharedJob};
