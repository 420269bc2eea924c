//! Broadcasting of batch progress for real-time streaming.
//!
//! Any integration (CLI, HTTP server, desktop shell) can subscribe.

pub mod job_progress;

pub use job_progress::{JobPhase, JobProgressBroadcaster, JobProgressEvent};
