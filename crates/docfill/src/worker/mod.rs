pub mod batch;
pub mod cancel;
pub mod job;
pub mod pool;
pub mod progress;

pub use batch::BatchProcessor;
pub use cancel::CancellationToken;
pub use job::{Job, JobStatus, RowResult, RowStatus};
pub use pool::{PoolConfig, WorkerPool};
pub use progress::{
    BroadcastProgress, CheckpointProgress, CompositeProgress, NoopProgress, ProgressEvent,
    ProgressReporter,
};
