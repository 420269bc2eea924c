use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info};

use crate::error::{FillError, JobError, RowError};
use crate::worker::cancel::CancellationToken;

/// The per-row work executed by pool workers.
pub type RowWork = dyn Fn(usize) -> Result<Vec<u8>, FillError> + Send + Sync;

/// Result of one row, sent back to the aggregator.
#[derive(Debug)]
pub struct RowOutcome {
    pub row_index: usize,
    pub result: Result<Vec<u8>, RowError>,
}

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub worker_count: usize,
    /// `None` disables the per-row timeout.
    pub row_timeout: Option<Duration>,
}

/// Bounded pool of row workers fed by a dispatcher thread.
///
/// The dispatcher pushes row indices `0..total_rows` into a bounded queue
/// and stops early once cancellation is requested. Outcomes arrive in
/// completion order; the receiver is closed after the last worker exits.
pub struct WorkerPool {
    outcome_receiver: Receiver<RowOutcome>,
    dispatcher: Option<JoinHandle<usize>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn start(
        work: Arc<RowWork>,
        total_rows: usize,
        config: PoolConfig,
        cancel: CancellationToken,
    ) -> Result<Self, JobError> {
        let worker_count = config.worker_count.max(1).min(total_rows.max(1));
        let (task_sender, task_receiver) = bounded::<usize>(worker_count * 2);
        let (outcome_sender, outcome_receiver) = bounded::<RowOutcome>(worker_count * 2);

        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let task_rx = task_receiver.clone();
            let outcome_tx = outcome_sender.clone();
            let worker_work = Arc::clone(&work);
            let worker_cancel = cancel.clone();
            let timeout = config.row_timeout;

            let handle = thread::Builder::new()
                .name(format!("docfill-worker-{}", worker_id))
                .spawn(move || {
                    run_worker(worker_id, task_rx, outcome_tx, worker_work, timeout, worker_cancel)
                })
                .map_err(|e| JobError::SpawnFailed(e.to_string()))?;
            workers.push(handle);
        }
        drop(outcome_sender);

        let dispatcher = thread::Builder::new()
            .name("docfill-dispatcher".to_string())
            .spawn(move || dispatch(task_sender, total_rows, cancel))
            .map_err(|e| JobError::SpawnFailed(e.to_string()))?;

        info!("Started {} row workers for {} rows", worker_count, total_rows);

        Ok(Self {
            outcome_receiver,
            dispatcher: Some(dispatcher),
            workers,
        })
    }

    /// Blocks for the next outcome; `None` once all workers have stopped.
    pub fn recv(&self) -> Option<RowOutcome> {
        self.outcome_receiver.recv().ok()
    }

    /// Joins the dispatcher and all workers. Returns how many rows were
    /// dispatched.
    pub fn wait(mut self) -> usize {
        let dispatched = match self.dispatcher.take().map(JoinHandle::join) {
            Some(Ok(count)) => count,
            Some(Err(e)) => {
                error!("Dispatcher panicked: {:?}", e);
                0
            }
            None => 0,
        };

        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        dispatched
    }
}

fn dispatch(task_sender: Sender<usize>, total_rows: usize, cancel: CancellationToken) -> usize {
    let mut dispatched = 0;
    for row_index in 0..total_rows {
        if cancel.is_cancelled() {
            info!("Cancellation requested, {} rows not dispatched", total_rows - row_index);
            break;
        }
        if task_sender.send(row_index).is_err() {
            break;
        }
        dispatched += 1;
    }
    dispatched
}

fn run_worker(
    worker_id: usize,
    task_receiver: Receiver<usize>,
    outcome_sender: Sender<RowOutcome>,
    work: Arc<RowWork>,
    timeout: Option<Duration>,
    cancel: CancellationToken,
) {
    debug!("Worker {} started", worker_id);

    for row_index in task_receiver.iter() {
        let result = if cancel.is_cancelled() {
            Err(RowError::Cancelled)
        } else {
            execute(&work, row_index, timeout)
        };

        if let Err(e) = outcome_sender.send(RowOutcome { row_index, result }) {
            error!("Worker {} failed to send outcome: {}", worker_id, e);
            break;
        }
    }

    debug!("Worker {} stopped", worker_id);
}

fn run_guarded(work: &RowWork, row_index: usize) -> Result<Vec<u8>, RowError> {
    match panic::catch_unwind(AssertUnwindSafe(|| work(row_index))) {
        Ok(result) => result.map_err(RowError::from),
        Err(_) => Err(RowError::Panicked),
    }
}

/// Runs one row, on a helper thread when a timeout applies. A row that
/// overruns is abandoned: its helper thread finishes in the background and
/// the result is discarded.
fn execute(work: &Arc<RowWork>, row_index: usize, timeout: Option<Duration>) -> Result<Vec<u8>, RowError> {
    let Some(limit) = timeout else {
        return run_guarded(work.as_ref(), row_index);
    };

    let (result_tx, result_rx) = bounded(1);
    let helper_work = Arc::clone(work);
    let spawned = thread::Builder::new()
        .name(format!("docfill-row-{}", row_index))
        .spawn(move || {
            let _ = result_tx.send(run_guarded(helper_work.as_ref(), row_index));
        });

    if let Err(e) = spawned {
        error!("Failed to spawn row thread, running inline: {}", e);
        return run_guarded(work.as_ref(), row_index);
    }

    match result_rx.recv_timeout(limit) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => Err(RowError::Timeout(limit)),
        Err(RecvTimeoutError::Disconnected) => Err(RowError::Panicked),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(pool: WorkerPool) -> (Vec<RowOutcome>, usize) {
        let mut outcomes = Vec::new();
        while let Some(outcome) = pool.recv() {
            outcomes.push(outcome);
        }
        let dispatched = pool.wait();
        outcomes.sort_by_key(|o| o.row_index);
        (outcomes, dispatched)
    }

    fn work<F>(f: F) -> Arc<RowWork>
    where
        F: Fn(usize) -> Result<Vec<u8>, FillError> + Send + Sync + 'static,
    {
        Arc::new(f)
    }

    fn config(worker_count: usize, timeout_ms: Option<u64>) -> PoolConfig {
        PoolConfig {
            worker_count,
            row_timeout: timeout_ms.map(Duration::from_millis),
        }
    }

    #[test]
    fn test_processes_every_row() {
        let work = work(|i| Ok(i.to_string().into_bytes()));
        let pool = WorkerPool::start(work, 20, config(4, Some(5_000)), CancellationToken::new()).unwrap();
        let (outcomes, dispatched) = collect(pool);

        assert_eq!(dispatched, 20);
        assert_eq!(outcomes.len(), 20);
        for (i, outcome) in outcomes.iter().enumerate() {
            assert_eq!(outcome.row_index, i);
            assert_eq!(outcome.result.as_ref().unwrap(), &i.to_string().into_bytes());
        }
    }

    #[test]
    fn test_fill_errors_are_row_scoped() {
        let work = work(|i| {
            if i == 1 {
                Err(FillError::Render {
                    reason: "bad row".to_string(),
                })
            } else {
                Ok(vec![])
            }
        });
        let pool = WorkerPool::start(work, 3, config(2, None), CancellationToken::new()).unwrap();
        let (outcomes, _) = collect(pool);

        assert!(outcomes[0].result.is_ok());
        assert!(matches!(outcomes[1].result, Err(RowError::Fill(_))));
        assert!(outcomes[2].result.is_ok());
    }

    #[test]
    fn test_slow_row_times_out() {
        let work = work(|i| {
            if i == 0 {
                thread::sleep(Duration::from_millis(500));
            }
            Ok(vec![1])
        });
        let pool = WorkerPool::start(work, 2, config(2, Some(50)), CancellationToken::new()).unwrap();
        let (outcomes, _) = collect(pool);

        assert_eq!(outcomes[0].result, Err(RowError::Timeout(Duration::from_millis(50))));
        assert!(outcomes[1].result.is_ok());
    }

    #[test]
    fn test_panicking_row_is_isolated() {
        let work = work(|i| {
            if i == 0 {
                panic!("pathological document");
            }
            Ok(vec![])
        });

        let pool = WorkerPool::start(Arc::clone(&work), 2, config(1, None), CancellationToken::new()).unwrap();
        let (outcomes, _) = collect(pool);
        assert_eq!(outcomes[0].result, Err(RowError::Panicked));
        assert!(outcomes[1].result.is_ok());

        let pool = WorkerPool::start(work, 2, config(1, Some(1_000)), CancellationToken::new()).unwrap();
        let (outcomes, _) = collect(pool);
        assert_eq!(outcomes[0].result, Err(RowError::Panicked));
        assert!(outcomes[1].result.is_ok());
    }

    #[test]
    fn test_cancelled_before_start_dispatches_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let work = work(|_| Ok(vec![]));
        let pool = WorkerPool::start(work, 10, config(2, None), cancel).unwrap();
        let (outcomes, dispatched) = collect(pool);

        assert_eq!(dispatched, 0);
        assert!(outcomes.is_empty());
    }

    #[test]
    fn test_zero_rows() {
        let work = work(|_| Ok(vec![]));
        let pool = WorkerPool::start(work, 0, config(4, None), CancellationToken::new()).unwrap();
        let (outcomes, dispatched) = collect(pool);
        assert_eq!(dispatched, 0);
        assert!(outcomes.is_empty());
    }
}
