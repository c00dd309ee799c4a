//! Bounded clip work queue.
//!
//! Completed recordings are handed to a fixed pool of workers through a
//! bounded channel. `try_send` keeps backpressure visible: when every worker
//! is busy and the queue is full, the capture is dropped with a log line
//! instead of silently piling up detached tasks.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, warn};

use haven_models::Frame;

/// One completed recording awaiting assembly and scoring.
pub struct ClipJob {
    pub frames: Vec<Frame>,
    pub metadata: Option<Map<String, Value>>,
}

/// A unit of clip processing (assemble, score, fold into the ledger).
#[async_trait]
pub trait ProcessClip: Send + Sync {
    async fn process(&self, job: ClipJob);
}

/// Handle for submitting clip jobs to the worker pool.
pub struct ClipQueue {
    tx: mpsc::Sender<ClipJob>,
}

impl ClipQueue {
    /// Spawn `workers` tasks consuming from a queue of `depth` slots.
    pub fn start<P>(depth: usize, workers: usize, processor: Arc<P>) -> Self
    where
        P: ProcessClip + 'static,
    {
        let (tx, rx) = mpsc::channel(depth.max(1));
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        for worker_id in 0..workers.max(1) {
            let rx = Arc::clone(&rx);
            let processor = Arc::clone(&processor);

            tokio::spawn(async move {
                debug!("Clip worker {} started", worker_id);
                loop {
                    let job = {
                        let mut rx = rx.lock().await;
                        rx.recv().await
                    };
                    match job {
                        Some(job) => processor.process(job).await,
                        None => break,
                    }
                }
                debug!("Clip worker {} stopped", worker_id);
            });
        }

        Self { tx }
    }

    /// Submit a job without blocking the frame loop.
    ///
    /// Returns false when the job was dropped (queue full or shut down);
    /// the buffered frames are simply lost, which matches abandoning an
    /// in-flight capture.
    pub fn submit(&self, job: ClipJob) -> bool {
        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Clip queue full, dropping capture");
                false
            }
            Err(TrySendError::Closed(_)) => {
                error!("Clip queue closed, dropping capture");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    struct BlockingProcessor {
        started: Notify,
        processed: AtomicUsize,
    }

    #[async_trait]
    impl ProcessClip for BlockingProcessor {
        async fn process(&self, _job: ClipJob) {
            self.processed.fetch_add(1, Ordering::SeqCst);
            self.started.notify_one();
            // Hold the worker forever so the queue can fill up
            std::future::pending::<()>().await;
        }
    }

    struct CountingProcessor {
        processed: AtomicUsize,
        done: Notify,
    }

    #[async_trait]
    impl ProcessClip for CountingProcessor {
        async fn process(&self, _job: ClipJob) {
            self.processed.fetch_add(1, Ordering::SeqCst);
            self.done.notify_one();
        }
    }

    fn job() -> ClipJob {
        ClipJob {
            frames: Vec::new(),
            metadata: None,
        }
    }

    #[tokio::test]
    async fn test_jobs_reach_the_worker() {
        let processor = Arc::new(CountingProcessor {
            processed: AtomicUsize::new(0),
            done: Notify::new(),
        });
        let queue = ClipQueue::start(4, 1, Arc::clone(&processor));

        assert!(queue.submit(job()));
        processor.done.notified().await;
        assert_eq!(processor.processed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_full_queue_rejects_instead_of_blocking() {
        let processor = Arc::new(BlockingProcessor {
            started: Notify::new(),
            processed: AtomicUsize::new(0),
        });
        let queue = ClipQueue::start(1, 1, Arc::clone(&processor));

        // First job occupies the single worker
        assert!(queue.submit(job()));
        processor.started.notified().await;

        // Second job fills the single queue slot
        assert!(queue.submit(job()));

        // Third has nowhere to go and must be dropped, not block
        assert!(!queue.submit(job()));
        assert_eq!(processor.processed.load(Ordering::SeqCst), 1);
    }
}
