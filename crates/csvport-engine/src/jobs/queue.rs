//! Background job queue.
//!
//! A single consumer drains a FIFO of submitted jobs and dispatches each
//! to its own orchestrator task, so several jobs can run concurrently.
//! Submission never blocks. Shutdown cancels the consumer; in-flight
//! jobs observe cancellation through their child tokens.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::{EngineError, Result};

use super::orchestrator::JobOrchestrator;

struct QueuedJob {
    job_id: Uuid,
    connection_string: String,
}

/// FIFO of jobs waiting to be processed.
pub struct JobQueue {
    tx: mpsc::UnboundedSender<QueuedJob>,
    shutdown: CancellationToken,
    consumer: JoinHandle<()>,
}

impl JobQueue {
    /// Spawn the consumer task.
    pub fn start(orchestrator: Arc<JobOrchestrator>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<QueuedJob>();
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();

        let consumer = tokio::spawn(async move {
            info!("Job queue consumer started");
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    item = rx.recv() => {
                        let Some(QueuedJob { job_id, connection_string }) = item else {
                            break;
                        };
                        info!(job_id = %job_id, "Dispatching job");
                        let orchestrator = orchestrator.clone();
                        let job_cancel = token.child_token();
                        // A failed job must never take the consumer down
                        // with it; the failure is already persisted.
                        tokio::spawn(async move {
                            if let Err(e) = orchestrator
                                .process(job_id, &connection_string, job_cancel)
                                .await
                            {
                                error!(job_id = %job_id, error = %e, "Job processing failed");
                            }
                        });
                    }
                }
            }
            info!("Job queue consumer stopped");
        });

        Self {
            tx,
            shutdown,
            consumer,
        }
    }

    /// Enqueue a job; returns immediately.
    pub fn submit(&self, job_id: Uuid, connection_string: impl Into<String>) -> Result<()> {
        self.tx
            .send(QueuedJob {
                job_id,
                connection_string: connection_string.into(),
            })
            .map_err(|_| EngineError::Internal("Job queue is shut down".to_string()))
    }

    /// Signal shutdown and wait for the consumer to exit. Dispatched
    /// jobs observe cancellation through their tokens.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.consumer.await {
            error!(error = %e, "Queue consumer did not exit cleanly");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    #[tokio::test]
    async fn test_submit_is_non_blocking_and_shutdown_drains() {
        let orchestrator = Arc::new(JobOrchestrator::new(EngineConfig::default()));
        let queue = JobQueue::start(orchestrator);

        // The job will fail immediately (no database), which must not
        // kill the consumer.
        queue.submit(Uuid::new_v4(), "Server=unused").unwrap();
        queue.submit(Uuid::new_v4(), "Server=unused").unwrap();

        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_channel_closes_after_shutdown() {
        let orchestrator = Arc::new(JobOrchestrator::new(EngineConfig::default()));
        let queue = JobQueue::start(orchestrator);
        let tx = queue.tx.clone();
        queue.shutdown().await;

        let rejected = tx.send(QueuedJob {
            job_id: Uuid::new_v4(),
            connection_string: "Server=unused".to_string(),
        });
        assert!(rejected.is_err());
    }
}
