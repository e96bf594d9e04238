//! Entry points for external collaborators.
//!
//! The HTTP/UI layer and the CLI talk to the engine exclusively through
//! [`MigrationService`]: connection testing, job submission, and the
//! read APIs over jobs, files, errors and metrics.

use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::db::{self, ConnectionTestResult};
use crate::error::Result;
use crate::jobs::{
    Job, JobError, JobFile, JobMetric, JobOrchestrator, JobQueue, JobRepository,
};

/// Facade over the orchestrator, queue and repository.
pub struct MigrationService {
    config: EngineConfig,
    orchestrator: Arc<JobOrchestrator>,
    queue: JobQueue,
}

impl MigrationService {
    /// Build the service and start its background queue consumer.
    pub fn new(config: EngineConfig) -> Self {
        let orchestrator = Arc::new(JobOrchestrator::new(config.clone()));
        let queue = JobQueue::start(orchestrator.clone());
        Self {
            config,
            orchestrator,
            queue,
        }
    }

    /// Probe a destination and classify any failure.
    pub async fn test_connection(&self, connection_string: &str) -> ConnectionTestResult {
        db::test_connection(
            connection_string,
            Duration::from_secs(self.config.connect_test_timeout_secs),
        )
        .await
    }

    /// Create the control tables if they do not exist yet.
    pub async fn initialize_schema(&self, connection_string: &str) -> Result<()> {
        JobRepository::new(connection_string).initialize_schema().await
    }

    /// Create a job for the root folder and enqueue it.
    pub async fn submit_job(&self, root_folder: &str, connection_string: &str) -> Result<Uuid> {
        let job_id = self
            .orchestrator
            .create_job(root_folder, connection_string)
            .await?;
        self.queue.submit(job_id, connection_string)?;
        Ok(job_id)
    }

    /// Re-run an earlier job over the same root folder.
    pub async fn submit_reprocess_job(
        &self,
        original_job_id: Uuid,
        connection_string: &str,
    ) -> Result<Uuid> {
        let job_id = self
            .orchestrator
            .create_reprocess_job(original_job_id, connection_string)
            .await?;
        self.queue.submit(job_id, connection_string)?;
        Ok(job_id)
    }

    /// Re-run a single file of an earlier job; its destination table is
    /// dropped and recreated.
    pub async fn submit_reprocess_file(
        &self,
        original_job_id: Uuid,
        file_id: Uuid,
        connection_string: &str,
    ) -> Result<Uuid> {
        let job_id = self
            .orchestrator
            .create_reprocess_file_job(original_job_id, file_id, connection_string)
            .await?;
        self.queue.submit(job_id, connection_string)?;
        Ok(job_id)
    }

    pub async fn get_job(&self, connection_string: &str, job_id: Uuid) -> Result<Job> {
        JobRepository::new(connection_string).get_job(job_id).await
    }

    /// All jobs, newest first.
    pub async fn list_jobs(&self, connection_string: &str) -> Result<Vec<Job>> {
        JobRepository::new(connection_string).get_all_jobs().await
    }

    pub async fn list_job_files(
        &self,
        connection_string: &str,
        job_id: Uuid,
    ) -> Result<Vec<JobFile>> {
        JobRepository::new(connection_string).get_job_files(job_id).await
    }

    pub async fn list_job_errors(
        &self,
        connection_string: &str,
        job_id: Uuid,
    ) -> Result<Vec<JobError>> {
        JobRepository::new(connection_string).get_job_errors(job_id).await
    }

    pub async fn list_job_metrics(
        &self,
        connection_string: &str,
        job_id: Uuid,
    ) -> Result<Vec<JobMetric>> {
        JobRepository::new(connection_string).get_job_metrics(job_id).await
    }

    /// Stop the queue; in-flight jobs observe cancellation.
    pub async fn shutdown(self) {
        self.queue.shutdown().await;
    }
}
