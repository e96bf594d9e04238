//! Job orchestration.
//!
//! Owns every mutation of [`Job`] and [`JobFile`] state. A job run
//! discovers its files, fans them out to a bounded pool of workers, and
//! finalizes counters and metrics. Each worker owns its file end to end:
//! header, sampling, naming, table creation, streaming and bulk load.
//!
//! Failure policy: line- and row-level problems are recorded and
//! processing continues; a structural defect fails only its file; only a
//! failure of the orchestration itself (control-table writes, panicked
//! workers) fails the job.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::csv::{CsvFile, RowEvent};
use crate::db::{bulk, schema};
use crate::discovery::discover_csv_files;
use crate::error::{EngineError, FileFailure, Result};
use crate::identifiers::{column_name_for_header, table_name_for_file};
use crate::inference::{infer_column_type, SqlColumnType};

use super::model::{Job, JobError, JobErrorKind, JobFile, JobFileStatus, JobStatus};
use super::repository::JobRepository;

/// Drives jobs through their state machine.
#[derive(Debug, Clone)]
pub struct JobOrchestrator {
    config: EngineConfig,
}

struct WorkItem {
    file: JobFile,
    needs_insert: bool,
}

impl JobOrchestrator {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Create a job for a root folder. The folder must exist; discovery
    /// itself happens when the job is processed.
    pub async fn create_job(&self, root_folder: &str, connection_string: &str) -> Result<Uuid> {
        if !Path::new(root_folder).is_dir() {
            return Err(EngineError::RootFolderMissing(PathBuf::from(root_folder)));
        }

        let repo = JobRepository::new(connection_string);
        let job = Job::new(root_folder);
        repo.insert_job(&job).await?;
        info!(job_id = %job.id, root_folder, "Job created");
        Ok(job.id)
    }

    /// Create a fresh job over the same root folder as an earlier one.
    pub async fn create_reprocess_job(
        &self,
        original_job_id: Uuid,
        connection_string: &str,
    ) -> Result<Uuid> {
        let repo = JobRepository::new(connection_string);
        let original = repo.get_job(original_job_id).await?;
        let job_id = self.create_job(&original.root_folder, connection_string).await?;
        info!(job_id = %job_id, original_job_id = %original_job_id, "Reprocess job created");
        Ok(job_id)
    }

    /// Create a single-file job cloning one file of an earlier job. The
    /// original destination table is dropped up front so the rerun lands
    /// into a freshly created table.
    pub async fn create_reprocess_file_job(
        &self,
        original_job_id: Uuid,
        file_id: Uuid,
        connection_string: &str,
    ) -> Result<Uuid> {
        let repo = JobRepository::new(connection_string);
        let original_file = repo.get_job_file(file_id).await?;
        if original_file.job_id != original_job_id {
            return Err(EngineError::InvalidArgument(format!(
                "File {} does not belong to job {}",
                file_id, original_job_id
            )));
        }

        if let Some(table) = &original_file.table_name {
            schema::drop_table(connection_string, table).await?;
            info!(table, "Dropped destination table for reprocessing");
        }

        let original_job = repo.get_job(original_job_id).await?;
        let mut job = Job::new(original_job.root_folder.clone());
        job.total_files = 1;
        repo.insert_job(&job).await?;

        let clone = JobFile::new(job.id, original_file.file_path.clone());
        repo.insert_job_file(&clone).await?;

        info!(job_id = %job.id, file = %clone.file_path, "Reprocess-file job created");
        Ok(job.id)
    }

    /// Process a job to completion, cancellation, or failure.
    pub async fn process(
        &self,
        job_id: Uuid,
        connection_string: &str,
        cancel: CancellationToken,
    ) -> Result<()> {
        let repo = JobRepository::new(connection_string);
        match self.run(&repo, job_id, connection_string, &cancel).await {
            Ok(()) => Ok(()),
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Job failed");
                let record = JobError::new(job_id, JobErrorKind::Other, e.to_string());
                if let Err(persist) = repo.insert_job_error(&record).await {
                    error!(job_id = %job_id, error = %persist, "Could not record job failure");
                }
                if let Ok(mut job) = repo.get_job(job_id).await {
                    job.status = JobStatus::Failed;
                    job.finished_at = Some(Utc::now().naive_utc());
                    if let Err(persist) = repo.update_job(&job).await {
                        error!(job_id = %job_id, error = %persist, "Could not mark job failed");
                    }
                }
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        repo: &JobRepository,
        job_id: Uuid,
        connection_string: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut job = repo.get_job(job_id).await?;
        let existing_files = repo.get_job_files(job_id).await?;

        // A reprocess-file job carries exactly one pre-created pending
        // file and skips rediscovery.
        let single_pending = job.total_files == 1
            && existing_files.len() == 1
            && existing_files[0].status == JobFileStatus::Pending;

        let work: Vec<WorkItem> = if single_pending {
            existing_files
                .into_iter()
                .map(|file| WorkItem {
                    file,
                    needs_insert: false,
                })
                .collect()
        } else {
            let paths = discover_csv_files(Path::new(&job.root_folder))?;
            job.total_files = paths.len() as i32;
            paths
                .into_iter()
                .map(|path| WorkItem {
                    file: JobFile::new(job_id, path.display().to_string()),
                    needs_insert: true,
                })
                .collect()
        };

        job.status = JobStatus::Running;
        job.started_at = Some(Utc::now().naive_utc());
        repo.update_job(&job).await?;
        info!(job_id = %job_id, total_files = job.total_files, "Job running");

        let table_names = Arc::new(Mutex::new(
            schema::existing_table_names(connection_string).await?,
        ));
        let semaphore = Arc::new(Semaphore::new(self.config.file_workers));
        let mut workers = JoinSet::new();

        for item in work {
            let semaphore = semaphore.clone();
            let worker = FileWorker {
                config: self.config.clone(),
                repo: repo.clone(),
                connection_string: connection_string.to_string(),
                job_id,
                table_names: table_names.clone(),
                cancel: cancel.clone(),
            };
            workers.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| EngineError::Internal("worker semaphore closed".to_string()))?;
                worker.process_file(item).await
            });
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(e),
                Err(e) => {
                    return Err(EngineError::Internal(format!("File worker panicked: {e}")))
                }
            }
        }

        let finished = Utc::now().naive_utc();
        let mut job = repo.get_job(job_id).await?;

        if cancel.is_cancelled() {
            job.status = JobStatus::Cancelled;
            job.finished_at = Some(finished);
            repo.update_job(&job).await?;
            info!(job_id = %job_id, "Job cancelled");
            return Ok(());
        }

        let files = repo.get_job_files(job_id).await?;
        let total_read: i64 = files.iter().map(|f| f.lines_read).sum();
        let total_inserted: i64 = files.iter().map(|f| f.lines_inserted).sum();
        let utilization = if total_read > 0 {
            (Decimal::from(total_inserted) * Decimal::from(100))
                .checked_div(Decimal::from(total_read))
                .unwrap_or(Decimal::ZERO)
                .round_dp(2)
        } else {
            Decimal::ZERO
        };
        repo.insert_job_metric(&super::model::JobMetric::new(
            job_id,
            "UtilizationPercentage",
            utilization,
        ))
        .await?;

        let elapsed_ms = job
            .started_at
            .map(|started| (finished - started).num_milliseconds())
            .unwrap_or(0);
        repo.insert_job_metric(&super::model::JobMetric::new(
            job_id,
            "TotalExecutionTime",
            Decimal::new(elapsed_ms, 3),
        ))
        .await?;

        job.status = JobStatus::Completed;
        job.finished_at = Some(finished);
        repo.update_job(&job).await?;
        info!(
            job_id = %job_id,
            processed_files = job.processed_files,
            utilization = %utilization,
            "Job completed"
        );
        Ok(())
    }
}

/// Processes one file end to end.
struct FileWorker {
    config: EngineConfig,
    repo: JobRepository,
    connection_string: String,
    job_id: Uuid,
    table_names: Arc<Mutex<HashSet<String>>>,
    cancel: CancellationToken,
}

impl FileWorker {
    /// Run one file through its lifecycle and finalize its record.
    /// Returned errors are orchestration failures (control-table writes)
    /// and fail the whole job.
    async fn process_file(&self, item: WorkItem) -> Result<()> {
        let mut file = item.file;
        if item.needs_insert {
            self.repo.insert_job_file(&file).await?;
        }

        file.status = JobFileStatus::Processing;
        file.started_at = Some(Utc::now().naive_utc());
        self.repo.update_job_file(&file).await?;

        let stopwatch = Instant::now();
        let outcome = self.run_pipeline(&mut file).await;
        file.finished_at = Some(Utc::now().naive_utc());

        match outcome {
            Ok(()) if self.cancel.is_cancelled() => {
                file.status = JobFileStatus::Failed;
                let record = JobError::new(
                    self.job_id,
                    JobErrorKind::Other,
                    format!("Processing of '{}' was cancelled", file.file_path),
                )
                .for_file(file.id);
                self.repo.insert_job_error(&record).await?;
                warn!(path = %file.file_path, "File cancelled");
            }
            Ok(()) => {
                file.status = JobFileStatus::Completed;
                let basename = Path::new(&file.file_path)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| file.file_path.clone());
                let elapsed_ms = stopwatch.elapsed().as_millis() as i64;
                self.repo
                    .insert_job_metric(&super::model::JobMetric::new(
                        self.job_id,
                        format!("FileProcessingTime_{}", basename),
                        Decimal::new(elapsed_ms, 3),
                    ))
                    .await?;
                info!(
                    path = %file.file_path,
                    read = file.lines_read,
                    inserted = file.lines_inserted,
                    rejected = file.lines_rejected,
                    "File completed"
                );
            }
            Err(failure) => {
                file.status = JobFileStatus::Failed;
                let kind = if failure.is_structural() {
                    JobErrorKind::StructuralFailure
                } else {
                    JobErrorKind::Other
                };
                let record =
                    JobError::new(self.job_id, kind, failure.message()).for_file(file.id);
                self.repo.insert_job_error(&record).await?;
                warn!(path = %file.file_path, error = %failure, "File failed");
            }
        }

        self.repo.update_job_file(&file).await?;
        self.repo.increment_processed_files(self.job_id).await?;
        Ok(())
    }

    /// The per-file pipeline: header, sample, infer, name, create,
    /// stream, bulk load. Everything that fails in here fails only this
    /// file; the caller records the failure and its kind.
    async fn run_pipeline(&self, file: &mut JobFile) -> std::result::Result<(), FileFailure> {
        let path = PathBuf::from(&file.file_path);
        let csv = CsvFile::open(&path).await?;
        info!(
            path = %path.display(),
            delimiter = csv.delimiter(),
            encoding = csv.encoding().name(),
            columns = csv.header().len(),
            "Header read"
        );

        // Sampling pass for type inference.
        let mut samples: Vec<Vec<String>> = vec![Vec::new(); csv.header().len()];
        {
            let mut stream = csv.rows(self.cancel.clone()).await?;
            let mut sampled = 0usize;
            while sampled < self.config.sample_rows {
                match stream.next_event().await.map_err(FileFailure::other)? {
                    Some(RowEvent::Row { fields, .. }) => {
                        for (column, value) in samples.iter_mut().zip(fields) {
                            column.push(value);
                        }
                        sampled += 1;
                    }
                    Some(RowEvent::Malformed { .. }) => continue,
                    None => break,
                }
            }
        }
        if self.cancel.is_cancelled() {
            return Ok(());
        }

        let column_types: Vec<SqlColumnType> = csv
            .header()
            .iter()
            .zip(&samples)
            .map(|(name, values)| infer_column_type(values, name))
            .collect();

        // Table and column names; the job-wide name set serializes
        // collision resolution across workers.
        let table_name = {
            let mut names = self.table_names.lock().await;
            let name = table_name_for_file(&path, &names);
            names.insert(name.clone());
            name
        };
        file.table_name = Some(table_name.clone());
        self.repo
            .update_job_file(file)
            .await
            .map_err(FileFailure::other)?;

        let mut column_names: Vec<String> = Vec::with_capacity(csv.header().len());
        for header in csv.header() {
            let name = column_name_for_header(header, &column_names);
            column_names.push(name);
        }

        let columns: Vec<(String, SqlColumnType)> = column_names
            .iter()
            .cloned()
            .zip(column_types.iter().cloned())
            .collect();
        schema::create_table(&self.connection_string, &table_name, &columns)
            .await
            .map_err(FileFailure::other)?;

        // Streaming pass: buffer well-formed rows, record malformed ones.
        let mut rows: Vec<bulk::BulkRow> = Vec::new();
        {
            let mut stream = csv.rows(self.cancel.clone()).await?;
            loop {
                match stream.next_event().await.map_err(FileFailure::other)? {
                    Some(RowEvent::Row { fields, line }) => rows.push((line, fields)),
                    Some(RowEvent::Malformed { line, message }) => {
                        let record =
                            JobError::new(self.job_id, JobErrorKind::LineError, message)
                                .for_file(file.id)
                                .at_line(line);
                        self.repo
                            .insert_job_error(&record)
                            .await
                            .map_err(FileFailure::other)?;
                        file.lines_rejected += 1;
                    }
                    None => break,
                }
            }
        }
        file.lines_read = rows.len() as i64;
        self.repo
            .update_job_file(file)
            .await
            .map_err(FileFailure::other)?;
        if self.cancel.is_cancelled() {
            return Ok(());
        }

        // Bulk load; row errors degrade to rejected lines.
        let mut row_errors: Vec<(u64, String)> = Vec::new();
        let inserted = bulk::bulk_insert(
            &self.connection_string,
            &table_name,
            &column_names,
            Some(&column_types),
            rows,
            &mut |line, reason| row_errors.push((line, reason)),
            self.config.batch_size,
            Duration::from_secs(self.config.bulk_timeout_secs),
            &self.cancel,
        )
        .await
        .map_err(FileFailure::other)?;

        for (line, reason) in row_errors {
            let record = JobError::new(self.job_id, JobErrorKind::DatabaseError, reason)
                .for_file(file.id)
                .at_line(line);
            self.repo
                .insert_job_error(&record)
                .await
                .map_err(FileFailure::other)?;
            file.lines_rejected += 1;
        }
        file.lines_inserted = inserted as i64;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_job_requires_existing_root() {
        let orchestrator = JobOrchestrator::new(EngineConfig::default());
        let err = orchestrator
            .create_job("/no/such/root", "Server=unused")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::RootFolderMissing(_)));
    }
}
