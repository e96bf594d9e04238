//! Persistence for jobs, files, errors and metrics.
//!
//! Sole gateway to the four control tables in `dbo`. The repository is
//! reentrant: every call opens its own connection, so it can be shared
//! freely across workers without pooling or cross-request transactions.

use tiberius::Row;
use uuid::Uuid;

use crate::db::{self, SqlClient};
use crate::error::{EngineError, Result};

use super::model::{Job, JobError, JobErrorKind, JobFile, JobFileStatus, JobMetric, JobStatus};

const CREATE_JOBS: &str = "\
IF OBJECT_ID(N'[dbo].[Jobs]', N'U') IS NULL
CREATE TABLE [dbo].[Jobs] (
    [Id] uniqueidentifier NOT NULL PRIMARY KEY,
    [CreatedAt] datetime2 NOT NULL,
    [StartedAt] datetime2 NULL,
    [FinishedAt] datetime2 NULL,
    [Status] int NOT NULL,
    [RootFolder] nvarchar(1024) NOT NULL,
    [TotalFiles] int NOT NULL,
    [ProcessedFiles] int NOT NULL
)";

const CREATE_JOB_FILES: &str = "\
IF OBJECT_ID(N'[dbo].[JobFiles]', N'U') IS NULL
CREATE TABLE [dbo].[JobFiles] (
    [Id] uniqueidentifier NOT NULL PRIMARY KEY,
    [JobId] uniqueidentifier NOT NULL,
    [FilePath] nvarchar(1024) NOT NULL,
    [Status] int NOT NULL,
    [StartedAt] datetime2 NULL,
    [FinishedAt] datetime2 NULL,
    [LinesRead] bigint NOT NULL,
    [LinesInserted] bigint NOT NULL,
    [LinesRejected] bigint NOT NULL,
    [TableName] nvarchar(128) NULL,
    CONSTRAINT [FK_JobFiles_Jobs] FOREIGN KEY ([JobId]) REFERENCES [dbo].[Jobs] ([Id])
)";

const CREATE_JOB_ERRORS: &str = "\
IF OBJECT_ID(N'[dbo].[JobErrors]', N'U') IS NULL
CREATE TABLE [dbo].[JobErrors] (
    [Id] uniqueidentifier NOT NULL PRIMARY KEY,
    [JobId] uniqueidentifier NOT NULL,
    [JobFileId] uniqueidentifier NULL,
    [LineNumber] bigint NULL,
    [ColumnName] nvarchar(128) NULL,
    [ErrorType] int NOT NULL,
    [Message] nvarchar(max) NOT NULL,
    [CreatedAt] datetime2 NOT NULL,
    CONSTRAINT [FK_JobErrors_Jobs] FOREIGN KEY ([JobId]) REFERENCES [dbo].[Jobs] ([Id]),
    CONSTRAINT [FK_JobErrors_JobFiles] FOREIGN KEY ([JobFileId]) REFERENCES [dbo].[JobFiles] ([Id])
)";

const CREATE_JOB_METRICS: &str = "\
IF OBJECT_ID(N'[dbo].[JobMetrics]', N'U') IS NULL
CREATE TABLE [dbo].[JobMetrics] (
    [Id] uniqueidentifier NOT NULL PRIMARY KEY,
    [JobId] uniqueidentifier NOT NULL,
    [MetricName] nvarchar(256) NOT NULL,
    [MetricValue] decimal(18,4) NOT NULL,
    [RecordedAt] datetime2 NOT NULL,
    CONSTRAINT [FK_JobMetrics_Jobs] FOREIGN KEY ([JobId]) REFERENCES [dbo].[Jobs] ([Id])
)";

/// Repository over the control tables.
#[derive(Debug, Clone)]
pub struct JobRepository {
    connection_string: String,
}

impl JobRepository {
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
        }
    }

    async fn client(&self) -> Result<SqlClient> {
        db::connect(&self.connection_string)
            .await
            .map_err(|e| EngineError::database("connect", e))
    }

    /// Create the four control tables if absent.
    pub async fn initialize_schema(&self) -> Result<()> {
        let mut client = self.client().await?;
        for ddl in [CREATE_JOBS, CREATE_JOB_FILES, CREATE_JOB_ERRORS, CREATE_JOB_METRICS] {
            client
                .simple_query(ddl)
                .await
                .map_err(|e| EngineError::database("initialize schema", e))?
                .into_results()
                .await
                .map_err(|e| EngineError::database("initialize schema", e))?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Jobs
    // ------------------------------------------------------------------

    pub async fn insert_job(&self, job: &Job) -> Result<()> {
        let mut client = self.client().await?;
        client
            .execute(
                "INSERT INTO [dbo].[Jobs] \
                 ([Id], [CreatedAt], [StartedAt], [FinishedAt], [Status], [RootFolder], [TotalFiles], [ProcessedFiles]) \
                 VALUES (@P1, @P2, @P3, @P4, @P5, @P6, @P7, @P8)",
                &[
                    &job.id,
                    &job.created_at,
                    &job.started_at,
                    &job.finished_at,
                    &job.status.as_i32(),
                    &job.root_folder.as_str(),
                    &job.total_files,
                    &job.processed_files,
                ],
            )
            .await
            .map_err(|e| EngineError::database("insert job", e))?;
        Ok(())
    }

    pub async fn update_job(&self, job: &Job) -> Result<()> {
        let mut client = self.client().await?;
        client
            .execute(
                "UPDATE [dbo].[Jobs] SET \
                 [StartedAt] = @P2, [FinishedAt] = @P3, [Status] = @P4, \
                 [TotalFiles] = @P5, [ProcessedFiles] = @P6 \
                 WHERE [Id] = @P1",
                &[
                    &job.id,
                    &job.started_at,
                    &job.finished_at,
                    &job.status.as_i32(),
                    &job.total_files,
                    &job.processed_files,
                ],
            )
            .await
            .map_err(|e| EngineError::database("update job", e))?;
        Ok(())
    }

    /// Atomically bump the processed-files counter.
    pub async fn increment_processed_files(&self, job_id: Uuid) -> Result<()> {
        let mut client = self.client().await?;
        client
            .execute(
                "UPDATE [dbo].[Jobs] SET [ProcessedFiles] = [ProcessedFiles] + 1 WHERE [Id] = @P1",
                &[&job_id],
            )
            .await
            .map_err(|e| EngineError::database("increment processed files", e))?;
        Ok(())
    }

    pub async fn get_job(&self, job_id: Uuid) -> Result<Job> {
        let mut client = self.client().await?;
        let row = client
            .query("SELECT * FROM [dbo].[Jobs] WHERE [Id] = @P1", &[&job_id])
            .await
            .map_err(|e| EngineError::database("get job", e))?
            .into_row()
            .await
            .map_err(|e| EngineError::database("get job", e))?
            .ok_or_else(|| EngineError::not_found("Job", job_id))?;
        job_from_row(&row)
    }

    /// All jobs, newest first.
    pub async fn get_all_jobs(&self) -> Result<Vec<Job>> {
        let mut client = self.client().await?;
        let rows = client
            .simple_query("SELECT * FROM [dbo].[Jobs] ORDER BY [CreatedAt] DESC")
            .await
            .map_err(|e| EngineError::database("list jobs", e))?
            .into_first_result()
            .await
            .map_err(|e| EngineError::database("list jobs", e))?;
        rows.iter().map(job_from_row).collect()
    }

    // ------------------------------------------------------------------
    // Job files
    // ------------------------------------------------------------------

    pub async fn insert_job_file(&self, file: &JobFile) -> Result<()> {
        let mut client = self.client().await?;
        client
            .execute(
                "INSERT INTO [dbo].[JobFiles] \
                 ([Id], [JobId], [FilePath], [Status], [StartedAt], [FinishedAt], [LinesRead], [LinesInserted], [LinesRejected], [TableName]) \
                 VALUES (@P1, @P2, @P3, @P4, @P5, @P6, @P7, @P8, @P9, @P10)",
                &[
                    &file.id,
                    &file.job_id,
                    &file.file_path.as_str(),
                    &file.status.as_i32(),
                    &file.started_at,
                    &file.finished_at,
                    &file.lines_read,
                    &file.lines_inserted,
                    &file.lines_rejected,
                    &file.table_name,
                ],
            )
            .await
            .map_err(|e| EngineError::database("insert job file", e))?;
        Ok(())
    }

    pub async fn update_job_file(&self, file: &JobFile) -> Result<()> {
        let mut client = self.client().await?;
        client
            .execute(
                "UPDATE [dbo].[JobFiles] SET \
                 [Status] = @P2, [StartedAt] = @P3, [FinishedAt] = @P4, \
                 [LinesRead] = @P5, [LinesInserted] = @P6, [LinesRejected] = @P7, [TableName] = @P8 \
                 WHERE [Id] = @P1",
                &[
                    &file.id,
                    &file.status.as_i32(),
                    &file.started_at,
                    &file.finished_at,
                    &file.lines_read,
                    &file.lines_inserted,
                    &file.lines_rejected,
                    &file.table_name,
                ],
            )
            .await
            .map_err(|e| EngineError::database("update job file", e))?;
        Ok(())
    }

    pub async fn get_job_file(&self, file_id: Uuid) -> Result<JobFile> {
        let mut client = self.client().await?;
        let row = client
            .query("SELECT * FROM [dbo].[JobFiles] WHERE [Id] = @P1", &[&file_id])
            .await
            .map_err(|e| EngineError::database("get job file", e))?
            .into_row()
            .await
            .map_err(|e| EngineError::database("get job file", e))?
            .ok_or_else(|| EngineError::not_found("JobFile", file_id))?;
        job_file_from_row(&row)
    }

    pub async fn get_job_files(&self, job_id: Uuid) -> Result<Vec<JobFile>> {
        let mut client = self.client().await?;
        let rows = client
            .query(
                "SELECT * FROM [dbo].[JobFiles] WHERE [JobId] = @P1 ORDER BY [FilePath]",
                &[&job_id],
            )
            .await
            .map_err(|e| EngineError::database("list job files", e))?
            .into_first_result()
            .await
            .map_err(|e| EngineError::database("list job files", e))?;
        rows.iter().map(job_file_from_row).collect()
    }

    // ------------------------------------------------------------------
    // Job errors
    // ------------------------------------------------------------------

    pub async fn insert_job_error(&self, error: &JobError) -> Result<()> {
        let mut client = self.client().await?;
        client
            .execute(
                "INSERT INTO [dbo].[JobErrors] \
                 ([Id], [JobId], [JobFileId], [LineNumber], [ColumnName], [ErrorType], [Message], [CreatedAt]) \
                 VALUES (@P1, @P2, @P3, @P4, @P5, @P6, @P7, @P8)",
                &[
                    &error.id,
                    &error.job_id,
                    &error.job_file_id,
                    &error.line_number,
                    &error.column_name,
                    &error.error_type.as_i32(),
                    &error.message.as_str(),
                    &error.created_at,
                ],
            )
            .await
            .map_err(|e| EngineError::database("insert job error", e))?;
        Ok(())
    }

    pub async fn get_job_errors(&self, job_id: Uuid) -> Result<Vec<JobError>> {
        let mut client = self.client().await?;
        let rows = client
            .query(
                "SELECT * FROM [dbo].[JobErrors] WHERE [JobId] = @P1 ORDER BY [CreatedAt]",
                &[&job_id],
            )
            .await
            .map_err(|e| EngineError::database("list job errors", e))?
            .into_first_result()
            .await
            .map_err(|e| EngineError::database("list job errors", e))?;
        rows.iter().map(job_error_from_row).collect()
    }

    // ------------------------------------------------------------------
    // Job metrics
    // ------------------------------------------------------------------

    pub async fn insert_job_metric(&self, metric: &JobMetric) -> Result<()> {
        let mut client = self.client().await?;
        client
            .execute(
                "INSERT INTO [dbo].[JobMetrics] \
                 ([Id], [JobId], [MetricName], [MetricValue], [RecordedAt]) \
                 VALUES (@P1, @P2, @P3, @P4, @P5)",
                &[
                    &metric.id,
                    &metric.job_id,
                    &metric.metric_name.as_str(),
                    &metric.metric_value,
                    &metric.recorded_at,
                ],
            )
            .await
            .map_err(|e| EngineError::database("insert job metric", e))?;
        Ok(())
    }

    pub async fn get_job_metrics(&self, job_id: Uuid) -> Result<Vec<JobMetric>> {
        let mut client = self.client().await?;
        let rows = client
            .query(
                "SELECT * FROM [dbo].[JobMetrics] WHERE [JobId] = @P1 ORDER BY [RecordedAt]",
                &[&job_id],
            )
            .await
            .map_err(|e| EngineError::database("list job metrics", e))?
            .into_first_result()
            .await
            .map_err(|e| EngineError::database("list job metrics", e))?;
        rows.iter().map(job_metric_from_row).collect()
    }
}

// ----------------------------------------------------------------------
// Row mapping
// ----------------------------------------------------------------------

fn required<T>(value: Option<T>, column: &'static str) -> Result<T> {
    value.ok_or_else(|| EngineError::database("row decode", format!("missing column {column}")))
}

fn job_from_row(row: &Row) -> Result<Job> {
    Ok(Job {
        id: required(row.get("Id"), "Id")?,
        created_at: required(row.get("CreatedAt"), "CreatedAt")?,
        started_at: row.get("StartedAt"),
        finished_at: row.get("FinishedAt"),
        status: JobStatus::from_i32(required(row.get("Status"), "Status")?),
        root_folder: required(row.get::<&str, _>("RootFolder"), "RootFolder")?.to_string(),
        total_files: required(row.get("TotalFiles"), "TotalFiles")?,
        processed_files: required(row.get("ProcessedFiles"), "ProcessedFiles")?,
    })
}

fn job_file_from_row(row: &Row) -> Result<JobFile> {
    Ok(JobFile {
        id: required(row.get("Id"), "Id")?,
        job_id: required(row.get("JobId"), "JobId")?,
        file_path: required(row.get::<&str, _>("FilePath"), "FilePath")?.to_string(),
        status: JobFileStatus::from_i32(required(row.get("Status"), "Status")?),
        started_at: row.get("StartedAt"),
        finished_at: row.get("FinishedAt"),
        lines_read: required(row.get("LinesRead"), "LinesRead")?,
        lines_inserted: required(row.get("LinesInserted"), "LinesInserted")?,
        lines_rejected: required(row.get("LinesRejected"), "LinesRejected")?,
        table_name: row.get::<&str, _>("TableName").map(str::to_string),
    })
}

fn job_error_from_row(row: &Row) -> Result<JobError> {
    Ok(JobError {
        id: required(row.get("Id"), "Id")?,
        job_id: required(row.get("JobId"), "JobId")?,
        job_file_id: row.get("JobFileId"),
        line_number: row.get("LineNumber"),
        column_name: row.get::<&str, _>("ColumnName").map(str::to_string),
        error_type: JobErrorKind::from_i32(required(row.get("ErrorType"), "ErrorType")?),
        message: required(row.get::<&str, _>("Message"), "Message")?.to_string(),
        created_at: required(row.get("CreatedAt"), "CreatedAt")?,
    })
}

fn job_metric_from_row(row: &Row) -> Result<JobMetric> {
    Ok(JobMetric {
        id: required(row.get("Id"), "Id")?,
        job_id: required(row.get("JobId"), "JobId")?,
        metric_name: required(row.get::<&str, _>("MetricName"), "MetricName")?.to_string(),
        metric_value: required(row.get("MetricValue"), "MetricValue")?,
        recorded_at: required(row.get("RecordedAt"), "RecordedAt")?,
    })
}
