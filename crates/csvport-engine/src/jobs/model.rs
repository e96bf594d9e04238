//! Durable job entities.
//!
//! One [`Job`] per migration run, one [`JobFile`] per source file,
//! append-only [`JobError`]s and time-stamped [`JobMetric`]s. Statuses
//! and error kinds persist as integers in declaration order; unknown
//! values read back as the most conservative member so old rows never
//! fail to load.

use chrono::{NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a migration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Created,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_i32(self) -> i32 {
        match self {
            JobStatus::Created => 0,
            JobStatus::Running => 1,
            JobStatus::Completed => 2,
            JobStatus::Failed => 3,
            JobStatus::Cancelled => 4,
        }
    }

    pub fn from_i32(value: i32) -> Self {
        match value {
            1 => JobStatus::Running,
            2 => JobStatus::Completed,
            3 => JobStatus::Failed,
            4 => JobStatus::Cancelled,
            _ => JobStatus::Created,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

/// Lifecycle of a single source file within a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobFileStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobFileStatus {
    pub fn as_i32(self) -> i32 {
        match self {
            JobFileStatus::Pending => 0,
            JobFileStatus::Processing => 1,
            JobFileStatus::Completed => 2,
            JobFileStatus::Failed => 3,
        }
    }

    pub fn from_i32(value: i32) -> Self {
        match value {
            1 => JobFileStatus::Processing,
            2 => JobFileStatus::Completed,
            3 => JobFileStatus::Failed,
            _ => JobFileStatus::Pending,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobFileStatus::Completed | JobFileStatus::Failed)
    }
}

/// Classification of a recorded failure event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobErrorKind {
    StructuralFailure,
    LineError,
    ColumnError,
    DatabaseError,
    Other,
}

impl JobErrorKind {
    pub fn as_i32(self) -> i32 {
        match self {
            JobErrorKind::StructuralFailure => 0,
            JobErrorKind::LineError => 1,
            JobErrorKind::ColumnError => 2,
            JobErrorKind::DatabaseError => 3,
            JobErrorKind::Other => 4,
        }
    }

    pub fn from_i32(value: i32) -> Self {
        match value {
            0 => JobErrorKind::StructuralFailure,
            1 => JobErrorKind::LineError,
            2 => JobErrorKind::ColumnError,
            3 => JobErrorKind::DatabaseError,
            _ => JobErrorKind::Other,
        }
    }
}

/// One migration run over a root folder. Never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub created_at: NaiveDateTime,
    pub started_at: Option<NaiveDateTime>,
    pub finished_at: Option<NaiveDateTime>,
    pub status: JobStatus,
    pub root_folder: String,
    pub total_files: i32,
    pub processed_files: i32,
}

impl Job {
    pub fn new(root_folder: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now().naive_utc(),
            started_at: None,
            finished_at: None,
            status: JobStatus::Created,
            root_folder: root_folder.into(),
            total_files: 0,
            processed_files: 0,
        }
    }
}

/// Per-file work unit within a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobFile {
    pub id: Uuid,
    pub job_id: Uuid,
    pub file_path: String,
    pub status: JobFileStatus,
    pub started_at: Option<NaiveDateTime>,
    pub finished_at: Option<NaiveDateTime>,
    pub lines_read: i64,
    pub lines_inserted: i64,
    pub lines_rejected: i64,
    pub table_name: Option<String>,
}

impl JobFile {
    pub fn new(job_id: Uuid, file_path: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id,
            file_path: file_path.into(),
            status: JobFileStatus::Pending,
            started_at: None,
            finished_at: None,
            lines_read: 0,
            lines_inserted: 0,
            lines_rejected: 0,
            table_name: None,
        }
    }
}

/// One failure event. Append-only; survives its parents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobError {
    pub id: Uuid,
    pub job_id: Uuid,
    pub job_file_id: Option<Uuid>,
    pub line_number: Option<i64>,
    pub column_name: Option<String>,
    pub error_type: JobErrorKind,
    pub message: String,
    pub created_at: NaiveDateTime,
}

impl JobError {
    pub fn new(job_id: Uuid, error_type: JobErrorKind, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id,
            job_file_id: None,
            line_number: None,
            column_name: None,
            error_type,
            message: message.into(),
            created_at: Utc::now().naive_utc(),
        }
    }

    pub fn for_file(mut self, job_file_id: Uuid) -> Self {
        self.job_file_id = Some(job_file_id);
        self
    }

    pub fn at_line(mut self, line_number: u64) -> Self {
        self.line_number = Some(line_number as i64);
        self
    }
}

/// One time-stamped measurement attached to a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMetric {
    pub id: Uuid,
    pub job_id: Uuid,
    pub metric_name: String,
    pub metric_value: Decimal,
    pub recorded_at: NaiveDateTime,
}

impl JobMetric {
    pub fn new(job_id: Uuid, metric_name: impl Into<String>, metric_value: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id,
            metric_name: metric_name.into(),
            metric_value,
            recorded_at: Utc::now().naive_utc(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_ordinals_round_trip() {
        for status in [
            JobStatus::Created,
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Cancelled,
        ] {
            assert_eq!(JobStatus::from_i32(status.as_i32()), status);
        }
        assert_eq!(JobStatus::Created.as_i32(), 0);
        assert_eq!(JobStatus::Cancelled.as_i32(), 4);
    }

    #[test]
    fn test_file_status_ordinals_round_trip() {
        for status in [
            JobFileStatus::Pending,
            JobFileStatus::Processing,
            JobFileStatus::Completed,
            JobFileStatus::Failed,
        ] {
            assert_eq!(JobFileStatus::from_i32(status.as_i32()), status);
        }
    }

    #[test]
    fn test_error_kind_ordinals() {
        assert_eq!(JobErrorKind::StructuralFailure.as_i32(), 0);
        assert_eq!(JobErrorKind::LineError.as_i32(), 1);
        assert_eq!(JobErrorKind::ColumnError.as_i32(), 2);
        assert_eq!(JobErrorKind::DatabaseError.as_i32(), 3);
        assert_eq!(JobErrorKind::Other.as_i32(), 4);
    }

    #[test]
    fn test_new_job_starts_created() {
        let job = Job::new("/data/in");
        assert_eq!(job.status, JobStatus::Created);
        assert_eq!(job.total_files, 0);
        assert!(job.started_at.is_none());
    }

    #[test]
    fn test_job_error_builders() {
        let job_id = Uuid::new_v4();
        let file_id = Uuid::new_v4();
        let error = JobError::new(job_id, JobErrorKind::LineError, "bad line")
            .for_file(file_id)
            .at_line(42);
        assert_eq!(error.job_file_id, Some(file_id));
        assert_eq!(error.line_number, Some(42));
        assert_eq!(error.error_type, JobErrorKind::LineError);
    }
}
