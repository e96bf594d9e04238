//! The durable job model and its machinery: entities, repository,
//! orchestrator and background queue.

pub mod model;
pub mod orchestrator;
pub mod queue;
pub mod repository;

pub use model::{Job, JobError, JobErrorKind, JobFile, JobFileStatus, JobMetric, JobStatus};
pub use orchestrator::JobOrchestrator;
pub use queue::JobQueue;
pub use repository::JobRepository;
