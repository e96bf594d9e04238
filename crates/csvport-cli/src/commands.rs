//! Command handlers.

use colored::Colorize;
use csvport_engine::jobs::{JobFileStatus, JobStatus};
use csvport_engine::MigrationService;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use crate::Result;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

pub async fn init(service: &MigrationService, connection: &str) -> Result<()> {
    service.initialize_schema(connection).await?;
    println!("{} control tables ready", "ok:".green().bold());
    Ok(())
}

pub async fn check(service: &MigrationService, connection: &str) -> Result<()> {
    let result = service.test_connection(connection).await;
    if result.ok {
        println!("{} {}", "ok:".green().bold(), result.message);
        return Ok(());
    }

    println!("{} {}", "error:".red().bold(), result.message);
    if let Some(details) = result.details {
        println!("  {}", details.dimmed());
    }
    anyhow::bail!("connection test failed");
}

pub async fn run(service: &MigrationService, connection: &str, root_folder: &str) -> Result<()> {
    let job_id = service.submit_job(root_folder, connection).await?;
    println!("Submitted job {}", job_id.to_string().bold());
    wait_for_job(service, connection, job_id).await
}

pub async fn reprocess(
    service: &MigrationService,
    connection: &str,
    job_id: Uuid,
    file: Option<Uuid>,
) -> Result<()> {
    let new_job_id = match file {
        Some(file_id) => {
            service
                .submit_reprocess_file(job_id, file_id, connection)
                .await?
        }
        None => service.submit_reprocess_job(job_id, connection).await?,
    };
    println!("Submitted reprocess job {}", new_job_id.to_string().bold());
    wait_for_job(service, connection, new_job_id).await
}

/// Poll until the job reaches a terminal state, or Ctrl-C cancels it.
async fn wait_for_job(service: &MigrationService, connection: &str, job_id: Uuid) -> Result<()> {
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\n{} cancelling job {}", "interrupt:".yellow().bold(), job_id);
                info!(job_id = %job_id, "Cancellation requested from terminal");
                return Ok(());
            }
            _ = tokio::time::sleep(POLL_INTERVAL) => {
                let job = service.get_job(connection, job_id).await?;
                if job.status.is_terminal() {
                    print_job_summary(service, connection, job_id).await?;
                    if job.status == JobStatus::Failed {
                        anyhow::bail!("job {} failed", job_id);
                    }
                    return Ok(());
                }
            }
        }
    }
}

pub async fn list_jobs(service: &MigrationService, connection: &str) -> Result<()> {
    let jobs = service.list_jobs(connection).await?;
    if jobs.is_empty() {
        println!("No jobs found");
        return Ok(());
    }

    for job in jobs {
        println!(
            "{}  {}  {}  {}/{} files  {}",
            job.id,
            job.created_at.format("%Y-%m-%d %H:%M:%S"),
            status_label(job.status),
            job.processed_files,
            job.total_files,
            job.root_folder.dimmed(),
        );
    }
    Ok(())
}

pub async fn show_job(service: &MigrationService, connection: &str, job_id: Uuid) -> Result<()> {
    print_job_summary(service, connection, job_id).await
}

async fn print_job_summary(
    service: &MigrationService,
    connection: &str,
    job_id: Uuid,
) -> Result<()> {
    let job = service.get_job(connection, job_id).await?;
    println!(
        "Job {}  {}  {}/{} files",
        job.id,
        status_label(job.status),
        job.processed_files,
        job.total_files
    );

    let files = service.list_job_files(connection, job_id).await?;
    for file in &files {
        println!(
            "  {}  {}  read={} inserted={} rejected={}  {}",
            file_status_label(file.status),
            file.table_name.as_deref().unwrap_or("-"),
            file.lines_read,
            file.lines_inserted,
            file.lines_rejected,
            file.file_path.dimmed(),
        );
    }

    let errors = service.list_job_errors(connection, job_id).await?;
    if !errors.is_empty() {
        println!("  {} {} error(s):", "!".red().bold(), errors.len());
        for error in errors.iter().take(20) {
            let line = error
                .line_number
                .map(|l| format!(" line {}", l))
                .unwrap_or_default();
            println!("    [{:?}]{} {}", error.error_type, line, error.message);
        }
        if errors.len() > 20 {
            println!("    … and {} more", errors.len() - 20);
        }
    }

    let metrics = service.list_job_metrics(connection, job_id).await?;
    for metric in metrics {
        println!("  {} = {}", metric.metric_name.dimmed(), metric.metric_value);
    }
    Ok(())
}

fn status_label(status: JobStatus) -> String {
    match status {
        JobStatus::Created => "created".dimmed().to_string(),
        JobStatus::Running => "running".cyan().to_string(),
        JobStatus::Completed => "completed".green().to_string(),
        JobStatus::Failed => "failed".red().to_string(),
        JobStatus::Cancelled => "cancelled".yellow().to_string(),
    }
}

fn file_status_label(status: JobFileStatus) -> String {
    match status {
        JobFileStatus::Pending => "pending".dimmed().to_string(),
        JobFileStatus::Processing => "processing".cyan().to_string(),
        JobFileStatus::Completed => "completed".green().to_string(),
        JobFileStatus::Failed => "failed".red().to_string(),
    }
}
