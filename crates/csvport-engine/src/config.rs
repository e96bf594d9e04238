//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Default number of concurrent file workers per job.
pub const DEFAULT_FILE_WORKERS: usize = 4;

/// Default number of rows per bulk-copy batch.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Default number of rows sampled per column for type inference.
pub const DEFAULT_SAMPLE_ROWS: usize = 5000;

/// Default bulk-copy timeout per batch, in seconds.
pub const DEFAULT_BULK_TIMEOUT_SECS: u64 = 300;

/// Default connection-test timeout in seconds.
pub const DEFAULT_CONNECT_TEST_TIMEOUT_SECS: u64 = 5;

/// Engine tuning knobs.
///
/// The destination connection string and root folder are not part of
/// this struct; they are passed per job by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Concurrent file workers per job (counting-semaphore bound).
    pub file_workers: usize,
    /// Rows accumulated before each bulk-copy submission.
    pub batch_size: usize,
    /// Rows sampled per column during type inference.
    pub sample_rows: usize,
    /// Per-batch bulk-copy timeout in seconds.
    pub bulk_timeout_secs: u64,
    /// Connection-test timeout in seconds.
    pub connect_test_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            file_workers: DEFAULT_FILE_WORKERS,
            batch_size: DEFAULT_BATCH_SIZE,
            sample_rows: DEFAULT_SAMPLE_ROWS,
            bulk_timeout_secs: DEFAULT_BULK_TIMEOUT_SECS,
            connect_test_timeout_secs: DEFAULT_CONNECT_TEST_TIMEOUT_SECS,
        }
    }
}

impl EngineConfig {
    /// Load configuration from the environment.
    ///
    /// Recognized variables: `CSVPORT_FILE_WORKERS`, `CSVPORT_BATCH_SIZE`,
    /// `CSVPORT_SAMPLE_ROWS`, `CSVPORT_BULK_TIMEOUT`,
    /// `CSVPORT_CONNECT_TEST_TIMEOUT`. Unset variables fall back to the
    /// defaults above.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            file_workers: env_parse("CSVPORT_FILE_WORKERS", DEFAULT_FILE_WORKERS),
            batch_size: env_parse("CSVPORT_BATCH_SIZE", DEFAULT_BATCH_SIZE),
            sample_rows: env_parse("CSVPORT_SAMPLE_ROWS", DEFAULT_SAMPLE_ROWS),
            bulk_timeout_secs: env_parse("CSVPORT_BULK_TIMEOUT", DEFAULT_BULK_TIMEOUT_SECS),
            connect_test_timeout_secs: env_parse(
                "CSVPORT_CONNECT_TEST_TIMEOUT",
                DEFAULT_CONNECT_TEST_TIMEOUT_SECS,
            ),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.file_workers == 0 {
            anyhow::bail!("file_workers must be greater than 0");
        }
        if self.batch_size == 0 {
            anyhow::bail!("batch_size must be greater than 0");
        }
        if self.sample_rows == 0 {
            anyhow::bail!("sample_rows must be greater than 0");
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(var: &str, default: T) -> T {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.file_workers, 4);
        assert_eq!(config.batch_size, 1000);
        assert_eq!(config.sample_rows, 5000);
        assert_eq!(config.bulk_timeout_secs, 300);
        assert_eq!(config.connect_test_timeout_secs, 5);
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let config = EngineConfig {
            file_workers: 0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
