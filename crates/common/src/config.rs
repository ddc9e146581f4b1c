//! Runner configuration and the environment contract with the scheduler.

use serde::{Deserialize, Serialize};

use crate::error::{JobError, JobResult};

/// Serialized pipeline configuration (JSON).
pub const PIPELINE_CONFIG_ENV: &str = "GST_PIPELINE_CONFIG";

/// Serialized source object descriptor (JSON).
pub const SRC_OBJECT_ENV: &str = "GST_PIPELINE_SRC_OBJECT";

/// Serialized list of sink object descriptors (JSON).
pub const SINK_OBJECTS_ENV: &str = "GST_PIPELINE_SINK_OBJECTS";

/// Serialized pipeline kind (JSON). When set, sink objects are derived from
/// it and [`SRC_KEY_ENV`] instead of being listed explicitly.
pub const PIPELINE_KIND_ENV: &str = "GST_PIPELINE_KIND_CONFIG";

/// Key of the object that triggered the job, used with [`PIPELINE_KIND_ENV`].
pub const SRC_KEY_ENV: &str = "GST_PIPELINE_SRC_KEY";

pub const SRC_ACCESS_KEY_ID_ENV: &str = "MINIO_SRC_ACCESS_KEY_ID";
pub const SRC_SECRET_ACCESS_KEY_ENV: &str = "MINIO_SRC_SECRET_ACCESS_KEY";
pub const SINK_ACCESS_KEY_ID_ENV: &str = "MINIO_SINK_ACCESS_KEY_ID";
pub const SINK_SECRET_ACCESS_KEY_ENV: &str = "MINIO_SINK_SECRET_ACCESS_KEY";

/// Default size of one output part.
pub const DEFAULT_PART_SIZE: u64 = 10 * 1024 * 1024;

/// Smallest part size the object store accepts for non-final composed parts.
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Default lifetime of the presigned source URL.
pub const DEFAULT_PRESIGN_TTL_SECS: u64 = 6 * 60 * 60;

/// Process-level runner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Size of each temporary output part in bytes.
    pub part_size: u64,

    /// Lifetime of the presigned URL handed to the source element.
    pub presign_ttl_secs: u64,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "gstjob_engine=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            part_size: DEFAULT_PART_SIZE,
            presign_ttl_secs: DEFAULT_PRESIGN_TTL_SECS,
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl RunnerConfig {
    /// Reject settings the object store would refuse later on.
    pub fn validate(&self) -> JobResult<()> {
        if self.part_size < MIN_PART_SIZE {
            return Err(JobError::spec(format!(
                "Part size {} is below the minimum of {MIN_PART_SIZE} bytes",
                self.part_size
            )));
        }
        if self.presign_ttl_secs == 0 {
            return Err(JobError::spec("Presign TTL must be greater than zero"));
        }
        Ok(())
    }
}

/// Read a required environment variable.
pub fn required_env(key: &str) -> JobResult<String> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        Ok(_) => Err(JobError::spec(format!("{key} is empty"))),
        Err(_) => Err(JobError::spec(format!("{key} not set"))),
    }
}

/// Read an environment variable that may be absent or blank.
pub fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}
