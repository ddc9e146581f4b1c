//! gstjob runner: processes one source object with the pipeline described by
//! the process environment.
//!
//! Exit status:
//!   0  job completed
//!   1  job specification could not be read
//!   2  pipeline construction failed
//!   3  processing failed at run time

use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::Parser;
use gstjob_common::config::{
    LoggingConfig, RunnerConfig, DEFAULT_PART_SIZE, DEFAULT_PRESIGN_TTL_SECS,
};
use gstjob_common::logging::{init_logging, job_span};
use gstjob_engine::{ExitStatus, JobRunner, S3StoreProvider};
use gstjob_model::JobSpec;
use tracing::Instrument;

#[derive(Debug, Parser)]
#[command(
    name = "gstjob-runner",
    about = "Run one GStreamer transcoding job against S3-compatible storage",
    version,
    author
)]
struct Cli {
    /// Size of each temporary output part in bytes
    #[arg(long, env = "GST_RUNNER_PART_SIZE", default_value_t = DEFAULT_PART_SIZE)]
    part_size: u64,

    /// Lifetime of the presigned source URL in seconds
    #[arg(long, env = "GST_RUNNER_PRESIGN_TTL_SECS", default_value_t = DEFAULT_PRESIGN_TTL_SECS)]
    presign_ttl_secs: u64,

    /// Log filter (RUST_LOG takes precedence)
    #[arg(long, env = "GST_RUNNER_LOG", default_value = "info")]
    log_level: String,

    /// Emit structured JSON logs
    #[arg(long, env = "GST_RUNNER_LOG_JSON")]
    json_logs: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn runner_config(&self) -> RunnerConfig {
        let level = if self.verbose {
            "debug".to_string()
        } else {
            self.log_level.clone()
        };
        RunnerConfig {
            part_size: self.part_size,
            presign_ttl_secs: self.presign_ttl_secs,
            logging: LoggingConfig {
                level,
                json: self.json_logs,
            },
        }
    }
}

fn exit(status: ExitStatus) -> ExitCode {
    ExitCode::from(status.code())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            let _ = e.print();
            return exit(ExitStatus::SpecUnreadable);
        }
    };

    let config = cli.runner_config();
    init_logging(&config.logging);

    if let Err(e) = config.validate() {
        tracing::error!(error = %e, "Invalid runner configuration");
        return exit(ExitStatus::SpecUnreadable);
    }

    let job = match JobSpec::from_env() {
        Ok(job) => job,
        Err(e) => {
            tracing::error!(error = %e, "Failed to retrieve job spec from environment");
            return exit(ExitStatus::SpecUnreadable);
        }
    };

    let provider = match S3StoreProvider::from_env(&config) {
        Ok(provider) => provider,
        Err(e) => {
            tracing::error!(error = %e, "Failed to configure object store access");
            return exit(ExitStatus::BuildFailed);
        }
    };

    let span = job_span(&job.source.key, job.sinks.len());
    let status = JobRunner::execute(job, &config, &provider)
        .instrument(span)
        .await;
    exit(status)
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flags_build_runner_config() {
        let cli = Cli::try_parse_from([
            "gstjob-runner",
            "--part-size",
            "8388608",
            "--log-level",
            "gstjob_engine=trace",
            "--json-logs",
        ])
        .unwrap();
        let config = cli.runner_config();
        assert_eq!(config.part_size, 8 * 1024 * 1024);
        assert_eq!(config.logging.level, "gstjob_engine=trace");
        assert!(config.logging.json);
        assert!(config.validate().is_ok());

        let cli = Cli::try_parse_from(["gstjob-runner", "-v", "--part-size", "1024"]).unwrap();
        let config = cli.runner_config();
        assert_eq!(config.logging.level, "debug");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_flag_value_is_rejected() {
        assert!(Cli::try_parse_from(["gstjob-runner", "--part-size", "lots"]).is_err());
    }
}
