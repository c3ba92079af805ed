// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Logging initialization for mmprep binaries
//!
//! Console output is always installed; with the `file-logging` feature a JSON
//! log is also written into a timestamped run folder with retention cleanup.

use anyhow::{Context, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use mmprep_config::{LogFormat, LoggingConfig};

use crate::cli::CrateDebugFlags;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn env_filter(debug_flags: &CrateDebugFlags, level: &str) -> Result<EnvFilter> {
    let directives = debug_flags.to_filter_string(level);
    EnvFilter::try_new(&directives)
        .with_context(|| format!("Invalid log filter directives: {}", directives))
}

fn console_layer(format: LogFormat, filter: EnvFilter) -> BoxedLayer {
    match format {
        LogFormat::Text => fmt::layer()
            .with_target(false)
            .with_thread_names(true)
            .with_filter(filter)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_names(true)
            .with_filter(filter)
            .boxed(),
    }
}

/// Install the global console subscriber.
///
/// # Errors
/// Fails if the level/debug flags do not form a valid filter, or if a global
/// subscriber has already been installed.
pub fn init_logging(debug_flags: &CrateDebugFlags, config: &LoggingConfig) -> Result<()> {
    let filter = env_filter(debug_flags, &config.level)?;
    Registry::default()
        .with(vec![console_layer(config.format, filter)])
        .try_init()
        .context("Failed to install tracing subscriber")?;
    Ok(())
}

#[cfg(feature = "file-logging")]
pub use file::{init_file_logging, LoggingGuard};

#[cfg(feature = "file-logging")]
mod file {
    use std::path::{Path, PathBuf};

    use anyhow::{Context, Result};
    use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
    use tracing_appender::rolling;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{fmt, Layer, Registry};

    use mmprep_config::LoggingConfig;

    use super::{console_layer, env_filter};
    use crate::cli::CrateDebugFlags;

    const RUN_PREFIX: &str = "run_";
    const RUN_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

    /// Keeps the background log writer alive; logs are flushed on drop.
    pub struct LoggingGuard {
        _file_guard: tracing_appender::non_blocking::WorkerGuard,
        log_dir: PathBuf,
    }

    impl LoggingGuard {
        /// Folder of the current run
        pub fn log_dir(&self) -> &Path {
            &self.log_dir
        }
    }

    /// Install console output plus a JSON log file under `{log_dir}/run_YYYYmmdd_HHMMSS/`.
    pub fn init_file_logging(
        debug_flags: &CrateDebugFlags,
        config: &LoggingConfig,
    ) -> Result<LoggingGuard> {
        let base_log_dir = PathBuf::from(&config.log_dir);
        let run_folder = base_log_dir.join(format!(
            "{}{}",
            RUN_PREFIX,
            Utc::now().format(RUN_TIMESTAMP_FORMAT)
        ));
        std::fs::create_dir_all(&run_folder)
            .with_context(|| format!("Failed to create log directory: {}", run_folder.display()))?;

        cleanup_old_logs(&base_log_dir, config.retention_days, config.retention_runs)?;

        let (writer, guard) = tracing_appender::non_blocking(rolling::daily(&run_folder, "mmprep.log"));
        let file_layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .json()
            .with_filter(env_filter(debug_flags, &config.level)?)
            .boxed();

        Registry::default()
            .with(vec![
                console_layer(config.format, env_filter(debug_flags, &config.level)?),
                file_layer,
            ])
            .try_init()
            .context("Failed to install tracing subscriber")?;

        Ok(LoggingGuard {
            _file_guard: guard,
            log_dir: run_folder,
        })
    }

    fn parse_run_timestamp(dir_name: &str) -> Option<DateTime<Utc>> {
        let stamp = dir_name.strip_prefix(RUN_PREFIX)?;
        let naive = NaiveDateTime::parse_from_str(stamp, RUN_TIMESTAMP_FORMAT).ok()?;
        Some(Utc.from_utc_datetime(&naive))
    }

    /// Runs to delete: older than `retention_days`, then all but the newest `retention_runs`.
    pub(crate) fn runs_to_remove(
        mut runs: Vec<(PathBuf, DateTime<Utc>)>,
        now: DateTime<Utc>,
        retention_days: u64,
        retention_runs: usize,
    ) -> Vec<PathBuf> {
        let cutoff = now - chrono::Duration::days(retention_days as i64);
        runs.sort_by_key(|(_, dt)| *dt);

        let (expired, kept): (Vec<_>, Vec<_>) = runs.into_iter().partition(|(_, dt)| *dt < cutoff);
        let surplus = kept.len().saturating_sub(retention_runs);
        expired
            .into_iter()
            .chain(kept.into_iter().take(surplus))
            .map(|(path, _)| path)
            .collect()
    }

    fn cleanup_old_logs(base_log_dir: &Path, retention_days: u64, retention_runs: usize) -> Result<()> {
        if !base_log_dir.exists() {
            return Ok(());
        }

        let mut runs = Vec::new();
        for entry in std::fs::read_dir(base_log_dir)? {
            let path = entry?.path();
            if !path.is_dir() {
                continue;
            }
            let stamp = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(parse_run_timestamp);
            if let Some(dt) = stamp {
                runs.push((path, dt));
            }
        }

        for path in runs_to_remove(runs, Utc::now(), retention_days, retention_runs) {
            if let Err(e) = std::fs::remove_dir_all(&path) {
                eprintln!("Warning: Failed to remove old log directory {}: {}", path.display(), e);
            }
        }
        Ok(())
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn at(stamp: &str) -> DateTime<Utc> {
            parse_run_timestamp(&format!("run_{}", stamp)).unwrap()
        }

        #[test]
        fn test_parse_run_timestamp() {
            assert!(parse_run_timestamp("run_20250101_120000").is_some());
            assert!(parse_run_timestamp("run_garbage").is_none());
            assert!(parse_run_timestamp("other_20250101_120000").is_none());
        }

        #[test]
        fn test_retention_policy() {
            let now = at("20250201_000000");
            let runs = vec![
                (PathBuf::from("old"), at("20241201_000000")),
                (PathBuf::from("a"), at("20250125_000000")),
                (PathBuf::from("b"), at("20250126_000000")),
                (PathBuf::from("c"), at("20250127_000000")),
            ];
            let removed = runs_to_remove(runs, now, 30, 2);
            assert_eq!(removed, vec![PathBuf::from("old"), PathBuf::from("a")]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_level_rejected_before_install() {
        let flags = CrateDebugFlags::default();
        assert!(env_filter(&flags, "info").is_ok());
        assert!(env_filter(&flags, "mmprep=loud").is_err());
    }
}
