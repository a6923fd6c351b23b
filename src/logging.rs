use crate::settings::Settings;
use anyhow::{Context, Result};
use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter for the given debug flag. `RUST_LOG`, when set, wins.
pub fn env_filter(debug_mode: bool) -> EnvFilter {
    let level = if debug_mode { "debug" } else { "info" };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Setup logging with a daily rotating file appender and optional console
/// output.
///
/// # Returns
/// A guard that must be held for the duration of the program to keep logging active
pub fn setup_logging(settings: &Settings) -> Result<WorkerGuard> {
    if !settings.log_dir.exists() {
        fs::create_dir_all(&settings.log_dir)
            .with_context(|| format!("Failed to create log directory: {}", settings.log_dir))?;
    }

    let file_appender = rolling::daily(&settings.log_dir, &settings.log_prefix);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false) // No ANSI codes in log files
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    // stdout carries command output, so console logs go to stderr
    let console_layer = settings.console_log.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(false)
    });

    tracing_subscriber::registry()
        .with(env_filter(settings.debug))
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    tracing::info!(
        "Logging initialized: dir={}, prefix={}, debug={}, console={}",
        settings.log_dir,
        settings.log_prefix,
        settings.debug,
        settings.console_log
    );

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_setup_logging_installs_once() {
        let temp_dir = TempDir::new().unwrap();
        let settings = Settings {
            log_dir: Utf8PathBuf::try_from(temp_dir.path().join("logs")).unwrap(),
            ..Settings::default()
        };

        // Only this test installs the global subscriber in this binary
        let guard = setup_logging(&settings);
        assert!(guard.is_ok());
        assert!(settings.log_dir.exists());

        let again = setup_logging(&settings);
        assert!(again.is_err());
    }
}
