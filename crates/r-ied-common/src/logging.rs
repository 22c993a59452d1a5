//! ---
//! ied_section: "01-core-functionality"
//! ied_subsection: "module"
//! ied_type: "source"
//! ied_scope: "code"
//! ied_description: "Tracing bootstrap for the daemon."
//! ied_version: "v0.0.0-prealpha"
//! ied_owner: "tbd"
//! ---
use anyhow::Result;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::{self, time::UtcTime};
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

const LOG_ENV: &str = "R_IED_LOG";
const DEFAULT_DIRECTIVE: &str = "info";

/// Flush guards for the stdout and file writers; dropped only at exit.
static GUARDS: OnceCell<[WorkerGuard; 2]> = OnceCell::new();

/// Stdout format. The rolling file is always JSON.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    StructuredJson,
    #[default]
    Pretty,
}

/// Install the global subscriber: stdout in `config.format` plus
/// `<directory>/<service>.log.<date>`. Frame traffic logs at `trace`.
pub fn init_tracing(service: &str, config: &LoggingConfig) -> Result<()> {
    std::fs::create_dir_all(&config.directory)?;
    let appender = tracing_appender::rolling::daily(&config.directory, format!("{service}.log"));
    let (file_writer, file_guard) = tracing_appender::non_blocking(appender);
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    let _ = GUARDS.set([stdout_guard, file_guard]);

    let stdout = match config.format {
        LogFormat::StructuredJson => fmt::layer()
            .with_timer(UtcTime::rfc_3339())
            .json()
            .with_writer(stdout_writer)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_timer(UtcTime::rfc_3339())
            .with_writer(stdout_writer)
            .boxed(),
    };
    let file = fmt::layer()
        .with_timer(UtcTime::rfc_3339())
        .json()
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(filter(std::env::var(LOG_ENV).ok()))
        .with(stdout)
        .with(file)
        .try_init()
        .ok();

    info!(service, log_dir = %config.directory.display(), format = ?config.format, "tracing initialised");
    Ok(())
}

/// `R_IED_LOG` wins over `RUST_LOG`; a bad directive falls back to `info`.
fn filter(directive: Option<String>) -> EnvFilter {
    match directive {
        Some(directive) => EnvFilter::try_new(&directive).unwrap_or_else(|err| {
            eprintln!("invalid {LOG_ENV} directive {directive:?} ({err}); using {DEFAULT_DIRECTIVE}");
            EnvFilter::new(DEFAULT_DIRECTIVE)
        }),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_directive_overrides_defaults() {
        let filter = filter(Some("r_ied_model=trace".to_owned()));
        assert_eq!(filter.to_string(), "r_ied_model=trace");
    }

    #[test]
    fn log_format_reads_kebab_case() {
        #[derive(Deserialize)]
        struct Section {
            format: LogFormat,
        }
        let section: Section = toml::from_str(r#"format = "structured-json""#).unwrap();
        assert_eq!(section.format, LogFormat::StructuredJson);
        assert_eq!(LogFormat::default(), LogFormat::Pretty);
    }
}
