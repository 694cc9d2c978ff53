//! Tracing/logging initialization.
//!
//! `RUST_LOG` selects the filter (default `info`); `LOG_FORMAT` selects
//! `json` (default) or `pretty` output.

use serde::Deserialize;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LogSettings {
    #[serde(default)]
    pub log_format: LogFormat,
}

impl LogSettings {
    /// Read `LOG_FORMAT`; an unreadable value falls back to JSON.
    pub fn from_env() -> Self {
        match envy::from_env::<LogSettings>() {
            Ok(settings) => settings,
            Err(err) => {
                eprintln!("ignoring invalid LOG_FORMAT ({err}); using json");
                Self::default()
            }
        }
    }
}

/// Initialize tracing/logging for the process from the environment.
pub fn init() {
    init_with(&LogSettings::from_env());
}

/// Initialize with explicit settings. Later calls are no-ops.
pub fn init_with(settings: &LogSettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::SystemTime);

    let _ = match settings.log_format {
        LogFormat::Json => builder
            .json()
            .with_current_span(true)
            .with_target(false)
            .try_init(),
        LogFormat::Pretty => builder.pretty().with_target(true).try_init(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_parses_from_vars() {
        let settings: LogSettings =
            envy::from_iter([("LOG_FORMAT".to_string(), "pretty".to_string())]).unwrap();
        assert_eq!(settings.log_format, LogFormat::Pretty);

        let settings: LogSettings = envy::from_iter(Vec::<(String, String)>::new()).unwrap();
        assert_eq!(settings.log_format, LogFormat::Json);
    }

    #[test]
    fn init_is_idempotent() {
        init_with(&LogSettings::default());
        init_with(&LogSettings {
            log_format: LogFormat::Pretty,
        });
    }
}
