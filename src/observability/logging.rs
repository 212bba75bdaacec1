//! Logging configuration.

use std::path::PathBuf;
use std::str::FromStr;

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

impl FromStr for LogFormat {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown log format: {other}"
            ))),
        }
    }
}

/// Logging configuration.
///
/// # Environment Variables
///
/// | Variable | Default | Description |
/// |----------|---------|-------------|
/// | `RUST_LOG` | `info` (`debug` for this crate with `--verbose`) | Filter directives |
/// | `WECHAT_DEDUP_LOG_FORMAT` | `pretty` | `pretty` or `json` |
/// | `WECHAT_DEDUP_LOG_FILE` | unset (stderr) | Append log lines to this file |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// Log file; stderr when `None`.
    pub file: Option<PathBuf>,
    /// `EnvFilter` directives.
    pub filter: String,
}

impl LoggingConfig {
    /// Reads the configuration from the process environment.
    #[must_use]
    pub fn from_env(verbose: bool) -> Self {
        Self::from_lookup(verbose, |key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`.
    #[must_use]
    pub fn from_lookup(verbose: bool, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let filter = lookup("RUST_LOG")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| {
                if verbose {
                    "info,wechat_dedup=debug".to_string()
                } else {
                    "info".to_string()
                }
            });
        let format = lookup("WECHAT_DEDUP_LOG_FORMAT")
            .and_then(|v| v.parse().ok())
            .unwrap_or_default();
        let file = lookup("WECHAT_DEDUP_LOG_FILE")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        Self {
            format,
            file,
            filter,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            file: None,
            filter: "info".to_string(),
        }
    }
}
