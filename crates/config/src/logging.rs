//! Logging configuration
//!
//! Controls the publisher's own diagnostic output. The base level applies to
//! every target; `[log.targets]` raises or lowers individual modules, e.g.
//! per-frame fan-out traces from the pipeline only.

use std::collections::BTreeMap;

use serde::Deserialize;

/// Log level
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Per-frame fan-out detail
    Trace,
    /// Per-request events
    Debug,
    /// Lifecycle events (default)
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Console,
    /// One JSON object per event
    Json,
}

/// `[log]` section
///
/// ```toml
/// [log]
/// level = "info"
/// format = "json"
///
/// [log.targets]
/// "tsp_publisher::pipeline" = "trace"
/// "tsp::callbacks" = "warn"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    /// Per-target overrides of `level`
    pub targets: BTreeMap<String, LogLevel>,
}

impl LogConfig {
    /// Filter directives in `tracing_subscriber::EnvFilter` syntax
    ///
    /// `base` replaces the configured base level when given (a CLI override);
    /// target overrides still apply.
    pub fn directives(&self, base: Option<&str>) -> String {
        let mut directives = base.unwrap_or(self.level.as_str()).to_string();
        for (target, level) in &self.targets {
            directives.push(',');
            directives.push_str(target);
            directives.push('=');
            directives.push_str(level.as_str());
        }
        directives
    }
}
