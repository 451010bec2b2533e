#![forbid(unsafe_code)]

//! Global `tracing` subscriber setup.
//!
//! Library crates only emit events through the `tracing` macros. Binaries and
//! tests that want to see them call [`init`] once:
//!
//! ```no_run
//! wisp::logging::init(wisp::logging::LogConfig::from_env()).expect("logging");
//! ```
//!
//! The filter directive is read from `WISP_LOG`, then `RUST_LOG`, then falls
//! back to `info`. Directive syntax is the `EnvFilter` one, e.g.
//! `wisp_server=debug,info`.

use std::fmt;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Environment variable holding the filter directive.
pub const LOG_ENV: &str = "WISP_LOG";

const FALLBACK_ENV: &str = "RUST_LOG";
const DEFAULT_FILTER: &str = "info";

/// Subscriber settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// `EnvFilter` directive.
    pub filter: String,
    /// One JSON object per line. Needs the `logging-json` feature.
    pub json: bool,
    /// Include the emitting thread's name.
    pub thread_names: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_owned(),
            json: false,
            thread_names: true,
        }
    }
}

impl LogConfig {
    /// Defaults with the filter taken from the environment.
    pub fn from_env() -> Self {
        Self {
            filter: filter_from(
                std::env::var(LOG_ENV).ok(),
                std::env::var(FALLBACK_ENV).ok(),
            ),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    #[must_use]
    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    #[must_use]
    pub fn with_thread_names(mut self, thread_names: bool) -> Self {
        self.thread_names = thread_names;
        self
    }
}

fn filter_from(primary: Option<String>, fallback: Option<String>) -> String {
    primary
        .filter(|s| !s.trim().is_empty())
        .or_else(|| fallback.filter(|s| !s.trim().is_empty()))
        .unwrap_or_else(|| DEFAULT_FILTER.to_owned())
}

/// Errors from [`init`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoggingError {
    /// The filter directive does not parse.
    InvalidFilter(String),
    /// JSON output was requested without the `logging-json` feature.
    JsonUnavailable,
    /// A global tracing subscriber is already installed.
    SubscriberAlreadySet,
}

impl fmt::Display for LoggingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidFilter(msg) => write!(f, "invalid log filter: {msg}"),
            Self::JsonUnavailable => {
                write!(f, "JSON logs need the `logging-json` feature")
            }
            Self::SubscriberAlreadySet => {
                write!(f, "a global tracing subscriber is already set")
            }
        }
    }
}

impl std::error::Error for LoggingError {}

fn build_filter(config: &LogConfig) -> Result<EnvFilter, LoggingError> {
    EnvFilter::try_new(&config.filter).map_err(|err| LoggingError::InvalidFilter(err.to_string()))
}

/// Install the global subscriber.
///
/// Fails with [`LoggingError::SubscriberAlreadySet`] if one is already
/// installed, so it is safe to call from every test.
pub fn init(config: LogConfig) -> Result<(), LoggingError> {
    let filter = build_filter(&config)?;

    #[cfg(feature = "logging-json")]
    let (plain, json) = if config.json {
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_thread_names(config.thread_names);
        (None, Some(layer))
    } else {
        let layer = tracing_subscriber::fmt::layer().with_thread_names(config.thread_names);
        (Some(layer), None)
    };

    #[cfg(not(feature = "logging-json"))]
    let (plain, json) = {
        if config.json {
            return Err(LoggingError::JsonUnavailable);
        }
        let layer = tracing_subscriber::fmt::layer().with_thread_names(config.thread_names);
        (Some(layer), None::<tracing_subscriber::layer::Identity>)
    };

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(plain)
        .with(json);
    if subscriber.try_init().is_err() {
        return Err(LoggingError::SubscriberAlreadySet);
    }
    tracing::debug!(filter = %config.filter, json = config.json, "logging initialised");
    Ok(())
}
