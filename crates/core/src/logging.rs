//! Structured logging initialization. Library code never installs a logging
//! backend on its own — only the CLI entry point calls [`init`], and it is
//! safe to call more than once (tests that spin up multiple orchestrators
//! in one process would otherwise panic on the second subscriber install).

use tracing_subscriber::{fmt, EnvFilter};

/// Output formatter for structured logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(LogFormat::Text),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    }
}

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` always wins when set. Otherwise `verbose` selects `debug`
/// level for this crate and `info` elsewhere; absent both, `info` everywhere.
pub fn init(format: LogFormat, verbose: bool) {
    if tracing::dispatcher::has_been_set() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("info,omnidupe=debug")
        } else {
            EnvFilter::new("info")
        }
    });

    match format {
        LogFormat::Text => {
            fmt().with_env_filter(filter).with_target(false).compact().init();
        }
        LogFormat::Json => {
            fmt().with_env_filter(filter).json().init();
        }
    }
}
