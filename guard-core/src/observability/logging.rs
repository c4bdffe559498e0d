use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, fmt};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

static LOG_INIT: OnceLock<()> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Install the global subscriber. `RUST_LOG` overrides the `info` default.
///
/// Only the first call has an effect; a subscriber installed elsewhere
/// (for example by a host application) is left in place.
pub fn setup_logging(format: LogFormat) {
    LOG_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let registry = tracing_subscriber::registry().with(filter);

        let result = match format {
            LogFormat::Json => registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_file(true)
                        .with_line_number(true)
                        .with_writer(std::io::stderr),
                )
                .try_init(),
            LogFormat::Pretty => registry
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_file(true)
                        .with_line_number(true)
                        .with_writer(std::io::stderr),
                )
                .try_init(),
        };

        if let Err(err) = result {
            tracing::debug!(error = %err, "global subscriber already installed");
        }
    });
}

/// Emit a verdict event under the `audit` target.
#[macro_export]
macro_rules! log_audit {
    ($level:ident, $mode:expr, $($arg:tt)*) => {
        tracing::$level!(
            target: "audit",
            mode = $mode,
            $($arg)*
        );
    };
}
