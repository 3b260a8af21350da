//! tracing-subscriber setup for the binary. Logs go to stderr so that
//! stdout stays clean for `--json-output`.

use std::str::FromStr;

use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const JSON_LOGS_ENV: &str = "APIGRID_JSON_LOGS";

/// `RUST_LOG` wins when set; otherwise `debug` with `--verbose`, else `warn`.
pub fn init(verbose: bool) -> Result<()> {
    let fallback = if verbose { "debug" } else { "warn" };
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| fallback.to_string());
    let json_logs = std::env::var(JSON_LOGS_ENV)
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    init_with_config(&log_level, json_logs)
}

pub fn init_with_config(log_level: &str, json_logs: bool) -> Result<()> {
    let env_filter = EnvFilter::from_str(log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    let registry = tracing_subscriber::registry().with(env_filter);

    if json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_level(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .compact()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_level(true),
            )
            .try_init()?;
    }

    tracing::debug!(log_level = %log_level, json_logs, "logging initialized");
    Ok(())
}
