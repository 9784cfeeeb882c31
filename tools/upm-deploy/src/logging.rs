use std::{
    env,
    fs::{self, OpenOptions},
    path::Path,
    sync::Arc,
};

use tracing_subscriber::{fmt::Layer, prelude::*, EnvFilter};

/// Initializes logging to both the console and an append-only log file.
///
/// - `rust_log`: used as the filter if `RUST_LOG` is not set, e.g. `info` or
///   `warn,upm_deploy=debug`.
/// - Console output is JSON when `JSON_LOGS` is set, the log file is always
///   plain timestamped text without colours.
pub fn init_tracing(rust_log: &str, log_file: &Path) -> anyhow::Result<()> {
    let filter = || {
        env::var("RUST_LOG")
            .ok()
            .and_then(|directive| EnvFilter::try_new(directive).ok())
            .unwrap_or_else(|| EnvFilter::new(rust_log))
    };

    if let Some(parent) = log_file.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)?;

    let file_layer = Layer::new()
        .with_writer(Arc::new(file))
        .with_ansi(false)
        .with_target(true)
        .with_filter(filter());

    let json_logs = env::var_os("JSON_LOGS").is_some();

    // Conditionally output console logs as JSON
    if json_logs {
        let console_layer = Layer::new()
            .with_writer(std::io::stdout)
            .with_target(true)
            .json()
            .flatten_event(true)
            .with_span_list(false)
            .with_filter(filter());

        tracing_subscriber::registry()
            .with(file_layer)
            .with(console_layer)
            .init();
    } else {
        let console_layer = Layer::new()
            .with_writer(std::io::stdout)
            .with_target(false)
            .with_filter(filter());

        tracing_subscriber::registry()
            .with(file_layer)
            .with(console_layer)
            .init();
    }

    tracing::debug!("Logging to {}", log_file.display());
    Ok(())
}
