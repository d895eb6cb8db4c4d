//! fibserv — Fibonacci terms over HTTP with cooperative scheduling.

use anyhow::{Context, Result};

use fibserv_server::config::{AppConfig, Mode};

fn main() -> Result<()> {
    let config = AppConfig::parse();

    // Worker mode owns stdout for its result; skip logging setup.
    if let Some(Mode::Worker { algorithm, n }) = &config.mode {
        return fibserv_server::worker_main(algorithm, *n);
    }

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    if let Some(path) = &config.pid_file {
        std::fs::write(path, std::process::id().to_string())
            .with_context(|| format!("writing pid file {}", path.display()))?;
    }

    let runtime = tokio::runtime::Runtime::new().context("starting runtime")?;
    runtime.block_on(fibserv_server::serve(&config))
}
