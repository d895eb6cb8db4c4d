//! Application entry points: the HTTP server and the worker mode.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use fibserv_core::algorithms::{binet, doubling, iterative, naive};
use fibserv_core::Algorithm;
use fibserv_orchestration::Engine;

use crate::config::AppConfig;
use crate::routes::router;

/// Run the HTTP server until ctrl-c.
pub async fn serve(config: &AppConfig) -> Result<()> {
    let engine = Arc::new(Engine::new(config.engine_config()).context("starting engine")?);
    let app = router(Arc::clone(&engine));

    let addr = format!("{}:{}", config.bind, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "fibserv listening");

    let shutdown_engine = Arc::clone(&engine);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("ctrl-c received; shutting down");
            shutdown_engine.shutdown();
        })
        .await?;

    engine.shutdown();
    Ok(())
}

/// Entry point for `worker <algorithm> <n>`: compute one term in this
/// process image, print it to stdout, and exit. Errors go to stderr via
/// the nonzero exit path. Process-isolated algorithms re-invoke the
/// server binary here so their failure or forced kill never touches the
/// parent's scheduler.
pub fn worker_main(algorithm: &str, n: u64) -> Result<()> {
    let algorithm = Algorithm::from_name(algorithm)
        .ok_or_else(|| anyhow::anyhow!("unknown worker algorithm: {algorithm}"))?;
    let term = match algorithm {
        Algorithm::Iterative => iterative::nth(n),
        Algorithm::Doubling => doubling::nth(n),
        Algorithm::Naive => naive::nth(n),
        Algorithm::Binet | Algorithm::BinetProcess => binet::nth(n)?,
        Algorithm::Memoized => {
            anyhow::bail!("memoized computes over shared tasks and cannot run in a worker")
        }
    };
    println!("{term}");
    Ok(())
}
