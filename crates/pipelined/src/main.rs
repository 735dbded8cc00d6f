//! pipelined: programmable forwarding pipeline daemon.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::{TcpListener, UdpSocket};

use pipeline_core::config::PipelinedConfig;
use pipeline_core::PipelineCounters;

mod control;
mod dispatch;
mod registry;
mod upcall;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = PipelinedConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = PipelinedConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        PipelinedConfig::default()
    });

    let registry = registry::builtin();
    let pipeline = config.pipeline.name.clone();
    tracing::info!(
        pipeline = %pipeline,
        available = ?registry.names().collect::<Vec<_>>(),
        "pipelined starting"
    );

    // The pipeline must come up before anything can reach it.
    let counters = Arc::new(PipelineCounters::default());
    let dispatch = dispatch::spawn(registry, pipeline.clone(), counters.clone())
        .await
        .with_context(|| format!("failed to initialise pipeline {pipeline}"))?;

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // ── Spawn tasks ──────────────────────────────────────────────────────────

    let control_listener = TcpListener::bind(&config.control.listen_addr)
        .await
        .with_context(|| format!("failed to bind control channel {}", config.control.listen_addr))?;
    tracing::info!(addr = %config.control.listen_addr, "control channel listening");
    let control_task = tokio::spawn(
        control::ControlListener::new(control_listener, dispatch.sender(), shutdown_tx.subscribe())
            .run(),
    );

    if config.upcall.enabled {
        let socket = UdpSocket::bind(&config.upcall.listen_addr)
            .await
            .with_context(|| format!("failed to bind upcall socket {}", config.upcall.listen_addr))?;
        tracing::info!(addr = %config.upcall.listen_addr, "packet upcall listening");
        let listener = upcall::UpcallListener::new(socket, dispatch.sender(), shutdown_tx.subscribe());
        tokio::spawn(async move {
            if let Err(e) = listener.run().await {
                tracing::error!(error = %e, "packet upcall failed");
            }
        });
    }

    // Status HTTP endpoint
    if config.api.port != 0 {
        let state = pipeline_api::ApiState::new(pipeline.clone(), counters.clone());
        let port = config.api.port;
        tokio::spawn(async move {
            if let Err(e) = pipeline_api::serve(state, port).await {
                tracing::error!(error = %e, "status server failed");
            }
        });
    }

    // ── Wait for exit ────────────────────────────────────────────────────────

    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::select! {
        _ = shutdown_rx.recv() => tracing::info!("shutting down"),
        r = control_task       => tracing::error!("control listener exited: {:?}", r),
    }

    let _ = shutdown_tx.send(());
    dispatch.shutdown().await;
    Ok(())
}
