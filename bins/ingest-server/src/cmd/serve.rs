use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use ingest_api::Sink;
use ingest_api_server::AppState;
use ingest_engine::{DeviceStatusBoard, Engine, EngineHooks, LogFailures};
use ingest_storage_file::FileSink;
use ingest_storage_memory::MemorySink;

use crate::config::{ServerConfig, SinkConfig};
use crate::error::ServerError;

async fn build_sink(config: &SinkConfig) -> Result<Arc<dyn Sink>, ServerError> {
    let sink: Arc<dyn Sink> = match config {
        SinkConfig::Memory(mem) => Arc::new(MemorySink::new(mem.clone())),
        SinkConfig::File(file) => Arc::new(FileSink::open(file.clone()).await?),
    };
    Ok(sink)
}

/// Ctrl+C, or SIGTERM on unix.
async fn wait_for_signal() -> Result<(), std::io::Error> {
    #[cfg(unix)]
    {
        let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res,
            _ = term.recv() => Ok(()),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}

pub async fn run(config: ServerConfig) -> Result<(), ServerError> {
    tracing::info!("ingest-server starting");

    // --- Sink + engine ---
    let sink = build_sink(&config.sink).await?;
    tracing::info!(sink = %config.sink.kind(), "sink ready");

    let board = Arc::new(DeviceStatusBoard::new(config.ingress.alert_threshold));
    let hooks = EngineHooks {
        failures: Arc::new(LogFailures),
        observer: Some(board.clone()),
    };
    let shutdown_timeout = config.engine.shutdown_timeout();
    let engine = Arc::new(Engine::start(config.engine, sink, hooks)?);

    // --- API server ---
    let token = CancellationToken::new();
    let state = AppState::new(engine.clone(), board, config.ingress);
    let api_port = config.api_port;
    let api_token = token.clone();
    let mut api_handle =
        tokio::spawn(async move { ingest_api_server::run(api_port, state, api_token).await });

    tracing::info!(port = api_port, "server ready");

    // --- Wait for a signal, or for the API to die on its own ---
    let api_failure = tokio::select! {
        res = wait_for_signal() => {
            res?;
            tracing::info!("shutting down...");
            None
        }
        joined = &mut api_handle => Some(match joined {
            Ok(Ok(())) => "api server exited unexpectedly".to_string(),
            Ok(Err(e)) => e,
            Err(e) => format!("api task: {e}"),
        }),
    };

    // Stop taking requests first, then drain the lanes.
    token.cancel();
    if api_failure.is_none() {
        match api_handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "api server error"),
            Err(e) => tracing::error!(error = %e, "api task failed"),
        }
    }

    let result = engine.shutdown(shutdown_timeout).await;
    for snap in engine.snapshot() {
        tracing::info!(
            lane = %snap.lane,
            admitted = snap.admitted,
            committed = snap.records_committed,
            failed = snap.records_failed,
            dropped = snap.records_dropped,
            "lane totals"
        );
    }

    if let Some(e) = api_failure {
        tracing::error!(error = %e, "api server stopped");
        result?;
        return Err(ServerError::Api(e));
    }
    result?;

    tracing::info!("shutdown complete");
    Ok(())
}
