use ingest_api::SinkError;
use ingest_engine::{EngineError, ShutdownError};

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("config ({context}): {detail}")]
    Config { context: &'static str, detail: String },

    #[error("{0}")]
    Engine(#[from] EngineError),

    #[error("sink: {0}")]
    Sink(#[from] SinkError),

    #[error("api: {0}")]
    Api(String),

    #[error("shutdown: {0}")]
    Shutdown(#[from] ShutdownError),

    #[error("signal: {0}")]
    Signal(#[from] std::io::Error),
}
