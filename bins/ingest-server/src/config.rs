use clap::{Args, Parser, Subcommand};
use serde::Deserialize;

use ingest_api_server::IngressConfig;
use ingest_engine::EngineConfig;
use ingest_storage_file::FileSinkConfig;
use ingest_storage_memory::MemorySinkConfig;

use crate::error::ServerError;

#[derive(Parser)]
#[command(name = "ingest-server", about = "Priority-buffered sensor data ingestion server")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the server until Ctrl+C / SIGTERM.
    Serve(ServeArgs),
    /// Load and validate the configuration, print the effective settings.
    Check(ServeArgs),
}

#[derive(Args, Clone, Debug)]
pub struct ServeArgs {
    /// Path to TOML configuration file.
    #[arg(long, default_value = "config.toml", env = "INGEST_CONFIG")]
    pub config: String,
}

// ---- TOML Config ----

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub api_port: u16,
    pub log: LogConfig,
    pub engine: EngineConfig,
    pub sink: SinkConfig,
    pub ingress: IngressConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_port: 8080,
            log: LogConfig::default(),
            engine: EngineConfig::default(),
            sink: SinkConfig::default(),
            ingress: IngressConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directive, used when `RUST_LOG` is unset.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SinkConfig {
    Memory(MemorySinkConfig),
    File(FileSinkConfig),
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig::Memory(MemorySinkConfig::default())
    }
}

impl SinkConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            SinkConfig::Memory(_) => "memory",
            SinkConfig::File(_) => "file",
        }
    }
}

impl ServerConfig {
    pub fn load(path: &str) -> Result<Self, ServerError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config { context: "read", detail: format!("'{path}': {e}") })?;
        Self::parse(&content)
            .map_err(|e| match e {
                ServerError::Config { context, detail } => ServerError::Config {
                    context,
                    detail: format!("'{path}': {detail}"),
                },
                other => other,
            })
    }

    pub fn parse(toml_str: &str) -> Result<Self, ServerError> {
        let config: Self = toml::from_str(toml_str)
            .map_err(|e| ServerError::Config { context: "parse", detail: e.to_string() })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ServerError> {
        self.engine
            .validate()
            .map_err(|e| ServerError::Config { context: "engine", detail: e.to_string() })?;
        if self.ingress.max_batch_records == 0 {
            return Err(ServerError::Config {
                context: "ingress",
                detail: "max_batch_records must be positive".into(),
            });
        }
        if !self.ingress.alert_threshold.is_finite() {
            return Err(ServerError::Config {
                context: "ingress",
                detail: "alert_threshold must be finite".into(),
            });
        }
        Ok(())
    }
}
