mod config;
mod error;

use clap::Parser;
use config::{Cli, Commands, LogConfig, LogFormat};
use tracing_subscriber::EnvFilter;

mod cmd;

fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
    match log.format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().with_env_filter(filter).json().init(),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Serve(args) => match config::ServerConfig::load(&args.config) {
            Ok(config) => {
                init_tracing(&config.log);
                tracing::info!(config = %args.config, "loaded config");
                cmd::serve::run(config).await
            }
            Err(e) => Err(e),
        },
        Commands::Check(args) => cmd::check::run(&args),
    };
    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
