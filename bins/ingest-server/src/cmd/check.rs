use ingest_api::Lane;

use crate::config::{ServeArgs, ServerConfig, SinkConfig};
use crate::error::ServerError;

/// Validate the configuration file and print what the server would run with.
pub fn run(args: &ServeArgs) -> Result<(), ServerError> {
    let config = ServerConfig::load(&args.config)?;

    println!("config:       {}", args.config);
    println!("api_port:     {}", config.api_port);
    println!("log:          level={} format={:?}", config.log.level, config.log.format);
    for lane in Lane::ALL {
        let lane_cfg = config.engine.lanes.get(lane);
        println!(
            "lane {:<7} capacity={} flush_interval={}ms channel={}",
            lane.as_str(),
            lane_cfg.capacity,
            lane_cfg.flush_interval_ms,
            config.engine.channel_depth(lane),
        );
    }
    println!(
        "engine:       admission_timeout={}ms shutdown_timeout={}ms",
        config.engine.admission_timeout_ms, config.engine.shutdown_timeout_ms
    );
    match &config.sink {
        SinkConfig::Memory(mem) => println!("sink:         memory max_batches={}", mem.max_batches),
        SinkConfig::File(file) => println!(
            "sink:         file data_dir={} fsync={}",
            file.data_dir.display(),
            file.fsync
        ),
    }
    println!(
        "ingress:      max_batch_records={} alert_threshold={}",
        config.ingress.max_batch_records, config.ingress.alert_threshold
    );
    Ok(())
}
