use clap::Parser;
use keyspan_worker::worker::telemetry::init_telemetry;
use keyspan_worker::{CliArgs, DigestCracker, Outcome, Worker, WorkerConfig};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = WorkerConfig::try_from(args)?;

    init_telemetry()?;
    tracing::info!("Connecting to {}", config.server_addr);

    let mut worker = Worker::new(config, DigestCracker);
    let outcome = tokio::select! {
        outcome = worker.run() => outcome?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C signal");
            return Ok(());
        }
    };

    match outcome {
        Outcome::Found(password) => tracing::info!("Done, password: {password}"),
        Outcome::Dismissed => tracing::info!("Done, dismissed by the coordinator"),
        Outcome::Disconnected => tracing::warn!("Coordinator went away"),
    }
    Ok(())
}
