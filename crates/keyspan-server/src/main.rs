use clap::Parser;
use keyspan_server::server::telemetry::init_telemetry;
use keyspan_server::{CliArgs, Coordinator, CoordinatorHandle, ServerConfig, TerminationReason};
use tokio::signal;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    let providers = init_telemetry()?;
    log_startup_info(&config);

    let coordinator = Coordinator::bind(config).await?;
    tokio::spawn(shutdown_signal(coordinator.handle()));

    let report = coordinator.run().await;
    providers.shutdown();

    let report = report?;
    report.log();
    if let Some(TerminationReason::Fatal(reason)) = report.reason {
        anyhow::bail!(reason);
    }
    Ok(())
}

fn log_startup_info(config: &ServerConfig) {
    if cfg!(debug_assertions) {
        tracing::info!(
            "Starting coordinator on {} with full config: {:#?}",
            config.listen_addr,
            config
        );
    } else {
        tracing::info!(
            "Starting coordinator on {} for {} ({} symbols, length {})",
            config.listen_addr,
            config.target.label(),
            config.alphabet.len(),
            config.length
        );
    }
}

async fn shutdown_signal(handle: CoordinatorHandle) {
    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
    }

    handle.terminate(TerminationReason::Signal);
}
