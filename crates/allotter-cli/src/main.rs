#![doc = include_str!("../README.md")]

mod commands;
mod config;
mod telemetry;

use allotter::{Engine, Service};
use clap::Parser;
use config::{AppConfig, CliArgs};
use telemetry::init_telemetry;
use tokio::signal;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = AppConfig::try_from(args)?;

    let providers = init_telemetry()?;
    log_startup_info(&config);

    let service = Service::new(Engine::open(&config.data_dir), &config.service);

    let result = tokio::select! {
        result = commands::run(&config, &service) => result,
        () = shutdown_signal() => {
            #[cfg(feature = "tracing")]
            tracing::info!("Interrupted, draining in-flight work");
            Err(anyhow::anyhow!("interrupted"))
        }
    };

    // Queued work still completes; anything not yet accepted is refused.
    if let Err(_e) = service.shutdown().await {
        #[cfg(feature = "tracing")]
        tracing::error!("Error during service shutdown: {:?}", _e);
    }
    providers.shutdown();
    result
}

fn log_startup_info(_config: &AppConfig) {
    if cfg!(debug_assertions) {
        #[cfg(feature = "tracing")]
        tracing::debug!("Starting with full config: {:#?}", _config);
    } else {
        #[cfg(feature = "tracing")]
        tracing::debug!(
            "Starting on {} with {} workers",
            _config.data_dir.display(),
            _config.service.num_workers
        );
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => {
            #[cfg(feature = "tracing")]
            tracing::info!("Received Ctrl+C signal");
        },
        () = terminate => {
            #[cfg(feature = "tracing")]
            tracing::info!("Received SIGTERM signal");
        },
    }
}
