use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use envconfig::Envconfig;
use jobrunner_core::serve::{liveness_router, serve, setup_metrics_routes};
use jobrunner_dispatch::config::{load_settings, Cli, Config};
use jobrunner_dispatch::context::AppContext;
use jobrunner_dispatch::runner::RunnerDaemon;
use jobrunner_dispatch::secrets::EnvSecretStore;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

async fn wait_for_shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sighup = signal(SignalKind::hangup()).expect("failed to install SIGHUP handler");

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT"),
        _ = sigterm.recv() => info!("received SIGTERM"),
        _ = sighup.recv() => info!("received SIGHUP"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .init();

    let config = Config::init_from_env()?.to_app_config();
    let settings = load_settings(&cli.config_file)?;

    info!("starting runner with ID {:?}", config.runner_id);

    let bind = format!("{}:{}", config.host, config.port);

    let ctx = Arc::new(AppContext::create(settings, config, &EnvSecretStore).await?);

    let app = setup_metrics_routes(liveness_router("jobrunner dispatch"));
    let http_server = tokio::spawn(serve(app, bind));

    let shutdown = Arc::new(AtomicBool::new(false));
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            wait_for_shutdown_signal().await;
            shutdown.store(true, Ordering::SeqCst);
        }
    });

    let mut daemon = RunnerDaemon::new(ctx);

    tokio::select! {
        _ = daemon.run(shutdown) => {
            info!("runner loop drained");
        }
        res = http_server => {
            error!("http server exited");
            if let Err(e) = res {
                error!("server failed with: {}", e);
            }
        }
    }

    info!("exiting");
    Ok(())
}
