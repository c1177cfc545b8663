use std::time::Duration;

use clap::Parser;
use envconfig::Envconfig;
use jobrunner_chron::chron::Chron;
use jobrunner_chron::config::{load_settings, Cli, Config};
use jobrunner_core::serve::{liveness_router, serve, setup_metrics_routes};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

async fn chron_loop(chron: Chron, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        if let Err(e) = chron.run_once().await {
            error!("reclamation cycle failed: {}", e);
        }
    }
}

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

    info!("starting chron with ID {:?}", config.chron_id);

    let bind = format!("{}:{}", config.host, config.port);
    let interval_secs = config.cycle_interval_secs;

    let chron = Chron::new(settings, config)?;

    let app = setup_metrics_routes(liveness_router("jobrunner chron"));
    let http_server = tokio::spawn(serve(app, bind));

    let chron_loop = tokio::spawn(chron_loop(chron, interval_secs));

    tokio::select! {
        _ = wait_for_shutdown_signal() => {
            info!("shutting down");
        }
        res = chron_loop => {
            error!("chron loop exited");
            if let Err(e) = res {
                error!("chron failed with: {}", e);
            }
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
