use axum::{routing::get, Router};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Liveness surface shared by both daemons: a name route for humans and
/// static readiness/liveness probes. The daemons are single control
/// loops, so "the process is up" is the health signal.
pub fn liveness_router(banner: &'static str) -> Router {
    Router::new()
        .route("/", get(move || std::future::ready(banner)))
        .route("/_readiness", get(|| std::future::ready("ok")))
        .route("/_liveness", get(|| std::future::ready("ok")))
}

/// Install the prometheus recorder and expose it at /metrics. Call once
/// per process, after the router is otherwise built.
pub fn setup_metrics_routes(router: Router) -> Router {
    let handle = setup_metrics_recorder();
    router.route(
        "/metrics",
        get(move || std::future::ready(handle.render())),
    )
}

fn setup_metrics_recorder() -> PrometheusHandle {
    const BUCKETS: &[f64] = &[
        1.0, 5.0, 10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2000.0, 5000.0, 10000.0,
    ];

    PrometheusBuilder::new()
        .set_buckets(BUCKETS)
        .unwrap()
        .install_recorder()
        .unwrap()
}

/// Bind and serve a router until the process exits.
pub async fn serve(router: Router, bind: String) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(bind).await?;

    axum::serve(listener, router).await?;

    Ok(())
}
