use std::time::Duration;

use jobrunner_core::{HaClient, Settings};

use crate::config::AppConfig;
use crate::pool::DispatchError;
use crate::secrets::SecretStore;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const TCP_KEEPALIVE: Duration = Duration::from_secs(60);

pub struct AppContext {
    pub settings: Settings,
    pub config: AppConfig,
    pub aggregators: HaClient,
    pub http: reqwest::Client,
    pub secret: String,
    pub metrics_labels: Vec<(String, String)>,
}

impl AppContext {
    pub async fn create(
        settings: Settings,
        config: AppConfig,
        secrets: &dyn SecretStore,
    ) -> Result<Self, DispatchError> {
        // Per-request timeouts vary with maxtime, so only the connect
        // phase is bounded here.
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .tcp_keepalive(Some(TCP_KEEPALIVE))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| {
                DispatchError::StartupError(format!("failed to create http client: {e}"))
            })?;

        let aggregators = HaClient::new("aggregators", &settings.aggregators)?;

        let secret = secrets.signing_secret(&settings.project).await?;

        let metrics_labels = vec![("runner_id".to_string(), config.runner_id.clone())];

        Ok(Self {
            settings,
            config,
            aggregators,
            http,
            secret,
            metrics_labels,
        })
    }
}
