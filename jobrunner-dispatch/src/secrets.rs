use async_trait::async_trait;

use crate::pool::DispatchError;

/// Where the request-signing secret comes from. The real store is
/// external to this service; the trait is the seam so tests (and local
/// runs) can plug in a fixed value.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn signing_secret(&self, project: &str) -> Result<String, DispatchError>;
}

/// Resolves the secret material the deployment injects into the
/// environment, keyed by project id (`JOBRUNNER_SECRET_<PROJECT>`), with
/// `JOBRUNNER_SECRET` as the unscoped fallback.
pub struct EnvSecretStore;

fn project_var(project: &str) -> String {
    let suffix: String = project
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("JOBRUNNER_SECRET_{suffix}")
}

#[async_trait]
impl SecretStore for EnvSecretStore {
    async fn signing_secret(&self, project: &str) -> Result<String, DispatchError> {
        std::env::var(project_var(project))
            .or_else(|_| std::env::var("JOBRUNNER_SECRET"))
            .map_err(|_| {
                DispatchError::StartupError(format!(
                    "no signing secret found for project {project:?}"
                ))
            })
    }
}

/// Test double with a fixed secret.
pub struct FixedSecretStore(pub String);

#[async_trait]
impl SecretStore for FixedSecretStore {
    async fn signing_secret(&self, _project: &str) -> Result<String, DispatchError> {
        Ok(self.0.clone())
    }
}
