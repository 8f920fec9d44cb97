//! Google Cloud Secret Manager, via its plain REST surface — the same
//! "native REST, no SDK" rationale the teacher applies to its own GCP
//! client to avoid a heavy transitive dependency tree.

use async_trait::async_trait;
use base64::Engine;
use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::provider::{GcpConfig, GcpCredentials, ProviderSyncer, SyncResult};
use crate::secret::SecretInput;

const API_BASE: &str = "https://secretmanager.googleapis.com/v1";

pub struct GcpSyncer {
    creds: GcpCredentials,
    config: GcpConfig,
    http: reqwest::Client,
}

impl std::fmt::Debug for GcpSyncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcpSyncer")
            .field("project", &self.config.project)
            .field("location", &self.config.location)
            .finish_non_exhaustive()
    }
}

impl GcpSyncer {
    pub fn new(creds: GcpCredentials, config: GcpConfig) -> Self {
        Self {
            creds,
            config,
            http: reqwest::Client::new(),
        }
    }

    fn secret_resource(&self, name: &str) -> String {
        format!("{API_BASE}/projects/{}/secrets/{name}", self.config.project)
    }

    async fn ensure_secret_exists(&self, name: &str) -> Result<(), AppError> {
        let resp = self
            .http
            .get(self.secret_resource(name))
            .bearer_auth(&self.creds.access_token)
            .send()
            .await
            .map_err(|e| AppError::ProviderTransport(e.to_string()))?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            self.create_secret(name).await
        } else if resp.status().is_success() {
            Ok(())
        } else {
            Err(AppError::ProviderTransport(format!(
                "gcp secret lookup failed: HTTP {}",
                resp.status()
            )))
        }
    }

    async fn create_secret(&self, name: &str) -> Result<(), AppError> {
        let body = serde_json::json!({ "replication": { "automatic": {} } });
        let resp = self
            .http
            .post(format!(
                "{API_BASE}/projects/{}/secrets",
                self.config.project
            ))
            .query(&[("secretId", name)])
            .bearer_auth(&self.creds.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ProviderTransport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(AppError::GcpInvalidLocation(format!(
                "could not create secret {name} in project {}: HTTP {}",
                self.config.project,
                resp.status()
            )));
        }
        Ok(())
    }

    async fn add_version(&self, name: &str, value: &str) -> Result<(), AppError> {
        let payload = base64::engine::general_purpose::STANDARD.encode(value.as_bytes());
        let body = serde_json::json!({ "payload": { "data": payload } });
        let resp = self
            .http
            .post(format!("{}:addVersion", self.secret_resource(name)))
            .bearer_auth(&self.creds.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ProviderTransport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(AppError::ProviderTransport(format!(
                "gcp addVersion failed for {name}: HTTP {}",
                resp.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ProviderSyncer for GcpSyncer {
    fn name(&self) -> &'static str {
        "gcp"
    }

    async fn validate_credentials(&self, _cancel: &CancellationToken) -> Result<(), AppError> {
        let resp = self
            .http
            .get(format!(
                "{API_BASE}/projects/{}/secrets",
                self.config.project
            ))
            .query(&[("pageSize", "1")])
            .bearer_auth(&self.creds.access_token)
            .send()
            .await
            .map_err(|e| AppError::ProviderTransport(e.to_string()))?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(AppError::GcpInvalidLocation(format!(
                "project {} not found",
                self.config.project
            )));
        }
        if !resp.status().is_success() {
            return Err(AppError::ProviderCredentialValidationFailed(format!(
                "gcp credential check failed: HTTP {}",
                resp.status()
            )));
        }
        Ok(())
    }

    async fn sync(
        &self,
        secrets: &[SecretInput],
        cancel: &CancellationToken,
    ) -> Result<Vec<SyncResult>, AppError> {
        let mut results = Vec::with_capacity(secrets.len());
        for secret in secrets {
            if cancel.is_cancelled() {
                results.push(SyncResult {
                    name: secret.name.clone(),
                    success: false,
                    error: Some("operation cancelled".into()),
                });
                continue;
            }
            let outcome = async {
                self.ensure_secret_exists(&secret.name).await?;
                self.add_version(&secret.name, &secret.value).await
            }
            .await;
            results.push(match outcome {
                Ok(()) => SyncResult {
                    name: secret.name.clone(),
                    success: true,
                    error: None,
                },
                Err(e) => SyncResult {
                    name: secret.name.clone(),
                    success: false,
                    error: Some(e.to_string()),
                },
            });
        }
        Ok(results)
    }
}
