//! Azure Key Vault secrets, via its plain REST surface (PUT
//! `secrets/{name}`), the same pattern the teacher falls back to for the
//! enable/disable calls its `azure_security_keyvault_secrets` SDK doesn't
//! cover — here used for every operation since no SDK crate is in play.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::provider::{AzureConfig, AzureCredentials, ProviderSyncer, SyncResult};
use crate::secret::SecretInput;

const API_VERSION: &str = "7.4";

pub struct AzureSyncer {
    creds: AzureCredentials,
    config: AzureConfig,
    http: reqwest::Client,
}

impl std::fmt::Debug for AzureSyncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureSyncer")
            .field("vault_name", &self.config.vault_name)
            .finish_non_exhaustive()
    }
}

impl AzureSyncer {
    pub fn new(creds: AzureCredentials, config: AzureConfig) -> Self {
        Self {
            creds,
            config,
            http: reqwest::Client::new(),
        }
    }

    fn vault_url(&self) -> String {
        if self.config.vault_name.starts_with("https://") {
            self.config.vault_name.clone()
        } else {
            format!("https://{}.vault.azure.net", self.config.vault_name)
        }
    }

    async fn set_secret(&self, name: &str, value: &str) -> Result<(), AppError> {
        let url = format!(
            "{}/secrets/{name}?api-version={API_VERSION}",
            self.vault_url()
        );
        let body = serde_json::json!({ "value": value });
        let resp = self
            .http
            .put(url)
            .bearer_auth(&self.creds.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ProviderTransport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(AppError::ProviderTransport(format!(
                "azure set_secret failed for {name}: HTTP {}",
                resp.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ProviderSyncer for AzureSyncer {
    fn name(&self) -> &'static str {
        "azure"
    }

    async fn validate_credentials(&self, _cancel: &CancellationToken) -> Result<(), AppError> {
        let url = format!("{}/secrets?api-version={API_VERSION}&maxresults=1", self.vault_url());
        let resp = self
            .http
            .get(url)
            .bearer_auth(&self.creds.access_token)
            .send()
            .await
            .map_err(|e| AppError::ProviderTransport(e.to_string()))?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(AppError::AzureVaultNotFound(self.config.vault_name.clone()));
        }
        if !resp.status().is_success() {
            return Err(AppError::ProviderCredentialValidationFailed(format!(
                "azure credential check failed: HTTP {}",
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
            let outcome = self.set_secret(&secret.name, &secret.value).await;
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
