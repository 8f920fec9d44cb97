//! GitHub Actions repository/environment secrets.
//!
//! GitHub requires each secret value to be sealed with the target
//! repository/environment's libsodium public key (sealed-box, spec §4.6)
//! before upload; `crypto_box` speaks the same NaCl sealed-box construction
//! GitHub's API expects.

use async_trait::async_trait;
use base64::Engine;
use crypto_box::{aead::OsRng, PublicKey};
use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::provider::{GitHubConfig, GitHubCredentials, ProviderSyncer, SyncResult};
use crate::secret::SecretInput;

const API_BASE: &str = "https://api.github.com";

pub struct GitHubSyncer {
    creds: GitHubCredentials,
    config: GitHubConfig,
    http: reqwest::Client,
}

impl std::fmt::Debug for GitHubSyncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubSyncer")
            .field("owner", &self.config.owner)
            .field("repo", &self.config.repo)
            .field("environment", &self.config.environment)
            .finish_non_exhaustive()
    }
}

#[derive(serde::Deserialize)]
struct PublicKeyResponse {
    key: String,
    key_id: String,
}

impl GitHubSyncer {
    pub fn new(creds: GitHubCredentials, config: GitHubConfig) -> Self {
        Self {
            creds,
            config,
            http: reqwest::Client::new(),
        }
    }

    fn environment_base(&self) -> String {
        format!(
            "{API_BASE}/repos/{}/{}/environments/{}/secrets",
            self.config.owner, self.config.repo, self.config.environment
        )
    }

    async fn fetch_public_key(&self) -> Result<PublicKeyResponse, AppError> {
        let resp = self
            .http
            .get(format!("{}/public-key", self.environment_base()))
            .bearer_auth(&self.creds.token)
            .header("User-Agent", "kavach")
            .send()
            .await
            .map_err(|e| AppError::ProviderTransport(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(AppError::GitHubEnvironmentNotFound(format!(
                "{}/{} environment {}",
                self.config.owner, self.config.repo, self.config.environment
            )));
        }
        if !resp.status().is_success() {
            return Err(AppError::ProviderTransport(format!(
                "github public key fetch failed: HTTP {}",
                resp.status()
            )));
        }
        resp.json::<PublicKeyResponse>()
            .await
            .map_err(|e| AppError::ProviderTransport(e.to_string()))
    }

    fn seal(public_key_b64: &str, plaintext: &str) -> Result<String, AppError> {
        let key_bytes = base64::engine::general_purpose::STANDARD
            .decode(public_key_b64)
            .map_err(|e| AppError::ProviderTransport(format!("invalid github public key: {e}")))?;
        let key_array: [u8; 32] = key_bytes
            .try_into()
            .map_err(|_| AppError::ProviderTransport("github public key is not 32 bytes".into()))?;
        let public_key = PublicKey::from(key_array);
        let sealed = public_key
            .seal(&mut OsRng, plaintext.as_bytes())
            .map_err(|_| AppError::Encryption)?;
        Ok(base64::engine::general_purpose::STANDARD.encode(sealed))
    }
}

#[async_trait]
impl ProviderSyncer for GitHubSyncer {
    fn name(&self) -> &'static str {
        "github"
    }

    async fn validate_credentials(&self, _cancel: &CancellationToken) -> Result<(), AppError> {
        self.fetch_public_key().await.map(|_| ())
    }

    async fn sync(
        &self,
        secrets: &[SecretInput],
        cancel: &CancellationToken,
    ) -> Result<Vec<SyncResult>, AppError> {
        let key = self.fetch_public_key().await?;
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
            let outcome = self.put_secret(secret, &key).await;
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

impl GitHubSyncer {
    async fn put_secret(
        &self,
        secret: &SecretInput,
        key: &PublicKeyResponse,
    ) -> Result<(), AppError> {
        let encrypted_value = Self::seal(&key.key, &secret.value)?;
        let body = serde_json::json!({
            "encrypted_value": encrypted_value,
            "key_id": key.key_id,
        });
        let resp = self
            .http
            .put(format!("{}/{}", self.environment_base(), secret.name))
            .bearer_auth(&self.creds.token)
            .header("User-Agent", "kavach")
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ProviderTransport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(AppError::ProviderTransport(format!(
                "github secret upload failed for {}: HTTP {}",
                secret.name,
                resp.status()
            )));
        }
        Ok(())
    }
}
