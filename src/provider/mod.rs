//! C7 — Provider-sync layer.
//!
//! Capability-style polymorphism over the provider variant set
//! {github, gcp, azure}, exactly as the teacher does for its own
//! multi-cloud secret-store targets: one trait, one factory, one
//! implementation module per variant. Credential blobs stay opaque
//! ciphertext outside the variant implementation that owns their schema
//! (spec §9).
//!
//! Grounded on the REST-client-over-reqwest style in
//! `provider/gcp/mod.rs` and `provider/azure/key_vault.rs` of the teacher —
//! adapted here to use plain bearer-token REST calls for every variant
//! (no provider SDKs), since the credential material already lives as an
//! application-managed ciphertext blob rather than an ambient cloud
//! identity the process assumes.

pub mod azure;
pub mod github;
pub mod gcp;

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::secret::SecretInput;

pub const DEFAULT_WORKER_POOL_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderVariant {
    Github,
    Gcp,
    Azure,
}

impl ProviderVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderVariant::Github => "github",
            ProviderVariant::Gcp => "gcp",
            ProviderVariant::Azure => "azure",
        }
    }
}

impl std::str::FromStr for ProviderVariant {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "github" => Ok(ProviderVariant::Github),
            "gcp" => Ok(ProviderVariant::Gcp),
            "azure" => Ok(ProviderVariant::Azure),
            other => Err(AppError::InvalidBody(format!("unknown provider variant: {other}"))),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SyncResult {
    pub name: String,
    pub success: bool,
    pub error: Option<String>,
}

/// A target external secret store. One instance is bound to one credential
/// + configuration pair for one environment.
#[async_trait]
pub trait ProviderSyncer: Send + Sync {
    fn name(&self) -> &'static str;

    /// A cheap provider-side check that the credentials are usable and the
    /// configured target exists (spec §4.6 step 4).
    async fn validate_credentials(&self, cancel: &CancellationToken) -> Result<(), AppError>;

    /// Push every secret, returning one result per input in input order
    /// (spec §4.6: "collected deterministically by input order").
    async fn sync(
        &self,
        secrets: &[SecretInput],
        cancel: &CancellationToken,
    ) -> Result<Vec<SyncResult>, AppError>;
}

/// GitHub Actions repository/environment secret configuration.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct GitHubConfig {
    pub owner: String,
    pub repo: String,
    pub environment: String,
    pub visibility: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct GitHubCredentials {
    pub token: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct GcpConfig {
    pub project: String,
    pub location: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct GcpCredentials {
    pub access_token: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct AzureConfig {
    pub vault_name: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct AzureCredentials {
    pub access_token: String,
}

/// `CreateProvider(variant, credentials, config) -> ProviderSyncer` (spec §4.6).
/// `credentials_json`/`config_json` are the decrypted credential blob and the
/// unencrypted configuration document respectively.
pub fn create_provider(
    variant: ProviderVariant,
    credentials_json: &str,
    config_json: &str,
) -> Result<Arc<dyn ProviderSyncer>, AppError> {
    match variant {
        ProviderVariant::Github => {
            let creds: GitHubCredentials = serde_json::from_str(credentials_json)
                .map_err(|e| AppError::ProviderCredentialValidationFailed(e.to_string()))?;
            let config: GitHubConfig = serde_json::from_str(config_json)
                .map_err(|e| AppError::ProviderCredentialValidationFailed(e.to_string()))?;
            Ok(Arc::new(github::GitHubSyncer::new(creds, config)))
        }
        ProviderVariant::Gcp => {
            let creds: GcpCredentials = serde_json::from_str(credentials_json)
                .map_err(|e| AppError::ProviderCredentialValidationFailed(e.to_string()))?;
            let config: GcpConfig = serde_json::from_str(config_json)
                .map_err(|e| AppError::ProviderCredentialValidationFailed(e.to_string()))?;
            Ok(Arc::new(gcp::GcpSyncer::new(creds, config)))
        }
        ProviderVariant::Azure => {
            let creds: AzureCredentials = serde_json::from_str(credentials_json)
                .map_err(|e| AppError::ProviderCredentialValidationFailed(e.to_string()))?;
            let config: AzureConfig = serde_json::from_str(config_json)
                .map_err(|e| AppError::ProviderCredentialValidationFailed(e.to_string()))?;
            Ok(Arc::new(azure::AzureSyncer::new(creds, config)))
        }
    }
}

/// Push `secrets` through `syncer` with a bounded worker pool, honoring
/// cancellation between items and preserving input order in the output
/// (spec §4.6, §5: "no unbounded fan-out is permitted").
pub async fn sync_with_bounded_pool(
    syncer: &dyn ProviderSyncer,
    secrets: &[SecretInput],
    pool_size: usize,
    cancel: &CancellationToken,
) -> Vec<SyncResult> {
    let indexed = secrets.iter().enumerate().collect::<Vec<_>>();
    let results: Vec<(usize, SyncResult)> = stream::iter(indexed)
        .map(|(idx, secret): (usize, &SecretInput)| {
            Box::pin(sync_one(syncer, idx, secret, cancel.clone()))
                as std::pin::Pin<Box<dyn std::future::Future<Output = (usize, SyncResult)> + Send + '_>>
        })
        .buffer_unordered(pool_size.max(1))
        .collect()
        .await;

    let mut ordered = results;
    ordered.sort_by_key(|(idx, _)| *idx);
    ordered.into_iter().map(|(_, r)| r).collect()
}

async fn sync_one(
    syncer: &dyn ProviderSyncer,
    idx: usize,
    secret: &SecretInput,
    cancel: CancellationToken,
) -> (usize, SyncResult) {
    if cancel.is_cancelled() {
        return (
            idx,
            SyncResult {
                name: secret.name.clone(),
                success: false,
                error: Some("operation cancelled".into()),
            },
        );
    }
    let result = push_one(syncer, secret, &cancel).await;
    (idx, result)
}

async fn push_one(
    syncer: &dyn ProviderSyncer,
    secret: &SecretInput,
    cancel: &CancellationToken,
) -> SyncResult {
    match syncer.sync(std::slice::from_ref(secret), cancel).await {
        Ok(mut results) if !results.is_empty() => results.remove(0),
        Ok(_) => SyncResult {
            name: secret.name.clone(),
            success: false,
            error: Some("provider returned no result".into()),
        },
        Err(e) => SyncResult {
            name: secret.name.clone(),
            success: false,
            error: Some(e.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubSyncer;

    #[async_trait]
    impl ProviderSyncer for StubSyncer {
        fn name(&self) -> &'static str {
            "stub"
        }

        async fn validate_credentials(&self, _cancel: &CancellationToken) -> Result<(), AppError> {
            Ok(())
        }

        async fn sync(
            &self,
            secrets: &[SecretInput],
            _cancel: &CancellationToken,
        ) -> Result<Vec<SyncResult>, AppError> {
            Ok(secrets
                .iter()
                .map(|s| SyncResult {
                    name: s.name.clone(),
                    success: true,
                    error: None,
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn bounded_pool_preserves_input_order() {
        let secrets: Vec<SecretInput> = (0..20)
            .map(|i| SecretInput {
                name: format!("SECRET_{i}"),
                value: "x".into(),
            })
            .collect();
        let syncer = StubSyncer;
        let cancel = CancellationToken::new();
        let results = sync_with_bounded_pool(&syncer, &secrets, 4, &cancel).await;
        let names: Vec<_> = results.iter().map(|r| r.name.clone()).collect();
        let expected: Vec<_> = secrets.iter().map(|s| s.name.clone()).collect();
        assert_eq!(names, expected);
        assert!(results.iter().all(|r| r.success));
    }

    #[tokio::test]
    async fn cancellation_before_dispatch_reports_per_secret_failure() {
        let secrets = vec![SecretInput {
            name: "A".into(),
            value: "x".into(),
        }];
        let syncer = StubSyncer;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let results = sync_with_bounded_pool(&syncer, &secrets, 4, &cancel).await;
        assert_eq!(results.len(), 1);
        assert!(!results[0].success);
    }
}
