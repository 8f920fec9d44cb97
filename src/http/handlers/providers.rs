use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::AppError;
use crate::http::dto::{Envelope, RegisterProviderCredentialRequest, SyncRequest};
use crate::provider::{ProviderVariant, SyncResult};
use crate::service::KavachService;

pub async fn register(
    State(service): State<Arc<KavachService>>,
    Path(environment_id): Path<Uuid>,
    Json(body): Json<RegisterProviderCredentialRequest>,
) -> Result<Json<Envelope<Uuid>>, AppError> {
    let variant: ProviderVariant = body.variant.parse()?;
    let credentials_json = serde_json::to_string(&body.credentials)
        .map_err(|e| AppError::InvalidBody(e.to_string()))?;
    let config_json = serde_json::to_string(&body.config)
        .map_err(|e| AppError::InvalidBody(e.to_string()))?;
    let id = service
        .register_provider_credential(environment_id, variant, &credentials_json, &config_json)
        .await?;
    Ok(Envelope::new(id))
}

pub async fn sync(
    State(service): State<Arc<KavachService>>,
    Path(environment_id): Path<Uuid>,
    Json(body): Json<SyncRequest>,
) -> Result<Json<Envelope<Vec<SyncResult>>>, AppError> {
    let variant: ProviderVariant = body.variant.parse()?;
    let cancel = CancellationToken::new();
    let results = service
        .sync_version(environment_id, variant, &body.version_id, &cancel)
        .await?;
    Ok(Envelope::new(results))
}
