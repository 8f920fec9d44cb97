use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use uuid::Uuid;

use crate::error::AppError;
use crate::http::dto::{
    CreateVersionRequest, DiffEntryResponse, DiffQuery, Envelope, RollbackRequest, SecretInputDto,
    VersionDetailsResponse, VersionSummaryResponse,
};
use crate::secret::SecretInput;
use crate::service::KavachService;

pub async fn create_version(
    State(service): State<Arc<KavachService>>,
    Path(environment_id): Path<Uuid>,
    Json(body): Json<CreateVersionRequest>,
) -> Result<Json<Envelope<VersionSummaryResponse>>, AppError> {
    let secrets = body
        .secrets
        .into_iter()
        .map(|s| SecretInput {
            name: s.name,
            value: s.value,
        })
        .collect();
    let summary = service
        .create_version(environment_id, &body.commit_message, secrets)
        .await?;
    Ok(Envelope::new(summary.into()))
}

pub async fn list_versions(
    State(service): State<Arc<KavachService>>,
    Path(environment_id): Path<Uuid>,
) -> Result<Json<Envelope<Vec<VersionSummaryResponse>>>, AppError> {
    let versions = service.secrets().list_versions(environment_id).await?;
    Ok(Envelope::new(versions.into_iter().map(Into::into).collect()))
}

pub async fn get_version(
    State(service): State<Arc<KavachService>>,
    Path((_environment_id, version_id)): Path<(Uuid, String)>,
) -> Result<Json<Envelope<VersionDetailsResponse>>, AppError> {
    let details = service.secrets().get_version_details(&version_id).await?;
    Ok(Envelope::new(VersionDetailsResponse {
        id: details.version.id,
        environment_id: details.version.environment_id,
        commit_message: details.version.commit_message,
        created_at: details.version.created_at,
        secrets: details
            .secrets
            .into_iter()
            .map(|(name, value)| SecretInputDto { name, value })
            .collect(),
    }))
}

pub async fn rollback(
    State(service): State<Arc<KavachService>>,
    Path((environment_id, version_id)): Path<(Uuid, String)>,
    Json(body): Json<RollbackRequest>,
) -> Result<Json<Envelope<VersionSummaryResponse>>, AppError> {
    let summary = service
        .secrets()
        .rollback_to_version(environment_id, &version_id, &body.commit_message)
        .await?;
    Ok(Envelope::new(summary.into()))
}

pub async fn diff(
    State(service): State<Arc<KavachService>>,
    Path(_environment_id): Path<Uuid>,
    Query(query): Query<DiffQuery>,
) -> Result<Json<Envelope<Vec<DiffEntryResponse>>>, AppError> {
    let entries = service
        .secrets()
        .get_version_diff(&query.from, &query.to)
        .await?;
    Ok(Envelope::new(entries.into_iter().map(Into::into).collect()))
}
