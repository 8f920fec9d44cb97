use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::http::dto::{CreateEnvironmentRequest, Envelope, EnvironmentResponse};
use crate::service::KavachService;

pub async fn create(
    State(service): State<Arc<KavachService>>,
    Path(secret_group_id): Path<Uuid>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Json(body): Json<CreateEnvironmentRequest>,
) -> Result<Json<Envelope<EnvironmentResponse>>, AppError> {
    let name = body.name.parse()?;
    let env = service
        .create_environment(secret_group_id, name, caller)
        .await?;
    Ok(Envelope::new(env.into()))
}

pub async fn list(
    State(service): State<Arc<KavachService>>,
    Path(secret_group_id): Path<Uuid>,
) -> Result<Json<Envelope<Vec<EnvironmentResponse>>>, AppError> {
    let envs = service.resources().list_environments(secret_group_id).await?;
    Ok(Envelope::new(envs.into_iter().map(Into::into).collect()))
}

/// Environments accessible via any grant, direct or inherited from a
/// secret-group- or organization-level binding (spec §4.4 `ListAccessible`).
pub async fn list_accessible(
    State(service): State<Arc<KavachService>>,
    AuthenticatedUser(caller): AuthenticatedUser,
) -> Result<Json<Envelope<Vec<crate::http::dto::AccessibleResourceResponse>>>, AppError> {
    let accessible = service.list_accessible_environments(caller).await?;
    Ok(Envelope::new(accessible.into_iter().map(Into::into).collect()))
}

pub async fn delete(
    State(service): State<Arc<KavachService>>,
    Path(id): Path<Uuid>,
) -> Result<(), AppError> {
    service.delete_environment(id, false).await
}
