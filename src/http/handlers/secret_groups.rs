use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::http::dto::{CreateSecretGroupRequest, Envelope, SecretGroupResponse};
use crate::service::KavachService;

pub async fn create(
    State(service): State<Arc<KavachService>>,
    Path(organization_id): Path<Uuid>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Json(body): Json<CreateSecretGroupRequest>,
) -> Result<Json<Envelope<SecretGroupResponse>>, AppError> {
    let sg = service
        .create_secret_group(organization_id, &body.name, caller)
        .await?;
    Ok(Envelope::new(sg.into()))
}

pub async fn list(
    State(service): State<Arc<KavachService>>,
    Path(organization_id): Path<Uuid>,
) -> Result<Json<Envelope<Vec<SecretGroupResponse>>>, AppError> {
    let groups = service.resources().list_secret_groups(organization_id).await?;
    Ok(Envelope::new(groups.into_iter().map(Into::into).collect()))
}

/// Secret groups accessible via any grant, direct or inherited from an
/// organization-level binding (spec §4.4 `ListAccessible`).
pub async fn list_accessible(
    State(service): State<Arc<KavachService>>,
    AuthenticatedUser(caller): AuthenticatedUser,
) -> Result<Json<Envelope<Vec<crate::http::dto::AccessibleResourceResponse>>>, AppError> {
    let accessible = service.list_accessible_secret_groups(caller).await?;
    Ok(Envelope::new(accessible.into_iter().map(Into::into).collect()))
}

pub async fn delete(
    State(service): State<Arc<KavachService>>,
    Path(id): Path<Uuid>,
) -> Result<(), AppError> {
    service.delete_secret_group(id, false).await
}
