use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;

use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::http::dto::{CreateOrganizationRequest, Envelope, OrganizationResponse};
use crate::service::KavachService;

pub async fn create(
    State(service): State<Arc<KavachService>>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Json(body): Json<CreateOrganizationRequest>,
) -> Result<Json<Envelope<OrganizationResponse>>, AppError> {
    let org = service.create_organization(&body.name, caller).await?;
    Ok(Envelope::new(org.into()))
}

pub async fn get_by_name(
    State(service): State<Arc<KavachService>>,
    Path(name): Path<String>,
) -> Result<Json<Envelope<OrganizationResponse>>, AppError> {
    let org = service.resources().get_organization_by_name(&name).await?;
    Ok(Envelope::new(org.into()))
}

pub async fn list_mine(
    State(service): State<Arc<KavachService>>,
    AuthenticatedUser(caller): AuthenticatedUser,
) -> Result<Json<Envelope<Vec<OrganizationResponse>>>, AppError> {
    let owned = service.resources().list_organizations_owned_by(caller).await?;
    Ok(Envelope::new(owned.into_iter().map(Into::into).collect()))
}

/// Resources accessible via any grant, not only ownership (spec §4.4
/// `ListAccessible`): the caller's own bindings plus every binding granted
/// to a user group the caller belongs to.
pub async fn list(
    State(service): State<Arc<KavachService>>,
    AuthenticatedUser(caller): AuthenticatedUser,
) -> Result<Json<Envelope<Vec<crate::http::dto::AccessibleResourceResponse>>>, AppError> {
    let accessible = service.list_accessible_organizations(caller).await?;
    Ok(Envelope::new(accessible.into_iter().map(Into::into).collect()))
}

pub async fn delete(
    State(service): State<Arc<KavachService>>,
    Path(id): Path<uuid::Uuid>,
) -> Result<(), AppError> {
    service.delete_organization(id, false).await
}
