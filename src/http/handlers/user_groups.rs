use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::http::dto::{AddUserGroupMemberRequest, CreateUserGroupRequest, Envelope, UserGroupResponse};
use crate::service::KavachService;

pub async fn create(
    State(service): State<Arc<KavachService>>,
    Path(organization_id): Path<Uuid>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Json(body): Json<CreateUserGroupRequest>,
) -> Result<Json<Envelope<UserGroupResponse>>, AppError> {
    let group = service
        .create_user_group(organization_id, &body.name, caller)
        .await?;
    Ok(Envelope::new(group.into()))
}

pub async fn list(
    State(service): State<Arc<KavachService>>,
    Path(organization_id): Path<Uuid>,
) -> Result<Json<Envelope<Vec<UserGroupResponse>>>, AppError> {
    let groups = service.resources().list_user_groups(organization_id).await?;
    Ok(Envelope::new(groups.into_iter().map(Into::into).collect()))
}

pub async fn add_member(
    State(service): State<Arc<KavachService>>,
    Path(group_id): Path<Uuid>,
    Json(body): Json<AddUserGroupMemberRequest>,
) -> Result<(), AppError> {
    service.add_user_group_member(group_id, body.user_id).await
}

pub async fn remove_member(
    State(service): State<Arc<KavachService>>,
    Path((group_id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<(), AppError> {
    service.remove_user_group_member(group_id, user_id).await
}
