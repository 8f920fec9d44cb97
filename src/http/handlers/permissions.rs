use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use crate::error::AppError;
use crate::http::dto::{Envelope, GrantRequest, RevokeRequest};
use crate::iam::{AncestorIds, ResourceType, Subject};
use crate::service::KavachService;

fn parse_resource_type(s: &str) -> Result<ResourceType, AppError> {
    match s {
        "organization" => Ok(ResourceType::Organization),
        "secret_group" => Ok(ResourceType::SecretGroup),
        "environment" => Ok(ResourceType::Environment),
        other => Err(AppError::InvalidBody(format!("unknown resource type: {other}"))),
    }
}

fn parse_subject(user_id: Option<uuid::Uuid>, group_id: Option<uuid::Uuid>) -> Result<Subject, AppError> {
    match (user_id, group_id) {
        (Some(u), None) => Ok(Subject::User(u)),
        (None, Some(g)) => Ok(Subject::Group(g)),
        _ => Err(AppError::InvalidBody(
            "exactly one of subject_user_id/subject_group_id must be set".into(),
        )),
    }
}

pub async fn grant(
    State(service): State<Arc<KavachService>>,
    Json(body): Json<GrantRequest>,
) -> Result<Json<Envelope<()>>, AppError> {
    let subject = parse_subject(body.subject_user_id, body.subject_group_id)?;
    let resource_type = parse_resource_type(&body.resource_type)?;
    service
        .iam()
        .grant(
            subject,
            &body.role,
            resource_type,
            body.resource_id,
            &body.resource_path,
            AncestorIds {
                organization_id: body.organization_id,
                secret_group_id: body.secret_group_id,
                environment_id: body.environment_id,
            },
        )
        .await?;
    Ok(Envelope::new(()))
}

pub async fn revoke(
    State(service): State<Arc<KavachService>>,
    Json(body): Json<RevokeRequest>,
) -> Result<Json<Envelope<()>>, AppError> {
    let subject = parse_subject(body.subject_user_id, body.subject_group_id)?;
    let resource_type = parse_resource_type(&body.resource_type)?;
    service
        .iam()
        .revoke(
            subject,
            &body.role,
            resource_type,
            body.resource_id,
            &body.resource_path,
        )
        .await?;
    Ok(Envelope::new(()))
}
