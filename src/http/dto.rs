//! Request/response bodies for the `/api/v1` surface.
//!
//! Success responses are always `{ "data": <payload> }`; failures go through
//! `AppError`'s own `IntoResponse` and never pass through here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub data: T,
}

impl<T: Serialize> Envelope<T> {
    pub fn new(data: T) -> axum::Json<Self> {
        axum::Json(Envelope { data })
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateOrganizationRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct OrganizationResponse {
    pub id: Uuid,
    pub name: String,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl From<crate::resource::Organization> for OrganizationResponse {
    fn from(o: crate::resource::Organization) -> Self {
        Self {
            id: o.id,
            name: o.name,
            owner_id: o.owner_id,
            created_at: o.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateSecretGroupRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct SecretGroupResponse {
    pub id: Uuid,
    pub name: String,
    pub organization_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl From<crate::resource::SecretGroup> for SecretGroupResponse {
    fn from(g: crate::resource::SecretGroup) -> Self {
        Self {
            id: g.id,
            name: g.name,
            organization_id: g.organization_id,
            created_at: g.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateEnvironmentRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct EnvironmentResponse {
    pub id: Uuid,
    pub name: String,
    pub secret_group_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl From<crate::resource::Environment> for EnvironmentResponse {
    fn from(e: crate::resource::Environment) -> Self {
        Self {
            id: e.id,
            name: e.name,
            secret_group_id: e.secret_group_id,
            created_at: e.created_at,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SecretInputDto {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateVersionRequest {
    pub commit_message: String,
    pub secrets: Vec<SecretInputDto>,
}

#[derive(Debug, Deserialize)]
pub struct RollbackRequest {
    pub commit_message: String,
}

#[derive(Debug, Serialize)]
pub struct VersionSummaryResponse {
    pub id: String,
    pub environment_id: Uuid,
    pub commit_message: String,
    pub created_at: DateTime<Utc>,
    pub secret_count: usize,
}

impl From<crate::secret::SecretVersionSummary> for VersionSummaryResponse {
    fn from(v: crate::secret::SecretVersionSummary) -> Self {
        Self {
            id: v.id,
            environment_id: v.environment_id,
            commit_message: v.commit_message,
            created_at: v.created_at,
            secret_count: v.secret_count,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct VersionDetailsResponse {
    pub id: String,
    pub environment_id: Uuid,
    pub commit_message: String,
    pub created_at: DateTime<Utc>,
    pub secrets: Vec<SecretInputDto>,
}

#[derive(Debug, Deserialize)]
pub struct DiffQuery {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Serialize)]
pub struct DiffEntryResponse {
    pub name: String,
    pub kind: &'static str,
    pub from_value: Option<String>,
    pub to_value: Option<String>,
}

impl From<crate::secret::DiffEntry> for DiffEntryResponse {
    fn from(e: crate::secret::DiffEntry) -> Self {
        let kind = match e.kind {
            crate::secret::DiffKind::Added => "added",
            crate::secret::DiffKind::Removed => "removed",
            crate::secret::DiffKind::Modified => "modified",
            crate::secret::DiffKind::NoChange => "no_change",
        };
        Self {
            name: e.name,
            kind,
            from_value: e.from_value,
            to_value: e.to_value,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterProviderCredentialRequest {
    pub variant: String,
    pub credentials: serde_json::Value,
    pub config: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    pub variant: String,
    pub version_id: String,
}

#[derive(Debug, Deserialize)]
pub struct GrantRequest {
    pub subject_user_id: Option<Uuid>,
    pub subject_group_id: Option<Uuid>,
    pub role: String,
    pub resource_type: String,
    pub resource_id: Uuid,
    pub resource_path: String,
    pub organization_id: Uuid,
    pub secret_group_id: Option<Uuid>,
    pub environment_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct RevokeRequest {
    pub subject_user_id: Option<Uuid>,
    pub subject_group_id: Option<Uuid>,
    pub role: String,
    pub resource_type: String,
    pub resource_id: Uuid,
    pub resource_path: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserGroupRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct UserGroupResponse {
    pub id: Uuid,
    pub name: String,
    pub organization_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl From<crate::resource::UserGroup> for UserGroupResponse {
    fn from(g: crate::resource::UserGroup) -> Self {
        Self {
            id: g.id,
            name: g.name,
            organization_id: g.organization_id,
            created_at: g.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AddUserGroupMemberRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct AccessibleResourceResponse {
    pub resource_id: Uuid,
    pub effective_role: String,
    pub via_resource: String,
}

impl From<crate::iam::AccessibleResource> for AccessibleResourceResponse {
    fn from(a: crate::iam::AccessibleResource) -> Self {
        Self {
            resource_id: a.resource_id,
            effective_role: a.effective_role,
            via_resource: a.via_resource,
        }
    }
}
