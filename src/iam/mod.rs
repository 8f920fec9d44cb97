//! C5 — IAM service.
//!
//! Binds roles to principals on resources and resolves listing queries.
//! `RoleBinding` rows and policy-store `g`-tuples are two views onto the
//! same fact and are kept transactionally consistent here (spec invariant 5);
//! nothing outside this module is allowed to write one without the other.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::authz::{role_rank, AuthorizationEngine, ROLE_OWNER};
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Organization,
    SecretGroup,
    Environment,
    UserGroup,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Organization => "organization",
            ResourceType::SecretGroup => "secret_group",
            ResourceType::Environment => "environment",
            ResourceType::UserGroup => "user_group",
        }
    }
}

/// Exactly one of `user_id`/`group_id` is set — enforced in [`RoleBindingRepo::create`],
/// mirroring the mutual-exclusion invariant in spec §3.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RoleBinding {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub group_id: Option<Uuid>,
    pub role: String,
    pub resource_type: String,
    pub resource_id: Uuid,
    pub organization_id: Uuid,
    pub secret_group_id: Option<Uuid>,
    pub environment_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

pub enum Subject {
    User(Uuid),
    Group(Uuid),
}

pub struct AncestorIds {
    pub organization_id: Uuid,
    pub secret_group_id: Option<Uuid>,
    pub environment_id: Option<Uuid>,
}

pub struct RoleBindingRepo {
    pool: PgPool,
}

impl std::fmt::Debug for RoleBindingRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleBindingRepo").finish_non_exhaustive()
    }
}

impl RoleBindingRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        subject: &Subject,
        role: &str,
        resource_type: ResourceType,
        resource_id: Uuid,
        ancestors: &AncestorIds,
    ) -> Result<RoleBinding, AppError> {
        if role_rank(role).is_none() {
            return Err(AppError::InvalidResourcePath(format!("unknown role: {role}")));
        }
        let (user_id, group_id) = match subject {
            Subject::User(id) => (Some(*id), None),
            Subject::Group(id) => (None, Some(*id)),
        };
        sqlx::query_as::<_, RoleBinding>(
            "INSERT INTO role_bindings
               (id, user_id, group_id, role, resource_type, resource_id,
                organization_id, secret_group_id, environment_id, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now())
             RETURNING id, user_id, group_id, role, resource_type, resource_id,
                       organization_id, secret_group_id, environment_id, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(group_id)
        .bind(role)
        .bind(resource_type.as_str())
        .bind(resource_id)
        .bind(ancestors.organization_id)
        .bind(ancestors.secret_group_id)
        .bind(ancestors.environment_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                AppError::DuplicateRoleBinding
            }
            _ => AppError::from(e),
        })
    }

    pub async fn delete(
        &self,
        subject: &Subject,
        resource_type: ResourceType,
        resource_id: Uuid,
    ) -> Result<(), AppError> {
        let (user_id, group_id) = match subject {
            Subject::User(id) => (Some(*id), None),
            Subject::Group(id) => (None, Some(*id)),
        };
        sqlx::query(
            "DELETE FROM role_bindings
             WHERE resource_type = $1 AND resource_id = $2
               AND user_id IS NOT DISTINCT FROM $3
               AND group_id IS NOT DISTINCT FROM $4",
        )
        .bind(resource_type.as_str())
        .bind(resource_id)
        .bind(user_id)
        .bind(group_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_owned_organizations(&self, user_id: Uuid) -> Result<Vec<Uuid>, AppError> {
        let rows: Vec<Uuid> = sqlx::query_scalar(
            "SELECT resource_id FROM role_bindings
             WHERE user_id = $1 AND role = $2 AND resource_type = 'organization'",
        )
        .bind(user_id)
        .bind(ROLE_OWNER)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Every binding naming `user_id` directly or naming a group `user_id`
    /// belongs to, scoped to `resource_type` (spec §4.4 `ListAccessible`).
    pub async fn list_bindings_for_user_and_groups(
        &self,
        user_id: Uuid,
        group_ids: &[Uuid],
        resource_type: ResourceType,
    ) -> Result<Vec<RoleBinding>, AppError> {
        let rows = sqlx::query_as::<_, RoleBinding>(
            "SELECT id, user_id, group_id, role, resource_type, resource_id,
                    organization_id, secret_group_id, environment_id, created_at
             FROM role_bindings
             WHERE resource_type = $1 AND (user_id = $2 OR group_id = ANY($3))",
        )
        .bind(resource_type.as_str())
        .bind(user_id)
        .bind(group_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

/// One row of a `ListAccessible` response: the resource id, the dominant
/// effective role, and the ancestor resource that contributed it (spec
/// §4.4, §9 Open Question #3: dominant-role merge computed at read time).
#[derive(Debug, Clone)]
pub struct AccessibleResource {
    pub resource_id: Uuid,
    pub effective_role: String,
    pub via_resource: String,
}

/// Merge a set of `(resource_id, role, via)` rows down to one dominant
/// row per `resource_id`, keeping the highest-ranked role.
pub fn merge_dominant_roles(
    rows: impl IntoIterator<Item = (Uuid, String, String)>,
) -> Vec<AccessibleResource> {
    use std::collections::HashMap;
    let mut best: HashMap<Uuid, AccessibleResource> = HashMap::new();
    for (resource_id, role, via) in rows {
        let rank = role_rank(&role).unwrap_or(0);
        match best.get(&resource_id) {
            Some(existing) if role_rank(&existing.effective_role).unwrap_or(0) >= rank => {}
            _ => {
                best.insert(
                    resource_id,
                    AccessibleResource {
                        resource_id,
                        effective_role: role,
                        via_resource: via,
                    },
                );
            }
        }
    }
    best.into_values().collect()
}

/// Thin façade kept transactionally consistent with C2 — every call updates
/// the relational row and the policy tuple together, rolling back the row
/// insert if the policy-store half fails (spec §4.4 step 2/3).
pub struct IamService {
    repo: RoleBindingRepo,
    authz: std::sync::Arc<AuthorizationEngine>,
}

impl std::fmt::Debug for IamService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IamService").finish_non_exhaustive()
    }
}

impl IamService {
    pub fn new(repo: RoleBindingRepo, authz: std::sync::Arc<AuthorizationEngine>) -> Self {
        Self { repo, authz }
    }

    pub async fn grant(
        &self,
        subject: Subject,
        role: &str,
        resource_type: ResourceType,
        resource_id: Uuid,
        resource_path: &str,
        ancestors: AncestorIds,
    ) -> Result<RoleBinding, AppError> {
        let binding = self
            .repo
            .create(&subject, role, resource_type, resource_id, &ancestors)
            .await?;
        let subject_key = match &subject {
            Subject::User(id) => id.to_string(),
            Subject::Group(id) => id.to_string(),
        };
        if let Err(e) = self
            .authz
            .grant_role_on_resource(&subject_key, role, resource_path)
            .await
        {
            self.repo.delete(&subject, resource_type, resource_id).await?;
            return Err(e);
        }
        Ok(binding)
    }

    pub async fn list_owned_organizations(&self, user_id: Uuid) -> Result<Vec<Uuid>, AppError> {
        self.repo.list_owned_organizations(user_id).await
    }

    pub async fn list_bindings(
        &self,
        user_id: Uuid,
        group_ids: &[Uuid],
        resource_type: ResourceType,
    ) -> Result<Vec<RoleBinding>, AppError> {
        self.repo
            .list_bindings_for_user_and_groups(user_id, group_ids, resource_type)
            .await
    }

    pub async fn revoke(
        &self,
        subject: Subject,
        role: &str,
        resource_type: ResourceType,
        resource_id: Uuid,
        resource_path: &str,
    ) -> Result<(), AppError> {
        self.repo.delete(&subject, resource_type, resource_id).await?;
        let subject_key = match &subject {
            Subject::User(id) => id.to_string(),
            Subject::Group(id) => id.to_string(),
        };
        self.authz
            .revoke_role_on_resource(&subject_key, role, resource_path)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dominant_role_merge_keeps_highest_rank() {
        let org = Uuid::new_v4();
        let rows = vec![
            (org, "viewer".to_string(), "/organizations/a".to_string()),
            (org, "owner".to_string(), "/organizations/a/secret-groups/b".to_string()),
        ];
        let merged = merge_dominant_roles(rows);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].effective_role, "owner");
    }
}
