//! C4 — Resource graph.
//!
//! The four-level resource tree (organization → secret-group → environment)
//! plus user-groups, stored as plain relational rows with denormalized
//! ancestor ids the way the teacher denormalizes a custom resource's owning
//! cluster/namespace onto its status subresource rather than re-deriving it
//! at query time.
//!
//! Grounded on the hand-written `sqlx` row/repository shape in
//! `other_examples/…ohitslaurence-maestro__reference-loom-crates-loom-server-db-src-secrets.rs.rs`.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::authz::MembershipSource;
use crate::error::AppError;

/// The closed set of environment names (spec §3, §9 Open Question #2:
/// "treat the closed set as authoritative" — encoded at the type level so an
/// invalid name can never reach the database layer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentName {
    Dev,
    Staging,
    Prod,
}

impl EnvironmentName {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvironmentName::Dev => "dev",
            EnvironmentName::Staging => "staging",
            EnvironmentName::Prod => "prod",
        }
    }
}

impl std::fmt::Display for EnvironmentName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EnvironmentName {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dev" => Ok(EnvironmentName::Dev),
            "staging" => Ok(EnvironmentName::Staging),
            "prod" => Ok(EnvironmentName::Prod),
            other => Err(AppError::EnvironmentNameNotAllowed(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SecretGroup {
    pub id: Uuid,
    pub name: String,
    pub organization_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Environment {
    pub id: Uuid,
    pub name: String,
    pub secret_group_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserGroup {
    pub id: Uuid,
    pub name: String,
    pub organization_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Resource-path construction, mirroring the glossary's
/// `/organizations/<u>/secret-groups/<u>/environments/<u>` shape.
pub mod path {
    use uuid::Uuid;

    pub fn organization(id: Uuid) -> String {
        format!("/organizations/{id}")
    }

    pub fn secret_group(org_id: Uuid, id: Uuid) -> String {
        format!("{}/secret-groups/{id}", organization(org_id))
    }

    pub fn environment(org_id: Uuid, secret_group_id: Uuid, id: Uuid) -> String {
        format!("{}/environments/{id}", secret_group(org_id, secret_group_id))
    }

    pub fn user_group(org_id: Uuid, id: Uuid) -> String {
        format!("{}/user-groups/{id}", organization(org_id))
    }
}

pub struct ResourceRepo {
    pool: PgPool,
}

impl std::fmt::Debug for ResourceRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceRepo").finish_non_exhaustive()
    }
}

impl ResourceRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create_organization(
        &self,
        name: &str,
        owner_id: Uuid,
    ) -> Result<Organization, AppError> {
        sqlx::query_as::<_, Organization>(
            "INSERT INTO organizations (id, name, owner_id, created_at)
             VALUES ($1, $2, $3, now())
             RETURNING id, name, owner_id, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(owner_id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_duplicate(AppError::DuplicateOrganization))
    }

    pub async fn get_organization(&self, id: Uuid) -> Result<Organization, AppError> {
        sqlx::query_as::<_, Organization>(
            "SELECT id, name, owner_id, created_at FROM organizations WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::OrganizationNotFound)
    }

    pub async fn get_organization_by_name(&self, name: &str) -> Result<Organization, AppError> {
        sqlx::query_as::<_, Organization>(
            "SELECT id, name, owner_id, created_at FROM organizations WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::OrganizationNotFound)
    }

    pub async fn list_organizations_owned_by(
        &self,
        owner_id: Uuid,
    ) -> Result<Vec<Organization>, AppError> {
        let rows = sqlx::query_as::<_, Organization>(
            "SELECT id, name, owner_id, created_at FROM organizations
             WHERE owner_id = $1 ORDER BY created_at",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn delete_organization(&self, id: Uuid, cascade: bool) -> Result<(), AppError> {
        if !cascade {
            let has_children = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS(SELECT 1 FROM secret_groups WHERE organization_id = $1)",
            )
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
            if has_children {
                return Err(AppError::ForeignKeyViolation);
            }
        }
        sqlx::query("DELETE FROM organizations WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn create_secret_group(
        &self,
        organization_id: Uuid,
        name: &str,
    ) -> Result<SecretGroup, AppError> {
        sqlx::query_as::<_, SecretGroup>(
            "INSERT INTO secret_groups (id, name, organization_id, created_at)
             VALUES ($1, $2, $3, now())
             RETURNING id, name, organization_id, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(organization_id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_duplicate(AppError::DuplicateSecretGroup))
    }

    pub async fn get_secret_group(&self, id: Uuid) -> Result<SecretGroup, AppError> {
        sqlx::query_as::<_, SecretGroup>(
            "SELECT id, name, organization_id, created_at FROM secret_groups WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::SecretGroupNotFound)
    }

    pub async fn list_secret_groups(
        &self,
        organization_id: Uuid,
    ) -> Result<Vec<SecretGroup>, AppError> {
        let rows = sqlx::query_as::<_, SecretGroup>(
            "SELECT id, name, organization_id, created_at FROM secret_groups
             WHERE organization_id = $1 ORDER BY created_at",
        )
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn delete_secret_group(&self, id: Uuid, cascade: bool) -> Result<(), AppError> {
        if !cascade {
            let has_children = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS(SELECT 1 FROM environments WHERE secret_group_id = $1)",
            )
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
            if has_children {
                return Err(AppError::ForeignKeyViolation);
            }
        }
        sqlx::query("DELETE FROM secret_groups WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn create_environment(
        &self,
        secret_group_id: Uuid,
        name: EnvironmentName,
    ) -> Result<Environment, AppError> {
        sqlx::query_as::<_, Environment>(
            "INSERT INTO environments (id, name, secret_group_id, created_at)
             VALUES ($1, $2, $3, now())
             RETURNING id, name, secret_group_id, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(name.as_str())
        .bind(secret_group_id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_duplicate(AppError::DuplicateEnvironment))
    }

    pub async fn get_environment(&self, id: Uuid) -> Result<Environment, AppError> {
        sqlx::query_as::<_, Environment>(
            "SELECT id, name, secret_group_id, created_at FROM environments WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::EnvironmentNotFound)
    }

    pub async fn list_environments(
        &self,
        secret_group_id: Uuid,
    ) -> Result<Vec<Environment>, AppError> {
        let rows = sqlx::query_as::<_, Environment>(
            "SELECT id, name, secret_group_id, created_at FROM environments
             WHERE secret_group_id = $1 ORDER BY created_at",
        )
        .bind(secret_group_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn delete_environment(&self, id: Uuid, cascade: bool) -> Result<(), AppError> {
        if !cascade {
            let has_children = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS(SELECT 1 FROM secret_versions WHERE environment_id = $1)",
            )
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
            if has_children {
                return Err(AppError::ForeignKeyViolation);
            }
        }
        sqlx::query("DELETE FROM environments WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Ancestor ids for an environment: `(organization_id, secret_group_id)`.
    /// Used both to build the resource path for authorization and to
    /// denormalize onto new role-binding rows (spec §9).
    pub async fn environment_ancestors(&self, environment_id: Uuid) -> Result<(Uuid, Uuid), AppError> {
        let row: (Uuid, Uuid) = sqlx::query_as(
            "SELECT sg.organization_id, e.secret_group_id
             FROM environments e JOIN secret_groups sg ON sg.id = e.secret_group_id
             WHERE e.id = $1",
        )
        .bind(environment_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::EnvironmentNotFound)?;
        Ok(row)
    }

    pub async fn secret_group_ancestor(&self, secret_group_id: Uuid) -> Result<Uuid, AppError> {
        sqlx::query_scalar("SELECT organization_id FROM secret_groups WHERE id = $1")
            .bind(secret_group_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AppError::SecretGroupNotFound)
    }

    /// Every user-group `user_id` belongs to, used to scope `ListAccessible`
    /// to the bindings granted to the caller's groups as well as to the
    /// caller directly (spec §4.4).
    pub async fn list_group_ids_for_user(&self, user_id: Uuid) -> Result<Vec<Uuid>, AppError> {
        let rows: Vec<Uuid> =
            sqlx::query_scalar("SELECT group_id FROM user_group_members WHERE user_id = $1")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows)
    }

    pub async fn create_user_group(
        &self,
        organization_id: Uuid,
        name: &str,
    ) -> Result<UserGroup, AppError> {
        sqlx::query_as::<_, UserGroup>(
            "INSERT INTO user_groups (id, name, organization_id, created_at)
             VALUES ($1, $2, $3, now())
             RETURNING id, name, organization_id, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(organization_id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_duplicate(AppError::DuplicateUserGroup))
    }

    pub async fn add_user_group_member(&self, group_id: Uuid, user_id: Uuid) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO user_group_members (group_id, user_id) VALUES ($1, $2)
             ON CONFLICT DO NOTHING",
        )
        .bind(group_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn remove_user_group_member(&self, group_id: Uuid, user_id: Uuid) -> Result<(), AppError> {
        sqlx::query("DELETE FROM user_group_members WHERE group_id = $1 AND user_id = $2")
            .bind(group_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list_user_groups(&self, organization_id: Uuid) -> Result<Vec<UserGroup>, AppError> {
        let rows = sqlx::query_as::<_, UserGroup>(
            "SELECT id, name, organization_id, created_at FROM user_groups
             WHERE organization_id = $1 ORDER BY created_at",
        )
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn user_group_ancestor(&self, user_group_id: Uuid) -> Result<Uuid, AppError> {
        sqlx::query_scalar("SELECT organization_id FROM user_groups WHERE id = $1")
            .bind(user_group_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AppError::UserGroupNotFound)
    }

    pub async fn delete_user_group(&self, id: Uuid) -> Result<(), AppError> {
        sqlx::query("DELETE FROM user_groups WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn map_duplicate(err: AppError) -> impl FnOnce(sqlx::Error) -> AppError {
    move |e| match &e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => err,
        _ => AppError::from(e),
    }
}

/// Implements [`MembershipSource`] against `user_group_members`, the table
/// that backs "any group containing the user" in C3's decision rule — kept
/// separate from `PolicyTuple` because group membership is not one of the
/// three relations the policy store persists (spec §3, §4.3).
pub struct PgGroupMembership {
    pool: PgPool,
}

impl PgGroupMembership {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl MembershipSource for PgGroupMembership {
    async fn load_all(&self) -> Result<Vec<(String, String)>, AppError> {
        let rows: Vec<(Uuid, Uuid)> =
            sqlx::query_as("SELECT user_id, group_id FROM user_group_members")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .into_iter()
            .map(|(user_id, group_id)| (user_id.to_string(), group_id.to_string()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_name_rejects_unknown_values() {
        assert!("dev".parse::<EnvironmentName>().is_ok());
        assert!("staging2".parse::<EnvironmentName>().is_err());
    }

    #[test]
    fn resource_paths_nest_by_ancestor() {
        let org = Uuid::new_v4();
        let sg = Uuid::new_v4();
        let env = Uuid::new_v4();
        let env_path = path::environment(org, sg, env);
        assert!(env_path.starts_with(&path::secret_group(org, sg)));
        assert!(env_path.ends_with(&env.to_string()));
    }
}
