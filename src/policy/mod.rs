//! C2 — Policy store.
//!
//! A flat persisted table of policy tuples (spec §3 `PolicyTuple`, §4.2).
//! `ptype = 'p'` encodes `(role, resource_pattern, action)`; `ptype = 'g'`
//! encodes `(subject, role, resource)`; `ptype = 'g2'` encodes
//! `(child_resource, parent_resource)`. Every mutation here must be followed
//! by an in-memory refresh of the authorization engine (C3) — callers own
//! that sequencing (see `authz::AuthorizationEngine::reload`).
//!
//! Grounded on the tuple-store shape in
//! `other_examples/5529e3c2_netadx1ai-ai-core__src-security-src-rbac.rs.rs`,
//! adapted from an ABAC policy table to the flat `(ptype, v0, v1, v2)` shape
//! spec.md prescribes, and persisted with hand-written `sqlx` prepared
//! statements per the re-architecture guidance in spec §9 (avoid pulling in
//! a full policy-engine dependency for a three-relation matcher).

use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::AppError;

pub const PTYPE_POLICY: &str = "p";
pub const PTYPE_GRANT: &str = "g";
pub const PTYPE_HIERARCHY: &str = "g2";

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PolicyTuple {
    pub ptype: String,
    pub v0: String,
    pub v1: String,
    pub v2: String,
}

#[derive(Debug, Clone)]
pub struct PolicyRule {
    pub role: String,
    pub resource_pattern: String,
    pub action: String,
}

#[derive(Debug, Clone)]
pub struct GrantTuple {
    pub subject: String,
    pub role: String,
    pub resource: String,
}

#[derive(Debug, Clone)]
pub struct HierarchyTuple {
    pub child: String,
    pub parent: String,
}

#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Bulk-load every persisted tuple.
    async fn load(&self) -> Result<Vec<PolicyTuple>, AppError>;

    async fn add_policy(&self, role: &str, resource: &str, action: &str) -> Result<(), AppError>;
    async fn remove_policy(
        &self,
        role: &str,
        resource: &str,
        action: &str,
    ) -> Result<(), AppError>;

    async fn add_grouping(&self, subject: &str, role: &str, resource: &str)
        -> Result<(), AppError>;
    async fn remove_grouping(
        &self,
        subject: &str,
        role: &str,
        resource: &str,
    ) -> Result<(), AppError>;

    async fn add_hierarchy(&self, parent: &str, child: &str) -> Result<(), AppError>;
    async fn remove_hierarchy(&self, parent: &str, child: &str) -> Result<(), AppError>;

    /// Remove every tuple referencing `subject` and/or `resource` — used for
    /// cascade deletions (spec §4.3 `RemoveResource`).
    async fn remove_all_matching(
        &self,
        subject: Option<&str>,
        resource: Option<&str>,
    ) -> Result<(), AppError>;
}

pub struct PgPolicyStore {
    pool: PgPool,
}

impl PgPolicyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PolicyStore for PgPolicyStore {
    async fn load(&self) -> Result<Vec<PolicyTuple>, AppError> {
        let rows = sqlx::query_as::<_, PolicyTuple>(
            "SELECT ptype, v0, v1, v2 FROM policy_tuples ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn add_policy(&self, role: &str, resource: &str, action: &str) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO policy_tuples (ptype, v0, v1, v2) VALUES ($1, $2, $3, $4)
             ON CONFLICT DO NOTHING",
        )
        .bind(PTYPE_POLICY)
        .bind(role)
        .bind(resource)
        .bind(action)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove_policy(
        &self,
        role: &str,
        resource: &str,
        action: &str,
    ) -> Result<(), AppError> {
        sqlx::query(
            "DELETE FROM policy_tuples WHERE ptype = $1 AND v0 = $2 AND v1 = $3 AND v2 = $4",
        )
        .bind(PTYPE_POLICY)
        .bind(role)
        .bind(resource)
        .bind(action)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn add_grouping(
        &self,
        subject: &str,
        role: &str,
        resource: &str,
    ) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO policy_tuples (ptype, v0, v1, v2) VALUES ($1, $2, $3, $4)
             ON CONFLICT DO NOTHING",
        )
        .bind(PTYPE_GRANT)
        .bind(subject)
        .bind(role)
        .bind(resource)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove_grouping(
        &self,
        subject: &str,
        role: &str,
        resource: &str,
    ) -> Result<(), AppError> {
        sqlx::query(
            "DELETE FROM policy_tuples WHERE ptype = $1 AND v0 = $2 AND v1 = $3 AND v2 = $4",
        )
        .bind(PTYPE_GRANT)
        .bind(subject)
        .bind(role)
        .bind(resource)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn add_hierarchy(&self, parent: &str, child: &str) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO policy_tuples (ptype, v0, v1, v2) VALUES ($1, $2, $3, '')
             ON CONFLICT DO NOTHING",
        )
        .bind(PTYPE_HIERARCHY)
        .bind(child)
        .bind(parent)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove_hierarchy(&self, parent: &str, child: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM policy_tuples WHERE ptype = $1 AND v0 = $2 AND v1 = $3")
            .bind(PTYPE_HIERARCHY)
            .bind(child)
            .bind(parent)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn remove_all_matching(
        &self,
        subject: Option<&str>,
        resource: Option<&str>,
    ) -> Result<(), AppError> {
        if let Some(subject) = subject {
            sqlx::query("DELETE FROM policy_tuples WHERE ptype = $1 AND v0 = $2")
                .bind(PTYPE_GRANT)
                .bind(subject)
                .execute(&self.pool)
                .await?;
        }
        if let Some(resource) = resource {
            sqlx::query(
                "DELETE FROM policy_tuples WHERE (ptype = $1 AND v2 = $2)
                    OR (ptype = $3 AND (v0 = $2 OR v1 = $2))",
            )
            .bind(PTYPE_GRANT)
            .bind(resource)
            .bind(PTYPE_HIERARCHY)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }
}

/// In-memory store used by unit tests and by `kavachctl` dry runs — keeps the
/// same trait surface as the Postgres-backed store so the authorization
/// engine is exercised identically in tests per spec §8.
#[derive(Default)]
pub struct InMemoryPolicyStore {
    tuples: tokio::sync::Mutex<Vec<PolicyTuple>>,
}

impl InMemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PolicyStore for InMemoryPolicyStore {
    async fn load(&self) -> Result<Vec<PolicyTuple>, AppError> {
        Ok(self.tuples.lock().await.clone())
    }

    async fn add_policy(&self, role: &str, resource: &str, action: &str) -> Result<(), AppError> {
        let mut tuples = self.tuples.lock().await;
        let tuple = PolicyTuple {
            ptype: PTYPE_POLICY.into(),
            v0: role.into(),
            v1: resource.into(),
            v2: action.into(),
        };
        if !tuples
            .iter()
            .any(|t| t.ptype == tuple.ptype && t.v0 == tuple.v0 && t.v1 == tuple.v1 && t.v2 == tuple.v2)
        {
            tuples.push(tuple);
        }
        Ok(())
    }

    async fn remove_policy(
        &self,
        role: &str,
        resource: &str,
        action: &str,
    ) -> Result<(), AppError> {
        let mut tuples = self.tuples.lock().await;
        tuples.retain(|t| {
            !(t.ptype == PTYPE_POLICY && t.v0 == role && t.v1 == resource && t.v2 == action)
        });
        Ok(())
    }

    async fn add_grouping(
        &self,
        subject: &str,
        role: &str,
        resource: &str,
    ) -> Result<(), AppError> {
        let mut tuples = self.tuples.lock().await;
        let tuple = PolicyTuple {
            ptype: PTYPE_GRANT.into(),
            v0: subject.into(),
            v1: role.into(),
            v2: resource.into(),
        };
        if !tuples
            .iter()
            .any(|t| t.ptype == tuple.ptype && t.v0 == tuple.v0 && t.v1 == tuple.v1 && t.v2 == tuple.v2)
        {
            tuples.push(tuple);
        }
        Ok(())
    }

    async fn remove_grouping(
        &self,
        subject: &str,
        role: &str,
        resource: &str,
    ) -> Result<(), AppError> {
        let mut tuples = self.tuples.lock().await;
        tuples.retain(|t| {
            !(t.ptype == PTYPE_GRANT && t.v0 == subject && t.v1 == role && t.v2 == resource)
        });
        Ok(())
    }

    async fn add_hierarchy(&self, parent: &str, child: &str) -> Result<(), AppError> {
        let mut tuples = self.tuples.lock().await;
        let tuple = PolicyTuple {
            ptype: PTYPE_HIERARCHY.into(),
            v0: child.into(),
            v1: parent.into(),
            v2: String::new(),
        };
        if !tuples
            .iter()
            .any(|t| t.ptype == tuple.ptype && t.v0 == tuple.v0 && t.v1 == tuple.v1)
        {
            tuples.push(tuple);
        }
        Ok(())
    }

    async fn remove_hierarchy(&self, parent: &str, child: &str) -> Result<(), AppError> {
        let mut tuples = self.tuples.lock().await;
        tuples.retain(|t| !(t.ptype == PTYPE_HIERARCHY && t.v0 == child && t.v1 == parent));
        Ok(())
    }

    async fn remove_all_matching(
        &self,
        subject: Option<&str>,
        resource: Option<&str>,
    ) -> Result<(), AppError> {
        let mut tuples = self.tuples.lock().await;
        tuples.retain(|t| {
            if let Some(subject) = subject {
                if t.ptype == PTYPE_GRANT && t.v0 == subject {
                    return false;
                }
            }
            if let Some(resource) = resource {
                if t.ptype == PTYPE_GRANT && t.v2 == resource {
                    return false;
                }
                if t.ptype == PTYPE_HIERARCHY && (t.v0 == resource || t.v1 == resource) {
                    return false;
                }
            }
            true
        });
        Ok(())
    }
}
