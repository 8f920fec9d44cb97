//! C3 — Authorization engine.
//!
//! Evaluates `permit(user, action, resource)` over three relations loaded
//! from the policy store (C2): `P(role, resource_pattern, action)`,
//! `G(subject, role, resource)`, `H(child, parent)`, plus a group-membership
//! relation `M(user, group)` sourced from the resource graph (C4). Decision
//! rule and role dominance are exactly as specified in spec §4.3.
//!
//! The engine holds an in-memory snapshot rebuilt off-lock and atomically
//! swapped behind a lock (spec §5, §9: "express as a value-typed snapshot
//! rebuilt off-lock and atomically swapped"). Readers take a short-lived read
//! lock on the snapshot `Arc`; writers persist to the policy store first and
//! only then swap the pointer, so a failed persist never mutates in-memory
//! state (spec §4.3 design decision).
//!
//! Grounded on the RBAC decision/explanation shape in
//! `other_examples/5529e3c2_netadx1ai-ai-core__src-security-src-rbac.rs.rs`;
//! the matcher itself is hand-rolled per spec §9's re-architecture guidance
//! rather than pulled in from a policy-engine crate.

pub mod model;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::AppError;
use crate::policy::{PolicyStore, PTYPE_GRANT, PTYPE_HIERARCHY, PTYPE_POLICY};

pub const ROLE_OWNER: &str = "owner";
pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_EDITOR: &str = "editor";
pub const ROLE_VIEWER: &str = "viewer";

/// Fixed role dominance: owner > admin > editor > viewer.
pub fn role_rank(role: &str) -> Option<u8> {
    match role {
        ROLE_OWNER => Some(3),
        ROLE_ADMIN => Some(2),
        ROLE_EDITOR => Some(1),
        ROLE_VIEWER => Some(0),
        _ => None,
    }
}

pub fn roles_at_least(role: &str) -> Vec<&'static str> {
    match role_rank(role) {
        Some(rank) => [ROLE_OWNER, ROLE_ADMIN, ROLE_EDITOR, ROLE_VIEWER]
            .into_iter()
            .filter(|r| role_rank(r).unwrap() >= rank)
            .collect(),
        None => Vec::new(),
    }
}

/// Source of user → group membership, decoupled from the resource graph (C4)
/// module to avoid a circular dependency; `resource::PgGroupMembership`
/// implements this against `user_group_members`.
#[async_trait]
pub trait MembershipSource: Send + Sync {
    async fn load_all(&self) -> Result<Vec<(String, String)>, AppError>;
}

pub struct NoMemberships;

#[async_trait]
impl MembershipSource for NoMemberships {
    async fn load_all(&self) -> Result<Vec<(String, String)>, AppError> {
        Ok(Vec::new())
    }
}

/// One matched tuple, reported back for audit (spec §4.3 `explanation`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedTuple {
    pub subject: String,
    pub role: String,
    pub via_resource: String,
    pub action: String,
}

#[derive(Debug, Clone)]
pub struct Decision {
    pub allowed: bool,
    pub explanation: Vec<MatchedTuple>,
}

/// The already-expanded, read-only snapshot a decision is made against.
/// Expanding `P` at load time (one tuple per "role-at-least", per spec §4.3
/// "compiled into P by expanding each P(role, pat, act) into one tuple per
/// role-at-least") turns dominance checking into plain equality at decision
/// time.
#[derive(Debug, Default, Clone)]
struct PolicyImage {
    /// role -> [(resource_pattern, action)]
    p: HashMap<String, Vec<(String, String)>>,
    /// subject -> [(role, resource)]
    g: HashMap<String, Vec<(String, String)>>,
    /// child -> [parent]
    h: HashMap<String, Vec<String>>,
    /// user -> [group]
    m: HashMap<String, Vec<String>>,
}

impl PolicyImage {
    fn from_tuples(
        tuples: &[crate::policy::PolicyTuple],
        memberships: &[(String, String)],
    ) -> Self {
        let mut image = PolicyImage::default();
        for t in tuples {
            match t.ptype.as_str() {
                PTYPE_POLICY => {
                    let base_role = &t.v0;
                    let pattern = t.v1.clone();
                    let action = t.v2.clone();
                    for expanded_role in roles_at_least(base_role) {
                        image
                            .p
                            .entry(expanded_role.to_string())
                            .or_default()
                            .push((pattern.clone(), action.clone()));
                    }
                }
                PTYPE_GRANT => {
                    image
                        .g
                        .entry(t.v0.clone())
                        .or_default()
                        .push((t.v1.clone(), t.v2.clone()));
                }
                PTYPE_HIERARCHY => {
                    image.h.entry(t.v0.clone()).or_default().push(t.v1.clone());
                }
                _ => {}
            }
        }
        for (user, group) in memberships {
            image.m.entry(user.clone()).or_default().push(group.clone());
        }
        image
    }

    /// Reflexive-transitive closure of H starting at `resource`: every
    /// ancestor including `resource` itself.
    fn ancestors(&self, resource: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut stack = vec![resource.to_string()];
        let mut result = Vec::new();
        while let Some(node) = stack.pop() {
            if !seen.insert(node.clone()) {
                continue;
            }
            result.push(node.clone());
            if let Some(parents) = self.h.get(&node) {
                stack.extend(parents.iter().cloned());
            }
        }
        result
    }

    fn subjects_for(&self, user: &str) -> Vec<String> {
        let mut subjects = vec![user.to_string()];
        if let Some(groups) = self.m.get(user) {
            subjects.extend(groups.iter().cloned());
        }
        subjects
    }

    fn matches_pattern(pattern: &str, resource: &str) -> bool {
        let pat_segs: Vec<&str> = pattern.split('/').collect();
        let res_segs: Vec<&str> = resource.split('/').collect();
        if pat_segs.len() != res_segs.len() {
            return false;
        }
        pat_segs
            .iter()
            .zip(res_segs.iter())
            .all(|(p, r)| *p == "*" || p == r)
    }
}

pub struct AuthorizationEngine {
    store: Arc<dyn PolicyStore>,
    memberships: Arc<dyn MembershipSource>,
    image: RwLock<Arc<PolicyImage>>,
}

impl std::fmt::Debug for AuthorizationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationEngine").finish_non_exhaustive()
    }
}

impl AuthorizationEngine {
    pub async fn load(
        store: Arc<dyn PolicyStore>,
        memberships: Arc<dyn MembershipSource>,
    ) -> Result<Self, AppError> {
        let tuples = store.load().await?;
        let m = memberships.load_all().await?;
        let image = Arc::new(PolicyImage::from_tuples(&tuples, &m));
        Ok(Self {
            store,
            memberships,
            image: RwLock::new(image),
        })
    }

    /// Rebuild the snapshot off-lock and swap it in. Called after every
    /// mutating policy-store operation.
    pub async fn reload(&self) -> Result<(), AppError> {
        let tuples = self.store.load().await?;
        let m = self.memberships.load_all().await?;
        let fresh = Arc::new(PolicyImage::from_tuples(&tuples, &m));
        *self.image.write().await = fresh;
        Ok(())
    }

    pub async fn has_permission(&self, user: &str, action: &str, resource: &str) -> Decision {
        let image = self.image.read().await.clone();
        let mut explanation = Vec::new();
        let subjects = image.subjects_for(user);
        let ancestors = image.ancestors(resource);

        for subject in &subjects {
            let Some(grants) = image.g.get(subject) else {
                continue;
            };
            for (role, granted_on) in grants {
                if !ancestors.contains(granted_on) {
                    continue;
                }
                let Some(rules) = image.p.get(role) else {
                    continue;
                };
                for (pattern, allowed_action) in rules {
                    if allowed_action == action && PolicyImage::matches_pattern(pattern, resource)
                    {
                        explanation.push(MatchedTuple {
                            subject: subject.clone(),
                            role: role.clone(),
                            via_resource: granted_on.clone(),
                            action: action.to_string(),
                        });
                    }
                }
            }
        }

        Decision {
            allowed: !explanation.is_empty(),
            explanation,
        }
    }

    pub async fn grant_role_on_resource(
        &self,
        subject: &str,
        role: &str,
        resource: &str,
    ) -> Result<(), AppError> {
        if role_rank(role).is_none() {
            return Err(AppError::InvalidResourcePath(format!(
                "unknown role: {role}"
            )));
        }
        self.store.add_grouping(subject, role, resource).await?;
        self.reload().await
    }

    pub async fn revoke_role_on_resource(
        &self,
        subject: &str,
        role: &str,
        resource: &str,
    ) -> Result<(), AppError> {
        self.store.remove_grouping(subject, role, resource).await?;
        self.reload().await
    }

    pub async fn add_resource_owner(&self, user: &str, resource: &str) -> Result<(), AppError> {
        self.grant_role_on_resource(user, ROLE_OWNER, resource)
            .await
    }

    pub async fn remove_resource(&self, resource: &str) -> Result<(), AppError> {
        self.store
            .remove_all_matching(None, Some(resource))
            .await?;
        self.reload().await
    }

    pub async fn add_resource_hierarchy(
        &self,
        parent: &str,
        child: &str,
    ) -> Result<(), AppError> {
        self.store.add_hierarchy(parent, child).await?;
        self.reload().await
    }

    pub async fn remove_resource_hierarchy(
        &self,
        parent: &str,
        child: &str,
    ) -> Result<(), AppError> {
        self.store.remove_hierarchy(parent, child).await?;
        self.reload().await
    }

    /// Seed the base action grammar for a fresh deployment: owner/admin may do
    /// everything; editor may read/create/update but not grant/manage
    /// providers; viewer may only read. Resource-pattern-agnostic (`*`
    /// segments match any single path element at every tree level spec §4.3
    /// describes).
    pub async fn seed_default_policy(&self) -> Result<(), AppError> {
        const ACTIONS_OWNER: &[&str] = &[
            "read",
            "create",
            "update",
            "delete",
            "grant",
            "revoke",
            "sync",
            "view_provider_config",
            "manage_provider_config",
        ];
        const ACTIONS_EDITOR: &[&str] = &["read", "create", "update", "sync"];
        const ACTIONS_VIEWER: &[&str] = &["read", "view_provider_config"];

        let patterns = [
            "/organizations/*",
            "/organizations/*/secret-groups/*",
            "/organizations/*/secret-groups/*/environments/*",
        ];
        for pattern in patterns {
            for action in ACTIONS_OWNER {
                self.store.add_policy(ROLE_OWNER, pattern, action).await?;
            }
            for action in ACTIONS_EDITOR {
                self.store.add_policy(ROLE_EDITOR, pattern, action).await?;
            }
            for action in ACTIONS_VIEWER {
                self.store.add_policy(ROLE_VIEWER, pattern, action).await?;
            }
        }
        self.reload().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::InMemoryPolicyStore;

    async fn engine_with_seed() -> AuthorizationEngine {
        let store: Arc<dyn PolicyStore> = Arc::new(InMemoryPolicyStore::new());
        let engine = AuthorizationEngine::load(store, Arc::new(NoMemberships))
            .await
            .unwrap();
        engine.seed_default_policy().await.unwrap();
        engine
    }

    #[tokio::test]
    async fn owner_can_do_everything_policy_defines() {
        let engine = engine_with_seed().await;
        engine
            .add_resource_owner("u1", "/organizations/acme")
            .await
            .unwrap();
        for action in ["read", "create", "update", "delete", "grant", "sync"] {
            let decision = engine
                .has_permission("u1", action, "/organizations/acme")
                .await;
            assert!(decision.allowed, "expected owner to be allowed {action}");
        }
    }

    #[tokio::test]
    async fn permission_propagates_down_a_newly_added_hierarchy_edge() {
        let engine = engine_with_seed().await;
        engine
            .add_resource_owner("u1", "/organizations/acme")
            .await
            .unwrap();
        assert!(
            engine
                .has_permission("u1", "read", "/organizations/acme")
                .await
                .allowed
        );
        engine
            .add_resource_hierarchy(
                "/organizations/acme",
                "/organizations/acme/secret-groups/db",
            )
            .await
            .unwrap();
        let decision = engine
            .has_permission("u1", "read", "/organizations/acme/secret-groups/db")
            .await;
        assert!(decision.allowed, "permission must still hold after extending the hierarchy");
    }

    #[tokio::test]
    async fn viewer_cannot_create() {
        let engine = engine_with_seed().await;
        engine
            .grant_role_on_resource("u2", ROLE_VIEWER, "/organizations/acme")
            .await
            .unwrap();
        assert!(
            engine
                .has_permission("u2", "read", "/organizations/acme")
                .await
                .allowed
        );
        assert!(
            !engine
                .has_permission("u2", "create", "/organizations/acme")
                .await
                .allowed
        );
    }

    #[tokio::test]
    async fn group_membership_grants_indirectly() {
        struct OneMembership;
        #[async_trait]
        impl MembershipSource for OneMembership {
            async fn load_all(&self) -> Result<Vec<(String, String)>, AppError> {
                Ok(vec![("u2".into(), "group-eng".into())])
            }
        }

        let store: Arc<dyn PolicyStore> = Arc::new(InMemoryPolicyStore::new());
        let engine = AuthorizationEngine::load(store, Arc::new(OneMembership))
            .await
            .unwrap();
        engine.seed_default_policy().await.unwrap();
        engine
            .grant_role_on_resource("group-eng", ROLE_VIEWER, "/organizations/acme")
            .await
            .unwrap();
        engine
            .add_resource_hierarchy(
                "/organizations/acme",
                "/organizations/acme/secret-groups/db/environments/prod",
            )
            .await
            .unwrap();

        let decision = engine
            .has_permission(
                "u2",
                "read",
                "/organizations/acme/secret-groups/db/environments/prod",
            )
            .await;
        assert!(decision.allowed);
        assert!(
            !engine
                .has_permission(
                    "u2",
                    "create",
                    "/organizations/acme/secret-groups/db/environments/prod"
                )
                .await
                .allowed
        );
    }
}
