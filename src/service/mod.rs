//! C9 — Domain service glue.
//!
//! Composes C2–C7 for the operations that span more than one component:
//! resource creation (insert row, grant owner, wire hierarchy), provider
//! credential registration, and sync orchestration. Nothing here talks to
//! `sqlx` or the authorization engine directly for anything the lower
//! components already own — this module is sequencing, not storage.

use std::sync::Arc;
use std::time::Instant;

use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::authz::AuthorizationEngine;
use crate::crypto::Cipher;
use crate::error::AppError;
use crate::iam::{AncestorIds, IamService, ResourceType, RoleBindingRepo, Subject};
use crate::observability::metrics;
use crate::provider::{self, ProviderVariant, SyncResult, DEFAULT_WORKER_POOL_SIZE};
use crate::resource::{path, Environment, EnvironmentName, Organization, ResourceRepo, SecretGroup};
use crate::secret::{SecretInput, SecretVersionEngine, SecretVersionSummary};

pub struct ProviderCredentialRow {
    pub id: Uuid,
    pub environment_id: Uuid,
    pub variant: String,
    pub encrypted_credentials: Vec<u8>,
    pub config_json: String,
}

pub struct KavachService {
    pool: PgPool,
    resources: ResourceRepo,
    iam: IamService,
    authz: Arc<AuthorizationEngine>,
    secrets: SecretVersionEngine,
    provider_cipher: Cipher,
}

impl std::fmt::Debug for KavachService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KavachService").finish_non_exhaustive()
    }
}

impl KavachService {
    pub fn new(
        pool: PgPool,
        authz: Arc<AuthorizationEngine>,
        secret_cipher: Cipher,
        provider_cipher: Cipher,
    ) -> Self {
        let resources = ResourceRepo::new(pool.clone());
        let role_bindings = RoleBindingRepo::new(pool.clone());
        let iam = IamService::new(role_bindings, authz.clone());
        let secrets = SecretVersionEngine::new(pool.clone(), secret_cipher);
        Self {
            pool,
            resources,
            iam,
            authz,
            secrets,
            provider_cipher,
        }
    }

    /// Three-step transaction per spec §4.4: insert the row, grant the
    /// caller `owner`, wire the resource hierarchy edge to its parent.
    pub async fn create_organization(
        &self,
        name: &str,
        owner_id: Uuid,
    ) -> Result<Organization, AppError> {
        let org = self.resources.create_organization(name, owner_id).await?;
        let org_path = path::organization(org.id);
        if let Err(e) = self
            .iam
            .grant(
                Subject::User(owner_id),
                crate::authz::ROLE_OWNER,
                ResourceType::Organization,
                org.id,
                &org_path,
                AncestorIds {
                    organization_id: org.id,
                    secret_group_id: None,
                    environment_id: None,
                },
            )
            .await
        {
            let _ = self.resources.delete_organization(org.id, true).await;
            return Err(e);
        }
        Ok(org)
    }

    pub async fn delete_organization(&self, id: Uuid, cascade: bool) -> Result<(), AppError> {
        self.resources.delete_organization(id, cascade).await?;
        self.authz.remove_resource(&path::organization(id)).await
    }

    pub async fn create_secret_group(
        &self,
        organization_id: Uuid,
        name: &str,
        caller_id: Uuid,
    ) -> Result<SecretGroup, AppError> {
        let sg = self
            .resources
            .create_secret_group(organization_id, name)
            .await?;
        let sg_path = path::secret_group(organization_id, sg.id);
        let org_path = path::organization(organization_id);
        if let Err(e) = self
            .iam
            .grant(
                Subject::User(caller_id),
                crate::authz::ROLE_OWNER,
                ResourceType::SecretGroup,
                sg.id,
                &sg_path,
                AncestorIds {
                    organization_id,
                    secret_group_id: Some(sg.id),
                    environment_id: None,
                },
            )
            .await
        {
            let _ = self.resources.delete_secret_group(sg.id, true).await;
            return Err(e);
        }
        self.authz.add_resource_hierarchy(&org_path, &sg_path).await?;
        Ok(sg)
    }

    pub async fn delete_secret_group(&self, id: Uuid, cascade: bool) -> Result<(), AppError> {
        let organization_id = self.resources.secret_group_ancestor(id).await?;
        self.resources.delete_secret_group(id, cascade).await?;
        self.authz
            .remove_resource(&path::secret_group(organization_id, id))
            .await
    }

    pub async fn create_environment(
        &self,
        secret_group_id: Uuid,
        name: EnvironmentName,
        caller_id: Uuid,
    ) -> Result<Environment, AppError> {
        let organization_id = self.resources.secret_group_ancestor(secret_group_id).await?;
        let env = self
            .resources
            .create_environment(secret_group_id, name)
            .await?;
        let env_path = path::environment(organization_id, secret_group_id, env.id);
        let sg_path = path::secret_group(organization_id, secret_group_id);
        if let Err(e) = self
            .iam
            .grant(
                Subject::User(caller_id),
                crate::authz::ROLE_OWNER,
                ResourceType::Environment,
                env.id,
                &env_path,
                AncestorIds {
                    organization_id,
                    secret_group_id: Some(secret_group_id),
                    environment_id: Some(env.id),
                },
            )
            .await
        {
            let _ = self.resources.delete_environment(env.id, true).await;
            return Err(e);
        }
        self.authz.add_resource_hierarchy(&sg_path, &env_path).await?;
        Ok(env)
    }

    pub async fn delete_environment(&self, id: Uuid, cascade: bool) -> Result<(), AppError> {
        let (organization_id, secret_group_id) = self.resources.environment_ancestors(id).await?;
        self.resources.delete_environment(id, cascade).await?;
        self.authz
            .remove_resource(&path::environment(organization_id, secret_group_id, id))
            .await
    }

    pub async fn create_version(
        &self,
        environment_id: Uuid,
        commit_message: &str,
        secrets: Vec<SecretInput>,
    ) -> Result<SecretVersionSummary, AppError> {
        let summary = self
            .secrets
            .create_version(environment_id, commit_message, secrets)
            .await?;
        metrics::SECRET_VERSIONS_CREATED_TOTAL.inc();
        Ok(summary)
    }

    pub fn secrets(&self) -> &SecretVersionEngine {
        &self.secrets
    }

    pub fn resources(&self) -> &ResourceRepo {
        &self.resources
    }

    pub fn iam(&self) -> &IamService {
        &self.iam
    }

    pub fn authz(&self) -> &Arc<AuthorizationEngine> {
        &self.authz
    }

    pub async fn register_provider_credential(
        &self,
        environment_id: Uuid,
        variant: ProviderVariant,
        credentials_json: &str,
        config_json: &str,
    ) -> Result<Uuid, AppError> {
        let encrypted = self.provider_cipher.encrypt(credentials_json.as_bytes())?;
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO provider_credentials
               (id, environment_id, variant, encrypted_credentials, config_json, created_at)
             VALUES ($1, $2, $3, $4, $5, now())",
        )
        .bind(id)
        .bind(environment_id)
        .bind(variant.as_str())
        .bind(&encrypted)
        .bind(config_json)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                AppError::DuplicateProviderCredential
            }
            _ => AppError::from(e),
        })?;
        Ok(id)
    }

    async fn load_provider_credential(
        &self,
        environment_id: Uuid,
        variant: ProviderVariant,
    ) -> Result<ProviderCredentialRow, AppError> {
        let row = sqlx::query_as::<_, (Uuid, Uuid, String, Vec<u8>, String)>(
            "SELECT id, environment_id, variant, encrypted_credentials, config_json
             FROM provider_credentials WHERE environment_id = $1 AND variant = $2",
        )
        .bind(environment_id)
        .bind(variant.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::ProviderCredentialNotFound)?;
        Ok(ProviderCredentialRow {
            id: row.0,
            environment_id: row.1,
            variant: row.2,
            encrypted_credentials: row.3,
            config_json: row.4,
        })
    }

    /// Sync orchestration per spec §4.6: load credential, decrypt, load
    /// version secrets, validate, push.
    pub async fn sync_version(
        &self,
        environment_id: Uuid,
        variant: ProviderVariant,
        version_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<SyncResult>, AppError> {
        let credential_row = self.load_provider_credential(environment_id, variant).await?;
        let credentials_plaintext = self
            .provider_cipher
            .decrypt(&credential_row.encrypted_credentials)?;
        let credentials_json =
            String::from_utf8(credentials_plaintext).map_err(|_| AppError::Decryption)?;

        let details = self.secrets.get_version_details(version_id).await?;
        if details.version.environment_id != environment_id {
            return Err(AppError::InvalidResourcePath(
                "version does not belong to this environment".into(),
            ));
        }
        let inputs: Vec<SecretInput> = details
            .secrets
            .into_iter()
            .map(|(name, value)| SecretInput { name, value })
            .collect();

        let syncer = provider::create_provider(variant, &credentials_json, &credential_row.config_json)?;
        syncer.validate_credentials(cancel).await?;

        let start = Instant::now();
        let results = provider::sync_with_bounded_pool(
            syncer.as_ref(),
            &inputs,
            DEFAULT_WORKER_POOL_SIZE,
            cancel,
        )
        .await;
        let all_succeeded = results.iter().all(|r| r.success);
        metrics::record_provider_sync(variant.as_str(), all_succeeded, start.elapsed().as_secs_f64());
        Ok(results)
    }

    /// `ListAccessible(user, scope)` (spec §4.4): bindings naming the user
    /// or any group containing them, merged to the dominant effective role.
    /// The caller's group memberships are resolved here so a grant made to a
    /// group the caller belongs to surfaces without the caller holding a
    /// direct binding of their own.
    pub async fn list_accessible_organizations(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<crate::iam::AccessibleResource>, AppError> {
        let group_ids = self.resources.list_group_ids_for_user(user_id).await?;
        let bindings = self
            .iam
            .list_bindings(user_id, &group_ids, ResourceType::Organization)
            .await?;
        let rows = bindings
            .into_iter()
            .map(|b| (b.resource_id, b.role, path::organization(b.resource_id)));
        Ok(crate::iam::merge_dominant_roles(rows))
    }

    /// As [`Self::list_accessible_organizations`], but for secret groups: a
    /// direct secret-group binding is combined with every secret group
    /// descending from an organization the caller (or one of their groups)
    /// holds a role on, per the resource-hierarchy inheritance in spec §4.3.
    pub async fn list_accessible_secret_groups(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<crate::iam::AccessibleResource>, AppError> {
        let group_ids = self.resources.list_group_ids_for_user(user_id).await?;
        let mut rows: Vec<(Uuid, String, String)> = self
            .iam
            .list_bindings(user_id, &group_ids, ResourceType::SecretGroup)
            .await?
            .into_iter()
            .map(|b| (b.resource_id, b.role, path::secret_group(b.organization_id, b.resource_id)))
            .collect();

        let org_bindings = self
            .iam
            .list_bindings(user_id, &group_ids, ResourceType::Organization)
            .await?;
        for binding in org_bindings {
            let via = path::organization(binding.resource_id);
            for sg in self.resources.list_secret_groups(binding.resource_id).await? {
                rows.push((sg.id, binding.role.clone(), via.clone()));
            }
        }
        Ok(crate::iam::merge_dominant_roles(rows))
    }

    /// As [`Self::list_accessible_secret_groups`], extended one level
    /// further: environments inherit from both their secret group and, in
    /// turn, its organization.
    pub async fn list_accessible_environments(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<crate::iam::AccessibleResource>, AppError> {
        let group_ids = self.resources.list_group_ids_for_user(user_id).await?;
        let mut rows: Vec<(Uuid, String, String)> = self
            .iam
            .list_bindings(user_id, &group_ids, ResourceType::Environment)
            .await?
            .into_iter()
            .map(|b| {
                let secret_group_id = b
                    .secret_group_id
                    .expect("environment role bindings always carry a secret_group_id ancestor");
                (
                    b.resource_id,
                    b.role,
                    path::environment(b.organization_id, secret_group_id, b.resource_id),
                )
            })
            .collect();

        let sg_bindings = self
            .iam
            .list_bindings(user_id, &group_ids, ResourceType::SecretGroup)
            .await?;
        for binding in sg_bindings {
            let via = path::secret_group(binding.organization_id, binding.resource_id);
            for env in self.resources.list_environments(binding.resource_id).await? {
                rows.push((env.id, binding.role.clone(), via.clone()));
            }
        }

        let org_bindings = self
            .iam
            .list_bindings(user_id, &group_ids, ResourceType::Organization)
            .await?;
        for binding in org_bindings {
            let via = path::organization(binding.resource_id);
            for sg in self.resources.list_secret_groups(binding.resource_id).await? {
                for env in self.resources.list_environments(sg.id).await? {
                    rows.push((env.id, binding.role.clone(), via.clone()));
                }
            }
        }
        Ok(crate::iam::merge_dominant_roles(rows))
    }

    pub async fn list_owned_organizations(&self, user_id: Uuid) -> Result<Vec<Uuid>, AppError> {
        self.iam.list_owned_organizations(user_id).await
    }

    /// Three-step transaction, as the other resource-creation operations:
    /// insert the row, grant the caller `owner` on it, wire the hierarchy
    /// edge to its owning organization.
    pub async fn create_user_group(
        &self,
        organization_id: Uuid,
        name: &str,
        caller_id: Uuid,
    ) -> Result<crate::resource::UserGroup, AppError> {
        let group = self.resources.create_user_group(organization_id, name).await?;
        let group_path = path::user_group(organization_id, group.id);
        let org_path = path::organization(organization_id);
        if let Err(e) = self
            .iam
            .grant(
                Subject::User(caller_id),
                crate::authz::ROLE_OWNER,
                ResourceType::UserGroup,
                group.id,
                &group_path,
                AncestorIds {
                    organization_id,
                    secret_group_id: None,
                    environment_id: None,
                },
            )
            .await
        {
            let _ = self.resources.delete_user_group(group.id).await;
            return Err(e);
        }
        self.authz.add_resource_hierarchy(&org_path, &group_path).await?;
        Ok(group)
    }

    /// Adds a membership row and refreshes the authorization snapshot so the
    /// group's existing grants apply to the new member immediately (spec
    /// §4.3 membership relation `M`).
    pub async fn add_user_group_member(&self, group_id: Uuid, user_id: Uuid) -> Result<(), AppError> {
        self.resources.add_user_group_member(group_id, user_id).await?;
        self.authz.reload().await
    }

    pub async fn remove_user_group_member(&self, group_id: Uuid, user_id: Uuid) -> Result<(), AppError> {
        self.resources.remove_user_group_member(group_id, user_id).await?;
        self.authz.reload().await
    }
}
