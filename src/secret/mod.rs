//! C6 — Secret-version engine.
//!
//! Content-addressable, immutable versioning per environment: every write
//! creates a brand new `SecretVersion` row plus one `Secret` row per input;
//! nothing is ever mutated in place (spec §3 invariant 3, §4.5). Rollback
//! and diff are built entirely out of `ListVersions`/`GetVersionDetails`
//! primitives rather than bespoke SQL, which is the shape the teacher uses
//! for its reconciliation diff between desired and observed secret state.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rand::Rng;
use sqlx::PgPool;
use uuid::Uuid;

use crate::crypto::{validate_secret_name, validate_secret_value, Cipher};
use crate::error::AppError;

pub const MAX_SECRETS_PER_VERSION: usize = 1000;
const VERSION_ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const VERSION_ID_LEN: usize = 8;

fn generate_version_id() -> String {
    let mut rng = rand::thread_rng();
    (0..VERSION_ID_LEN)
        .map(|_| VERSION_ID_ALPHABET[rng.gen_range(0..VERSION_ID_ALPHABET.len())] as char)
        .collect()
}

#[derive(Debug, Clone)]
pub struct SecretInput {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SecretVersionRow {
    pub id: String,
    pub environment_id: Uuid,
    pub commit_message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SecretVersionSummary {
    pub id: String,
    pub environment_id: Uuid,
    pub commit_message: String,
    pub created_at: DateTime<Utc>,
    pub secret_count: usize,
}

#[derive(Debug, Clone)]
pub struct SecretVersionDetails {
    pub version: SecretVersionRow,
    pub secrets: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffKind {
    Added,
    Removed,
    Modified,
    NoChange,
}

#[derive(Debug, Clone)]
pub struct DiffEntry {
    pub name: String,
    pub kind: DiffKind,
    pub from_value: Option<String>,
    pub to_value: Option<String>,
}

struct SecretRow {
    name: String,
    ciphertext: Vec<u8>,
}

pub struct SecretVersionEngine {
    pool: PgPool,
    cipher: Cipher,
}

impl std::fmt::Debug for SecretVersionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretVersionEngine").finish_non_exhaustive()
    }
}

impl SecretVersionEngine {
    pub fn new(pool: PgPool, cipher: Cipher) -> Self {
        Self { pool, cipher }
    }

    pub async fn create_version(
        &self,
        environment_id: Uuid,
        commit_message: &str,
        secrets: Vec<SecretInput>,
    ) -> Result<SecretVersionSummary, AppError> {
        if commit_message.trim().is_empty() {
            return Err(AppError::EmptyCommitMessage);
        }
        if secrets.is_empty() {
            return Err(AppError::EmptySecrets {
                max: MAX_SECRETS_PER_VERSION,
            });
        }
        if secrets.len() > MAX_SECRETS_PER_VERSION {
            return Err(AppError::TooManySecrets {
                max: MAX_SECRETS_PER_VERSION,
            });
        }
        let mut seen = std::collections::HashSet::new();
        for s in &secrets {
            validate_secret_name(&s.name)?;
            validate_secret_value(&s.value)?;
            if !seen.insert(s.name.clone()) {
                return Err(AppError::DuplicateSecretNameInRequest(s.name.clone()));
            }
        }

        let mut sealed = Vec::with_capacity(secrets.len());
        for s in &secrets {
            let ct = self.cipher.encrypt(s.value.as_bytes())?;
            sealed.push((s.name.clone(), ct));
        }

        let mut tx = self.pool.begin().await?;
        let version_id = generate_version_id();
        let version = sqlx::query_as::<_, SecretVersionRow>(
            "INSERT INTO secret_versions (id, environment_id, commit_message, created_at)
             VALUES ($1, $2, $3, now())
             RETURNING id, environment_id, commit_message, created_at",
        )
        .bind(&version_id)
        .bind(environment_id)
        .bind(commit_message)
        .fetch_one(&mut *tx)
        .await?;

        for (name, ciphertext) in &sealed {
            sqlx::query(
                "INSERT INTO secrets (id, version_id, name, ciphertext) VALUES ($1, $2, $3, $4)",
            )
            .bind(Uuid::new_v4())
            .bind(&version_id)
            .bind(name)
            .bind(ciphertext)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(SecretVersionSummary {
            id: version.id,
            environment_id: version.environment_id,
            commit_message: version.commit_message,
            created_at: version.created_at,
            secret_count: sealed.len(),
        })
    }

    pub async fn list_versions(
        &self,
        environment_id: Uuid,
    ) -> Result<Vec<SecretVersionSummary>, AppError> {
        let rows = sqlx::query_as::<_, (String, Uuid, String, DateTime<Utc>, i64)>(
            "SELECT v.id, v.environment_id, v.commit_message, v.created_at, COUNT(s.id)
             FROM secret_versions v LEFT JOIN secrets s ON s.version_id = v.id
             WHERE v.environment_id = $1
             GROUP BY v.id, v.environment_id, v.commit_message, v.created_at
             ORDER BY v.created_at DESC",
        )
        .bind(environment_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(id, environment_id, commit_message, created_at, count)| SecretVersionSummary {
                id,
                environment_id,
                commit_message,
                created_at,
                secret_count: count as usize,
            })
            .collect())
    }

    async fn load_secret_rows(&self, version_id: &str) -> Result<Vec<SecretRow>, AppError> {
        let rows = sqlx::query_as::<_, (String, Vec<u8>)>(
            "SELECT name, ciphertext FROM secrets WHERE version_id = $1 ORDER BY name",
        )
        .bind(version_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(name, ciphertext)| SecretRow { name, ciphertext })
            .collect())
    }

    async fn load_version(&self, version_id: &str) -> Result<SecretVersionRow, AppError> {
        sqlx::query_as::<_, SecretVersionRow>(
            "SELECT id, environment_id, commit_message, created_at
             FROM secret_versions WHERE id = $1",
        )
        .bind(version_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::VersionNotFound)
    }

    pub async fn get_version_details(
        &self,
        version_id: &str,
    ) -> Result<SecretVersionDetails, AppError> {
        let version = self.load_version(version_id).await?;
        let rows = self.load_secret_rows(version_id).await?;
        let mut secrets = Vec::with_capacity(rows.len());
        for row in rows {
            let plaintext = self.cipher.decrypt(&row.ciphertext)?;
            let value = String::from_utf8(plaintext).map_err(|_| AppError::Decryption)?;
            secrets.push((row.name, value));
        }
        Ok(SecretVersionDetails { version, secrets })
    }

    pub async fn rollback_to_version(
        &self,
        environment_id: Uuid,
        target_version_id: &str,
        commit_message: &str,
    ) -> Result<SecretVersionSummary, AppError> {
        let target = self.load_version(target_version_id).await?;
        if target.environment_id != environment_id {
            return Err(AppError::InvalidResourcePath(
                "target version does not belong to this environment".into(),
            ));
        }
        if commit_message.trim().is_empty() {
            return Err(AppError::EmptyCommitMessage);
        }
        let rows = self.load_secret_rows(target_version_id).await?;

        let mut tx = self.pool.begin().await?;
        let new_version_id = generate_version_id();
        let version = sqlx::query_as::<_, SecretVersionRow>(
            "INSERT INTO secret_versions (id, environment_id, commit_message, created_at)
             VALUES ($1, $2, $3, now())
             RETURNING id, environment_id, commit_message, created_at",
        )
        .bind(&new_version_id)
        .bind(environment_id)
        .bind(commit_message)
        .fetch_one(&mut *tx)
        .await?;

        for row in &rows {
            sqlx::query(
                "INSERT INTO secrets (id, version_id, name, ciphertext) VALUES ($1, $2, $3, $4)",
            )
            .bind(Uuid::new_v4())
            .bind(&new_version_id)
            .bind(&row.name)
            .bind(&row.ciphertext)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(SecretVersionSummary {
            id: version.id,
            environment_id: version.environment_id,
            commit_message: version.commit_message,
            created_at: version.created_at,
            secret_count: rows.len(),
        })
    }

    pub async fn get_version_diff(
        &self,
        from_version_id: &str,
        to_version_id: &str,
    ) -> Result<Vec<DiffEntry>, AppError> {
        let from = self.get_version_details(from_version_id).await?;
        let to = self.get_version_details(to_version_id).await?;
        if from.version.environment_id != to.version.environment_id {
            return Err(AppError::InvalidResourcePath(
                "versions belong to different environments".into(),
            ));
        }

        let from_map: BTreeMap<_, _> = from.secrets.into_iter().collect();
        let to_map: BTreeMap<_, _> = to.secrets.into_iter().collect();

        let mut names: std::collections::BTreeSet<String> = from_map.keys().cloned().collect();
        names.extend(to_map.keys().cloned());

        let mut entries = Vec::with_capacity(names.len());
        for name in names {
            let from_value = from_map.get(&name).cloned();
            let to_value = to_map.get(&name).cloned();
            let kind = match (&from_value, &to_value) {
                (None, Some(_)) => DiffKind::Added,
                (Some(_), None) => DiffKind::Removed,
                (Some(a), Some(b)) if a != b => DiffKind::Modified,
                (Some(_), Some(_)) => DiffKind::NoChange,
                (None, None) => unreachable!("name present in at least one map"),
            };
            entries.push(DiffEntry {
                name,
                kind,
                from_value,
                to_value,
            });
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_ids_have_fixed_length_and_alphabet() {
        for _ in 0..50 {
            let id = generate_version_id();
            assert_eq!(id.len(), VERSION_ID_LEN);
            assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        }
    }

    #[test]
    fn diff_of_identical_maps_has_no_change_entries_only() {
        let from: BTreeMap<String, String> = [("A".to_string(), "1".to_string())].into();
        let to = from.clone();
        let mut names: std::collections::BTreeSet<String> = from.keys().cloned().collect();
        names.extend(to.keys().cloned());
        for name in names {
            let a = from.get(&name);
            let b = to.get(&name);
            assert_eq!(a, b);
        }
    }
}
