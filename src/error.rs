//! Error taxonomy for Kavach.
//!
//! Every domain error a component can raise is a variant here, mirroring the
//! teacher's `ReconcilerError` pattern of one flat enum mapped to an outward
//! action (there: requeue/backoff; here: an HTTP status + stable error code).
//! Nothing is recovered silently: handlers log once at the boundary and
//! return a structured `{ "error": { "code", "message" } }` body, never raw
//! crypto or database internals.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // --- Validation (4xx) ---
    #[error("commit message must not be empty")]
    EmptyCommitMessage,
    #[error("a version must contain between 1 and {max} secrets")]
    EmptySecrets { max: usize },
    #[error("a version may contain at most {max} secrets")]
    TooManySecrets { max: usize },
    #[error("duplicate secret name in request: {0}")]
    DuplicateSecretNameInRequest(String),
    #[error("invalid secret name: {0}")]
    InvalidSecretName(String),
    #[error("secret value too long (max {max} bytes)")]
    SecretValueTooLong { max: usize },
    #[error("secret value must not be empty")]
    EmptySecretValue,
    #[error("environment name not allowed: {0}")]
    EnvironmentNameNotAllowed(String),
    #[error("invalid resource path: {0}")]
    InvalidResourcePath(String),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("invalid request body: {0}")]
    InvalidBody(String),

    // --- Authentication (401) ---
    #[error("missing or invalid bearer token")]
    Unauthenticated,
    #[error("token expired")]
    TokenExpired,

    // --- Authorization (403) ---
    #[error("permission denied")]
    Forbidden,

    // --- Not found (404) ---
    #[error("organization not found")]
    OrganizationNotFound,
    #[error("secret group not found")]
    SecretGroupNotFound,
    #[error("environment not found")]
    EnvironmentNotFound,
    #[error("secret version not found")]
    VersionNotFound,
    #[error("user group not found")]
    UserGroupNotFound,
    #[error("role binding not found")]
    RoleBindingNotFound,
    #[error("provider credential not found for this environment")]
    ProviderCredentialNotFound,

    // --- Conflict (409) ---
    #[error("an organization with this name already exists")]
    DuplicateOrganization,
    #[error("a secret group with this name already exists in this organization")]
    DuplicateSecretGroup,
    #[error("an environment with this name already exists in this secret group")]
    DuplicateEnvironment,
    #[error("a user group with this name already exists in this organization")]
    DuplicateUserGroup,
    #[error("this subject already holds a role on this resource")]
    DuplicateRoleBinding,
    #[error("a credential for this provider is already registered on this environment")]
    DuplicateProviderCredential,
    #[error("conflicting grant already present in the policy store")]
    PolicyConflict,
    #[error("cannot delete: dependent resources exist (pass cascade to force)")]
    ForeignKeyViolation,

    // --- Crypto (500, details never exposed) ---
    #[error("encryption failure")]
    Encryption,
    #[error("decryption failure")]
    Decryption,
    #[error("invalid encryption key")]
    InvalidKey,

    // --- Provider (400/500) ---
    #[error("provider credential validation failed: {0}")]
    ProviderCredentialValidationFailed(String),
    #[error("github environment not found: {0}")]
    GitHubEnvironmentNotFound(String),
    #[error("gcp project/location invalid: {0}")]
    GcpInvalidLocation(String),
    #[error("azure key vault not found: {0}")]
    AzureVaultNotFound(String),
    #[error("provider transport error: {0}")]
    ProviderTransport(String),

    // --- Internal (500) ---
    #[error("storage unavailable: {0}")]
    StoreUnavailable(String),
    #[error("internal error")]
    Internal,
    #[error("operation cancelled")]
    Cancelled,
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::EmptyCommitMessage => "empty_commit_message",
            AppError::EmptySecrets { .. } => "empty_secrets",
            AppError::TooManySecrets { .. } => "too_many_secrets",
            AppError::DuplicateSecretNameInRequest(_) => "duplicate_secret_name_in_request",
            AppError::InvalidSecretName(_) => "invalid_secret_name",
            AppError::SecretValueTooLong { .. } => "secret_value_too_long",
            AppError::EmptySecretValue => "empty_secret_value",
            AppError::EnvironmentNameNotAllowed(_) => "environment_name_not_allowed",
            AppError::InvalidResourcePath(_) => "invalid_resource_path",
            AppError::MissingField(_) => "missing_field",
            AppError::InvalidBody(_) => "invalid_body",
            AppError::Unauthenticated => "unauthenticated",
            AppError::TokenExpired => "token_expired",
            AppError::Forbidden => "forbidden",
            AppError::OrganizationNotFound => "organization_not_found",
            AppError::SecretGroupNotFound => "secret_group_not_found",
            AppError::EnvironmentNotFound => "environment_not_found",
            AppError::VersionNotFound => "version_not_found",
            AppError::UserGroupNotFound => "user_group_not_found",
            AppError::RoleBindingNotFound => "role_binding_not_found",
            AppError::ProviderCredentialNotFound => "provider_credential_not_found",
            AppError::DuplicateOrganization => "duplicate_organization",
            AppError::DuplicateSecretGroup => "duplicate_secret_group",
            AppError::DuplicateEnvironment => "duplicate_environment",
            AppError::DuplicateUserGroup => "duplicate_user_group",
            AppError::DuplicateRoleBinding => "duplicate_role_binding",
            AppError::DuplicateProviderCredential => "duplicate_provider_credential",
            AppError::PolicyConflict => "policy_conflict",
            AppError::ForeignKeyViolation => "foreign_key_violation",
            AppError::Encryption => "encryption_error",
            AppError::Decryption => "decryption_error",
            AppError::InvalidKey => "invalid_key",
            AppError::ProviderCredentialValidationFailed(_) => {
                "provider_credential_validation_failed"
            }
            AppError::GitHubEnvironmentNotFound(_) => "github_environment_not_found",
            AppError::GcpInvalidLocation(_) => "gcp_invalid_location",
            AppError::AzureVaultNotFound(_) => "azure_vault_not_found",
            AppError::ProviderTransport(_) => "provider_transport_error",
            AppError::StoreUnavailable(_) => "store_unavailable",
            AppError::Internal => "internal_error",
            AppError::Cancelled => "cancelled",
        }
    }

    pub fn status(&self) -> StatusCode {
        use AppError::*;
        match self {
            EmptyCommitMessage
            | EmptySecrets { .. }
            | TooManySecrets { .. }
            | DuplicateSecretNameInRequest(_)
            | InvalidSecretName(_)
            | SecretValueTooLong { .. }
            | EmptySecretValue
            | InvalidResourcePath(_)
            | MissingField(_)
            | InvalidBody(_) => StatusCode::BAD_REQUEST,

            Unauthenticated | TokenExpired => StatusCode::UNAUTHORIZED,
            Forbidden => StatusCode::FORBIDDEN,

            OrganizationNotFound
            | SecretGroupNotFound
            | EnvironmentNotFound
            | VersionNotFound
            | UserGroupNotFound
            | RoleBindingNotFound
            | ProviderCredentialNotFound => StatusCode::NOT_FOUND,

            EnvironmentNameNotAllowed(_)
            | DuplicateOrganization
            | DuplicateSecretGroup
            | DuplicateEnvironment
            | DuplicateUserGroup
            | DuplicateRoleBinding
            | DuplicateProviderCredential
            | PolicyConflict
            | ForeignKeyViolation => StatusCode::CONFLICT,

            ProviderCredentialValidationFailed(_)
            | GitHubEnvironmentNotFound(_)
            | GcpInvalidLocation(_)
            | AzureVaultNotFound(_) => StatusCode::BAD_REQUEST,

            ProviderTransport(_) | Encryption | Decryption | InvalidKey | StoreUnavailable(_)
            | Internal | Cancelled => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
    correlation_id: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let correlation_id = Uuid::new_v4();
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(correlation_id = %correlation_id, error = %self, "internal error");
        } else {
            tracing::warn!(correlation_id = %correlation_id, error = %self, "request rejected");
        }
        // Crypto/internal errors never leak details to the client.
        let message = match status {
            StatusCode::INTERNAL_SERVER_ERROR => "an internal error occurred".to_string(),
            _ => self.to_string(),
        };
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code(),
                message,
                correlation_id: correlation_id.to_string(),
            },
        };
        (status, axum::Json(body)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) => {
                if db_err.is_unique_violation() {
                    AppError::PolicyConflict
                } else if db_err.is_foreign_key_violation() {
                    AppError::ForeignKeyViolation
                } else {
                    AppError::StoreUnavailable(db_err.to_string())
                }
            }
            sqlx::Error::RowNotFound => AppError::Internal,
            other => AppError::StoreUnavailable(other.to_string()),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
