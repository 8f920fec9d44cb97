//! Bearer-token principal extraction.
//!
//! The OAuth/device-flow handshake and JWT issuance mechanics are out of
//! scope; this module only covers the inward half — turning an already
//! issued, already signed bearer token into an authenticated principal id,
//! the minimum ambient auth surface an HTTP service like this needs to
//! exist at all.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user id.
    pub sub: Uuid,
    pub exp: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser(pub Uuid);

pub fn issue_access_token(
    user_id: Uuid,
    secret: &str,
    duration: std::time::Duration,
) -> Result<String, AppError> {
    let exp = (chrono::Utc::now() + duration)
        .timestamp()
        .try_into()
        .unwrap_or(usize::MAX);
    let claims = Claims { sub: user_id, exp };
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|_| AppError::Internal)
}

pub fn verify_access_token(token: &str, secret: &str) -> Result<Uuid, AppError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => AppError::TokenExpired,
        _ => AppError::Unauthenticated,
    })?;
    Ok(data.claims.sub)
}

/// An axum extractor pulling `AuthenticatedUser` out of the `Authorization:
/// Bearer <token>` header, using the shared JWT secret from application
/// state.
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
    crate::http::AppState: axum::extract::FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        use axum::extract::FromRef;
        let app_state = crate::http::AppState::from_ref(state);
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(AppError::Unauthenticated)?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or(AppError::Unauthenticated)?;
        let user_id = verify_access_token(token, &app_state.config.jwt_secret)?;
        Ok(AuthenticatedUser(user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_token() {
        let user_id = Uuid::new_v4();
        let token =
            issue_access_token(user_id, "test-secret", std::time::Duration::from_secs(60)).unwrap();
        let decoded = verify_access_token(&token, "test-secret").unwrap();
        assert_eq!(decoded, user_id);
    }

    #[test]
    fn rejects_token_signed_with_a_different_secret() {
        let user_id = Uuid::new_v4();
        let token =
            issue_access_token(user_id, "secret-a", std::time::Duration::from_secs(60)).unwrap();
        assert!(verify_access_token(&token, "secret-b").is_err());
    }

    #[test]
    fn rejects_an_expired_token() {
        let user_id = Uuid::new_v4();
        let token = issue_access_token(
            user_id,
            "test-secret",
            std::time::Duration::from_secs(0),
        )
        .unwrap();
        std::thread::sleep(std::time::Duration::from_secs(1));
        let err = verify_access_token(&token, "test-secret").unwrap_err();
        assert!(matches!(err, AppError::TokenExpired));
    }
}
