use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, Params,
};
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use tracing::debug;

use crate::{error::ApiError, models::Role, store::users, AppState};

/// The caller behind a verified bearer token.
///
/// The user row is re-read on every request so deleted accounts lose access
/// immediately and role changes apply without a new login.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i64,
    pub username: String,
    pub role: Role,
}

impl AuthUser {
    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.role != Role::Admin {
            return Err(ApiError::Forbidden("Admin access required".to_string()));
        }
        Ok(())
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)?;
        let claims = state.tokens.verify(token.trim()).map_err(|err| {
            debug!("Rejected bearer token: {err}");
            ApiError::Unauthorized("Invalid or expired token".to_string())
        })?;

        let user_id = claims.id;
        let user = state
            .db
            .call(move |conn| users::find_by_id(conn, user_id))
            .await?
            .ok_or_else(|| ApiError::Unauthorized("Account no longer exists".to_string()))?;

        Ok(Self {
            id: user.id,
            username: user.username,
            role: user.role,
        })
    }
}

pub fn extract_bearer_token(headers: &HeaderMap) -> Result<String, ApiError> {
    let Some(raw_header) = headers.get(AUTHORIZATION) else {
        return Err(ApiError::Unauthorized("Access token required".to_string()));
    };

    let Ok(value) = raw_header.to_str() else {
        return Err(ApiError::Unauthorized("Invalid Authorization header".to_string()));
    };

    let Some(token) = value.strip_prefix("Bearer ") else {
        return Err(ApiError::Unauthorized(
            "Authorization must use Bearer token".to_string(),
        ));
    };

    Ok(token.to_string())
}

fn argon2() -> Result<Argon2<'static>, ApiError> {
    #[cfg(not(test))]
    let params = Params::default();
    #[cfg(test)]
    let params = Params::new(1024, 1, 1, None)
        .map_err(|e| ApiError::Internal(format!("argon2 params: {e}")))?;

    Ok(Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        params,
    ))
}

/// Argon2id PHC string for `password`. Runs on the blocking pool.
pub async fn hash_password(password: String) -> Result<String, ApiError> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        argon2()?
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| ApiError::Internal(format!("password hashing failed: {e}")))
    })
    .await
    .map_err(|e| ApiError::Internal(format!("hashing task failed: {e}")))?
}

/// Checks `password` against a stored PHC string. Unparseable hashes never match.
pub async fn verify_password(password: String, stored_hash: String) -> Result<bool, ApiError> {
    tokio::task::spawn_blocking(move || {
        let Ok(parsed) = PasswordHash::new(&stored_hash) else {
            return Ok(false);
        };
        Ok(argon2()?
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    })
    .await
    .map_err(|e| ApiError::Internal(format!("verification task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[tokio::test]
    async fn password_hash_verifies_only_the_original() {
        let hash = hash_password("hunter2".to_string()).await.unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("hunter2".to_string(), hash.clone()).await.unwrap());
        assert!(!verify_password("hunter3".to_string(), hash).await.unwrap());
    }

    #[tokio::test]
    async fn corrupt_hash_never_matches() {
        assert!(!verify_password("x".to_string(), "plain".to_string()).await.unwrap());
    }

    #[test]
    fn bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        assert!(matches!(
            extract_bearer_token(&headers),
            Err(ApiError::Unauthorized(_))
        ));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(extract_bearer_token(&headers).is_err());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
        assert_eq!(extract_bearer_token(&headers).unwrap(), "abc.def.ghi");
    }
}
