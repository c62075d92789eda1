use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tracing::warn;

use crate::{
    auth::{blacklist, jwt::JwtKeys, repo::User},
    error::ApiError,
    state::AppState,
};

/// Authenticated session: bearer token present, not blacklisted, valid
/// signature/expiry, and resolving to an existing user. Each failed step
/// short-circuits with its own 401 reason. The raw token string is kept so
/// logout can blacklist exactly what was presented.
#[derive(Debug)]
pub struct AuthSession {
    pub user: User,
    pub token: String,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthSession {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized("Token not found"))?;

        let token = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            .ok_or_else(|| ApiError::unauthorized("Token not found"))?;

        // Revocation wins over cryptographic validity.
        if blacklist::is_revoked(&state.db, token).await? {
            warn!("rejected blacklisted token");
            return Err(ApiError::unauthorized(
                "Token revoked, please log in again",
            ));
        }

        let claims = JwtKeys::from_ref(state).verify_session(token).map_err(|e| {
            warn!(error = %e, "invalid or expired token");
            ApiError::unauthorized("Invalid or expired token")
        })?;

        let user = User::find_by_id(&state.db, claims.sub)
            .await?
            .ok_or_else(|| ApiError::unauthorized("Unknown user"))?;

        Ok(Self {
            user,
            token: token.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Request, StatusCode};
    use sqlx::PgPool;
    use uuid::Uuid;

    use crate::auth::password::hash_password;
    use crate::state::AppState;

    fn state_with(pool: PgPool) -> AppState {
        let mut state = AppState::fake();
        state.db = pool;
        state
    }

    fn parts_with_bearer(token: &str) -> Parts {
        Request::builder()
            .uri("/auth/user")
            .header(
                axum::http::header::AUTHORIZATION,
                format!("Bearer {token}"),
            )
            .body(())
            .unwrap()
            .into_parts()
            .0
    }

    #[tokio::test]
    async fn missing_token_short_circuits() {
        let state = AppState::fake();
        let mut parts = Request::builder()
            .uri("/auth/user")
            .body(())
            .unwrap()
            .into_parts()
            .0;
        let err = AuthSession::from_request_parts(&mut parts, &state)
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert!(err.to_string().contains("Token not found"));
    }

    #[sqlx::test]
    async fn revoked_token_is_rejected_after_valid_use(pool: PgPool) {
        let state = state_with(pool.clone());
        let hash = hash_password("pw123").unwrap();
        let user = User::create(&pool, "alice", "alice@x.com", &hash)
            .await
            .unwrap();
        let token = JwtKeys::from_ref(&state).sign_session(user.id).unwrap();

        let session = AuthSession::from_request_parts(&mut parts_with_bearer(&token), &state)
            .await
            .expect("fresh token authorizes");
        assert_eq!(session.user.id, user.id);
        assert_eq!(session.token, token);

        blacklist::revoke(&pool, &token).await.unwrap();
        blacklist::revoke(&pool, &token)
            .await
            .expect("second revoke is a no-op");

        let err = AuthSession::from_request_parts(&mut parts_with_bearer(&token), &state)
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert!(err.to_string().contains("revoked"));
    }

    #[sqlx::test]
    async fn token_for_unknown_user_is_rejected(pool: PgPool) {
        let state = state_with(pool);
        let token = JwtKeys::from_ref(&state)
            .sign_session(Uuid::new_v4())
            .unwrap();
        let err = AuthSession::from_request_parts(&mut parts_with_bearer(&token), &state)
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert!(err.to_string().contains("Unknown user"));
    }
}
