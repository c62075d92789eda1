use std::time::Duration;

use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use crate::{config::JwtConfig, state::AppState};

/// Purpose claim. A reset token must never pass as a session credential.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Session,
    Reset,
}

/// Token payload. Session tokens have no expiry; reset tokens always do.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: Uuid,
    pub iat: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<usize>,
    pub kind: TokenKind,
}

#[derive(Clone)]
pub struct JwtKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub reset_ttl: Duration,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        let JwtConfig {
            secret,
            reset_ttl_minutes,
        } = state.config.jwt.clone();
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            reset_ttl: Duration::from_secs((reset_ttl_minutes as u64) * 60),
        }
    }
}

impl JwtKeys {
    pub(crate) fn sign(&self, claims: &Claims) -> anyhow::Result<String> {
        let token = encode(&Header::default(), claims, &self.encoding)?;
        debug!(user_id = %claims.sub, kind = ?claims.kind, "jwt signed");
        Ok(token)
    }

    pub fn sign_session(&self, user_id: Uuid) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        self.sign(&Claims {
            sub: user_id,
            iat: now.unix_timestamp() as usize,
            exp: None,
            kind: TokenKind::Session,
        })
    }

    pub fn sign_reset(&self, user_id: Uuid) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let exp = now + TimeDuration::seconds(self.reset_ttl.as_secs() as i64);
        self.sign(&Claims {
            sub: user_id,
            iat: now.unix_timestamp() as usize,
            exp: Some(exp.unix_timestamp() as usize),
            kind: TokenKind::Reset,
        })
    }

    /// Signature plus expiry check. `exp` is optional: session tokens omit
    /// it, so it must not be a required claim.
    pub fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims.clear();
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        debug!(user_id = %data.claims.sub, kind = ?data.claims.kind, "jwt verified");
        Ok(data.claims)
    }

    pub fn verify_session(&self, token: &str) -> anyhow::Result<Claims> {
        let claims = self.verify(token)?;
        if claims.kind != TokenKind::Session {
            anyhow::bail!("not a session token");
        }
        Ok(claims)
    }

    pub fn verify_reset(&self, token: &str) -> anyhow::Result<Claims> {
        let claims = self.verify(token)?;
        if claims.kind != TokenKind::Reset {
            anyhow::bail!("not a reset token");
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_keys(secret: &str) -> JwtKeys {
        JwtKeys {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            reset_ttl: Duration::from_secs(600),
        }
    }

    #[test]
    fn sign_and_verify_session_token() {
        let keys = make_keys("dev-secret");
        let user_id = Uuid::new_v4();
        let token = keys.sign_session(user_id).expect("sign session");
        let claims = keys.verify_session(&token).expect("verify token");
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.kind, TokenKind::Session);
        assert_eq!(claims.exp, None);
    }

    #[test]
    fn reset_token_carries_expiry() {
        let keys = make_keys("dev-secret");
        let token = keys.sign_reset(Uuid::new_v4()).expect("sign reset");
        let claims = keys.verify_reset(&token).expect("verify reset");
        assert_eq!(claims.kind, TokenKind::Reset);
        assert!(claims.exp.is_some());
    }

    #[test]
    fn reset_token_is_not_a_session_token() {
        let keys = make_keys("dev-secret");
        let token = keys.sign_reset(Uuid::new_v4()).expect("sign reset");
        let err = keys.verify_session(&token).unwrap_err();
        assert!(err.to_string().contains("not a session token"));
    }

    #[test]
    fn expired_reset_token_is_rejected() {
        let keys = make_keys("dev-secret");
        let past = OffsetDateTime::now_utc() - TimeDuration::minutes(30);
        let token = keys
            .sign(&Claims {
                sub: Uuid::new_v4(),
                iat: past.unix_timestamp() as usize,
                exp: Some(past.unix_timestamp() as usize),
                kind: TokenKind::Reset,
            })
            .expect("sign");
        assert!(keys.verify(&token).is_err());
    }

    #[test]
    fn identical_claims_produce_identical_tokens() {
        let keys = make_keys("dev-secret");
        let claims = Claims {
            sub: Uuid::new_v4(),
            iat: 1_700_000_000,
            exp: None,
            kind: TokenKind::Session,
        };
        let a = keys.sign(&claims).unwrap();
        let b = keys.sign(&claims).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn verify_rejects_wrong_secret() {
        let token = make_keys("secret-a").sign_session(Uuid::new_v4()).unwrap();
        assert!(make_keys("secret-b").verify(&token).is_err());
    }
}
