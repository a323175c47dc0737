//! Token issuance/verification and credential hashing.
//!
//! Tokens are HS256 JWTs carrying the user id in `sub` with a configured
//! expiry; passwords are hashed with argon2 and only the PHC string is
//! persisted.  The `require_auth` middleware gates the authenticated HTTP
//! surface; the realtime channel authenticates separately via the
//! `authenticate` event.

use argon2::password_hash::{rand_core::OsRng, PasswordHash, SaltString};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use dyad_shared::UserId;
use dyad_store::User;

use crate::api::AppState;
use crate::error::ServerError;

/// JWT claims carried by an identity token.
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    /// Subject: the user id.
    sub: String,
    /// Issued at (unix seconds).
    iat: i64,
    /// Expiry (unix seconds), enforced by validation.
    exp: i64,
}

/// Issues and verifies signed, expiring identity tokens.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: u64,
}

impl TokenService {
    pub fn new(secret: &str, ttl_secs: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_secs,
        }
    }

    /// Issue a token for a user id.
    pub fn issue(&self, user_id: UserId) -> Result<String, ServerError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now,
            exp: now + self.ttl_secs as i64,
        };

        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| ServerError::Internal(format!("Failed to sign token: {e}")))
    }

    /// Verify a token and extract the user id it was issued for.
    ///
    /// Fails on bad signature, expiry, or a malformed subject.
    pub fn verify(&self, token: &str) -> Result<UserId, ServerError> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default())
            .map_err(|e| ServerError::Unauthorized(format!("Invalid token: {e}")))?;

        UserId::parse(&data.claims.sub)
            .map_err(|_| ServerError::Unauthorized("Invalid token subject".to_string()))
    }
}

/// Hash a password for storage (argon2id, random salt).
pub fn hash_password(password: &str) -> Result<String, ServerError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ServerError::Internal(format!("Failed to hash password: {e}")))
}

/// Check a password against a stored PHC string.
pub fn verify_password(password: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// The authenticated caller, inserted into request extensions by
/// [`require_auth`].
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

/// Middleware guarding the authenticated HTTP surface.
///
/// Expects `Authorization: Bearer <token>`; on success the loaded [`AuthUser`]
/// is attached to the request.  Any failure is a 401 and never touches the
/// handler.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, ServerError> {
    let header = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ServerError::Unauthorized("Missing authorization header".to_string()))?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ServerError::Unauthorized("Expected bearer token".to_string()))?;

    let user_id = state.tokens.verify(token)?;

    let user = {
        let db = state.db.lock().await;
        db.get_user(user_id)
            .map_err(|_| ServerError::Unauthorized("Unknown user".to_string()))?
    };

    req.extensions_mut().insert(AuthUser(user));
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trip() {
        let tokens = TokenService::new("test-secret", 3600);
        let user_id = UserId::new();

        let token = tokens.issue(user_id).unwrap();
        assert_eq!(tokens.verify(&token).unwrap(), user_id);
    }

    #[test]
    fn token_rejects_wrong_secret_and_garbage() {
        let issuer = TokenService::new("secret-a", 3600);
        let verifier = TokenService::new("secret-b", 3600);

        let token = issuer.issue(UserId::new()).unwrap();
        assert!(verifier.verify(&token).is_err());
        assert!(issuer.verify("not.a.token").is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        // jsonwebtoken's default validation applies 60s leeway, so back-date
        // well past it.
        let tokens = TokenService::new("test-secret", 3600);
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: UserId::new().to_string(),
            iat: now - 7200,
            exp: now - 3600,
        };
        let token = encode(&Header::default(), &claims, &tokens.encoding).unwrap();

        assert!(tokens.verify(&token).is_err());
    }

    #[test]
    fn password_hash_verifies_and_rejects() {
        let hash = hash_password("hunter2").unwrap();
        assert_ne!(hash, "hunter2");
        assert!(verify_password("hunter2", &hash));
        assert!(!verify_password("wrong", &hash));
        assert!(!verify_password("hunter2", "not-a-phc-string"));
    }
}
