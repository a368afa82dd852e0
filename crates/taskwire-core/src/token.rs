//! Short-lived signed tokens proving a user's identity to the real-time service.
//!
//! Tokens are HS256 JWTs carrying `sub`, `email`, `iat`, `exp` and a random
//! `jti`. A fresh token is signed for every use; nothing here caches.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{TaskwireError, TaskwireResult};
use crate::session::SessionUser;

/// Lifetime of every minted token.
pub const TOKEN_TTL_HOURS: i64 = 24;

/// Claims carried by a real-time token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

/// Signs and verifies real-time tokens with a shared secret.
#[derive(Clone)]
pub struct TokenSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenSigner {
    /// Build a signer. An empty secret is rejected.
    pub fn new(secret: &[u8]) -> TaskwireResult<Self> {
        if secret.is_empty() {
            return Err(TaskwireError::config("token signing secret is empty"));
        }
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp", "sub"]);
        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            ttl: Duration::hours(TOKEN_TTL_HOURS),
        })
    }

    /// Mint a token for `user`, issued now.
    pub fn mint(&self, user: &SessionUser) -> TaskwireResult<String> {
        self.mint_at(user, Utc::now())
    }

    /// Mint a token for `user` as if issued at `issued_at`.
    pub fn mint_at(&self, user: &SessionUser, issued_at: DateTime<Utc>) -> TaskwireResult<String> {
        let claims = Claims {
            sub: user.id.clone(),
            email: user.email.clone(),
            iat: issued_at.timestamp(),
            exp: (issued_at + self.ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?)
    }

    /// Verify signature and expiry, returning the claims.
    pub fn verify(&self, token: &str) -> TaskwireResult<Claims> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)?;
        Ok(data.claims)
    }
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner")
            .field("algorithm", &"HS256")
            .field("ttl_hours", &self.ttl.num_hours())
            .finish_non_exhaustive()
    }
}
