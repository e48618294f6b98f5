use axum::http::HeaderMap;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::identity::{bearer_token, Identity, IdentityResolver};
use super::AuthError;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn new(user_id: Uuid, email: Option<String>, expiry_hours: u64) -> Self {
        let now = Utc::now();
        let exp = (now + Duration::hours(expiry_hours as i64)).timestamp();

        Self {
            sub: user_id,
            email,
            iat: now.timestamp(),
            exp,
        }
    }
}

/// HS256 bearer-token resolver
#[derive(Clone)]
pub struct JwtResolver {
    secret: String,
    expiry_hours: u64,
}

impl JwtResolver {
    pub fn new(secret: impl Into<String>, expiry_hours: u64) -> Self {
        Self { secret: secret.into(), expiry_hours }
    }

    pub fn expiry_seconds(&self) -> i64 {
        self.expiry_hours as i64 * 3600
    }

    pub fn issue(&self, user_id: Uuid, email: Option<String>) -> Result<String, AuthError> {
        if self.secret.is_empty() {
            return Err(AuthError::InvalidSecret);
        }

        let claims = Claims::new(user_id, email, self.expiry_hours);
        let encoding_key = EncodingKey::from_secret(self.secret.as_bytes());

        encode(&Header::new(Algorithm::HS256), &claims, &encoding_key)
            .map_err(|e| AuthError::TokenGeneration(e.to_string()))
    }

    pub fn verify(&self, token: &str) -> Option<Claims> {
        if self.secret.is_empty() {
            return None;
        }
        let decoding_key = DecodingKey::from_secret(self.secret.as_bytes());
        match decode::<Claims>(token, &decoding_key, &Validation::new(Algorithm::HS256)) {
            Ok(data) => Some(data.claims),
            Err(e) => {
                debug!("Rejected bearer token: {}", e);
                None
            }
        }
    }
}

impl IdentityResolver for JwtResolver {
    fn resolve(&self, headers: &HeaderMap) -> Identity {
        match bearer_token(headers).and_then(|token| self.verify(token)) {
            Some(claims) => Identity::User { id: claims.sub, email: claims.email },
            None => Identity::Anonymous,
        }
    }
}
