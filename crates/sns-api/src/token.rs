use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ApiError;

/// The only message a caller ever sees for a rejected token.
pub const INVALID_TOKEN: &str = "invalid or expired token";

const ALGORITHM: Algorithm = Algorithm::HS256;

/// Payload of every bearer token. Times are Unix seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    fn new(subject: &str, issued_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            sub: subject.to_string(),
            iat: issued_at.timestamp(),
            exp: (issued_at + ttl).timestamp(),
        }
    }
}

/// Issues and verifies HMAC-signed bearer tokens. Stateless: nothing is
/// stored server-side, a token dies at its `exp`.
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenService {
    pub const DEFAULT_TTL_HOURS: i64 = 24;

    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(ALGORITHM);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl: Duration::hours(Self::DEFAULT_TTL_HOURS),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn create_token(&self, subject: &str) -> Result<String, ApiError> {
        self.sign(&Claims::new(subject, Utc::now(), self.ttl))
    }

    fn sign(&self, claims: &Claims) -> Result<String, ApiError> {
        encode(&Header::new(ALGORITHM), claims, &self.encoding)
            .map_err(|e| ApiError::internal("create token", e))
    }

    /// Verify signature, algorithm and expiry. Every rejection reason is
    /// logged but collapses into the same caller-facing error.
    pub fn validate_token(&self, token: &str) -> Result<Claims, ApiError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            warn!("Token rejected: {}", e);
            ApiError::unauthenticated(INVALID_TOKEN)
        })?;

        // jsonwebtoken still accepts a token in the second it expires
        if data.claims.exp <= Utc::now().timestamp() {
            warn!("Token rejected: expired at {}", data.claims.exp);
            return Err(ApiError::unauthenticated(INVALID_TOKEN));
        }

        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(result: Result<Claims, ApiError>) -> bool {
        result == Err(ApiError::unauthenticated(INVALID_TOKEN))
    }

    #[test]
    fn issued_tokens_validate_to_their_subject() {
        let tokens = TokenService::new("secret");

        for subject in ["42", "c0ffee00-0000-4000-8000-000000000000", "ünïcødé subject", " "] {
            let token = tokens.create_token(subject).unwrap();
            let claims = tokens.validate_token(&token).unwrap();
            assert_eq!(claims.sub, subject);
            assert_eq!(claims.exp - claims.iat, 24 * 60 * 60);
        }
    }

    #[test]
    fn expired_token_is_rejected() {
        let tokens = TokenService::new("secret");
        let issued = Utc::now() - Duration::hours(25);
        let token = tokens.sign(&Claims::new("42", issued, Duration::hours(24))).unwrap();

        assert!(rejected(tokens.validate_token(&token)));
    }

    #[test]
    fn token_expiring_now_is_rejected() {
        let tokens = TokenService::new("secret");
        let now = Utc::now();
        let claims = Claims {
            sub: "42".into(),
            iat: now.timestamp() - 10,
            exp: now.timestamp(),
        };
        let token = tokens.sign(&claims).unwrap();

        assert!(rejected(tokens.validate_token(&token)));
    }

    #[test]
    fn foreign_secret_is_rejected() {
        let issuer = TokenService::new("issuer-secret");
        let validator = TokenService::new("validator-secret");
        let token = issuer.create_token("42").unwrap();

        assert!(rejected(validator.validate_token(&token)));
    }

    #[test]
    fn other_algorithms_are_rejected() {
        let tokens = TokenService::new("secret");
        let claims = Claims::new("42", Utc::now(), Duration::hours(1));
        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();

        assert!(rejected(tokens.validate_token(&token)));
    }

    #[test]
    fn missing_or_mistyped_subject_is_rejected() {
        let tokens = TokenService::new("secret");
        let now = Utc::now().timestamp();
        let key = EncodingKey::from_secret(b"secret");

        let no_sub = serde_json::json!({ "iat": now, "exp": now + 3600 });
        let numeric_sub = serde_json::json!({ "sub": 42, "iat": now, "exp": now + 3600 });

        for payload in [no_sub, numeric_sub] {
            let token = encode(&Header::new(ALGORITHM), &payload, &key).unwrap();
            assert!(rejected(tokens.validate_token(&token)));
        }
    }

    #[test]
    fn garbage_is_rejected() {
        let tokens = TokenService::new("secret");
        let token = tokens.create_token("42").unwrap();
        let tampered = format!("{}x", token);

        assert!(rejected(tokens.validate_token("")));
        assert!(rejected(tokens.validate_token("not.a.token")));
        assert!(rejected(tokens.validate_token(&tampered)));
    }
}
