//! Token decoding + signature verification.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;

use crate::{JwtClaims, TokenValidationError, validate_claims};

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("malformed or badly signed token: {0}")]
    Decode(#[from] jsonwebtoken::errors::Error),

    #[error(transparent)]
    Claims(#[from] TokenValidationError),
}

/// Validates a bearer token and yields its claims.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, JwtError>;
}

/// Shared-secret HS256 validator.
///
/// The time window is carried in our own `issued_at`/`expires_at` claims, so
/// the registered `exp` claim is not required.
pub struct Hs256JwtValidator {
    decoding: DecodingKey,
    encoding: EncodingKey,
}

impl Hs256JwtValidator {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let secret = secret.as_ref();
        Self {
            decoding: DecodingKey::from_secret(secret),
            encoding: EncodingKey::from_secret(secret),
        }
    }

    /// Sign claims with the same secret (dev tooling and tests).
    pub fn mint(&self, claims: &JwtClaims) -> Result<String, JwtError> {
        Ok(jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            claims,
            &self.encoding,
        )?)
    }
}

impl JwtValidator for Hs256JwtValidator {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;

        let data = jsonwebtoken::decode::<JwtClaims>(token, &self.decoding, &validation)?;
        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Role;
    use chrono::Duration;
    use fleetops_core::UserId;

    fn claims() -> JwtClaims {
        let now = Utc::now();
        JwtClaims {
            sub: UserId::new(),
            name: "Admin".to_string(),
            site_id: None,
            roles: vec![Role::admin()],
            issued_at: now - Duration::seconds(5),
            expires_at: now + Duration::minutes(10),
        }
    }

    #[test]
    fn minted_token_validates() {
        let v = Hs256JwtValidator::new("secret");
        let c = claims();
        let token = v.mint(&c).unwrap();
        let decoded = v.validate(&token, Utc::now()).unwrap();
        assert_eq!(decoded, c);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = Hs256JwtValidator::new("secret").mint(&claims()).unwrap();
        let err = Hs256JwtValidator::new("other").validate(&token, Utc::now());
        assert!(matches!(err, Err(JwtError::Decode(_))));
    }

    #[test]
    fn expired_claims_are_rejected_after_signature_check() {
        let v = Hs256JwtValidator::new("secret");
        let token = v.mint(&claims()).unwrap();
        let later = Utc::now() + Duration::hours(1);
        assert!(matches!(
            v.validate(&token, later),
            Err(JwtError::Claims(TokenValidationError::Expired))
        ));
    }
}
