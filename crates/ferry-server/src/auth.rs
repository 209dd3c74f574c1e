//! Bearer-token verification against the identity provider's signing
//! secret.
//!
//! The signup service (external to this repo) issues HS256 tokens whose
//! claims carry the user id and email it minted.  This verifier only
//! checks them; it never issues credentials.

use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use ferry_shared::identity::{AuthError, IdentityProvider, VerifiedIdentity};
use ferry_shared::types::UserId;

/// Claims embedded by the signup service at issue time.
#[derive(Debug, Deserialize)]
struct Claims {
    id: String,
    email: String,
}

pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }
}

impl IdentityProvider for JwtVerifier {
    fn verify(&self, token: &str) -> Result<VerifiedIdentity, AuthError> {
        let data =
            decode::<Claims>(token, &self.key, &self.validation).map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
                _ => AuthError::InvalidToken,
            })?;

        Ok(VerifiedIdentity {
            id: UserId::new(data.claims.id),
            email: data.claims.email,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde::Serialize;

    #[derive(Serialize)]
    struct TestClaims {
        id: &'static str,
        email: &'static str,
        exp: i64,
    }

    fn token(secret: &str, exp: i64) -> String {
        let claims = TestClaims {
            id: "user-1",
            email: "user@example.com",
            exp,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn far_future() -> i64 {
        chrono::Utc::now().timestamp() + 3600
    }

    #[test]
    fn test_valid_token_verifies() {
        let verifier = JwtVerifier::new("secret");
        let identity = verifier.verify(&token("secret", far_future())).unwrap();
        assert_eq!(identity.id, UserId::from("user-1"));
        assert_eq!(identity.email, "user@example.com");
    }

    #[test]
    fn test_expired_token_is_distinguished() {
        let verifier = JwtVerifier::new("secret");
        let expired = chrono::Utc::now().timestamp() - 3600;
        assert_eq!(
            verifier.verify(&token("secret", expired)),
            Err(AuthError::ExpiredToken)
        );
    }

    #[test]
    fn test_wrong_secret_is_invalid() {
        let verifier = JwtVerifier::new("secret");
        assert_eq!(
            verifier.verify(&token("other-secret", far_future())),
            Err(AuthError::InvalidToken)
        );
    }

    #[test]
    fn test_garbage_token_is_invalid() {
        let verifier = JwtVerifier::new("secret");
        assert_eq!(
            verifier.verify("not-a-token"),
            Err(AuthError::InvalidToken)
        );
    }
}
