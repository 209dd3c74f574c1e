//! Contract for the external identity provider.
//!
//! The signaling layer never issues credentials; it only verifies opaque
//! bearer tokens through this interface and receives back the user id the
//! provider minted at signup.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::UserId;

/// Identity returned by a successful credential verification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub id: UserId,
    pub email: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("token is not valid")]
    InvalidToken,

    #[error("token has expired")]
    ExpiredToken,
}

/// Verifies an opaque bearer credential.
pub trait IdentityProvider: Send + Sync {
    fn verify(&self, token: &str) -> Result<VerifiedIdentity, AuthError>;
}
