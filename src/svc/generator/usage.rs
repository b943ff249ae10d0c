//! # Usage module
//!
//! This module provide the registry of purposes that key material could
//! serve. Everything that differs between two usages is data held here, the
//! secret helper does not branch on the usage.

use std::fmt::{self, Display, Formatter};

use crate::svc::crd::oidc_provider::{SecretReference, Secrets};

// -----------------------------------------------------------------------------
// Constants

/// type of the kubernetes secrets holding symmetric key material
pub const SYMMETRIC_SECRET_TYPE: &str = "secrets.idp.dev/symmetric";

/// name of the single data field holding the raw key bytes
pub const SYMMETRIC_SECRET_DATA_KEY: &str = "key";

/// number of bytes of a generated symmetric key, also the minimum accepted
pub const SYMMETRIC_KEY_LENGTH: usize = 32;

// -----------------------------------------------------------------------------
// SecretUsage enumeration

#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Debug)]
pub enum SecretUsage {
    TokenSigningKey,
    StateSigningKey,
    StateEncryptionKey,
}

impl SecretUsage {
    pub const ALL: [Self; 3] = [
        Self::TokenSigningKey,
        Self::StateSigningKey,
        Self::StateEncryptionKey,
    ];

    pub const fn secret_type(&self) -> &'static str {
        match self {
            Self::TokenSigningKey | Self::StateSigningKey | Self::StateEncryptionKey => {
                SYMMETRIC_SECRET_TYPE
            }
        }
    }

    pub const fn key_length(&self) -> usize {
        match self {
            Self::TokenSigningKey | Self::StateSigningKey | Self::StateEncryptionKey => {
                SYMMETRIC_KEY_LENGTH
            }
        }
    }

    /// returns the status field recording the active secret of this usage
    pub fn reference<'a>(&self, secrets: &'a Secrets) -> &'a Option<SecretReference> {
        match self {
            Self::TokenSigningKey => &secrets.token_signing_key,
            Self::StateSigningKey => &secrets.state_signing_key,
            Self::StateEncryptionKey => &secrets.state_encryption_key,
        }
    }

    pub fn reference_mut<'a>(&self, secrets: &'a mut Secrets) -> &'a mut Option<SecretReference> {
        match self {
            Self::TokenSigningKey => &mut secrets.token_signing_key,
            Self::StateSigningKey => &mut secrets.state_signing_key,
            Self::StateEncryptionKey => &mut secrets.state_encryption_key,
        }
    }
}

impl Display for SecretUsage {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::TokenSigningKey => write!(f, "token-signing-key"),
            Self::StateSigningKey => write!(f, "state-signing-key"),
            Self::StateEncryptionKey => write!(f, "state-encryption-key"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_usage_records_into_its_own_status_field() {
        let mut secrets = Secrets::default();

        for usage in SecretUsage::ALL {
            *usage.reference_mut(&mut secrets) = Some(SecretReference {
                name: usage.to_string(),
            });
        }

        assert_eq!(
            secrets.token_signing_key.map(|r| r.name).as_deref(),
            Some("token-signing-key")
        );
        assert_eq!(
            secrets.state_signing_key.map(|r| r.name).as_deref(),
            Some("state-signing-key")
        );
        assert_eq!(
            secrets.state_encryption_key.map(|r| r.name).as_deref(),
            Some("state-encryption-key")
        );
    }

    #[test]
    fn symmetric_usages_share_type_and_length() {
        for usage in SecretUsage::ALL {
            assert_eq!(usage.secret_type(), "secrets.idp.dev/symmetric");
            assert_eq!(usage.key_length(), 32);
        }
    }
}
