//! # Keyring module
//!
//! This module provide the live key material read by signers and encryptors
//! on the request path. Secret helpers write into it through the callback
//! returned by [`Keyring::sink`]; each key is swapped as a whole, so readers
//! see either the previous or the next key.
//!
//! An issuer is claimed by a single oidc provider, identified by its unique
//! identifier, before its keys are observed. The claim keeps two providers
//! from serving each other's keys and lets the keys of an issuer be dropped
//! when its provider moves to another issuer or goes away.

use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use crate::svc::generator::{Notify, SecretUsage};

// -----------------------------------------------------------------------------
// Error enumeration

#[derive(thiserror::Error, PartialEq, Eq, Clone, Debug)]
pub enum Error {
    #[error("issuer '{issuer}' is already served by the oidc provider with uid '{owner}'")]
    DuplicateIssuer { issuer: String, owner: String },
}

// -----------------------------------------------------------------------------
// Keyring structure

#[derive(Default, Debug)]
struct Entries {
    keys: HashMap<(String, SecretUsage), Arc<[u8]>>,
    /// issuer claimed by each oidc provider, keyed by uid
    claims: HashMap<String, String>,
}

impl Entries {
    fn forget(&mut self, issuer: &str) {
        self.keys.retain(|(i, _), _| i != issuer);
    }
}

#[derive(Default, Debug)]
pub struct Keyring {
    entries: RwLock<Entries>,
}

impl Keyring {
    /// replace the key of the usage for the issuer
    pub fn set(&self, usage: SecretUsage, issuer: &str, key: &[u8]) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .keys
            .insert((issuer.to_string(), usage), Arc::from(key));
    }

    /// returns the active key of the usage for the issuer
    pub fn get(&self, usage: SecretUsage, issuer: &str) -> Option<Arc<[u8]>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys
            .get(&(issuer.to_string(), usage))
            .cloned()
    }

    /// records that the oidc provider with the given uid serves the issuer.
    /// Fails if another provider already claimed it. The keys of the issuer
    /// previously claimed by the provider are dropped.
    pub fn claim(&self, uid: &str, issuer: &str) -> Result<(), Error> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        if let Some((owner, _)) = entries
            .claims
            .iter()
            .find(|(owner, claimed)| owner.as_str() != uid && claimed.as_str() == issuer)
        {
            return Err(Error::DuplicateIssuer {
                issuer: issuer.to_string(),
                owner: owner.to_owned(),
            });
        }

        if let Some(previous) = entries.claims.insert(uid.to_string(), issuer.to_string()) {
            if previous != issuer {
                entries.forget(&previous);
            }
        }

        Ok(())
    }

    /// drop the claim of the oidc provider with the given uid and every key
    /// of the issuer it served
    pub fn release(&self, uid: &str) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(issuer) = entries.claims.remove(uid) {
            entries.forget(&issuer);
        }
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// returns the callback to give to the secret helper of the usage
    pub fn sink(self: &Arc<Self>, usage: SecretUsage) -> Notify {
        let keyring = Arc::clone(self);

        Arc::new(move |issuer: &str, key: &[u8]| keyring.set(usage, issuer, key))
    }
}
