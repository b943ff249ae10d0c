//! # Helper module
//!
//! This module provide the [`SecretHelper`], it generates, validates and
//! observes the managed secret of one usage for an oidc provider. It performs
//! no input/output, the caller persists what it produces.

use std::{
    collections::BTreeMap,
    fmt::{self, Debug, Formatter},
    sync::Arc,
};

use k8s_openapi::{api::core::v1::Secret, ByteString};
use kube::{api::ObjectMeta, ResourceExt};

use crate::svc::{
    crd::oidc_provider::{OIDCProvider, SecretReference},
    generator::{
        owner,
        random::RandomSource,
        usage::{SecretUsage, SYMMETRIC_SECRET_DATA_KEY},
        Error,
    },
};

// -----------------------------------------------------------------------------
// Types

/// callback receiving the issuer and the raw key bytes each time the active
/// secret of a usage is observed
pub type Notify = Arc<dyn Fn(&str, &[u8]) + Send + Sync>;

// -----------------------------------------------------------------------------
// SecretHelper structure

#[derive(Clone)]
pub struct SecretHelper {
    prefix: String,
    labels: BTreeMap<String, String>,
    random: Arc<dyn RandomSource>,
    usage: SecretUsage,
    notify: Notify,
}

impl Debug for SecretHelper {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretHelper")
            .field("prefix", &self.prefix)
            .field("labels", &self.labels)
            .field("usage", &self.usage)
            .finish_non_exhaustive()
    }
}

impl SecretHelper {
    pub fn new(
        prefix: impl Into<String>,
        labels: BTreeMap<String, String>,
        random: Arc<dyn RandomSource>,
        usage: SecretUsage,
        notify: Notify,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            labels,
            random,
            usage,
            notify,
        }
    }

    pub fn usage(&self) -> SecretUsage {
        self.usage
    }

    /// returns the name of the secret of this usage for the given parent, it
    /// only depends on the prefix and the parent's unique identifier
    pub fn name(&self, parent: &OIDCProvider) -> String {
        format!("{}{}", self.prefix, parent.uid().unwrap_or_default())
    }

    /// returns a new secret with fresh key material for the given parent
    pub fn generate(&self, parent: &OIDCProvider) -> Result<Secret, Error> {
        let mut key = vec![0u8; self.usage.key_length()];
        self.random
            .read(&mut key)
            .map_err(|err| Error::Random(self.usage, err))?;

        let labels = if self.labels.is_empty() {
            None
        } else {
            Some(self.labels.to_owned())
        };

        Ok(Secret {
            metadata: ObjectMeta {
                name: Some(self.name(parent)),
                namespace: parent.namespace(),
                labels,
                owner_references: Some(vec![owner::reference(parent)]),
                ..Default::default()
            },
            type_: Some(self.usage.secret_type().to_string()),
            data: Some(BTreeMap::from([(
                SYMMETRIC_SECRET_DATA_KEY.to_string(),
                ByteString(key),
            )])),
            ..Default::default()
        })
    }

    /// returns if the child could be used as the active secret of the parent
    pub fn is_valid(&self, parent: &OIDCProvider, child: &Secret) -> bool {
        if child.type_.as_deref() != Some(self.usage.secret_type()) {
            return false;
        }

        let key = match key(child) {
            Some(key) => key,
            None => return false,
        };

        if key.len() < self.usage.key_length() {
            return false;
        }

        owner::is_controlled_by(child, parent)
    }

    /// records the child as the active secret of this usage in the parent's
    /// status and hands its key material to the notification callback. The
    /// child must have been validated or generated by this helper.
    pub fn observe_active_secret_and_update_parent(
        &self,
        parent: &mut OIDCProvider,
        child: &Secret,
    ) {
        let status = parent.status.get_or_insert_with(Default::default);

        *self.usage.reference_mut(&mut status.secrets) = Some(SecretReference {
            name: child.name_any(),
        });

        (self.notify)(&parent.spec.issuer, key(child).unwrap_or_default());
    }
}

fn key(secret: &Secret) -> Option<&[u8]> {
    secret
        .data
        .as_ref()
        .and_then(|data| data.get(SYMMETRIC_SECRET_DATA_KEY))
        .map(|bytes| bytes.0.as_slice())
}
