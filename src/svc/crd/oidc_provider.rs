//! # OIDCProvider custom resource
//!
//! This module provide the oidc provider custom resource, its definition and
//! the reconciliation loop keeping its key material alive.

use std::{
    fmt::{self, Display, Formatter},
    sync::Arc,
};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::{
    runtime::{controller, watcher, Controller},
    Api, CustomResource, Resource, ResourceExt,
};
#[cfg(feature = "metrics")]
use once_cell::sync::Lazy;
#[cfg(feature = "metrics")]
use prometheus::{opts, register_counter_vec, CounterVec};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::svc::{
    generator::{self, SecretUsage},
    k8s::{self, finalizer, recorder, resource, secret, Context, ControllerBuilder},
    keyring,
};

// -----------------------------------------------------------------------------
// Telemetry

#[cfg(feature = "metrics")]
static SECRET_GENERATED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        opts!(
            "idp_operator_secret_generated",
            "number of secrets generated with fresh key material"
        ),
        &["usage"]
    )
    .expect("metrics 'idp_operator_secret_generated' to not be already registered")
});

// -----------------------------------------------------------------------------
// Spec structure

#[derive(CustomResource, JsonSchema, Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
#[kube(group = "config.idp.dev")]
#[kube(version = "v1alpha1")]
#[kube(kind = "OIDCProvider")]
#[kube(singular = "oidcprovider")]
#[kube(plural = "oidcproviders")]
#[kube(shortname = "op")]
#[kube(status = "Status")]
#[kube(namespaced)]
#[kube(derive = "PartialEq")]
#[kube(
    printcolumn = r#"{"name":"issuer", "type":"string", "description":"Issuer", "jsonPath":".spec.issuer"}"#
)]
pub struct Spec {
    #[serde(rename = "issuer")]
    pub issuer: String,
}

// -----------------------------------------------------------------------------
// Status structure

#[derive(JsonSchema, Serialize, Deserialize, PartialEq, Eq, Clone, Debug, Default)]
pub struct Status {
    #[serde(rename = "secrets", default)]
    pub secrets: Secrets,
}

/// names of the active secrets, one per usage
#[derive(JsonSchema, Serialize, Deserialize, PartialEq, Eq, Clone, Debug, Default)]
pub struct Secrets {
    #[serde(
        rename = "tokenSigningKey",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub token_signing_key: Option<SecretReference>,
    #[serde(
        rename = "stateSigningKey",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub state_signing_key: Option<SecretReference>,
    #[serde(
        rename = "stateEncryptionKey",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub state_encryption_key: Option<SecretReference>,
}

#[derive(JsonSchema, Serialize, Deserialize, PartialEq, Eq, Clone, Debug, Default)]
pub struct SecretReference {
    #[serde(rename = "name")]
    pub name: String,
}

// -----------------------------------------------------------------------------
// Constants

/// finalizer held on oidc providers until their live keys are released
pub const KEYRING_FINALIZER: &str = "config.idp.dev/keyring";

// -----------------------------------------------------------------------------
// Action structure

#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Debug)]
pub enum Action {
    UpsertFinalizer,
    DeleteFinalizer,
    RejectIssuer,
    GenerateSecret,
    RejectSecret,
    UpdateStatus,
}

impl Display for Action {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::UpsertFinalizer => write!(f, "UpsertFinalizer"),
            Self::DeleteFinalizer => write!(f, "DeleteFinalizer"),
            Self::RejectIssuer => write!(f, "RejectIssuer"),
            Self::GenerateSecret => write!(f, "GenerateSecret"),
            Self::RejectSecret => write!(f, "RejectSecret"),
            Self::UpdateStatus => write!(f, "UpdateStatus"),
        }
    }
}

// -----------------------------------------------------------------------------
// ReconcilerError enum

#[derive(thiserror::Error, Debug)]
pub enum ReconcilerError {
    #[error("failed to reconcile resource, {0}")]
    Reconcile(String),
    #[error("failed to generate secret, {0}")]
    Generate(generator::Error),
    #[error("failed to claim issuer, {0}")]
    DuplicateIssuer(keyring::Error),
    #[error("secret '{1}' stored for usage '{0}' is not valid after a concurrent write")]
    InvalidSecret(SecretUsage, String),
    #[error("failed to execute request on kubernetes api, {0}")]
    KubeClient(kube::Error),
    #[error("failed to compute diff between the original and modified object, {0}")]
    Diff(serde_json::Error),
}

impl From<kube::Error> for ReconcilerError {
    #[cfg_attr(feature = "trace", tracing::instrument)]
    fn from(err: kube::Error) -> Self {
        Self::KubeClient(err)
    }
}

impl From<generator::Error> for ReconcilerError {
    #[cfg_attr(feature = "trace", tracing::instrument)]
    fn from(err: generator::Error) -> Self {
        Self::Generate(err)
    }
}

impl From<controller::Error<Self, watcher::Error>> for ReconcilerError {
    #[cfg_attr(feature = "trace", tracing::instrument)]
    fn from(err: controller::Error<ReconcilerError, watcher::Error>) -> Self {
        Self::Reconcile(err.to_string())
    }
}

// -----------------------------------------------------------------------------
// Reconciler structure

#[derive(Clone, Default, Debug)]
pub struct Reconciler {}

impl ControllerBuilder<OIDCProvider> for Reconciler {
    fn build(&self, context: Arc<Context>) -> Controller<OIDCProvider> {
        let client = context.kube.to_owned();
        let secret = Api::<Secret>::all(client.to_owned());

        let mut config = watcher::Config::default();
        if !context.config.secrets.labels.is_empty() {
            config = config.labels(&k8s::selector(&context.config.secrets.labels));
        }

        Controller::new(Api::all(client), watcher::Config::default()).owns(secret, config)
    }
}

#[async_trait]
impl k8s::Reconciler<OIDCProvider> for Reconciler {
    type Error = ReconcilerError;

    async fn upsert(ctx: Arc<Context>, origin: Arc<OIDCProvider>) -> Result<(), ReconcilerError> {
        let Context {
            kube,
            helpers,
            keyring,
            ..
        } = ctx.as_ref();

        let kind = OIDCProvider::kind(&()).to_string();
        let (namespace, name) = resource::namespaced_name(&*origin);
        let uid = origin.uid().unwrap_or_default();

        // ---------------------------------------------------------------------
        // Step 1: set finalizer
        let origin = if finalizer::contains(&*origin, KEYRING_FINALIZER) {
            (*origin).to_owned()
        } else {
            info!(
                kind = &kind,
                namespace = &namespace,
                name = &name,
                "Set finalizer on custom resource",
            );

            let modified = finalizer::add((*origin).to_owned(), KEYRING_FINALIZER);
            let patch = resource::diff(&*origin, &modified).map_err(ReconcilerError::Diff)?;
            let modified = resource::patch(kube.to_owned(), &modified, patch).await?;

            let action = &Action::UpsertFinalizer;
            let message = &format!("Create finalizer '{KEYRING_FINALIZER}'");
            recorder::normal(kube.to_owned(), &modified, action, message).await?;

            modified
        };

        // ---------------------------------------------------------------------
        // Step 2: claim the issuer, live keys of an issuer belong to a single
        // custom resource
        if let Err(err) = keyring.claim(&uid, &origin.spec.issuer) {
            warn!(
                kind = &kind,
                namespace = &namespace,
                name = &name,
                issuer = &origin.spec.issuer,
                error = err.to_string(),
                "Issuer of custom resource is already served",
            );

            let action = &Action::RejectIssuer;
            let message = &format!("Reject issuer '{}', {err}", origin.spec.issuer);
            recorder::warning(kube.to_owned(), &origin, action, message).await?;

            return Err(ReconcilerError::DuplicateIssuer(err));
        }

        let mut modified = origin.to_owned();

        // ---------------------------------------------------------------------
        // Step 3: reuse, or generate and persist, one secret per usage
        for helper in helpers {
            let usage = helper.usage();
            let secret_name = helper.name(&modified);

            let existing: Option<Secret> =
                resource::get(kube.to_owned(), &namespace, &secret_name).await?;

            let active = match existing {
                Some(s) if helper.is_valid(&modified, &s) => {
                    debug!(
                        kind = &kind,
                        namespace = &namespace,
                        name = &name,
                        usage = usage.to_string(),
                        secret = &secret_name,
                        "Reuse valid secret for custom resource",
                    );

                    s
                }
                existing => {
                    info!(
                        kind = &kind,
                        namespace = &namespace,
                        name = &name,
                        usage = usage.to_string(),
                        secret = &secret_name,
                        replace = existing.is_some(),
                        "Generate secret for custom resource",
                    );

                    let generated = helper.generate(&modified)?;
                    let stored =
                        secret::upsert(kube.to_owned(), existing.as_ref(), generated).await?;

                    if !helper.is_valid(&modified, &stored) {
                        warn!(
                            kind = &kind,
                            namespace = &namespace,
                            name = &name,
                            usage = usage.to_string(),
                            secret = &secret_name,
                            "Secret written concurrently is not valid",
                        );

                        let action = &Action::RejectSecret;
                        let message = &format!(
                            "Reject kubernetes secret '{secret_name}' for usage '{usage}'"
                        );
                        recorder::warning(kube.to_owned(), &modified, action, message).await?;

                        return Err(ReconcilerError::InvalidSecret(usage, secret_name));
                    }

                    #[cfg(feature = "metrics")]
                    SECRET_GENERATED
                        .with_label_values(&[&usage.to_string()])
                        .inc();

                    let action = &Action::GenerateSecret;
                    let message = &format!(
                        "Generate kubernetes secret '{}' for usage '{usage}'",
                        stored.name_any()
                    );
                    recorder::normal(kube.to_owned(), &modified, action, message).await?;

                    stored
                }
            };

            let previous = origin
                .status
                .as_ref()
                .and_then(|status| usage.reference(&status.secrets).to_owned())
                .map(|reference| reference.name);

            if previous.as_deref() != Some(active.name_any().as_str()) {
                info!(
                    kind = &kind,
                    namespace = &namespace,
                    name = &name,
                    usage = usage.to_string(),
                    previous = previous.unwrap_or_default(),
                    secret = active.name_any(),
                    "Switch active secret of custom resource",
                );
            }

            helper.observe_active_secret_and_update_parent(&mut modified, &active);
        }

        // ---------------------------------------------------------------------
        // Step 4: persist the status
        let patch = resource::diff(&origin, &modified).map_err(ReconcilerError::Diff)?;
        if patch.0.is_empty() {
            debug!(
                kind = &kind,
                namespace = &namespace,
                name = &name,
                "Status of custom resource is up to date",
            );

            return Ok(());
        }

        debug!(
            kind = &kind,
            namespace = &namespace,
            name = &name,
            "Update status of custom resource",
        );

        let modified = resource::patch_status(kube.to_owned(), modified, patch).await?;

        let action = &Action::UpdateStatus;
        let message = "Update active secrets of custom resource";
        recorder::normal(kube.to_owned(), &modified, action, message).await?;

        Ok(())
    }

    async fn delete(ctx: Arc<Context>, origin: Arc<OIDCProvider>) -> Result<(), ReconcilerError> {
        let Context { kube, keyring, .. } = ctx.as_ref();

        let kind = OIDCProvider::kind(&()).to_string();
        let (namespace, name) = resource::namespaced_name(&*origin);

        // ---------------------------------------------------------------------
        // Step 1: release the live keys, secrets are removed by the garbage
        // collector through their owner reference
        info!(
            kind = &kind,
            namespace = &namespace,
            name = &name,
            issuer = &origin.spec.issuer,
            "Release live keys of custom resource",
        );

        keyring.release(&origin.uid().unwrap_or_default());

        // ---------------------------------------------------------------------
        // Step 2: remove the finalizer
        if !finalizer::contains(&*origin, KEYRING_FINALIZER) {
            return Ok(());
        }

        info!(
            kind = &kind,
            namespace = &namespace,
            name = &name,
            "Remove finalizer on custom resource",
        );

        let action = &Action::DeleteFinalizer;
        let message = "Delete finalizer from custom resource";
        recorder::normal(kube.to_owned(), &*origin, action, message).await?;

        let modified = finalizer::remove((*origin).to_owned(), KEYRING_FINALIZER);
        let patch = resource::diff(&*origin, &modified).map_err(ReconcilerError::Diff)?;
        resource::patch(kube.to_owned(), &modified, patch).await?;

        Ok(())
    }
}
