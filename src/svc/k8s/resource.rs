//! # Resource module
//!
//! This module provide helpers on kubernetes [`Resource`]

use std::fmt::Debug;

use k8s_openapi::NamespaceResourceScope;
use kube::{
    api::{Patch, PatchParams},
    Api, Client, Resource, ResourceExt,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

// -----------------------------------------------------------------------------
// Helpers functions

/// returns if the resource is considered from kubernetes point of view as deleted
pub fn deleted<T>(obj: &T) -> bool
where
    T: Resource,
{
    obj.meta().deletion_timestamp.is_some()
}

/// returns the namespace and name of the kubernetes resource, the namespace
/// is empty for cluster wide resources.
pub fn namespaced_name<T>(obj: &T) -> (String, String)
where
    T: ResourceExt,
{
    (obj.namespace().unwrap_or_default(), obj.name_any())
}

/// returns differnce between the two given object serialize as json patch
pub fn diff<T>(origin: &T, modified: &T) -> Result<json_patch::Patch, serde_json::Error>
where
    T: Serialize,
{
    Ok(json_patch::diff(
        &serde_json::to_value(origin)?,
        &serde_json::to_value(modified)?,
    ))
}

/// returns the resource with the given name if any
pub async fn get<T>(client: Client, namespace: &str, name: &str) -> Result<Option<T>, kube::Error>
where
    T: Resource<Scope = NamespaceResourceScope> + DeserializeOwned + Clone + Debug,
    <T as Resource>::DynamicType: Default,
{
    debug!(
        kind = T::kind(&Default::default()).to_string(),
        namespace = namespace,
        name = name,
        "Execute a request to retrieve resource",
    );

    match Api::<T>::namespaced(client, namespace).get(name).await {
        Ok(obj) => Ok(Some(obj)),
        Err(kube::Error::Api(err)) if err.code == 404 => Ok(None),
        Err(err) => Err(err),
    }
}

/// make a patch request on the given resource using the given patch
pub async fn patch<T>(client: Client, obj: &T, patch: json_patch::Patch) -> Result<T, kube::Error>
where
    T: Resource<Scope = NamespaceResourceScope>
        + DeserializeOwned
        + Serialize
        + Clone
        + Debug,
    <T as Resource>::DynamicType: Default,
{
    let (namespace, name) = namespaced_name(obj);

    if patch.0.is_empty() {
        debug!(
            namespace = &namespace,
            name = &name,
            "Skip patch request on resource, no operation to apply",
        );

        return Ok(obj.to_owned());
    }

    debug!(
        namespace = &namespace,
        name = &name,
        patch = serde_json::to_string(&patch).unwrap_or_default(),
        "Execute patch request on resource",
    );

    Api::namespaced(client, &namespace)
        .patch(&name, &PatchParams::default(), &Patch::Json::<T>(patch))
        .await
}

/// make a patch request on the given resource's status using the given patch
pub async fn patch_status<T>(
    client: Client,
    obj: T,
    patch: json_patch::Patch,
) -> Result<T, kube::Error>
where
    T: Resource<Scope = NamespaceResourceScope>
        + DeserializeOwned
        + Serialize
        + Clone
        + Debug,
    <T as Resource>::DynamicType: Default,
{
    let (namespace, name) = namespaced_name(&obj);

    if patch.0.is_empty() {
        debug!(
            namespace = &namespace,
            name = &name,
            "Skip patch request on resource's status, no operation to apply",
        );

        return Ok(obj);
    }

    debug!(
        namespace = &namespace,
        name = &name,
        patch = serde_json::to_string(&patch).unwrap_or_default(),
        "Execute patch request on resource's status",
    );

    Api::namespaced(client, &namespace)
        .patch_status(&name, &PatchParams::default(), &Patch::Json::<T>(patch))
        .await
}

#[cfg(test)]
mod tests {
    use k8s_openapi::{api::core::v1::Secret, apimachinery::pkg::apis::meta::v1::Time};
    use kube::api::ObjectMeta;

    use super::*;

    #[test]
    fn deletion_timestamp_marks_deletion() {
        let mut secret = Secret::default();
        assert!(!deleted(&secret));

        secret.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
        assert!(deleted(&secret));
    }

    #[test]
    fn diff_only_reports_changes() {
        let origin = Secret {
            metadata: ObjectMeta {
                name: Some("some-secret".into()),
                namespace: Some("some-namespace".into()),
                ..Default::default()
            },
            ..Default::default()
        };

        let patch = diff(&origin, &origin).expect("secret to be serializable");
        assert!(patch.0.is_empty());

        let mut modified = origin.to_owned();
        modified.type_ = Some("secrets.idp.dev/symmetric".into());

        let patch = diff(&origin, &modified).expect("secret to be serializable");
        assert_eq!(patch.0.len(), 1);
    }

    #[test]
    fn namespaced_name_of_cluster_resource() {
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some("some-secret".into()),
                ..Default::default()
            },
            ..Default::default()
        };

        assert_eq!(
            namespaced_name(&secret),
            (String::new(), "some-secret".to_string())
        );
    }
}
