//! # Owner module
//!
//! This module provide helpers to build and check the owner reference binding
//! a generated secret to its parent custom resource.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{CustomResourceExt, Resource, ResourceExt};

/// returns a controller owner reference pointing to the given resource, the
/// cascade deletion of kubernetes applies to the objects holding it
pub fn reference<T>(obj: &T) -> OwnerReference
where
    T: ResourceExt + CustomResourceExt,
{
    let api_resource = T::api_resource();

    OwnerReference {
        api_version: api_resource.api_version,
        block_owner_deletion: Some(true),
        controller: Some(true),
        kind: api_resource.kind,
        name: obj.name_any(),
        uid: obj.uid().unwrap_or_default(),
    }
}

/// returns if the child is controlled by the given parent. The controller
/// reference has to match the unique identifier, the kind and the api version
/// of the parent, a matching name is not enough.
pub fn is_controlled_by<C, T>(child: &C, parent: &T) -> bool
where
    C: Resource,
    T: ResourceExt + CustomResourceExt,
{
    let uid = match parent.uid() {
        Some(uid) if !uid.is_empty() => uid,
        _ => return false,
    };

    let api_resource = T::api_resource();

    child
        .meta()
        .owner_references
        .iter()
        .flatten()
        .find(|owner| owner.controller == Some(true))
        .map(|owner| {
            owner.uid == uid
                && owner.kind == api_resource.kind
                && owner.api_version == api_resource.api_version
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::Secret;
    use kube::api::ObjectMeta;

    use super::*;
    use crate::svc::crd::oidc_provider::{OIDCProvider, Spec};

    fn parent(uid: &str) -> OIDCProvider {
        OIDCProvider {
            metadata: ObjectMeta {
                name: Some("some-parent-name".into()),
                namespace: Some("some-namespace".into()),
                uid: Some(uid.into()),
                ..Default::default()
            },
            spec: Spec {
                issuer: "https://issuer.example.com".into(),
            },
            status: None,
        }
    }

    fn child(owner: OwnerReference) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some("some-child".into()),
                namespace: Some("some-namespace".into()),
                owner_references: Some(vec![owner]),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn reference_points_to_the_parent() {
        let owner = reference(&parent("some-parent-uid"));

        assert_eq!(owner.api_version, "config.idp.dev/v1alpha1");
        assert_eq!(owner.kind, "OIDCProvider");
        assert_eq!(owner.name, "some-parent-name");
        assert_eq!(owner.uid, "some-parent-uid");
        assert_eq!(owner.controller, Some(true));
        assert_eq!(owner.block_owner_deletion, Some(true));
    }

    #[test]
    fn child_is_controlled_by_its_parent() {
        let p = parent("some-parent-uid");

        assert!(is_controlled_by(&child(reference(&p)), &p));
    }

    #[test]
    fn same_name_with_another_uid_is_not_owned() {
        let previous = parent("previous-uid");
        let current = parent("current-uid");

        assert!(!is_controlled_by(&child(reference(&previous)), &current));
    }

    #[test]
    fn kind_and_api_version_must_match() {
        let p = parent("some-parent-uid");

        let mut owner = reference(&p);
        owner.kind = "Deployment".into();
        assert!(!is_controlled_by(&child(owner), &p));

        let mut owner = reference(&p);
        owner.api_version = "config.idp.dev/v1beta1".into();
        assert!(!is_controlled_by(&child(owner), &p));
    }

    #[test]
    fn non_controller_reference_does_not_own() {
        let p = parent("some-parent-uid");
        let mut owner = reference(&p);
        owner.controller = None;

        assert!(!is_controlled_by(&child(owner), &p));
    }

    #[test]
    fn parent_without_uid_owns_nothing() {
        let p = parent("");

        assert!(!is_controlled_by(&child(reference(&p)), &p));
        assert!(!is_controlled_by(&Secret::default(), &p));
    }
}
