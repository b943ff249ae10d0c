//! # Finalizer module
//!
//! This module provide helpers methods to interact with kubernetes' resource
//! finalizer. The operator holds a finalizer on each oidc provider so that
//! its live keys are released before the object goes away.

use kube::Resource;

/// returns if there is the given finalizer on the resource
pub fn contains<T>(obj: &T, finalizer: &str) -> bool
where
    T: Resource,
{
    obj.meta()
        .finalizers
        .as_ref()
        .map(|finalizers| finalizers.iter().any(|f| f == finalizer))
        .unwrap_or(false)
}

/// add finalizer to the resource, if not already present
pub fn add<T>(mut obj: T, finalizer: &str) -> T
where
    T: Resource,
{
    let finalizers = obj.meta_mut().finalizers.get_or_insert_with(Vec::new);
    if !finalizers.iter().any(|f| f == finalizer) {
        finalizers.push(finalizer.to_string());
    }

    obj
}

/// remove finalizer from the resource
pub fn remove<T>(mut obj: T, finalizer: &str) -> T
where
    T: Resource,
{
    if let Some(finalizers) = obj.meta_mut().finalizers.as_mut() {
        finalizers.retain(|f| f != finalizer);
    }

    obj
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::Secret;

    use super::*;

    const FINALIZER: &str = "config.idp.dev/keyring";

    #[test]
    fn add_is_idempotent() {
        let obj = add(Secret::default(), FINALIZER);
        assert!(contains(&obj, FINALIZER));

        let obj = add(obj, FINALIZER);
        assert_eq!(obj.metadata.finalizers, Some(vec![FINALIZER.to_string()]));
    }

    #[test]
    fn remove_keeps_other_finalizers() {
        let mut obj = Secret::default();
        obj.metadata.finalizers = Some(vec!["kubernetes".into(), FINALIZER.into()]);

        let obj = remove(obj, FINALIZER);

        assert!(!contains(&obj, FINALIZER));
        assert_eq!(obj.metadata.finalizers, Some(vec!["kubernetes".to_string()]));
    }

    #[test]
    fn nothing_to_remove_without_finalizers() {
        let obj = remove(Secret::default(), FINALIZER);

        assert!(!contains(&obj, FINALIZER));
        assert_eq!(obj.metadata.finalizers, None);
    }
}
