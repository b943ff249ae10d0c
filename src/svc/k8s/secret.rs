//! # Secret module
//!
//! This module provide helpers to persist the secrets produced by the secret
//! helpers. Secret names are deterministic, so two reconciliations racing on
//! the same object end on the same name, a conflict is resolved by reading
//! the stored secret back.

use k8s_openapi::api::core::v1::Secret;
use kube::{api::PostParams, Api, Client, ResourceExt};
use tracing::debug;

use crate::svc::k8s::resource;

/// returns if the error is a conflict reported by the kubernetes api
pub fn conflict(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(err) if err.code == 409)
}

/// create the secret, or replace the existing one in place. If another writer
/// won the race, the stored secret is returned so that the caller validates
/// it again.
pub async fn upsert(
    client: Client,
    existing: Option<&Secret>,
    mut secret: Secret,
) -> Result<Secret, kube::Error> {
    let (namespace, name) = resource::namespaced_name(&secret);
    let api: Api<Secret> = Api::namespaced(client, &namespace);

    let result = match existing {
        Some(existing) => {
            debug!(
                kind = "Secret",
                namespace = &namespace,
                name = &name,
                "Execute a request to replace a secret",
            );

            secret.metadata.resource_version = existing.resource_version();
            api.replace(&name, &PostParams::default(), &secret).await
        }
        None => {
            debug!(
                kind = "Secret",
                namespace = &namespace,
                name = &name,
                "Execute a request to create a secret",
            );

            api.create(&PostParams::default(), &secret).await
        }
    };

    match result {
        Err(err) if conflict(&err) => {
            debug!(
                kind = "Secret",
                namespace = &namespace,
                name = &name,
                "Secret has been written concurrently, read it back",
            );

            api.get(&name).await
        }
        result => result,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use hyper::{Method, StatusCode};
    use k8s_openapi::ByteString;
    use kube::{api::ObjectMeta, error::ErrorResponse};
    use serde_json::json;

    use super::*;
    use crate::svc::k8s::mock::{failure, ApiServer, Reply};

    const SECRETS_PATH: &str = "/api/v1/namespaces/idp-system/secrets";
    const SECRET_PATH: &str = "/api/v1/namespaces/idp-system/secrets/idp-token-signing-key-uid";

    fn secret(resource_version: Option<&str>, key: u8) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some("idp-token-signing-key-uid".into()),
                namespace: Some("idp-system".into()),
                resource_version: resource_version.map(String::from),
                ..Default::default()
            },
            type_: Some("secrets.idp.dev/symmetric".into()),
            data: Some(BTreeMap::from([("key".to_string(), ByteString(vec![key; 32]))])),
            ..Default::default()
        }
    }

    fn to_json(secret: &Secret) -> serde_json::Value {
        serde_json::to_value(secret).expect("secret to be serializable")
    }

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".into(),
            message: "some message".into(),
            reason: "some reason".into(),
            code,
        })
    }

    #[test]
    fn only_409_is_a_conflict() {
        assert!(conflict(&api_error(409)));
        assert!(!conflict(&api_error(404)));
        assert!(!conflict(&api_error(500)));
    }

    #[tokio::test]
    async fn missing_secret_is_created() {
        let server = ApiServer::default().expect(
            Method::POST,
            SECRETS_PATH,
            StatusCode::CREATED,
            Reply::Echo,
        );

        let stored = upsert(server.client(), None, secret(None, 1))
            .await
            .expect("secret to be created");

        assert_eq!(stored, secret(None, 1));
        assert_eq!(server.remaining(), 0);
    }

    #[tokio::test]
    async fn existing_secret_is_replaced_with_its_resource_version() {
        let server = ApiServer::default().expect(
            Method::PUT,
            SECRET_PATH,
            StatusCode::OK,
            Reply::Echo,
        );

        let existing = secret(Some("42"), 0);
        let stored = upsert(server.client(), Some(&existing), secret(None, 1))
            .await
            .expect("secret to be replaced");

        assert_eq!(stored, secret(Some("42"), 1));
        assert_eq!(
            server.requests()[0].body["metadata"]["resourceVersion"],
            json!("42")
        );
    }

    #[tokio::test]
    async fn conflict_reads_back_the_stored_secret() {
        let winner = secret(Some("7"), 2);
        let server = ApiServer::default()
            .expect(
                Method::POST,
                SECRETS_PATH,
                StatusCode::CONFLICT,
                Reply::Json(failure(StatusCode::CONFLICT, "secret already exists")),
            )
            .expect(
                Method::GET,
                SECRET_PATH,
                StatusCode::OK,
                Reply::Json(to_json(&winner)),
            );

        let stored = upsert(server.client(), None, secret(None, 1))
            .await
            .expect("stored secret to be read back");

        assert_eq!(stored, winner);
        assert_eq!(server.remaining(), 0);
    }

    #[tokio::test]
    async fn other_failures_are_returned() {
        let server = ApiServer::default().expect(
            Method::POST,
            SECRETS_PATH,
            StatusCode::FORBIDDEN,
            Reply::Json(failure(StatusCode::FORBIDDEN, "secrets is forbidden")),
        );

        match upsert(server.client(), None, secret(None, 1)).await {
            Err(kube::Error::Api(err)) => assert_eq!(err.code, 403),
            other => panic!("expected a forbidden error, got {other:?}"),
        }
    }
}
