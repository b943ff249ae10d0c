//! # Custom resource definition module
//!
//! This module provides custom resource module command line interface function
//! implementation

use std::{error::Error, str::FromStr, sync::Arc};

use async_trait::async_trait;
use clap::Subcommand;
use kube::CustomResourceExt;

use crate::{
    cmd::Executor,
    svc::{cfg::Configuration, crd::oidc_provider::OIDCProvider},
};

// -----------------------------------------------------------------------------
// CustomResource enum

#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Debug)]
pub enum CustomResource {
    OIDCProvider,
}

impl FromStr for CustomResource {
    type Err = Box<dyn Error + Send + Sync>;

    #[cfg_attr(feature = "trace", tracing::instrument)]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "oidc-provider" | "oidcprovider" => Ok(Self::OIDCProvider),
            _ => Err(format!(
                "failed to parse '{s}', available options are 'oidc-provider'"
            )
            .into()),
        }
    }
}

// -----------------------------------------------------------------------------
// CustomResourceDefinitionError enum

#[derive(thiserror::Error, Debug)]
pub enum CustomResourceDefinitionError {
    #[error("failed to serialize custom resource definition, {0}")]
    Serialize(serde_yaml::Error),
}

// -----------------------------------------------------------------------------
// CustomResourceDefinition enum

#[derive(Subcommand, Clone, Debug)]
pub enum CustomResourceDefinition {
    /// View custom resource definition
    #[clap(name = "view", aliases = &["v"])]
    View {
        #[clap(name = "custom-resource")]
        custom_resource: Option<CustomResource>,
    },
}

#[async_trait]
impl Executor for CustomResourceDefinition {
    type Error = CustomResourceDefinitionError;

    #[cfg_attr(feature = "trace", tracing::instrument(skip(config)))]
    async fn execute(&self, config: Arc<Configuration>) -> Result<(), Self::Error> {
        match self {
            Self::View { custom_resource } => view(config, custom_resource).await,
        }
    }
}

// -----------------------------------------------------------------------------
// view function

/// returns the yaml documents of the requested custom resource definitions
pub fn render(
    custom_resource: &Option<CustomResource>,
) -> Result<String, CustomResourceDefinitionError> {
    let crds = match custom_resource {
        Some(CustomResource::OIDCProvider) | None => vec![serde_yaml::to_string(
            &OIDCProvider::crd(),
        )
        .map_err(CustomResourceDefinitionError::Serialize)?],
    };

    Ok(crds.join("---\n"))
}

#[cfg_attr(feature = "trace", tracing::instrument(skip(_config)))]
pub async fn view(
    _config: Arc<Configuration>,
    custom_resource: &Option<CustomResource>,
) -> Result<(), CustomResourceDefinitionError> {
    print!("{}", render(custom_resource)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_custom_resource() {
        assert_eq!(
            "OIDC-Provider".parse::<CustomResource>().ok(),
            Some(CustomResource::OIDCProvider)
        );
        assert!("postgresql".parse::<CustomResource>().is_err());
    }

    #[test]
    fn render_oidc_provider() {
        let yaml = render(&None).expect("custom resource definition to be serializable");

        assert!(yaml.contains("kind: CustomResourceDefinition"));
        assert!(yaml.contains("name: oidcproviders.config.idp.dev"));
    }
}
