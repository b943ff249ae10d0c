//! # Configuration module
//!
//! This module provide utilities and helpers to interact with the configuration

use std::{collections::BTreeMap, convert::TryFrom, env, net::SocketAddr, path::PathBuf};

use config::{builder::DefaultState, Config, ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::svc::generator::SecretUsage;

// -----------------------------------------------------------------------------
// Constants

pub const DEFAULT_LISTEN: &str = "0.0.0.0:8000";
pub const DEFAULT_SECRET_PREFIX: &str = "idp-";

// -----------------------------------------------------------------------------
// Operator structure

#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
pub struct Operator {
    #[serde(rename = "listen")]
    pub listen: SocketAddr,
}

// -----------------------------------------------------------------------------
// Secrets structure

#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
pub struct Secrets {
    #[serde(rename = "prefix")]
    pub prefix: String,
    #[serde(rename = "labels", default)]
    pub labels: BTreeMap<String, String>,
}

impl Secrets {
    /// returns the prefix of the names of the secrets of the given usage
    pub fn prefix(&self, usage: SecretUsage) -> String {
        format!("{}{}-", self.prefix, usage)
    }
}

// -----------------------------------------------------------------------------
// Jaeger structure

#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
pub struct Jaeger {
    #[serde(rename = "endpoint")]
    pub endpoint: String,
}

// -----------------------------------------------------------------------------
// Error enum

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to build configuration from file '{0:?}', {1}")]
    File(PathBuf, ConfigError),
    #[error("failed to build configuration, {0}")]
    Build(ConfigError),
    #[error("failed to deserialize configuration, {0}")]
    Cast(ConfigError),
    #[error("failed to set default for key '{0}', {1}")]
    Default(String, ConfigError),
}

// -----------------------------------------------------------------------------
// Configuration structures

#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
pub struct Configuration {
    #[serde(rename = "operator")]
    pub operator: Operator,
    #[serde(rename = "secrets")]
    pub secrets: Secrets,
    #[serde(rename = "jaeger", default)]
    pub jaeger: Option<Jaeger>,
}

impl TryFrom<PathBuf> for Configuration {
    type Error = Error;

    fn try_from(path: PathBuf) -> Result<Self, Self::Error> {
        builder()?
            .add_source(File::from(path.to_owned()).required(true))
            .add_source(environment())
            .build()
            .map_err(|err| Error::File(path, err))?
            .try_deserialize()
            .map_err(Error::Cast)
    }
}

impl Configuration {
    pub fn try_default() -> Result<Self, Error> {
        let mut builder = builder()?;

        for path in search_paths() {
            builder = builder.add_source(File::from(path).required(false));
        }

        builder
            .add_source(environment())
            .build()
            .map_err(Error::Build)?
            .try_deserialize()
            .map_err(Error::Cast)
    }
}

/// returns a builder holding the defaults
fn builder() -> Result<ConfigBuilder<DefaultState>, Error> {
    Config::builder()
        .set_default("operator.listen", DEFAULT_LISTEN)
        .map_err(|err| Error::Default("operator.listen".into(), err))?
        .set_default("secrets.prefix", DEFAULT_SECRET_PREFIX)
        .map_err(|err| Error::Default("secrets.prefix".into(), err))
}

/// returns the environment source, it overrides values read from files
fn environment() -> Environment {
    Environment::with_prefix(&env!("CARGO_PKG_NAME").replace('-', "_")).separator("__")
}

/// returns the optional locations of the configuration, the last one wins
fn search_paths() -> Vec<PathBuf> {
    let mut paths = vec![
        PathBuf::from(format!("/usr/share/{}/config", env!("CARGO_PKG_NAME"))),
        PathBuf::from(format!("/etc/{}/config", env!("CARGO_PKG_NAME"))),
    ];

    if let Some(home) = env::var_os("HOME") {
        let home = PathBuf::from(home);

        paths.push(home.join(".config").join(env!("CARGO_PKG_NAME")).join("config"));
        paths.push(
            home.join(".local")
                .join("share")
                .join(env!("CARGO_PKG_NAME"))
                .join("config"),
        );
    }

    paths.push(PathBuf::from("config"));
    paths
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("temporary file to be created");

        file.write_all(content.as_bytes())
            .expect("configuration to be written");
        file
    }

    #[test]
    fn defaults_apply_to_a_minimal_file() {
        let file = write("[secrets]\n");

        let config = Configuration::try_from(file.path().to_path_buf())
            .expect("configuration to be loaded");

        assert_eq!(config.operator.listen, DEFAULT_LISTEN.parse::<SocketAddr>().expect("valid address"));
        assert_eq!(config.secrets.prefix, DEFAULT_SECRET_PREFIX);
        assert!(config.secrets.labels.is_empty());
        assert_eq!(config.jaeger, None);
    }

    #[test]
    fn file_overrides_defaults() {
        let file = write(
            r#"
[operator]
listen = "127.0.0.1:9090"

[secrets]
prefix = "corp-idp-"

[secrets.labels]
app = "idp"

[jaeger]
endpoint = "http://jaeger:14268/api/traces"
"#,
        );

        let config = Configuration::try_from(file.path().to_path_buf())
            .expect("configuration to be loaded");

        assert_eq!(config.operator.listen, "127.0.0.1:9090".parse::<SocketAddr>().expect("valid address"));
        assert_eq!(
            config.secrets.prefix(SecretUsage::TokenSigningKey),
            "corp-idp-token-signing-key-"
        );
        assert_eq!(
            config.secrets.labels.get("app").map(String::as_str),
            Some("idp")
        );
        assert_eq!(
            config.jaeger.map(|jaeger| jaeger.endpoint).as_deref(),
            Some("http://jaeger:14268/api/traces")
        );
    }

    #[test]
    fn missing_file_is_an_error() {
        let result = Configuration::try_from(PathBuf::from("/nonexistent/idp-operator.toml"));

        assert!(matches!(result, Err(Error::File(_, _))));
    }

    #[test]
    fn prefixes_differ_per_usage() {
        let secrets = Secrets {
            prefix: DEFAULT_SECRET_PREFIX.into(),
            labels: BTreeMap::new(),
        };

        assert_eq!(
            secrets.prefix(SecretUsage::StateSigningKey),
            "idp-state-signing-key-"
        );
        assert_eq!(
            secrets.prefix(SecretUsage::StateEncryptionKey),
            "idp-state-encryption-key-"
        );
    }
}
