//! # Generator module
//!
//! This module provide the lifecycle of the key material backing an oidc
//! provider: generation of candidate secrets, validation of existing ones and
//! projection of the active secret into the parent status and the live keys.

pub mod helper;
pub mod owner;
pub mod random;
pub mod usage;

pub use helper::{Notify, SecretHelper};
pub use usage::SecretUsage;

// -----------------------------------------------------------------------------
// Error enumeration

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to generate key material for usage '{0}', {1}")]
    Random(SecretUsage, random::Error),
}
