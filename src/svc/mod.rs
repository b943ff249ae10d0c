//! # Services module
//!
//! This module provide services to interact with kubernetes, generate the key
//! material of the identity provider and helpers to do so.
pub mod cfg;
pub mod crd;
pub mod generator;
pub mod k8s;
pub mod keyring;
pub mod telemetry;
