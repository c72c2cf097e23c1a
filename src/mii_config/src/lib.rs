#![deny(missing_docs)]
#![warn(clippy::all)]

//! Configuration schema for MII deployments.
//!
//! Two calling conventions converge on one [`MIIConfig`]: the legacy flat
//! arguments ([`LegacyArgs`]) and the canonical list of per-deployment
//! mappings. [`DeployRequest`] carries either one and builds the validated
//! config.

mod deployment_config;
mod error;
mod legacy;
mod request;
mod serving;

pub use crate::deployment_config::{DeploymentConfig, Dtype, Task};
pub use crate::error::Error;
pub use crate::legacy::LegacyArgs;
pub use crate::request::DeployRequest;
pub use crate::serving::{DeploymentType, MIIConfig};

/// Untyped configuration mapping, the shape both calling conventions accept.
pub type Map = serde_json::Map<String, serde_json::Value>;
