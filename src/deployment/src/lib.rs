#![warn(missing_docs)]
#![warn(clippy::all)]

//! Deployment dispatcher for MII serving units.
//!
//! A [`Deployer`] takes a [`DeployRequest`](mii_config::DeployRequest),
//! validates it into an `MIIConfig` and hands it to exactly one backend: a
//! local server started from the score file, generated AML assets, or an
//! in-process registration in a [`Registry`].

pub mod aml;
pub mod builder;
mod deployer;
mod error;
mod local;
pub mod model;
pub mod non_persistent;
pub mod registry;
pub mod score;

pub use crate::deployer::{Deployer, Deployment};
pub use crate::error::Error;
pub use crate::local::LocalHandle;
pub use crate::model::{CheckpointLoader, Inference, ModelLoader};
pub use crate::registry::Registry;
