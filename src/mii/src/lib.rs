//! MII front end: deploy models to a local server, to Azure ML, or into the
//! current process.
//!
//! This crate glues the configuration schema (`mii_config`) and the
//! dispatcher (`deployment`) together and hosts the `deploy` command line
//! tool.

#![warn(missing_docs)]

pub mod cli;

pub use deployment::{
    CheckpointLoader, Deployer, Deployment, Error, Inference, LocalHandle, ModelLoader, Registry,
};
pub use mii_config::{
    DeployRequest, DeploymentConfig, DeploymentType, Error as ConfigError, LegacyArgs, MIIConfig,
    Map, Task,
};

/// Deploy `deployment_configs` as the serving unit `deployment_tag` with a
/// default [`Deployer`].
pub fn deploy<S: Into<String>>(
    deployment_tag: S,
    deployment_configs: Vec<Map>,
    mii_config: Option<Map>,
) -> Result<Deployment, Error> {
    Deployer::builder().build().deploy(DeployRequest::canonical(
        deployment_tag,
        deployment_configs,
        mii_config,
    ))
}
