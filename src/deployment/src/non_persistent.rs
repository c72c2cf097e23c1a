//! Non-persistent backend: models loaded into the calling process.
use crate::{model::ModelLoader, registry::Registry, Error};
use mii_config::MIIConfig;
use std::env;

/// Environment variable holding the number of cooperating processes.
pub const WORLD_SIZE_ENV: &str = "WORLD_SIZE";

/// `$WORLD_SIZE`, 1 when unset.
pub fn world_size() -> Result<u32, Error> {
    let raw = env::var(WORLD_SIZE_ENV).unwrap_or_else(|_| "1".to_string());
    raw.trim()
        .parse()
        .map_err(|_| Error::InvalidWorldSize(raw.clone()))
}

/// Load the model of `config` in this process and register it under the
/// deployment tag. The caller must have launched exactly `tensor_parallel`
/// processes.
pub(crate) fn deploy(
    config: &MIIConfig,
    world_size: u32,
    loader: &dyn ModelLoader,
    registry: &Registry,
) -> Result<(), Error> {
    let deployment = config.deployment_config();
    if world_size != deployment.tensor_parallel() {
        return Err(Error::WorldSize {
            world_size,
            tensor_parallel: deployment.tensor_parallel(),
        });
    }
    let model = loader.load(deployment)?;
    registry.insert(config.deployment_tag(), model, deployment.task());
    log::info!(
        "Non-persistent deployment {} registered ({})",
        config.deployment_tag(),
        deployment.task()
    );
    Ok(())
}
