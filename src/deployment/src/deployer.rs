//! Deployer
use crate::{
    aml::{self, AmlAssets, AmlParams},
    builder::Builder,
    local::LocalHandle,
    model::ModelLoader,
    non_persistent,
    registry::Registry,
    score, Error,
};
use mii_config::{DeployRequest, DeploymentConfig, DeploymentType, MIIConfig};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

/// Outcome of a deploy call.
#[derive(Debug)]
pub enum Deployment {
    /// A local server is running.
    Local(LocalHandle),
    /// Assets were generated; run `deploy.sh` to bring them online.
    Aml(AmlAssets),
    /// The model is registered under this deployment tag.
    NonPersistent(String),
}

impl Deployment {
    /// Backend that produced this outcome.
    pub fn deployment_type(&self) -> DeploymentType {
        match self {
            Deployment::Local(_) => DeploymentType::Local,
            Deployment::Aml(_) => DeploymentType::Aml,
            Deployment::NonPersistent(_) => DeploymentType::NonPersistent,
        }
    }
}

/// Dispatches serving units to their backend.
pub struct Deployer {
    cache_dir: PathBuf,
    aml_output_dir: PathBuf,
    world_size: Option<u32>,
    loader: Arc<dyn ModelLoader>,
    registry: Registry,
}

impl Deployer {
    pub(crate) fn new(
        cache_dir: PathBuf,
        aml_output_dir: PathBuf,
        world_size: Option<u32>,
        loader: Arc<dyn ModelLoader>,
        registry: Registry,
    ) -> Self {
        Deployer {
            cache_dir,
            aml_output_dir,
            world_size,
            loader,
            registry,
        }
    }

    /// Builder with default configuration
    pub fn builder() -> Builder {
        Builder::new()
    }

    /// Registry non-persistent deployments are registered in.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Directory score files are written to.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Validate `request` and deploy it.
    pub fn deploy(&self, request: DeployRequest) -> Result<Deployment, Error> {
        let config = request.into_config()?;
        self.deploy_config(config)
    }

    /// Deploy an already validated configuration.
    ///
    /// Process backends get their score file before dispatch; non-persistent
    /// deployments never do.
    pub fn deploy_config(&self, config: MIIConfig) -> Result<Deployment, Error> {
        for deployment in config.deployment_configs() {
            log_acceleration(deployment);
        }
        let score_file = match config.deployment_type() {
            DeploymentType::NonPersistent => None,
            DeploymentType::Local | DeploymentType::Aml => {
                Some(score::create_score_file(&config, &self.cache_dir)?)
            }
        };
        match config.deployment_type() {
            DeploymentType::Local => self.deploy_local(&config),
            DeploymentType::Aml => self.deploy_aml(&config, score_file.as_deref()),
            DeploymentType::NonPersistent => self.deploy_non_persistent(&config),
        }
    }

    /// Drop a non-persistent deployment from the registry.
    pub fn terminate(&self, deployment_tag: &str) -> bool {
        let removed = self.registry.remove(deployment_tag).is_some();
        if removed {
            log::info!("Deployment {} terminated", deployment_tag);
        }
        removed
    }

    fn deploy_local(&self, config: &MIIConfig) -> Result<Deployment, Error> {
        let score_file = score::import_score_file(config.deployment_tag(), &self.cache_dir)?;
        let handle = score_file.init(self.loader.as_ref())?;
        Ok(Deployment::Local(handle))
    }

    fn deploy_aml(
        &self,
        config: &MIIConfig,
        score_file: Option<&Path>,
    ) -> Result<Deployment, Error> {
        let acr_name = aml::acr_name()?;
        let deployment = config.deployment_config();
        let params = AmlParams {
            acr_name: &acr_name,
            deployment_name: deployment.deployment_name(),
            model_name: deployment.model(),
            version: config.version(),
            instance_type: config.instance_type(),
        };
        let assets = aml::generate_aml_scripts(&self.aml_output_dir, &params, score_file)?;
        println!("AML deployment assets at {}", assets.path().display());
        println!("Please run 'deploy.sh' to bring your deployment online");
        Ok(Deployment::Aml(assets))
    }

    fn deploy_non_persistent(&self, config: &MIIConfig) -> Result<Deployment, Error> {
        let world_size = match self.world_size {
            Some(world_size) => world_size,
            None => non_persistent::world_size()?,
        };
        non_persistent::deploy(config, world_size, self.loader.as_ref(), &self.registry)?;
        Ok(Deployment::NonPersistent(
            config.deployment_tag().to_string(),
        ))
    }
}

fn log_acceleration(deployment: &DeploymentConfig) {
    if deployment.enable_deepspeed() {
        log::info!(
            "************* MII is using DeepSpeed Optimizations to accelerate {} *************",
            deployment.deployment_name()
        );
    } else {
        log::info!(
            "************* DeepSpeed Optimizations not enabled for {}. \
             Please use enable_deepspeed to get better performance *************",
            deployment.deployment_name()
        );
    }
}
