//! Builder for Deployer, caller may provide a ModelLoader and a Registry
use crate::{
    deployer::Deployer,
    model::{CheckpointLoader, ModelLoader},
    registry::Registry,
    score,
};
use std::{env, path::PathBuf, sync::Arc};

/// Builder for the deployer
pub struct Builder {
    cache_dir: PathBuf,
    aml_output_dir: PathBuf,
    world_size: Option<u32>,
    loader: Option<Arc<dyn ModelLoader>>,
    registry: Registry,
}

macro_rules! config {
    ($name:ident, $t: ty, $comment: literal) => {
        #[doc=$comment]
        pub fn $name(mut self, $name: $t) -> Self {
            self.$name = $name;
            self
        }
    };
}

impl Default for Builder {
    fn default() -> Self {
        Builder {
            cache_dir: score::default_cache_dir(),
            aml_output_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            world_size: None,
            loader: None,
            registry: Registry::new(),
        }
    }
}

impl Builder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Builder::default()
    }

    config!(cache_dir, PathBuf, "Directory score files are written to");
    config!(aml_output_dir, PathBuf, "Directory AML assets are generated in");
    config!(registry, Registry, "Registry non-persistent deployments go to");

    /// World size to check non-persistent deployments against, instead of
    /// reading `WORLD_SIZE` at deploy time.
    pub fn world_size(mut self, world_size: u32) -> Self {
        self.world_size = Some(world_size);
        self
    }

    /// Model loader for local and non-persistent deployments
    pub fn loader<L>(mut self, loader: L) -> Self
    where
        L: 'static + ModelLoader,
    {
        self.loader = Some(Arc::new(loader));
        self
    }

    /// Build the deployer
    pub fn build(self) -> Deployer {
        let loader = self
            .loader
            .unwrap_or_else(|| Arc::new(CheckpointLoader));
        log::debug!(
            "Deployer built, score files in {}, AML assets in {}",
            self.cache_dir.display(),
            self.aml_output_dir.display()
        );
        Deployer::new(
            self.cache_dir,
            self.aml_output_dir,
            self.world_size,
            loader,
            self.registry,
        )
    }
}
