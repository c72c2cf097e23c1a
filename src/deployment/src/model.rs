//! Seam between the dispatcher and the inference engine.
use crate::Error;
use mii_config::{DeploymentConfig, Task};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

/// A loaded model. Models are immutable after loading, hence should be
/// Send + Sync.
pub trait Inference: Send + Sync {
    /// Run one request through the model.
    fn infer(&self, input: &[u8]) -> Result<Vec<u8>, Error>;
}

/// Loads the model a deployment describes.
pub trait ModelLoader: Send + Sync {
    /// Load the model of `config`.
    fn load(&self, config: &DeploymentConfig) -> Result<Arc<dyn Inference>, Error>;
}

impl<F> ModelLoader for F
where
    F: Fn(&DeploymentConfig) -> Result<Arc<dyn Inference>, Error> + Send + Sync,
{
    fn load(&self, config: &DeploymentConfig) -> Result<Arc<dyn Inference>, Error> {
        self(config)
    }
}

/// Loader that resolves checkpoints on the local filesystem.
///
/// No inference engine is linked in; the returned model only knows where
/// its weights are and fails every request with [`Error::Engine`].
#[derive(Debug, Default, Clone, Copy)]
pub struct CheckpointLoader;

impl CheckpointLoader {
    /// `<model_path>/<model>`, or `<model>` when no model path is set.
    pub fn checkpoint_path(config: &DeploymentConfig) -> PathBuf {
        if config.model_path().is_empty() {
            PathBuf::from(config.model())
        } else {
            Path::new(config.model_path()).join(config.model())
        }
    }
}

impl ModelLoader for CheckpointLoader {
    fn load(&self, config: &DeploymentConfig) -> Result<Arc<dyn Inference>, Error> {
        let path = CheckpointLoader::checkpoint_path(config);
        if !config.skip_model_check() && !path.exists() {
            return Err(Error::Load {
                model: config.model().to_string(),
                reason: format!("checkpoint {} does not exist", path.display()),
            });
        }
        let files = if path.is_dir() {
            let mut files = 0;
            for entry in fs::read_dir(&path)? {
                if entry?.file_type()?.is_file() {
                    files += 1;
                }
            }
            files
        } else if path.is_file() {
            1
        } else {
            0
        };
        log::info!(
            "Checkpoint {} for {} resolved, {} files",
            path.display(),
            config.task(),
            files
        );
        Ok(Arc::new(Checkpoint {
            path,
            task: config.task(),
        }))
    }
}

struct Checkpoint {
    path: PathBuf,
    task: Task,
}

impl Inference for Checkpoint {
    fn infer(&self, _input: &[u8]) -> Result<Vec<u8>, Error> {
        Err(Error::Engine(format!(
            "no {} engine is linked to serve {}",
            self.task,
            self.path.display()
        )))
    }
}
