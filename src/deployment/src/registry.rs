//! In-process table of non-persistent deployments.
//!
//! The registry is a value: the [`Deployer`](crate::Deployer) writes to it,
//! whatever serves requests holds a clone and reads from it.
use crate::model::Inference;
use mii_config::Task;
use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

/// A registered model and the task it serves.
#[derive(Clone)]
pub struct RegisteredModel {
    model: Arc<dyn Inference>,
    task: Task,
}

impl RegisteredModel {
    /// The loaded model.
    pub fn model(&self) -> &Arc<dyn Inference> {
        &self.model
    }

    /// Task the model serves.
    pub fn task(&self) -> Task {
        self.task
    }
}

/// Models keyed by deployment tag.
#[derive(Clone, Default)]
pub struct Registry {
    models: Arc<Mutex<HashMap<String, RegisteredModel>>>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Registry::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, RegisteredModel>> {
        self.models.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `model` under `deployment_tag`, returning the entry it replaced.
    pub fn insert<S: Into<String>>(
        &self,
        deployment_tag: S,
        model: Arc<dyn Inference>,
        task: Task,
    ) -> Option<RegisteredModel> {
        let deployment_tag = deployment_tag.into();
        let previous = self
            .lock()
            .insert(deployment_tag.clone(), RegisteredModel { model, task });
        if previous.is_some() {
            log::warn!("Deployment {} re-registered, previous model dropped", deployment_tag);
        }
        previous
    }

    /// Look up a deployment.
    pub fn get(&self, deployment_tag: &str) -> Option<RegisteredModel> {
        self.lock().get(deployment_tag).cloned()
    }

    /// Task of a deployment.
    pub fn task(&self, deployment_tag: &str) -> Option<Task> {
        self.lock().get(deployment_tag).map(|entry| entry.task)
    }

    /// Drop a deployment.
    pub fn remove(&self, deployment_tag: &str) -> Option<RegisteredModel> {
        self.lock().remove(deployment_tag)
    }

    /// Whether a deployment is registered.
    pub fn contains(&self, deployment_tag: &str) -> bool {
        self.lock().contains_key(deployment_tag)
    }

    /// Registered tags, sorted.
    pub fn tags(&self) -> Vec<String> {
        let mut tags: Vec<_> = self.lock().keys().cloned().collect();
        tags.sort();
        tags
    }

    /// Number of registered deployments.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry").field("tags", &self.tags()).finish()
    }
}
