//! Local serving loop started from a score file.
use crate::{
    model::{Inference, ModelLoader},
    Error,
};
use crossbeam::channel;
use mii_config::MIIConfig;
use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, PoisonError},
    thread::{self, JoinHandle},
};

/// Command to the local server
pub(crate) enum Command {
    /// Query(deployment_name, input, result_tx)
    Query(String, Vec<u8>, channel::Sender<Result<Vec<u8>, Error>>),
    /// Shutdown
    Shutdown,
}

pub(crate) struct LocalServer {
    rx: channel::Receiver<Command>,
    models: HashMap<String, Arc<dyn Inference>>,
}

impl LocalServer {
    /// Load every deployment of `config` and start serving them.
    pub fn start(config: &MIIConfig, loader: &dyn ModelLoader) -> Result<LocalHandle, Error> {
        let mut models = HashMap::new();
        for deployment in config.deployment_configs() {
            let model = loader.load(deployment)?;
            log::info!(
                "Deployment {} registered\nTask: {}\nModel: {}\nTensor parallel: {}\nRanks: {:?}",
                deployment.deployment_name(),
                deployment.task(),
                deployment.model(),
                deployment.tensor_parallel(),
                deployment.deploy_ranks()
            );
            models.insert(deployment.deployment_name().to_string(), model);
        }
        let mut deployment_names: Vec<_> = models.keys().cloned().collect();
        deployment_names.sort();
        let (tx, rx) = channel::unbounded();
        let server = LocalServer { rx, models };
        let deployment_tag = config.deployment_tag().to_string();
        let worker = {
            let deployment_tag = deployment_tag.clone();
            thread::spawn(move || {
                server.run();
                log::info!("Local server for {} stopped", deployment_tag);
            })
        };
        log::info!(
            "Local server for {} listening on port {}",
            deployment_tag,
            config.port_number()
        );
        Ok(LocalHandle {
            tx,
            deployment_tag,
            deployment_names: Arc::new(deployment_names),
            worker: Arc::new(Mutex::new(Some(worker))),
        })
    }

    fn run(self) {
        use Command::*;
        for cmd in self.rx.iter() {
            match cmd {
                Query(deployment_name, input, result_tx) => {
                    log::debug!("Query {} ({} bytes)", deployment_name, input.len());
                    let result = match self.models.get(&deployment_name) {
                        Some(model) => model.infer(&input),
                        None => Err(Error::UnknownDeployment(deployment_name)),
                    };
                    let _ = result_tx.send(result);
                }
                Shutdown => break,
            }
        }
    }
}

/// Handle to a running local deployment.
#[derive(Clone)]
pub struct LocalHandle {
    tx: channel::Sender<Command>,
    deployment_tag: String,
    deployment_names: Arc<Vec<String>>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl fmt::Debug for LocalHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalHandle")
            .field("deployment_tag", &self.deployment_tag)
            .field("deployment_names", &self.deployment_names)
            .finish()
    }
}

impl LocalHandle {
    /// Serving unit this handle belongs to.
    pub fn deployment_tag(&self) -> &str {
        &self.deployment_tag
    }

    /// Deployments served, sorted.
    pub fn deployment_names(&self) -> &[String] {
        &self.deployment_names
    }

    /// Send `input` to a deployment and wait for its output.
    pub fn query(&self, deployment_name: &str, input: Vec<u8>) -> Result<Vec<u8>, Error> {
        let (tx, rx) = channel::bounded(1);
        self.tx
            .send(Command::Query(deployment_name.to_string(), input, tx))
            .map_err(|_| Error::Send)?;
        rx.recv().map_err(|_| Error::Recv)?
    }

    /// Stop serving and wait for the server thread.
    pub fn shutdown(&self) -> Result<(), Error> {
        let _ = self.tx.send(Command::Shutdown);
        self.wait()
    }

    /// Block until the server thread exits.
    pub fn wait(&self) -> Result<(), Error> {
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match worker {
            Some(worker) => worker
                .join()
                .map_err(|_| Error::Engine("local server panicked".to_string())),
            None => Ok(()),
        }
    }
}
