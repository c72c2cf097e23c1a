use deployment::{
    aml::ACR_NAME_ENV, non_persistent::WORLD_SIZE_ENV, score, Deployer, Deployment, Error,
    Inference, Registry,
};
use mii_config::{DeployRequest, DeploymentConfig, DeploymentType, LegacyArgs, Map, Task};
use serde_json::{json, Value};
use serial_test::serial;
use std::{
    env, fs,
    path::Path,
    sync::{Arc, Mutex},
};
use tempfile::TempDir;

struct Echo;

impl Inference for Echo {
    fn infer(&self, input: &[u8]) -> Result<Vec<u8>, Error> {
        Ok(input.to_vec())
    }
}

fn echo_loader(_config: &DeploymentConfig) -> Result<Arc<dyn Inference>, Error> {
    Ok(Arc::new(Echo))
}

fn map(value: Value) -> Map {
    value.as_object().unwrap().clone()
}

fn deployer(dir: &TempDir) -> Deployer {
    Deployer::builder()
        .cache_dir(dir.path().join("cache"))
        .aml_output_dir(dir.path().join("aml"))
        .loader(echo_loader)
        .build()
}

fn score_dir_is_empty(dir: &Path) -> bool {
    match fs::read_dir(dir) {
        Ok(mut entries) => entries.next().is_none(),
        Err(_) => true,
    }
}

#[test]
fn local_creates_score_file_before_serving() {
    let dir = tempfile::tempdir().unwrap();
    let seen = Arc::new(Mutex::new(vec![]));
    let cache_dir = dir.path().join("cache");
    let loader = {
        let seen = seen.clone();
        let cache_dir = cache_dir.clone();
        move |config: &DeploymentConfig| -> Result<Arc<dyn Inference>, Error> {
            let exists = score::score_file_path(&cache_dir, "bert_unit").exists();
            seen.lock().unwrap().push((config.deployment_name().to_string(), exists));
            Ok(Arc::new(Echo))
        }
    };
    let deployer = Deployer::builder()
        .cache_dir(cache_dir.clone())
        .loader(loader)
        .build();
    let request = DeployRequest::canonical(
        "bert_unit",
        vec![
            map(json!({"deployment_name": "bert", "task": "fill-mask", "model": "bert-base-uncased"})),
            map(json!({"deployment_name": "roberta", "task": "fill-mask", "model": "roberta-base"})),
        ],
        None,
    );
    let handle = match deployer.deploy(request).unwrap() {
        Deployment::Local(handle) => handle,
        other => panic!("unexpected {:?}", other),
    };
    assert_eq!(
        *seen.lock().unwrap(),
        vec![("bert".to_string(), true), ("roberta".to_string(), true)]
    );
    assert_eq!(handle.query("roberta", b"<mask>".to_vec()).unwrap(), b"<mask>".to_vec());
    handle.shutdown().unwrap();
    assert!(deployer.registry().is_empty());
}

#[serial]
#[test]
fn non_persistent_registers_without_score_file() {
    env::remove_var(WORLD_SIZE_ENV);
    let dir = tempfile::tempdir().unwrap();
    let registry = Registry::new();
    let deployer = Deployer::builder()
        .cache_dir(dir.path().join("cache"))
        .registry(registry.clone())
        .loader(echo_loader)
        .build();
    let args = LegacyArgs::new(Task::TextGeneration, "gpt2")
        .deployment_type(DeploymentType::NonPersistent);
    let outcome = deployer
        .deploy(DeployRequest::legacy("gpt2_deployment", args))
        .unwrap();
    assert_eq!(outcome.deployment_type(), DeploymentType::NonPersistent);
    assert_eq!(registry.task("gpt2_deployment"), Some(Task::TextGeneration));
    let model = registry.get("gpt2_deployment").unwrap();
    assert_eq!(model.model().infer(b"hi").unwrap(), b"hi".to_vec());
    assert!(score_dir_is_empty(&dir.path().join("cache")));

    assert!(deployer.terminate("gpt2_deployment"));
    assert!(!deployer.terminate("gpt2_deployment"));
}

#[serial]
#[test]
fn non_persistent_world_size_mismatch() {
    env::remove_var(WORLD_SIZE_ENV);
    let dir = tempfile::tempdir().unwrap();
    let deployer = deployer(&dir);
    let request = DeployRequest::canonical(
        "gpt2_unit",
        vec![map(json!({
            "deployment_name": "gpt2",
            "task": "text-generation",
            "model": "gpt2",
            "tensor_parallel": 2,
        }))],
        Some(map(json!({"deployment_type": "non-persistent"}))),
    );
    match deployer.deploy(request.clone()) {
        Err(Error::WorldSize {
            world_size,
            tensor_parallel,
        }) => {
            assert_eq!(world_size, 1);
            assert_eq!(tensor_parallel, 2);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(deployer.registry().is_empty());

    env::set_var(WORLD_SIZE_ENV, "2");
    let outcome = deployer.deploy(request);
    env::remove_var(WORLD_SIZE_ENV);
    assert!(matches!(outcome, Ok(Deployment::NonPersistent(_))));
    assert!(deployer.registry().contains("gpt2_unit"));
    assert!(score_dir_is_empty(&dir.path().join("cache")));
}

#[test]
fn world_size_override() {
    let dir = tempfile::tempdir().unwrap();
    let deployer = Deployer::builder()
        .cache_dir(dir.path().join("cache"))
        .world_size(4)
        .loader(echo_loader)
        .build();
    let args = LegacyArgs::new(Task::TextGeneration, "bigscience/bloom-7b1")
        .deployment_type(DeploymentType::NonPersistent)
        .mii_config(map(json!({"tensor_parallel": 4, "dtype": "fp16"})));
    deployer
        .deploy(DeployRequest::legacy("bloom", args))
        .unwrap();
    assert!(deployer.registry().contains("bloom"));
}

#[serial]
#[test]
fn aml_generates_assets() {
    env::set_var(ACR_NAME_ENV, "miiregistry");
    let dir = tempfile::tempdir().unwrap();
    let deployer = deployer(&dir);
    let args = LegacyArgs::new(Task::TextGeneration, "gpt2")
        .deployment_type(DeploymentType::Aml)
        .version(2);
    let outcome = deployer.deploy(DeployRequest::legacy("gpt2_aml_unit", args));
    env::remove_var(ACR_NAME_ENV);
    let assets = match outcome {
        Ok(Deployment::Aml(assets)) => assets,
        other => panic!("unexpected {:?}", other),
    };
    assert_eq!(assets.path(), dir.path().join("aml").join("gpt2_aml_unit_aml"));
    assert!(assets.path().join("deploy.sh").is_file());
    let score = fs::read_to_string(assets.path().join("score.json")).unwrap();
    assert!(score.contains("gpt2_aml_unit"));
    assert!(score::score_file_path(&dir.path().join("cache"), "gpt2_aml_unit").is_file());
}

#[serial]
#[test]
fn aml_without_registry_name() {
    env::remove_var(ACR_NAME_ENV);
    let dir = tempfile::tempdir().unwrap();
    let args = LegacyArgs::new(Task::FillMask, "bert-base-uncased").deployment_type(DeploymentType::Aml);
    let outcome = deployer(&dir).deploy(DeployRequest::legacy("bert", args));
    assert!(matches!(outcome, Err(Error::AcrName)));
}

#[test]
fn mixed_conventions_never_dispatch() {
    let request = DeployRequest::from_parts(
        "tag",
        vec![map(json!({"deployment_name": "a", "task": "fill-mask", "model": "bert"}))],
        None,
        Some(LegacyArgs::new(Task::FillMask, "bert")),
    );
    assert!(matches!(request, Err(mii_config::Error::Usage(_))));
}

#[test]
fn invalid_config_is_not_deployed() {
    let dir = tempfile::tempdir().unwrap();
    let request = DeployRequest::canonical(
        "tag",
        vec![map(json!({"deployment_name": "a", "task": "fill-mask", "model": "bert", "shards": 3}))],
        None,
    );
    let outcome = deployer(&dir).deploy(request);
    assert!(matches!(outcome, Err(Error::Config(_))));
    assert!(score_dir_is_empty(&dir.path().join("cache")));
}

#[test]
fn tag_cannot_escape_cache_dir() {
    let dir = tempfile::tempdir().unwrap();
    let outside = dir.path().join("outside");
    let deployer = deployer(&dir);
    for tag in &[outside.to_str().unwrap(), "../outside", "nested/unit"] {
        let request = DeployRequest::canonical(
            *tag,
            vec![map(json!({"deployment_name": "bert", "task": "fill-mask", "model": "bert"}))],
            None,
        );
        match deployer.deploy(request) {
            Err(Error::Config(mii_config::Error::Validation { field, .. })) => {
                assert_eq!(field, "deployment_tag")
            }
            other => panic!("{}: unexpected {:?}", tag, other),
        }
    }
    assert!(!outside.exists());
    assert!(score_dir_is_empty(&dir.path().join("cache")));
}

#[serial]
#[test]
fn deployment_name_cannot_escape_aml_output_dir() {
    env::set_var(ACR_NAME_ENV, "miiregistry");
    let dir = tempfile::tempdir().unwrap();
    let request = DeployRequest::canonical(
        "aml_unit",
        vec![map(json!({"deployment_name": "../escaped", "task": "fill-mask", "model": "bert"}))],
        Some(map(json!({"deployment_type": "aml"}))),
    );
    let outcome = deployer(&dir).deploy(request);
    env::remove_var(ACR_NAME_ENV);
    assert!(matches!(outcome, Err(Error::Config(_))));
    assert!(!dir.path().join("escaped_aml").exists());
}
