//! Azure ML asset generation. Nothing here talks to Azure; the operator
//! runs the generated `deploy.sh`.
use crate::Error;
use std::{
    env, fs,
    path::{Path, PathBuf},
};

/// Environment variable naming the container registry.
pub const ACR_NAME_ENV: &str = "AML_ACR_NAME";

const BUILD_SH: &str = r#"#!/bin/bash
set -e
az acr login --name {{acr_name}}
docker build -t {{image}} .
docker push {{image}}
"#;

const DEPLOY_SH: &str = r#"#!/bin/bash
set -e
cd "$(dirname "$0")"
bash build.sh
az ml environment create -f environment.yml
az ml online-endpoint create -n {{deployment_name}} -f endpoint.yml
az ml online-deployment create -n {{deployment_name}}-deployment --endpoint {{deployment_name}} -f deployment.yml --all-traffic
"#;

const ENDPOINT_YML: &str = r#"$schema: https://azuremlschemas.azureedge.net/latest/managedOnlineEndpoint.schema.json
name: {{deployment_name}}
auth_mode: key
"#;

const DEPLOYMENT_YML: &str = r#"$schema: https://azuremlschemas.azureedge.net/latest/managedOnlineDeployment.schema.json
name: {{deployment_name}}-deployment
endpoint_name: {{deployment_name}}
environment: azureml:{{deployment_name}}-environment:{{version}}
instance_type: {{instance_type}}
instance_count: 1
request_settings:
  request_timeout_ms: 90000
  max_concurrent_requests_per_instance: 1
environment_variables:
  MII_MODEL: {{model_name}}
  MII_CACHE_PATH: /var/mii
"#;

const ENVIRONMENT_YML: &str = r#"$schema: https://azuremlschemas.azureedge.net/latest/environment.schema.json
name: {{deployment_name}}-environment
version: {{version}}
image: {{image}}
inference_config:
  liveness_route:
    port: 5001
    path: /
  readiness_route:
    port: 5001
    path: /
  scoring_route:
    port: 5001
    path: /score
"#;

const DOCKERFILE: &str = r#"FROM mcr.microsoft.com/azureml/openmpi4.1.0-cuda11.6-cudnn8-ubuntu20.04
ENV MII_MODEL={{model_name}}
ENV MII_CACHE_PATH=/var/mii
COPY score.json /var/mii/{{deployment_name}}/score.json
EXPOSE 5001
"#;

/// Registry name from `$AML_ACR_NAME`.
pub fn acr_name() -> Result<String, Error> {
    match env::var(ACR_NAME_ENV) {
        Ok(name) if !name.trim().is_empty() => Ok(name.trim().to_string()),
        _ => Err(Error::AcrName),
    }
}

/// Directory the assets of `deployment_name` are generated into.
pub fn aml_output_path(base: &Path, deployment_name: &str) -> PathBuf {
    base.join(format!("{}_aml", deployment_name))
}

fn render(template: &str, values: &[(&str, &str)]) -> String {
    values.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{{{}}}}}", key), value)
    })
}

/// Generated AML assets.
#[derive(Debug, Clone)]
pub struct AmlAssets {
    path: PathBuf,
    files: Vec<PathBuf>,
}

impl AmlAssets {
    /// Output directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Files written, in generation order.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

/// What the generated scripts are parameterized with.
pub(crate) struct AmlParams<'a> {
    pub acr_name: &'a str,
    pub deployment_name: &'a str,
    pub model_name: &'a str,
    pub version: u32,
    pub instance_type: &'a str,
}

pub(crate) fn generate_aml_scripts(
    base: &Path,
    params: &AmlParams<'_>,
    score_file: Option<&Path>,
) -> Result<AmlAssets, Error> {
    let path = aml_output_path(base, params.deployment_name);
    fs::create_dir_all(&path)?;
    let version = params.version.to_string();
    let image = format!(
        "{}.azurecr.io/mii/{}:{}",
        params.acr_name, params.deployment_name, version
    );
    let values = [
        ("acr_name", params.acr_name),
        ("deployment_name", params.deployment_name),
        ("model_name", params.model_name),
        ("version", version.as_str()),
        ("instance_type", params.instance_type),
        ("image", image.as_str()),
    ];
    let mut files = vec![];
    for (name, template) in &[
        ("build.sh", BUILD_SH),
        ("deploy.sh", DEPLOY_SH),
        ("endpoint.yml", ENDPOINT_YML),
        ("deployment.yml", DEPLOYMENT_YML),
        ("environment.yml", ENVIRONMENT_YML),
        ("Dockerfile", DOCKERFILE),
    ] {
        let file = path.join(name);
        fs::write(&file, render(template, &values))?;
        if name.ends_with(".sh") {
            make_executable(&file)?;
        }
        files.push(file);
    }
    if let Some(score_file) = score_file {
        let file = path.join("score.json");
        fs::copy(score_file, &file)?;
        files.push(file);
    }
    log::info!(
        "AML assets for {} generated in {}",
        params.deployment_name,
        path.display()
    );
    Ok(AmlAssets { path, files })
}

#[cfg(unix)]
fn make_executable(file: &Path) -> Result<(), Error> {
    use std::os::unix::fs::PermissionsExt;
    let mut permissions = fs::metadata(file)?.permissions();
    permissions.set_mode(0o755);
    fs::set_permissions(file, permissions)?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_file: &Path) -> Result<(), Error> {
    Ok(())
}
