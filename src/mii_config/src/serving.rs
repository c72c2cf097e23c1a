//! Top-level serving configuration.
use crate::{
    deployment_config::{path_component, RawDeploymentConfig},
    DeploymentConfig, Error, Map,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    collections::HashSet,
    convert::TryFrom,
    fmt::{self, Display},
    str::FromStr,
};

/// Backend a serving unit is deployed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeploymentType {
    /// Persistent local serving process.
    #[serde(rename = "local", alias = "LOCAL")]
    Local,
    /// Azure ML assets, brought online manually.
    #[serde(rename = "aml", alias = "AML")]
    Aml,
    /// Model loaded into the calling process only.
    #[serde(
        rename = "non-persistent",
        alias = "non_persistent",
        alias = "NON_PERSISTENT"
    )]
    NonPersistent,
}

impl DeploymentType {
    /// Wire name of the deployment type.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentType::Local => "local",
            DeploymentType::Aml => "aml",
            DeploymentType::NonPersistent => "non-persistent",
        }
    }
}

impl Default for DeploymentType {
    fn default() -> Self {
        DeploymentType::Local
    }
}

impl Display for DeploymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeploymentType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" | "LOCAL" => Ok(DeploymentType::Local),
            "aml" | "AML" => Ok(DeploymentType::Aml),
            "non-persistent" | "non_persistent" | "NON_PERSISTENT" => {
                Ok(DeploymentType::NonPersistent)
            }
            _ => Err(Error::validation(
                "deployment_type",
                format!("unknown deployment type `{}`", s),
            )),
        }
    }
}

fn default_version() -> u32 {
    1
}

fn default_port_number() -> u16 {
    50050
}

fn default_hostfile() -> String {
    "/job/hostfile".to_string()
}

fn default_restful_api_port() -> u16 {
    51080
}

fn default_instance_type() -> String {
    "Standard_NC12s_v3".to_string()
}

/// Mapping form of an [`MIIConfig`] before validation.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawMIIConfig {
    deployment_tag: String,
    deployment_configs: Vec<RawDeploymentConfig>,
    #[serde(default)]
    deployment_type: DeploymentType,
    #[serde(default = "default_version")]
    version: u32,
    #[serde(default = "default_port_number")]
    port_number: u16,
    #[serde(default = "default_hostfile")]
    hostfile: String,
    #[serde(default)]
    enable_restful_api: bool,
    #[serde(default = "default_restful_api_port")]
    restful_api_port: u16,
    #[serde(default = "default_instance_type")]
    instance_type: String,
}

/// Validated description of one serving unit.
///
/// Only obtainable through validation, so `deployment_configs` is never
/// empty and AML and non-persistent units hold exactly one deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawMIIConfig")]
pub struct MIIConfig {
    deployment_tag: String,
    deployment_configs: Vec<DeploymentConfig>,
    deployment_type: DeploymentType,
    version: u32,
    port_number: u16,
    hostfile: String,
    enable_restful_api: bool,
    restful_api_port: u16,
    instance_type: String,
}

impl TryFrom<RawMIIConfig> for MIIConfig {
    type Error = Error;

    fn try_from(raw: RawMIIConfig) -> Result<Self, Error> {
        if raw.deployment_tag.trim().is_empty() {
            return Err(Error::MissingDeploymentTag);
        }
        path_component("deployment_tag", &raw.deployment_tag)?;
        if raw.deployment_configs.is_empty() {
            return Err(Error::validation(
                "deployment_configs",
                "at least one deployment is required",
            ));
        }
        let mut deployment_configs = Vec::with_capacity(raw.deployment_configs.len());
        let mut names = HashSet::new();
        for deployment in raw.deployment_configs {
            let config = DeploymentConfig::try_from(deployment)?;
            if !names.insert(config.deployment_name().to_string()) {
                return Err(Error::validation(
                    "deployment_configs",
                    format!("duplicate deployment name `{}`", config.deployment_name()),
                ));
            }
            deployment_configs.push(config);
        }
        if raw.deployment_type != DeploymentType::Local && deployment_configs.len() != 1 {
            return Err(Error::validation(
                "deployment_configs",
                format!(
                    "{} deployments serve exactly one model, got {}",
                    raw.deployment_type,
                    deployment_configs.len()
                ),
            ));
        }
        if raw.enable_restful_api && raw.restful_api_port == raw.port_number {
            return Err(Error::validation(
                "restful_api_port",
                format!("collides with port_number {}", raw.port_number),
            ));
        }
        Ok(MIIConfig {
            deployment_tag: raw.deployment_tag,
            deployment_configs,
            deployment_type: raw.deployment_type,
            version: raw.version,
            port_number: raw.port_number,
            hostfile: raw.hostfile,
            enable_restful_api: raw.enable_restful_api,
            restful_api_port: raw.restful_api_port,
            instance_type: raw.instance_type,
        })
    }
}

impl MIIConfig {
    /// Keys recognized at the serving level. Anything else belongs to a
    /// deployment.
    pub const FIELDS: [&'static str; 9] = [
        "deployment_tag",
        "deployment_configs",
        "deployment_type",
        "version",
        "port_number",
        "hostfile",
        "enable_restful_api",
        "restful_api_port",
        "instance_type",
    ];

    /// Whether `key` is a serving-level key.
    pub fn is_serving_key(key: &str) -> bool {
        MIIConfig::FIELDS.contains(&key)
    }

    /// Build and validate from the mapping form.
    pub fn from_map(map: Map) -> Result<Self, Error> {
        MIIConfig::from_value(Value::Object(map))
    }

    /// Build and validate from a JSON value.
    pub fn from_value(value: Value) -> Result<Self, Error> {
        let raw: RawMIIConfig = serde_json::from_value(value)?;
        let config = MIIConfig::try_from(raw)?;
        log::debug!(
            "Serving unit {} validated with {} deployment(s)",
            config.deployment_tag,
            config.deployment_configs.len()
        );
        Ok(config)
    }

    /// Identifier of the serving unit.
    pub fn deployment_tag(&self) -> &str {
        &self.deployment_tag
    }

    /// Deployments in declaration order.
    pub fn deployment_configs(&self) -> &[DeploymentConfig] {
        &self.deployment_configs
    }

    /// The first deployment; the only one for AML and non-persistent units.
    pub fn deployment_config(&self) -> &DeploymentConfig {
        // never empty once validated
        &self.deployment_configs[0]
    }

    /// Backend the unit is dispatched to.
    pub fn deployment_type(&self) -> DeploymentType {
        self.deployment_type
    }

    /// API version stamped on generated assets.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Port of the serving endpoint.
    pub fn port_number(&self) -> u16 {
        self.port_number
    }

    /// Hostfile listing the machines of a multi-node launch.
    pub fn hostfile(&self) -> &str {
        &self.hostfile
    }

    /// Whether a RESTful gateway is started next to the serving endpoint.
    pub fn enable_restful_api(&self) -> bool {
        self.enable_restful_api
    }

    /// Port of the RESTful gateway.
    pub fn restful_api_port(&self) -> u16 {
        self.restful_api_port
    }

    /// AML compute SKU.
    pub fn instance_type(&self) -> &str {
        &self.instance_type
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn deployment(name: &str) -> Value {
        json!({"deployment_name": name, "task": "text-generation", "model": "gpt2"})
    }

    #[test]
    fn test_defaults() {
        let config = MIIConfig::from_value(json!({
            "deployment_tag": "tag",
            "deployment_configs": [deployment("gpt2_deployment")],
        }))
        .unwrap();
        assert_eq!(config.deployment_type(), DeploymentType::Local);
        assert_eq!(config.version(), 1);
        assert_eq!(config.port_number(), 50050);
        assert_eq!(config.restful_api_port(), 51080);
        assert_eq!(config.hostfile(), "/job/hostfile");
        assert_eq!(config.deployment_config().deployment_name(), "gpt2_deployment");
    }

    #[test]
    fn test_fields_match_schema() {
        let config = MIIConfig::from_value(json!({
            "deployment_tag": "tag",
            "deployment_configs": [deployment("a")],
        }))
        .unwrap();
        let value = serde_json::to_value(&config).unwrap();
        let keys: HashSet<_> = value.as_object().unwrap().keys().cloned().collect();
        let fields: HashSet<_> = MIIConfig::FIELDS.iter().map(|f| f.to_string()).collect();
        assert_eq!(keys, fields);
    }

    #[test]
    fn test_unknown_serving_key_rejected() {
        let result = MIIConfig::from_value(json!({
            "deployment_tag": "tag",
            "deployment_configs": [deployment("a")],
            "gpu_count": 4,
        }));
        assert!(matches!(result, Err(Error::Parse(_))));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let result = MIIConfig::from_value(json!({
            "deployment_tag": "tag",
            "deployment_configs": [deployment("a"), deployment("a")],
        }));
        assert!(matches!(result, Err(Error::Validation { .. })));
    }

    #[test]
    fn test_single_model_backends() {
        for deployment_type in &["aml", "non-persistent"] {
            let result = MIIConfig::from_value(json!({
                "deployment_tag": "tag",
                "deployment_type": deployment_type,
                "deployment_configs": [deployment("a"), deployment("b")],
            }));
            assert!(result.is_err(), "{}", deployment_type);
        }
        let local = MIIConfig::from_value(json!({
            "deployment_tag": "tag",
            "deployment_configs": [deployment("a"), deployment("b")],
        }))
        .unwrap();
        assert_eq!(local.deployment_configs().len(), 2);
    }

    #[test]
    fn test_empty_tag() {
        let result = MIIConfig::from_value(json!({
            "deployment_tag": "",
            "deployment_configs": [deployment("a")],
        }));
        assert!(matches!(result, Err(Error::MissingDeploymentTag)));
    }

    #[test]
    fn test_deployment_type_spellings() {
        assert_eq!(
            "NON_PERSISTENT".parse::<DeploymentType>().unwrap(),
            DeploymentType::NonPersistent
        );
        assert_eq!("aml".parse::<DeploymentType>().unwrap(), DeploymentType::Aml);
        assert!("cloud".parse::<DeploymentType>().is_err());
        let parsed: DeploymentType = serde_json::from_value(json!("LOCAL")).unwrap();
        assert_eq!(parsed, DeploymentType::Local);
    }

    #[test]
    fn test_restful_port_collision() {
        let result = MIIConfig::from_value(json!({
            "deployment_tag": "tag",
            "deployment_configs": [deployment("a")],
            "enable_restful_api": true,
            "restful_api_port": 50050,
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_non_persistent_underscore_alias() {
        let parsed: DeploymentType = serde_json::from_value(json!("non_persistent")).unwrap();
        assert_eq!(parsed, DeploymentType::NonPersistent);
        let config = MIIConfig::from_value(json!({
            "deployment_tag": "tag",
            "deployment_type": "non_persistent",
            "deployment_configs": [deployment("a")],
        }))
        .unwrap();
        assert_eq!(config.deployment_type(), DeploymentType::NonPersistent);
    }

    #[test]
    fn test_deserialize_validates() {
        let empty = serde_json::from_value::<MIIConfig>(json!({
            "deployment_tag": "tag",
            "deployment_type": "non-persistent",
            "deployment_configs": [],
        }));
        assert!(empty.is_err());
        let bad_deployment = serde_json::from_value::<MIIConfig>(json!({
            "deployment_tag": "tag",
            "deployment_configs": [{
                "deployment_name": "a", "task": "fill-mask", "model": "bert", "tensor_parallel": 0,
            }],
        }));
        assert!(bad_deployment.is_err());
        let config = serde_json::from_value::<MIIConfig>(json!({
            "deployment_tag": "tag",
            "deployment_type": "aml",
            "deployment_configs": [deployment("a")],
        }))
        .unwrap();
        assert_eq!(config.deployment_config().deployment_name(), "a");
        let reparsed: MIIConfig =
            serde_json::from_value(serde_json::to_value(&config).unwrap()).unwrap();
        assert_eq!(reparsed, config);
    }

    #[test]
    fn test_tag_is_single_path_component() {
        for tag in &["../escape", "/tmp/outside", "nested/tag", ".", "..", "back\\slash"] {
            let result = MIIConfig::from_value(json!({
                "deployment_tag": tag,
                "deployment_configs": [deployment("a")],
            }));
            match result {
                Err(Error::Validation { field, .. }) => assert_eq!(field, "deployment_tag", "{}", tag),
                other => panic!("{}: unexpected {:?}", tag, other),
            }
        }
        let result = MIIConfig::from_value(json!({
            "deployment_tag": "tag",
            "deployment_type": "aml",
            "deployment_configs": [deployment("../../etc")],
        }));
        match result {
            Err(Error::Validation { field, .. }) => assert_eq!(field, "deployment_name"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(MIIConfig::from_value(json!({
            "deployment_tag": "gpt2.v2-unit",
            "deployment_configs": [deployment("a")],
        }))
        .is_ok());
    }
}
