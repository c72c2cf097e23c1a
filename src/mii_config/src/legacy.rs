//! The flat calling convention of earlier releases.
use crate::{DeploymentType, MIIConfig, Map, Task};
use serde_json::Value;

/// Arguments of the legacy `deploy(task, model, ...)` call.
#[derive(Debug, Clone)]
pub struct LegacyArgs {
    task: Task,
    model: String,
    deployment_type: DeploymentType,
    model_path: String,
    enable_deepspeed: bool,
    enable_zero: bool,
    ds_config: Option<Map>,
    mii_config: Option<Map>,
    version: u32,
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

impl LegacyArgs {
    /// Legacy arguments with the historical defaults.
    pub fn new<S: Into<String>>(task: Task, model: S) -> Self {
        LegacyArgs {
            task,
            model: model.into(),
            deployment_type: DeploymentType::Local,
            model_path: String::new(),
            enable_deepspeed: true,
            enable_zero: false,
            ds_config: None,
            mii_config: None,
            version: 1,
        }
    }

    config!(deployment_type, DeploymentType, "Backend to deploy to");
    config!(model_path, String, "Directory the model is loaded from");
    config!(enable_deepspeed, bool, "DeepSpeed inference optimizations");
    config!(enable_zero, bool, "ZeRO inference");
    config!(version, u32, "API version");

    /// DeepSpeed settings for the deployment.
    pub fn ds_config(mut self, ds_config: Map) -> Self {
        self.ds_config = Some(ds_config);
        self
    }

    /// Mixed serving-level and deployment-level settings.
    pub fn mii_config(mut self, mii_config: Map) -> Self {
        self.mii_config = Some(mii_config);
        self
    }

    pub(crate) fn has_mii_config(&self) -> bool {
        self.mii_config.is_some()
    }

    /// Split the arguments into a deployment mapping and a serving mapping.
    ///
    /// Keys of the `mii_config` mapping that are not serving-level keys move
    /// to the deployment mapping. The serving mapping is always stamped with
    /// `version` and `deployment_type`.
    pub fn normalize(self) -> (Map, Map) {
        let mut deployment = Map::new();
        deployment.insert("task".into(), Value::from(self.task.as_str()));
        deployment.insert("model".into(), Value::from(self.model));
        deployment.insert("model_path".into(), Value::from(self.model_path));
        deployment.insert(
            "enable_deepspeed".into(),
            Value::from(self.enable_deepspeed),
        );
        deployment.insert("enable_zero".into(), Value::from(self.enable_zero));
        deployment.insert(
            "ds_config".into(),
            Value::Object(self.ds_config.unwrap_or_default()),
        );

        let mut serving = Map::new();
        for (key, value) in self.mii_config.unwrap_or_default() {
            if MIIConfig::is_serving_key(&key) {
                serving.insert(key, value);
            } else {
                deployment.insert(key, value);
            }
        }
        serving.insert("version".into(), Value::from(self.version));
        serving.insert(
            "deployment_type".into(),
            Value::from(self.deployment_type.as_str()),
        );
        (deployment, serving)
    }
}
