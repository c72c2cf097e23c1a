//! Per-model deployment settings.
use crate::{Error, Map};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    convert::TryFrom,
    fmt::{self, Display},
    path::{Component, Path},
    str::FromStr,
};

/// Task a deployed model serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Task {
    /// text-generation
    TextGeneration,
    /// text-classification
    TextClassification,
    /// question-answering
    QuestionAnswering,
    /// fill-mask
    FillMask,
    /// token-classification
    TokenClassification,
    /// conversational
    Conversational,
    /// text-to-image
    TextToImage,
    /// zero-shot-image-classification
    ZeroShotImageClassification,
}

impl Task {
    /// Every supported task.
    pub const ALL: [Task; 8] = [
        Task::TextGeneration,
        Task::TextClassification,
        Task::QuestionAnswering,
        Task::FillMask,
        Task::TokenClassification,
        Task::Conversational,
        Task::TextToImage,
        Task::ZeroShotImageClassification,
    ];

    /// Wire name of the task.
    pub fn as_str(&self) -> &'static str {
        match self {
            Task::TextGeneration => "text-generation",
            Task::TextClassification => "text-classification",
            Task::QuestionAnswering => "question-answering",
            Task::FillMask => "fill-mask",
            Task::TokenClassification => "token-classification",
            Task::Conversational => "conversational",
            Task::TextToImage => "text-to-image",
            Task::ZeroShotImageClassification => "zero-shot-image-classification",
        }
    }
}

impl Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Task {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Task::ALL
            .iter()
            .copied()
            .find(|task| task.as_str() == s)
            .ok_or_else(|| Error::validation("task", format!("unknown task `{}`", s)))
    }
}

/// Data type the weights are loaded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dtype {
    /// 32-bit float
    Fp32,
    /// 16-bit float
    Fp16,
    /// bfloat16
    Bf16,
    /// 8-bit integer
    Int8,
}

impl Default for Dtype {
    fn default() -> Self {
        Dtype::Fp32
    }
}

fn default_true() -> bool {
    true
}

fn default_one() -> u32 {
    1
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_torch_dist_port() -> u16 {
    29500
}

/// Mapping form of a [`DeploymentConfig`] before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawDeploymentConfig {
    deployment_name: String,
    task: Task,
    model: String,
    #[serde(default)]
    model_path: String,
    #[serde(default = "default_true")]
    enable_deepspeed: bool,
    #[serde(default)]
    enable_zero: bool,
    #[serde(default)]
    ds_config: Map,
    #[serde(default = "default_one")]
    tensor_parallel: u32,
    #[serde(default)]
    dtype: Dtype,
    #[serde(default)]
    meta_tensor: bool,
    #[serde(default)]
    load_with_sys_mem: bool,
    #[serde(default)]
    enable_cuda_graph: bool,
    #[serde(default = "default_true")]
    replace_with_kernel_inject: bool,
    #[serde(default)]
    profile_model_time: bool,
    #[serde(default)]
    skip_model_check: bool,
    #[serde(default)]
    trust_remote_code: bool,
    #[serde(default)]
    hf_auth_token: Option<String>,
    #[serde(default = "default_max_tokens")]
    max_tokens: u32,
    #[serde(default = "default_one")]
    replica_num: u32,
    #[serde(default)]
    deploy_rank: Vec<u32>,
    #[serde(default = "default_torch_dist_port")]
    torch_dist_port: u16,
}

impl RawDeploymentConfig {
    fn validate(&self) -> Result<(), Error> {
        path_component("deployment_name", &self.deployment_name)?;
        if self.model.trim().is_empty() {
            return Err(Error::validation("model", "must not be empty"));
        }
        if self.tensor_parallel == 0 {
            return Err(Error::validation("tensor_parallel", "must be at least 1"));
        }
        if self.replica_num == 0 {
            return Err(Error::validation("replica_num", "must be at least 1"));
        }
        if self.enable_deepspeed && self.enable_zero {
            return Err(Error::validation(
                "enable_zero",
                "DeepSpeed and ZeRO cannot both be enabled, select only one",
            ));
        }
        if self.enable_zero && !self.ds_config.contains_key("zero_optimization") {
            return Err(Error::validation(
                "ds_config",
                "enable_zero requires a `zero_optimization` section",
            ));
        }
        if self.meta_tensor && !self.enable_deepspeed {
            return Err(Error::validation(
                "meta_tensor",
                "meta tensor loading requires enable_deepspeed",
            ));
        }
        if !self.deploy_rank.is_empty() && self.deploy_rank.len() != self.tensor_parallel as usize
        {
            return Err(Error::validation(
                "deploy_rank",
                format!(
                    "expected {} ranks for tensor_parallel, got {}",
                    self.tensor_parallel,
                    self.deploy_rank.len()
                ),
            ));
        }
        Ok(())
    }
}

/// Names that become directory names must be a single plain path component.
pub(crate) fn path_component(field: &'static str, value: &str) -> Result<(), Error> {
    if value.trim().is_empty() {
        return Err(Error::validation(field, "must not be empty"));
    }
    let mut components = Path::new(value).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !value.contains('\\') => Ok(()),
        _ => Err(Error::validation(
            field,
            format!("`{}` must be a single path component", value),
        )),
    }
}

/// Settings of one deployed model.
///
/// Every construction path, deserialization included, rejects unknown keys
/// and checks cross-field constraints. Read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDeploymentConfig")]
pub struct DeploymentConfig(RawDeploymentConfig);

impl TryFrom<RawDeploymentConfig> for DeploymentConfig {
    type Error = Error;

    fn try_from(raw: RawDeploymentConfig) -> Result<Self, Error> {
        raw.validate()?;
        Ok(DeploymentConfig(raw))
    }
}

macro_rules! getter {
    ($name:ident, $t: ty, $comment: literal) => {
        #[doc=$comment]
        pub fn $name(&self) -> $t {
            self.0.$name
        }
    };
}

impl DeploymentConfig {
    /// Build and validate a config from its mapping form.
    pub fn from_map(map: Map) -> Result<Self, Error> {
        let raw: RawDeploymentConfig = serde_json::from_value(Value::Object(map))?;
        DeploymentConfig::try_from(raw)
    }

    /// Mapping form of the config, every field included.
    pub fn to_map(&self) -> Result<Map, Error> {
        match serde_json::to_value(&self.0)? {
            Value::Object(map) => Ok(map),
            _ => Err(Error::validation(
                "deployment_configs",
                "deployment config did not serialize to an object",
            )),
        }
    }

    /// Name of this deployment inside its serving unit.
    pub fn deployment_name(&self) -> &str {
        &self.0.deployment_name
    }

    /// Model identifier.
    pub fn model(&self) -> &str {
        &self.0.model
    }

    /// Directory the model is loaded from, empty for the default location.
    pub fn model_path(&self) -> &str {
        &self.0.model_path
    }

    /// DeepSpeed settings passed through to the engine.
    pub fn ds_config(&self) -> &Map {
        &self.0.ds_config
    }

    /// Token used to fetch gated checkpoints.
    pub fn hf_auth_token(&self) -> Option<&str> {
        self.0.hf_auth_token.as_deref()
    }

    /// Ranks the model is placed on; `0..tensor_parallel` unless configured.
    pub fn deploy_ranks(&self) -> Vec<u32> {
        if self.0.deploy_rank.is_empty() {
            (0..self.0.tensor_parallel).collect()
        } else {
            self.0.deploy_rank.clone()
        }
    }

    getter!(task, Task, "Task served by the model");
    getter!(enable_deepspeed, bool, "DeepSpeed inference optimizations");
    getter!(enable_zero, bool, "ZeRO inference");
    getter!(tensor_parallel, u32, "Tensor-parallel degree");
    getter!(dtype, Dtype, "Weight data type");
    getter!(meta_tensor, bool, "Load weights through meta tensors");
    getter!(load_with_sys_mem, bool, "Stage weights in system memory");
    getter!(enable_cuda_graph, bool, "Capture CUDA graphs");
    getter!(replace_with_kernel_inject, bool, "Inject DeepSpeed kernels");
    getter!(profile_model_time, bool, "Report model latency");
    getter!(skip_model_check, bool, "Skip the checkpoint existence check");
    getter!(trust_remote_code, bool, "Allow checkpoint-provided code");
    getter!(max_tokens, u32, "Upper bound on generated tokens");
    getter!(replica_num, u32, "Number of model replicas");
    getter!(torch_dist_port, u16, "Port of the distributed rendezvous");
}
