//! A deployment request in either calling convention.
use crate::{DeploymentConfig, Error, LegacyArgs, MIIConfig, Map};
use serde_json::Value;

const MIXED_API: &str = "We do not support mixture of legacy and new API options, use latest API.";

/// What a caller asked to deploy, before validation.
#[derive(Debug, Clone)]
pub enum DeployRequest {
    /// Flat legacy arguments describing a single model.
    Legacy {
        /// Identifier of the serving unit, also used as the deployment name.
        deployment_tag: String,
        /// The legacy arguments.
        args: LegacyArgs,
    },
    /// One mapping per deployment plus serving-level settings.
    Canonical {
        /// Identifier of the serving unit.
        deployment_tag: String,
        /// Per-deployment mappings.
        deployment_configs: Vec<Map>,
        /// Serving-level mapping.
        mii_config: Map,
    },
}

impl DeployRequest {
    /// Request in the legacy convention.
    pub fn legacy<S: Into<String>>(deployment_tag: S, args: LegacyArgs) -> Self {
        DeployRequest::Legacy {
            deployment_tag: deployment_tag.into(),
            args,
        }
    }

    /// Request in the canonical convention.
    pub fn canonical<S: Into<String>>(
        deployment_tag: S,
        deployment_configs: Vec<Map>,
        mii_config: Option<Map>,
    ) -> Self {
        DeployRequest::Canonical {
            deployment_tag: deployment_tag.into(),
            deployment_configs,
            mii_config: mii_config.unwrap_or_default(),
        }
    }

    /// Request from whatever the caller supplied.
    ///
    /// Non-empty `deployment_configs` together with legacy arguments is a
    /// usage error. With legacy arguments, `mii_config` becomes their
    /// serving-level mapping.
    pub fn from_parts<S: Into<String>>(
        deployment_tag: S,
        deployment_configs: Vec<Map>,
        mii_config: Option<Map>,
        legacy: Option<LegacyArgs>,
    ) -> Result<Self, Error> {
        match legacy {
            Some(_) if !deployment_configs.is_empty() => Err(Error::Usage(MIXED_API.into())),
            Some(mut args) => {
                if let Some(mii_config) = mii_config {
                    if args.has_mii_config() {
                        return Err(Error::Usage(MIXED_API.into()));
                    }
                    args = args.mii_config(mii_config);
                }
                Ok(DeployRequest::legacy(deployment_tag, args))
            }
            None => Ok(DeployRequest::canonical(
                deployment_tag,
                deployment_configs,
                mii_config,
            )),
        }
    }

    /// Identifier of the serving unit.
    pub fn deployment_tag(&self) -> &str {
        match self {
            DeployRequest::Legacy { deployment_tag, .. } => deployment_tag.as_str(),
            DeployRequest::Canonical { deployment_tag, .. } => deployment_tag.as_str(),
        }
    }

    /// Validate the request into a serving configuration.
    pub fn into_config(self) -> Result<MIIConfig, Error> {
        match self {
            DeployRequest::Legacy {
                deployment_tag,
                args,
            } => {
                if deployment_tag.trim().is_empty() {
                    return Err(Error::MissingDeploymentTag);
                }
                let (mut deployment, mut serving) = args.normalize();
                deployment.insert(
                    "deployment_name".into(),
                    Value::from(deployment_tag.clone()),
                );
                serving.insert("deployment_tag".into(), Value::from(deployment_tag));
                let deployment = DeploymentConfig::from_map(deployment)?;
                serving.insert(
                    "deployment_configs".into(),
                    Value::Array(vec![Value::Object(deployment.to_map()?)]),
                );
                MIIConfig::from_map(serving)
            }
            DeployRequest::Canonical {
                deployment_tag,
                deployment_configs,
                mut mii_config,
            } => {
                if deployment_tag.trim().is_empty() {
                    return Err(Error::MissingDeploymentTag);
                }
                let mut configs = Vec::with_capacity(deployment_configs.len());
                for map in deployment_configs {
                    let config = DeploymentConfig::from_map(map)?;
                    configs.push(Value::Object(config.to_map()?));
                }
                mii_config.insert("deployment_configs".into(), Value::Array(configs));
                mii_config.insert("deployment_tag".into(), Value::from(deployment_tag));
                MIIConfig::from_map(mii_config)
            }
        }
    }
}
