//! Argument handling of the `deploy` tool.
//!
//! `--config` takes the canonical form: a JSON object with a
//! `deployment_configs` list and serving-level keys. `--task`/`--model` and
//! the other legacy flags describe a single model the old way. A config file
//! that lists deployments cannot be combined with legacy flags.
use deployment::Deployer;
use mii_config::{DeployRequest, DeploymentType, Error, LegacyArgs, Map, Task};
use serde_json::Value;
use std::{
    fs,
    path::{Path, PathBuf},
};

const LEGACY_ONLY: [&str; 5] = [
    "model_path",
    "disable_deepspeed",
    "enable_zero",
    "ds_config",
    "api_version",
];

/// Command line definition.
pub fn app() -> clap::App<'static, 'static> {
    use clap::{App, Arg};
    App::new("MII Deploy")
        .about("Deploy models to a local server, Azure ML or the current process")
        .arg(
            Arg::with_name("name")
                .short("n")
                .long("name")
                .help("Deployment tag of the serving unit, overrides the config file's")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("config")
                .short("f")
                .long("config")
                .help("JSON file holding deployment_configs and serving-level settings")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("deployment_type")
                .short("d")
                .long("deployment-type")
                .help("Backend to deploy to")
                .possible_values(&["local", "aml", "non-persistent"])
                .takes_value(true),
        )
        .arg(
            Arg::with_name("task")
                .short("t")
                .long("task")
                .help("Task of the model, e.g. text-generation (legacy form)")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("model")
                .short("m")
                .long("model")
                .help("Model identifier (legacy form)")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("model_path")
                .long("model-path")
                .help("Directory holding the model (legacy form)")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("disable_deepspeed")
                .long("disable-deepspeed")
                .help("Serve without DeepSpeed optimizations (legacy form)"),
        )
        .arg(
            Arg::with_name("enable_zero")
                .long("enable-zero")
                .help("Serve with ZeRO inference, needs --disable-deepspeed (legacy form)"),
        )
        .arg(
            Arg::with_name("ds_config")
                .long("ds-config")
                .help("JSON file with DeepSpeed settings (legacy form)")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("api_version")
                .long("api-version")
                .help("API version stamped on generated assets (legacy form)")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("cache_dir")
                .long("cache-dir")
                .help("Directory score files are written to, default $MII_CACHE_PATH or /tmp/mii_cache")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("aml_output_dir")
                .long("aml-output-dir")
                .help("Directory AML assets are generated in, default the working directory")
                .takes_value(true),
        )
}

fn read_json_object(path: &Path) -> Result<Map, Error> {
    let contents = fs::read_to_string(path)?;
    match serde_json::from_str::<Value>(&contents)? {
        Value::Object(map) => Ok(map),
        _ => Err(Error::Usage(format!(
            "{} must hold a JSON object",
            path.display()
        ))),
    }
}

type ConfigFile = (Option<String>, Vec<Map>, Map);

fn read_config_file(path: &Path) -> Result<ConfigFile, Error> {
    let mut mii_config = read_json_object(path)?;
    let deployment_tag = match mii_config.remove("deployment_tag") {
        Some(Value::String(tag)) => Some(tag),
        Some(_) => return Err(Error::Usage("deployment_tag must be a string".into())),
        None => None,
    };
    let deployment_configs = match mii_config.remove("deployment_configs") {
        Some(Value::Array(items)) => {
            let mut configs = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::Object(map) => configs.push(map),
                    _ => {
                        return Err(Error::Usage(
                            "every entry of deployment_configs must be an object".into(),
                        ))
                    }
                }
            }
            configs
        }
        Some(_) => return Err(Error::Usage("deployment_configs must be a list".into())),
        None => vec![],
    };
    Ok((deployment_tag, deployment_configs, mii_config))
}

fn legacy_args(matches: &clap::ArgMatches<'_>) -> Result<Option<LegacyArgs>, Error> {
    let (task, model) = match (matches.value_of("task"), matches.value_of("model")) {
        (None, None) => {
            if let Some(flag) = LEGACY_ONLY.iter().find(|flag| matches.is_present(flag)) {
                return Err(Error::Usage(format!(
                    "`{}` belongs to the legacy form and needs --task and --model",
                    flag
                )));
            }
            return Ok(None);
        }
        (Some(task), Some(model)) => (task.parse::<Task>()?, model),
        _ => {
            return Err(Error::Usage(
                "the legacy form needs both --task and --model".into(),
            ))
        }
    };
    let mut args = LegacyArgs::new(task, model)
        .enable_deepspeed(!matches.is_present("disable_deepspeed"))
        .enable_zero(matches.is_present("enable_zero"));
    if let Some(model_path) = matches.value_of("model_path") {
        args = args.model_path(model_path.to_string());
    }
    if let Some(path) = matches.value_of("ds_config") {
        args = args.ds_config(read_json_object(Path::new(path))?);
    }
    if let Some(version) = matches.value_of("api_version") {
        let version = version.parse().map_err(|_| {
            Error::Usage(format!("--api-version `{}` is not an integer", version))
        })?;
        args = args.version(version);
    }
    Ok(Some(args))
}

/// Assemble the deploy request the arguments describe.
pub fn request(matches: &clap::ArgMatches<'_>) -> Result<DeployRequest, Error> {
    let (file_tag, deployment_configs, mut mii_config) = match matches.value_of("config") {
        Some(path) => read_config_file(Path::new(path))?,
        None => (None, vec![], Map::new()),
    };
    let deployment_tag = matches
        .value_of("name")
        .map(str::to_string)
        .or(file_tag)
        .unwrap_or_default();
    let deployment_type = match matches.value_of("deployment_type") {
        Some(deployment_type) => Some(deployment_type.parse::<DeploymentType>()?),
        None => None,
    };
    match legacy_args(matches)? {
        Some(mut args) => {
            if let Some(deployment_type) = deployment_type {
                args = args.deployment_type(deployment_type);
            }
            let mii_config = if mii_config.is_empty() {
                None
            } else {
                Some(mii_config)
            };
            DeployRequest::from_parts(deployment_tag, deployment_configs, mii_config, Some(args))
        }
        None => {
            if let Some(deployment_type) = deployment_type {
                mii_config.insert(
                    "deployment_type".into(),
                    Value::from(deployment_type.as_str()),
                );
            }
            DeployRequest::from_parts(deployment_tag, deployment_configs, Some(mii_config), None)
        }
    }
}

/// Deployer configured by the arguments.
pub fn deployer(matches: &clap::ArgMatches<'_>) -> Deployer {
    let mut builder = Deployer::builder();
    if let Some(dir) = matches.value_of("cache_dir") {
        builder = builder.cache_dir(PathBuf::from(dir));
    }
    if let Some(dir) = matches.value_of("aml_output_dir") {
        builder = builder.aml_output_dir(PathBuf::from(dir));
    }
    builder.build()
}
