//! Score files: the entry point a process backend loads.
//!
//! A score file freezes the validated [`MIIConfig`] of a serving unit under
//! `<cache_dir>/<deployment_tag>/score.json`. The local backend imports it
//! by tag and calls [`ScoreFile::init`]; AML ships it with the image.
use crate::{
    local::{LocalHandle, LocalServer},
    model::ModelLoader,
    Error,
};
use mii_config::MIIConfig;
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

/// Environment variable overriding the cache directory.
pub const CACHE_PATH_ENV: &str = "MII_CACHE_PATH";
const DEFAULT_CACHE_PATH: &str = "/tmp/mii_cache";
const SCORE_FILE_NAME: &str = "score.json";
const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct ScoreDocument {
    format_version: u32,
    mii_config: serde_json::Value,
}

/// `$MII_CACHE_PATH`, or `/tmp/mii_cache`.
pub fn default_cache_dir() -> PathBuf {
    match env::var_os(CACHE_PATH_ENV) {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => PathBuf::from(DEFAULT_CACHE_PATH),
    }
}

/// Where the score file of `deployment_tag` lives.
pub fn score_file_path(cache_dir: &Path, deployment_tag: &str) -> PathBuf {
    cache_dir.join(deployment_tag).join(SCORE_FILE_NAME)
}

/// Write the score file of `config`, replacing any previous one.
pub fn create_score_file(config: &MIIConfig, cache_dir: &Path) -> Result<PathBuf, Error> {
    let path = score_file_path(cache_dir, config.deployment_tag());
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let document = ScoreDocument {
        format_version: FORMAT_VERSION,
        mii_config: serde_json::to_value(config)?,
    };
    fs::write(&path, serde_json::to_string_pretty(&document)?)?;
    log::info!(
        "Score file for {} written to {}",
        config.deployment_tag(),
        path.display()
    );
    Ok(path)
}

/// Read back the score file of `deployment_tag`.
pub fn import_score_file(deployment_tag: &str, cache_dir: &Path) -> Result<ScoreFile, Error> {
    let path = score_file_path(cache_dir, deployment_tag);
    let contents = match fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(Error::ScoreFile {
                path,
                reason: format!("no score file was created for `{}`", deployment_tag),
            })
        }
        Err(err) => return Err(err.into()),
    };
    let document: ScoreDocument = match serde_json::from_str(&contents) {
        Ok(document) => document,
        Err(err) => {
            return Err(Error::ScoreFile {
                path,
                reason: err.to_string(),
            })
        }
    };
    if document.format_version != FORMAT_VERSION {
        return Err(Error::ScoreFile {
            path,
            reason: format!(
                "format version {} is not supported, expected {}",
                document.format_version, FORMAT_VERSION
            ),
        });
    }
    let config = MIIConfig::from_value(document.mii_config)?;
    Ok(ScoreFile { path, config })
}

/// An imported score file.
#[derive(Debug)]
pub struct ScoreFile {
    path: PathBuf,
    config: MIIConfig,
}

impl ScoreFile {
    /// Location the score file was read from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The frozen configuration.
    pub fn config(&self) -> &MIIConfig {
        &self.config
    }

    /// Start serving the deployments of this score file.
    pub fn init(&self, loader: &dyn ModelLoader) -> Result<LocalHandle, Error> {
        LocalServer::start(&self.config, loader)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::test::fake_loader;
    use serde_json::json;

    fn config() -> MIIConfig {
        MIIConfig::from_value(json!({
            "deployment_tag": "bert_unit",
            "deployment_configs": [
                {"deployment_name": "bert", "task": "fill-mask", "model": "bert-base-uncased"},
            ],
            "port_number": 50111,
        }))
        .unwrap()
    }

    #[test]
    fn test_create_and_import() {
        let dir = tempfile::tempdir().unwrap();
        let path = create_score_file(&config(), dir.path()).unwrap();
        assert_eq!(path, dir.path().join("bert_unit").join("score.json"));
        let score_file = import_score_file("bert_unit", dir.path()).unwrap();
        assert_eq!(score_file.path(), path.as_path());
        assert_eq!(score_file.config(), &config());
        let handle = score_file.init(&fake_loader).unwrap();
        assert_eq!(handle.query("bert", vec![7]).unwrap(), vec![7]);
        handle.shutdown().unwrap();
    }

    #[test]
    fn test_import_missing() {
        let dir = tempfile::tempdir().unwrap();
        match import_score_file("absent", dir.path()) {
            Err(Error::ScoreFile { reason, .. }) => assert!(reason.contains("absent")),
            other => panic!("unexpected {:?}", other.map(|s| s.path().to_path_buf())),
        }
    }

    #[test]
    fn test_import_unsupported_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = create_score_file(&config(), dir.path()).unwrap();
        let contents = fs::read_to_string(&path)
            .unwrap()
            .replace("\"format_version\": 1", "\"format_version\": 9");
        fs::write(&path, contents).unwrap();
        assert!(matches!(
            import_score_file("bert_unit", dir.path()),
            Err(Error::ScoreFile { .. })
        ));
    }
}
