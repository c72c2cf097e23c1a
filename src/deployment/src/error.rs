use std::{
    fmt::{self, Display},
    path::PathBuf,
};

/// Errors raised while deploying or serving.
#[derive(Debug)]
pub enum Error {
    /// The configuration could not be assembled or validated.
    Config(mii_config::Error),
    /// `WORLD_SIZE` differs from the tensor-parallel degree of a
    /// non-persistent deployment.
    WorldSize {
        /// Value read from the environment.
        world_size: u32,
        /// Configured tensor-parallel degree.
        tensor_parallel: u32,
    },
    /// `WORLD_SIZE` is not an integer.
    InvalidWorldSize(String),
    /// The score file is missing or unreadable.
    ScoreFile {
        /// Location that was read.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },
    /// No container registry name is configured for AML.
    AcrName,
    /// The model loader failed.
    Load {
        /// Model being loaded.
        model: String,
        /// What went wrong.
        reason: String,
    },
    /// The inference engine failed.
    Engine(String),
    /// No deployment with this name is served.
    UnknownDeployment(String),
    /// Error during sending message
    Send,
    /// Error during receiving message
    Recv,
    /// Filesystem error.
    Io(std::io::Error),
    /// Serializing an artifact failed.
    Serialize(serde_json::Error),
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(err) => Display::fmt(err, f),
            Error::WorldSize {
                world_size,
                tensor_parallel,
            } => write!(
                f,
                "World Size does not equal number of tensors (WORLD_SIZE={}, tensor_parallel={}). \
                 When using non-persistent deployment type, please launch with \
                 `deepspeed --num_gpus {}`",
                world_size, tensor_parallel, tensor_parallel
            ),
            Error::InvalidWorldSize(raw) => write!(f, "WORLD_SIZE `{}` is not an integer", raw),
            Error::ScoreFile { path, reason } => {
                write!(f, "score file {}: {}", path.display(), reason)
            }
            Error::AcrName => f.write_str(
                "no container registry configured, set AML_ACR_NAME to deploy to AML",
            ),
            Error::Load { model, reason } => write!(f, "failed to load {}: {}", model, reason),
            Error::Engine(msg) => write!(f, "inference failed: {}", msg),
            Error::UnknownDeployment(name) => write!(f, "no deployment named `{}`", name),
            Error::Send => f.write_str("local server is not running"),
            Error::Recv => f.write_str("local server dropped the request"),
            Error::Io(err) => Display::fmt(err, f),
            Error::Serialize(err) => write!(f, "failed to serialize: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Config(err) => Some(err),
            Error::Io(err) => Some(err),
            Error::Serialize(err) => Some(err),
            _ => None,
        }
    }
}

impl From<mii_config::Error> for Error {
    fn from(err: mii_config::Error) -> Self {
        Error::Config(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialize(err)
    }
}
