use std::fmt::{self, Display};

/// Errors raised while assembling or validating a configuration.
#[derive(Debug)]
pub enum Error {
    /// The caller used the API in an unsupported way.
    Usage(String),
    /// No deployment tag was supplied.
    MissingDeploymentTag,
    /// A field holds a value the schema rejects.
    Validation {
        /// Offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
    /// Input does not have the shape of the schema.
    Parse(serde_json::Error),
    /// Reading a configuration file failed.
    Io(std::io::Error),
}

impl Error {
    pub(crate) fn validation<R: Into<String>>(field: &'static str, reason: R) -> Self {
        Error::Validation {
            field,
            reason: reason.into(),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Usage(msg) => f.write_str(msg),
            Error::MissingDeploymentTag => f.write_str("a deployment tag is required"),
            Error::Validation { field, reason } => write!(f, "invalid `{}`: {}", field, reason),
            Error::Parse(err) => write!(f, "malformed configuration: {}", err),
            Error::Io(err) => write!(f, "failed to read configuration: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Parse(err) => Some(err),
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Parse(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}
