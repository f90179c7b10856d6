use std::path::PathBuf;
use thiserror::Error;

pub type SwitchResult<T> = Result<T, SwitchError>;

#[derive(Debug, Error)]
pub enum SwitchError {
    #[error("{0}")]
    Usage(String),

    #[error("invalid profile name: '{0}'")]
    InvalidName(String),

    #[error("profile '{0}' not found")]
    NotFound(String),

    #[error("profile '{0}' already exists (use 'remove' first)")]
    AlreadyExists(String),

    #[error("failed to parse {}: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Refresh(#[from] RefreshError),

    #[error("{program} exited with {status}; use 'claude-switch use <profile>' to restore your previous session")]
    LoginFailed { program: String, status: String },

    #[error("{0}")]
    NoCredentials(String),

    #[error("{context} {}: {source}", path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode {what}: {source}")]
    Encode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("exec {program} failed: {source}")]
    Exec {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl SwitchError {
    pub fn io(context: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            context,
            path: path.into(),
            source,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Usage(_) => 2,
            _ => 1,
        }
    }
}

#[derive(Debug, Error)]
pub enum RefreshError {
    /// The refresh token itself was rejected; only a fresh login recovers.
    #[error("refresh token is no longer valid (invalid_grant)")]
    InvalidGrant,

    #[error("token refresh failed ({status}): {body}")]
    Other { status: u16, body: String },

    #[error("malformed refresh response: {0}")]
    MalformedResponse(String),

    #[error("token refresh request failed: {0}")]
    Transport(String),
}
