use thiserror::Error;

use crate::ops::Path;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("cannot compare positions in different roots: `{left}` and `{right}`")]
    CrossRoot { left: String, right: String },

    #[error("unknown root `{0}`")]
    UnknownRoot(String),

    #[error("invalid path {path:?} in root `{root}`: {reason}")]
    InvalidPath {
        root: String,
        path: Path,
        reason: String,
    },

    #[error("range must start and end in the same parent")]
    NotFlat,

    #[error("cannot move a range into itself")]
    MoveIntoItself,

    #[error("marker `{0}` already exists")]
    DuplicateMarkerName(String),

    #[error("schema item `{0}` is already registered")]
    DuplicateSchemaItem(String),

    #[error("post-fixers did not converge after {0} iterations")]
    PostFixersDidNotConverge(usize),
}

impl ModelError {
    pub(crate) fn invalid_path(root: &str, path: &[usize], reason: impl Into<String>) -> Self {
        ModelError::InvalidPath {
            root: root.to_string(),
            path: path.to_vec(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("unknown command `{0}`")]
    Unknown(String),

    #[error("command `{0}` is already registered")]
    Duplicate(String),

    #[error("invalid options for `{command}`: {source}")]
    InvalidOptions {
        command: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("{0}")]
    Failed(String),
}
