use arbor_types::Hash;
use arbor_values::{Ref, ValueError};

fn show(r: &Option<Ref>) -> String {
    r.as_ref().map_or_else(|| "none".to_string(), Ref::to_string)
}

#[derive(Debug, thiserror::Error)]
pub enum DatasError {
    /// The dataset head was not the one the caller expected.
    #[error("dataset {dataset:?} moved: expected {}, found {}", show(.expected), show(.actual))]
    Conflict {
        dataset: String,
        expected: Option<Ref>,
        actual: Option<Ref>,
    },

    /// The new commit does not descend from the current head.
    #[error("commit to {dataset:?} does not list the current head as a parent")]
    MergeNeeded { dataset: String },

    #[error("invalid root: {0}")]
    InvalidRoot(String),

    #[error("not a commit: {0}")]
    NotACommit(String),

    #[error("missing chunk: {0}")]
    MissingChunk(Hash),

    #[error("root still contended after {attempts} attempts updating {dataset:?}")]
    RootContention { dataset: String, attempts: usize },

    #[error("value error: {0}")]
    Value(#[from] ValueError),
}

pub type DatasResult<T> = Result<T, DatasError>;
