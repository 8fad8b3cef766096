use std::path::PathBuf;

use crate::{
    sources::{SourceError, SourceKind},
    train::TrainError,
};

/// Failures that stop a pipeline run. Per-molecule problems never end up here;
/// they are counted in the [crate::report::Report] instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{kind} source unavailable: {cause}")]
    Source {
        kind: SourceKind,
        #[source]
        cause: SourceError,
    },

    #[error("failed to access {path}: {cause}")]
    Io {
        path: PathBuf,
        #[source]
        cause: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error(transparent)]
    Train(#[from] TrainError),

    #[error("failed to build thread pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    #[error("failed to read or write model {path}: {cause}")]
    Model {
        path: PathBuf,
        #[source]
        cause: serde_json::Error,
    },

    #[error("failed to write vectors: {0}")]
    WriteNpy(#[from] ndarray_npy::WriteNpyError),

    #[error("failed to read vectors: {0}")]
    ReadNpy(#[from] ndarray_npy::ReadNpyError),

    #[error("failed to write {path}: {cause}")]
    Csv {
        path: PathBuf,
        #[source]
        cause: csv::Error,
    },
}

impl Error {
    /// tag an io error with the path it came from, for use with `map_err`
    pub(crate) fn io(
        path: impl Into<PathBuf>,
    ) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |cause| Error::Io { path, cause }
    }
}
