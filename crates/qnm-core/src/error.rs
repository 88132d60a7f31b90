use qnm_util::UnresolvablePathError;
use std::path::PathBuf;
use thiserror::Error;

/// Core error type for qnm operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Cannot resolve start directory {path}: {source}")]
    StartDirUnresolvable {
        path: PathBuf,
        #[source]
        source: UnresolvablePathError,
    },

    #[error("Cannot read start directory {path}: {source}")]
    StartDirUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid value for {var}: {value:?}")]
    InvalidEnv { var: String, value: String },
}
