//! File codecs.
//!
//! - [`report`]: scenario execution reports (JSON),
//! - [`req_db_file`]: requirement databases (JSON),
//! - [`traceability_file`]: traceability documents (JSON or YAML).

use std::{fs, io, path::Path, path::PathBuf};

use crate::{domain::ReqDbError, engine};

pub mod report;
pub mod req_db_file;
pub mod traceability_file;

/// Errors raised while reading or writing files.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The file cannot be read or written.
    #[error("{}: {source}", path.display())]
    Io {
        /// The file.
        path: PathBuf,
        /// The underlying error.
        source: io::Error,
    },

    /// A directory cannot be scanned.
    #[error("{}: {message}", path.display())]
    Walk {
        /// The directory.
        path: PathBuf,
        /// What went wrong.
        message: String,
    },

    /// Malformed JSON content.
    #[error("{}: {source}", path.display())]
    Json {
        /// The file.
        path: PathBuf,
        /// The underlying error.
        source: serde_json::Error,
    },

    /// YAML serialization failure.
    #[error("{}: {source}", path.display())]
    Yaml {
        /// The file.
        path: PathBuf,
        /// The underlying error.
        source: serde_yaml::Error,
    },

    /// The file extension selects no known format.
    #[error("unknown extension {extension:?} for {}", path.display())]
    UnknownExtension {
        /// The file.
        path: PathBuf,
        /// The extension found, empty if none.
        extension: String,
    },

    /// The content is well-formed but inconsistent.
    #[error("{}: {message}", path.display())]
    Content {
        /// The file.
        path: PathBuf,
        /// What is wrong.
        message: String,
    },

    /// Requirement database failure.
    #[error(transparent)]
    ReqDb(#[from] ReqDbError),

    /// Scenario engine failure.
    #[error(transparent)]
    Engine(#[from] engine::Error),
}

pub(crate) fn read_to_string(path: &Path) -> Result<String, Error> {
    fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes `content`, creating parent directories as needed.
pub(crate) fn write(path: &Path, content: &str) -> Result<(), Error> {
    let io_error = |source| Error::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_error)?;
    }
    fs::write(path, content).map_err(io_error)
}

pub(crate) fn json_error(path: &Path) -> impl FnOnce(serde_json::Error) -> Error + '_ {
    move |source| Error::Json {
        path: path.to_path_buf(),
        source,
    }
}
