//! Error types for conversion operations
//!
//! Only fatal conditions live here. Everything a reviewer should see but that
//! does not stop a conversion (missing children, unresolved links, duplicate
//! ids) is a [`Diagnostic`](crate::report::Diagnostic) instead.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failures of the cross-reference store. All of them abort the conversion.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("store file '{path}' is not a valid JSON object: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("timed out after {waited:?} waiting for lock '{path}'")]
    LockTimeout { path: PathBuf, waited: Duration },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors that abort a whole conversion.
#[derive(Error, Debug)]
pub enum ConvertError {
    /// The source stream is not well-formed XML.
    #[error("malformed XML at byte {position}: {message}")]
    Source { position: u64, message: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("intermediate tree error: {0}")]
    Tree(#[from] serde_json::Error),

    /// The registry has no entry for the document being converted.
    #[error("document '{0}' is not listed in the registry")]
    UnknownDocument(String),

    #[error("building the tree of '{0}' needs a tree dump path")]
    MissingTreePath(String),

    #[error("render error: {0}")]
    Render(String),
}

/// A formula could not be converted. The generator degrades to the plain
/// text of the formula and records a diagnostic.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormulaError {
    #[error("formula is not well-formed MathML: {0}")]
    Parse(String),

    #[error("formula command failed: {0}")]
    Command(String),

    #[error("formula could not be serialised: {0}")]
    Serialize(String),
}

pub type Result<T, E = ConvertError> = std::result::Result<T, E>;
