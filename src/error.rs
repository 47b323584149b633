// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2024 Daniel J. H. Nebdal

//! Error taxonomy shared by the manifest model and the archiver.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while building, parsing, or packaging a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// An attachment record is missing a required field or is not a record.
    #[error("Invalid attachment record: {detail}")]
    Schema { detail: String },

    /// The JSON is well-formed but is not a usable `Task`.
    #[error("Invalid manifest at `{path}`: {reason}")]
    Parse { path: String, reason: String },

    #[error("Malformed manifest JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No MANIFEST.json entry found in archive")]
    NotFound,

    #[error("Manifest is already completed")]
    AlreadyCompleted,

    #[error("Duplicate file name in package: {0}")]
    DuplicateEntry(String),

    /// A referenced file name is not a single plain path component.
    #[error("File name must be a bare name without directories: {0:?}")]
    UnsafeFileName(String),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ManifestError {
    pub(crate) fn parse(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ManifestError>;
