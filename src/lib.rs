// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2024 Daniel J. H. Nebdal

//! Teamplay transfer manifests: the job record, its HL7 FHIR `Task`
//! encoding, and ZIP packaging of the manifest with its data files.

pub mod app;
pub mod error;
pub mod logic;
pub mod models;
pub mod utils;

pub use error::{ManifestError, Result};
pub use logic::{PackageOutcome, extract, package};
pub use models::{FileAttachment, FileAttachmentList, Manifest, Status};
