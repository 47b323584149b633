// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2024 Daniel J. H. Nebdal

//! Business logic operating on manifests.

pub mod archive;

pub use archive::{
    MANIFEST_ENTRY, PackageOutcome, extract, extract_from_path, is_archive_path, package,
};
