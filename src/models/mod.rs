// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2024 Daniel J. H. Nebdal

//! Domain layer: the manifest record and its attachment lists.

pub mod attachment;
pub mod manifest;

pub use attachment::{AttachmentInput, FileAttachment, FileAttachmentList};
pub use manifest::{Manifest, ManifestField, Status};
