// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2024 Daniel J. H. Nebdal

//! File attachment model and its HL7 attachment-array view.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{ManifestError, Result};

/// Prefix carried by every `valueAttachment.url` in the HL7 encoding.
pub const FILE_URL_PREFIX: &str = "file://";

/// Metadata for one data file referenced by a manifest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttachment {
    /// Bare file name, no directory or protocol prefix.
    pub filename: String,
    /// Semantic label, e.g. "Methylation".
    pub description: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

impl FileAttachment {
    pub fn new(
        filename: impl Into<String>,
        description: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            filename: filename.into(),
            description: description.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Build an attachment whose MIME type is guessed from the file extension.
    pub fn with_guessed_mime(filename: impl Into<String>, description: impl Into<String>) -> Self {
        let filename = filename.into();
        let mime_type = mime_guess::from_path(Path::new(&filename))
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        Self {
            filename,
            description: description.into(),
            mime_type,
        }
    }

    /// Copy the three recognized fields out of a loose JSON record.
    ///
    /// Unrecognized fields are dropped; a missing or non-string field is a
    /// [`ManifestError::Schema`] naming that field.
    pub fn from_record(record: Value) -> Result<Self> {
        if !record.is_object() {
            return Err(ManifestError::Schema {
                detail: format!("expected an attachment record, found {record}"),
            });
        }
        serde_json::from_value(record).map_err(|err| ManifestError::Schema {
            detail: err.to_string(),
        })
    }

    /// Shape used by `Task.input[]` / `Task.output[]`.
    pub fn to_hl7(&self) -> Value {
        json!({
            "type": { "text": self.description },
            "valueAttachment": {
                "contentType": self.mime_type,
                "url": format!("{FILE_URL_PREFIX}{}", self.filename),
            },
        })
    }
}

/// What [`FileAttachmentList::insert`] accepts: one attachment, one loose
/// record, or a nested sequence of either.
#[derive(Clone, Debug, PartialEq)]
pub enum AttachmentInput {
    Attachment(FileAttachment),
    Record(Value),
    Nested(Vec<AttachmentInput>),
}

impl From<FileAttachment> for AttachmentInput {
    fn from(attachment: FileAttachment) -> Self {
        Self::Attachment(attachment)
    }
}

impl From<Value> for AttachmentInput {
    /// JSON arrays become nested inputs; anything else is a single record.
    fn from(value: Value) -> Self {
        match value {
            Value::Array(items) => Self::Nested(items.into_iter().map(Self::from).collect()),
            other => Self::Record(other),
        }
    }
}

impl<T: Into<AttachmentInput>> From<Vec<T>> for AttachmentInput {
    fn from(items: Vec<T>) -> Self {
        Self::Nested(items.into_iter().map(Into::into).collect())
    }
}

/// Ordered attachment collection owned by one manifest field.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileAttachmentList {
    files: Vec<FileAttachment>,
}

impl FileAttachmentList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a list from any accepted input shape.
    pub fn from_input(input: impl Into<AttachmentInput>) -> Result<Self> {
        let mut list = Self::new();
        list.insert(input)?;
        Ok(list)
    }

    /// Flatten `input` depth-first and append every attachment in encounter order.
    ///
    /// The list is left untouched when any record fails validation.
    pub fn insert(&mut self, input: impl Into<AttachmentInput>) -> Result<()> {
        let mut staged = Vec::new();
        flatten_into(input.into(), &mut staged)?;
        self.files.extend(staged);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileAttachment> {
        self.files.iter()
    }

    /// Bare file names in list order.
    pub fn file_names(&self) -> Vec<&str> {
        self.files.iter().map(|f| f.filename.as_str()).collect()
    }

    pub fn as_table(&self) -> &[FileAttachment] {
        &self.files
    }

    pub fn as_hl7_array(&self) -> Vec<Value> {
        self.files.iter().map(FileAttachment::to_hl7).collect()
    }
}

fn flatten_into(input: AttachmentInput, out: &mut Vec<FileAttachment>) -> Result<()> {
    match input {
        AttachmentInput::Attachment(attachment) => out.push(attachment),
        AttachmentInput::Record(record) => out.push(FileAttachment::from_record(record)?),
        AttachmentInput::Nested(items) => {
            for item in items {
                flatten_into(item, out)?;
            }
        }
    }
    Ok(())
}

impl fmt::Display for FileAttachmentList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let blocks: Vec<String> = self
            .files
            .iter()
            .map(|a| {
                format!(
                    "->  {}\n     MIME: {}\n     Description: {}",
                    a.filename, a.mime_type, a.description
                )
            })
            .collect();
        f.write_str(&blocks.join("\n"))
    }
}

/// Ensure no two packaged files land on the same archive entry.
///
/// `reserved` names (the manifest entry) count as already taken.
pub fn assert_unique_entry_names<'a>(
    names: impl IntoIterator<Item = &'a str>,
    reserved: &[&str],
) -> Result<()> {
    let mut seen: HashSet<&str> = reserved.iter().copied().collect();
    for name in names {
        if !seen.insert(name) {
            return Err(ManifestError::DuplicateEntry(name.to_string()));
        }
    }
    Ok(())
}
