// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2024 Daniel J. H. Nebdal

//! Transfer manifest and its HL7 FHIR `Task` encoding.
//!
//! A manifest starts out `requested` (input files only) and is completed
//! exactly once by [`Manifest::mark_done`], which attaches the output files.

use std::fmt;
use std::io::Read;

use serde_json::{Map, Value, json};

use crate::error::{ManifestError, Result};
use crate::models::attachment::{
    AttachmentInput, FILE_URL_PREFIX, FileAttachment, FileAttachmentList,
};
use crate::utils::json_path::Segment::{Index, Key};
use crate::utils::{
    Segment, clean_for_filename, display_path, hl7_timestamp, try_nested, try_nested_str,
    unix_timestamp,
};

const XHTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// Task lifecycle state. `Completed` is terminal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Status {
    #[default]
    Requested,
    Completed,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Requested => "requested",
            Status::Completed => "completed",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "requested" => Some(Status::Requested),
            "completed" => Some(Status::Completed),
            _ => None,
        }
    }

    /// Stage marker used as the first archive-name component.
    fn stage(&self) -> &'static str {
        match self {
            Status::Requested => "NEW",
            Status::Completed => "RES",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One value in the [`Manifest::entries`] view.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ManifestField<'a> {
    Text(&'a str),
    Files(&'a FileAttachmentList),
}

/// A single clinical-data-transfer job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Manifest {
    status: Status,
    authored_on: String,
    last_modified: String,
    pub patient_id: String,
    pub encounter: String,
    pub performer: String,
    /// Archive reference (`for.reference`), set by packaging.
    pub zipfile: String,
    input_files: FileAttachmentList,
    output_files: FileAttachmentList,
}

impl Manifest {
    /// Create a fresh `requested` manifest authored now.
    ///
    /// At least one input file is required.
    pub fn new(
        patient_id: impl Into<String>,
        encounter: impl Into<String>,
        performer: impl Into<String>,
        files: impl Into<AttachmentInput>,
    ) -> Result<Self> {
        Ok(Self {
            status: Status::Requested,
            authored_on: hl7_timestamp(),
            last_modified: String::new(),
            patient_id: patient_id.into(),
            encounter: encounter.into(),
            performer: performer.into(),
            zipfile: String::new(),
            input_files: non_empty_files(files, "input")?,
            output_files: FileAttachmentList::new(),
        })
    }

    /// Rebuild a manifest from an already-parsed HL7 `Task`.
    ///
    /// Reference fields (`for`, `focus`, `encounter`, `requestedPerformer`)
    /// fall back to empty strings; `status`, `authoredOn` and a non-empty
    /// `input` are required. `output` and `lastModified` are only read for a
    /// completed task, and `output` must then list at least one file.
    pub fn from_parsed(task: &Value) -> Result<Self> {
        if !task.is_object() {
            return Err(ManifestError::parse("$", "expected a JSON object"));
        }
        if let Some(kind) = task.get("resourceType")
            && kind != "Task"
        {
            return Err(ManifestError::parse(
                "resourceType",
                format!("expected \"Task\", found {kind}"),
            ));
        }

        let raw_status = required_str(task, &[Key("status")])?;
        let status = Status::parse(raw_status).ok_or_else(|| {
            ManifestError::parse("status", format!("unsupported status {raw_status:?}"))
        })?;
        let authored_on = required_str(task, &[Key("authoredOn")])?.to_string();

        let input_files = attachments_from_hl7(task, "input")?;
        let (output_files, last_modified) = match status {
            Status::Completed => (
                attachments_from_hl7(task, "output")?,
                try_nested_str(task, &[Key("lastModified")], ""),
            ),
            Status::Requested => (FileAttachmentList::new(), String::new()),
        };

        Ok(Self {
            status,
            authored_on,
            last_modified,
            patient_id: try_nested_str(task, &[Key("focus"), Key("reference")], ""),
            encounter: try_nested_str(task, &[Key("encounter"), Key("reference")], ""),
            performer: try_nested_str(
                task,
                &[
                    Key("requestedPerformer"),
                    Index(0),
                    Key("reference"),
                    Key("reference"),
                ],
                "",
            ),
            zipfile: try_nested_str(task, &[Key("for"), Key("reference")], ""),
            input_files,
            output_files,
        })
    }

    pub fn from_json_text(text: &str) -> Result<Self> {
        let parsed: Value = serde_json::from_str(text)?;
        Self::from_parsed(&parsed)
    }

    pub fn from_reader(reader: impl Read) -> Result<Self> {
        let parsed: Value = serde_json::from_reader(reader)?;
        Self::from_parsed(&parsed)
    }

    /// Complete the job: `requested` → `completed`, stamping `lastModified`.
    ///
    /// Fails without changing anything if the manifest is already completed,
    /// no output file is given, or any output record is invalid.
    pub fn mark_done(&mut self, files: impl Into<AttachmentInput>) -> Result<&mut Self> {
        if self.status == Status::Completed {
            return Err(ManifestError::AlreadyCompleted);
        }
        let output_files = non_empty_files(files, "output")?;
        self.status = Status::Completed;
        self.last_modified = hl7_timestamp();
        self.output_files = output_files;
        Ok(self)
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn authored_on(&self) -> &str {
        &self.authored_on
    }

    pub fn last_modified(&self) -> &str {
        &self.last_modified
    }

    pub fn input_files(&self) -> &FileAttachmentList {
        &self.input_files
    }

    pub fn output_files(&self) -> &FileAttachmentList {
        &self.output_files
    }

    /// Files that belong in this manifest's archive for its current state.
    pub fn files_to_package(&self) -> &FileAttachmentList {
        match self.status {
            Status::Completed => &self.output_files,
            Status::Requested => &self.input_files,
        }
    }

    /// Ordered key/value view of the manifest's fields.
    pub fn entries(&self) -> [(&'static str, ManifestField<'_>); 8] {
        [
            ("status", ManifestField::Text(self.status.as_str())),
            ("authoredOn", ManifestField::Text(&self.authored_on)),
            ("zipfile", ManifestField::Text(&self.zipfile)),
            ("patientID", ManifestField::Text(&self.patient_id)),
            ("encounter", ManifestField::Text(&self.encounter)),
            ("performer", ManifestField::Text(&self.performer)),
            ("inputFiles", ManifestField::Files(&self.input_files)),
            ("outputFiles", ManifestField::Files(&self.output_files)),
        ]
    }

    fn div_text(&self) -> String {
        let kind = match self.status {
            Status::Completed => "Output",
            Status::Requested => "Input",
        };
        format!(
            "<div xmlns='{XHTML_NAMESPACE}'>{kind} task for {}, created {}</div>",
            self.patient_id, self.authored_on
        )
    }

    /// Encode as an HL7 FHIR `Task`.
    pub fn to_hl7(&self) -> Value {
        let mut task = Map::new();
        task.insert("resourceType".into(), json!("Task"));
        task.insert(
            "text".into(),
            json!({ "status": "generated", "div": self.div_text() }),
        );
        task.insert("status".into(), json!(self.status.as_str()));
        task.insert("intent".into(), json!("order"));
        task.insert("authoredOn".into(), json!(self.authored_on));
        task.insert("focus".into(), json!({ "reference": self.patient_id }));
        task.insert("encounter".into(), json!({ "reference": self.encounter }));
        task.insert(
            "requestedPerformer".into(),
            json!([{ "reference": { "reference": self.performer } }]),
        );
        task.insert("for".into(), json!({ "reference": self.zipfile }));

        if !self.input_files.is_empty() {
            task.insert("input".into(), Value::Array(self.input_files.as_hl7_array()));
        }
        if !self.output_files.is_empty() {
            task.insert(
                "output".into(),
                Value::Array(self.output_files.as_hl7_array()),
            );
        }
        if !self.last_modified.is_empty() {
            task.insert("lastModified".into(), json!(self.last_modified));
        }

        Value::Object(task)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_hl7())?)
    }

    /// Archive name stamped with the current time.
    pub fn make_archive_name(&self, extension: &str) -> String {
        self.make_archive_name_at(extension, unix_timestamp())
    }

    /// `{stage}.{patient}.{encounter}.{performer}.{unix_ts}.{extension}`, every
    /// component cleaned for filename use.
    pub fn make_archive_name_at(&self, extension: &str, unix_ts: i64) -> String {
        let stamp = unix_ts.to_string();
        [
            self.status.stage(),
            self.patient_id.as_str(),
            self.encounter.as_str(),
            self.performer.as_str(),
            stamp.as_str(),
            extension,
        ]
        .iter()
        .map(|component| clean_for_filename(component))
        .collect::<Vec<_>>()
        .join(".")
    }
}

impl fmt::Display for Manifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Manifest for [{}] @ [{}] on [{}]",
            self.patient_id, self.encounter, self.performer
        )?;
        writeln!(f, "Status   {}", self.status)?;
        writeln!(f, "Created  {}", self.authored_on)?;
        if self.status == Status::Completed {
            writeln!(f, "Finished {}", self.last_modified)?;
        }
        write!(f, "[ Input ]\n{}", self.input_files)?;
        if self.status == Status::Completed {
            write!(f, "\n[ Output ]\n{}", self.output_files)?;
        }
        Ok(())
    }
}

fn required_str<'v>(task: &'v Value, path: &[Segment<'_>]) -> Result<&'v str> {
    try_nested(task, path)
        .and_then(Value::as_str)
        .ok_or_else(|| ManifestError::parse(display_path(path), "missing or not a string"))
}

/// Build a list that must hold at least one attachment.
fn non_empty_files(files: impl Into<AttachmentInput>, role: &str) -> Result<FileAttachmentList> {
    let list = FileAttachmentList::from_input(files)?;
    if list.is_empty() {
        return Err(ManifestError::Schema {
            detail: format!("at least one {role} file is required"),
        });
    }
    Ok(list)
}

/// Read `task[key]` (an HL7 attachment array) back into a list.
fn attachments_from_hl7(task: &Value, key: &str) -> Result<FileAttachmentList> {
    let items = task
        .get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| ManifestError::parse(key, "missing or not an array"))?;
    if items.is_empty() {
        return Err(ManifestError::parse(key, "must list at least one file"));
    }

    let mut files = Vec::with_capacity(items.len());
    for idx in 0..items.len() {
        let url = required_str(task, &[Key(key), Index(idx), Key("valueAttachment"), Key("url")])?;
        let mime_type = required_str(
            task,
            &[Key(key), Index(idx), Key("valueAttachment"), Key("contentType")],
        )?;
        let description = required_str(task, &[Key(key), Index(idx), Key("type"), Key("text")])?;

        files.push(FileAttachment::new(
            url.strip_prefix(FILE_URL_PREFIX).unwrap_or(url),
            description,
            mime_type,
        ));
    }
    FileAttachmentList::from_input(files)
}
