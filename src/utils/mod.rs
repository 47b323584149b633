// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2024 Daniel J. H. Nebdal

//! Shared helper utilities reused by the model and the archiver.

pub mod clean_filename;
pub mod json_path;
pub mod timestamp;

/// Reduce free text to a filename-safe component.
pub use clean_filename::clean_for_filename;
/// Fail-soft lookup into nested JSON values.
pub use json_path::{Segment, display_path, try_nested, try_nested_str};
/// HL7 and Unix timestamps.
pub use timestamp::{hl7_timestamp, unix_timestamp};
