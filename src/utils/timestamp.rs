// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2024 Daniel J. H. Nebdal

//! Timestamp helpers for HL7 fields and archive names.

use chrono::{DateTime, Local, TimeZone, Utc};

/// Format `at` as `YYYY-MM-DDThh:mm:ss±hh:mm` (colon in the UTC offset).
pub fn hl7_timestamp_at<Tz>(at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    at.format("%Y-%m-%dT%H:%M:%S%:z").to_string()
}

/// Current local time as an HL7 timestamp.
pub fn hl7_timestamp() -> String {
    hl7_timestamp_at(&Local::now())
}

/// Seconds since the Unix epoch.
pub fn unix_timestamp() -> i64 {
    Utc::now().timestamp()
}
