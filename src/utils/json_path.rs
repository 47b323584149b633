// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2024 Daniel J. H. Nebdal

//! Fail-soft traversal of nested JSON values.

use serde_json::Value;

/// One step into a JSON tree: an object key or an array index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Segment<'a> {
    Key(&'a str),
    Index(usize),
}

/// Follow `path` through `value`, returning `None` as soon as a segment is
/// absent or the current node has the wrong shape.
pub fn try_nested<'v>(value: &'v Value, path: &[Segment<'_>]) -> Option<&'v Value> {
    path.iter().try_fold(value, |node, segment| match segment {
        Segment::Key(key) => node.as_object()?.get(*key),
        Segment::Index(idx) => node.as_array()?.get(*idx),
    })
}

/// Like [`try_nested`], but yields `fallback` unless the leaf is a string.
pub fn try_nested_str(value: &Value, path: &[Segment<'_>], fallback: &str) -> String {
    try_nested(value, path)
        .and_then(Value::as_str)
        .unwrap_or(fallback)
        .to_string()
}

/// Render a path as `a.b[0].c` for error messages.
pub fn display_path(path: &[Segment<'_>]) -> String {
    let mut out = String::new();
    for segment in path {
        match segment {
            Segment::Key(key) => {
                if !out.is_empty() {
                    out.push('.');
                }
                out.push_str(key);
            }
            Segment::Index(idx) => out.push_str(&format!("[{idx}]")),
        }
    }
    out
}
