// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2024 Daniel J. H. Nebdal

//! Produce archive-name components that survive any filesystem.

/// Reduce free text to the `[A-Za-z0-9_()-]` alphabet.
///
/// # Steps
/// - Every non-ASCII code point becomes `_` (one per code point, no transliteration).
/// - `?` becomes `_`.
/// - Anything else outside the allowed set becomes `_`.
///
/// Dots are replaced as well, so a cleaned component can be dot-joined
/// without changing the number of components. Applying the function twice
/// gives the same result as applying it once.
pub fn clean_for_filename(value: &str) -> String {
    value
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '(' | ')') {
                ch
            } else {
                '_'
            }
        })
        .collect()
}
