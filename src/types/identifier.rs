// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Topic-safe identifiers.
//!
//! Every device, node, property and metadata key is addressed by an id made of
//! `[a-z0-9-]` that does not start with a hyphen. [`normalize_id`] turns an
//! arbitrary display string (a light group called "Sypialnia Łóżko", an
//! air-quality parameter called "PM2.5") into such an id.
//!
//! Two different display names can normalize to the same id ("PM2.5" and
//! "PM2-5" both become `pm2-5`). Collisions are not detected here; callers
//! that derive ids from names must keep them unique themselves.

use crate::error::ValidationError;

/// Accented letters folded to ASCII before the character-class replacement.
///
/// Lookup happens after lower-casing, so only lower-case forms are listed.
const ACCENT_FOLDING: &[(char, char)] = &[
    ('ą', 'a'),
    ('ć', 'c'),
    ('ę', 'e'),
    ('ł', 'l'),
    ('ń', 'n'),
    ('ó', 'o'),
    ('ś', 's'),
    ('ź', 'z'),
    ('ż', 'z'),
];

/// Converts a display string into a topic-safe identifier.
///
/// The string is lower-cased, the letters in the folding table are replaced
/// by their ASCII base letter, every remaining character outside `[a-z0-9]`
/// becomes one hyphen (runs are not collapsed), and leading hyphens are
/// stripped.
///
/// The function is idempotent: normalizing an already-normalized id returns
/// it unchanged.
///
/// # Examples
///
/// ```
/// use homie_bridge::types::normalize_id;
///
/// assert_eq!(normalize_id("Salon Górny"), "salon-gorny");
/// assert_eq!(normalize_id("  PM2.5"), "pm2-5");
/// assert_eq!(normalize_id(&normalize_id("Łazienka")), "lazienka");
/// ```
#[must_use]
pub fn normalize_id(input: &str) -> String {
    let normalized: String = input
        .chars()
        .flat_map(char::to_lowercase)
        .map(fold_accent)
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() {
                c
            } else {
                '-'
            }
        })
        .collect();

    normalized.trim_start_matches('-').to_string()
}

fn fold_accent(c: char) -> char {
    ACCENT_FOLDING
        .iter()
        .find_map(|&(accented, plain)| (accented == c).then_some(plain))
        .unwrap_or(c)
}

/// Returns true if `id` is non-empty, made of `[a-z0-9-]` and does not start
/// with a hyphen.
#[must_use]
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && !id.starts_with('-')
        && id
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

/// Checks that `id` is topic-safe.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidIdentifier`] otherwise.
pub fn validate_id(id: &str) -> Result<(), ValidationError> {
    if is_valid_id(id) {
        Ok(())
    } else {
        Err(ValidationError::InvalidIdentifier(id.to_string()))
    }
}

/// Default display name for an id: first letter upper-cased, hyphens shown
/// as spaces.
///
/// ```
/// use homie_bridge::types::display_name_for;
///
/// assert_eq!(display_name_for("lights-count"), "Lights count");
/// ```
#[must_use]
pub fn display_name_for(id: &str) -> String {
    let spaced = id.replace('-', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
