//! Query value object: raw text, normalized text and cache fingerprint.
//!
//! A [`Query`] is created once per request and never mutated. The
//! fingerprint is a SHA-256 over the locale and the normalized text, so two
//! queries that differ only in case, punctuation or spacing share a cache
//! entry.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::ValidationError;

/// Maximum accepted query length, in characters.
pub const MAX_QUERY_CHARS: usize = 2000;

/// Locale used when the caller does not provide one.
pub const DEFAULT_LOCALE: &str = "fr";

/// A validated, normalized user query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    raw: String,
    normalized: String,
    locale: String,
    fingerprint: String,
}

impl Query {
    /// Validate and normalize raw query text.
    ///
    /// Empty, whitespace-only and punctuation-only input is rejected.
    pub fn new(raw: impl Into<String>, locale: &str) -> Result<Self, ValidationError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(ValidationError::EmptyQuery);
        }

        let len = raw.chars().count();
        if len > MAX_QUERY_CHARS {
            return Err(ValidationError::TooLong {
                len,
                max: MAX_QUERY_CHARS,
            });
        }

        let normalized = normalize(&raw);
        if normalized.is_empty() {
            return Err(ValidationError::EmptyQuery);
        }

        let locale = if locale.trim().is_empty() {
            DEFAULT_LOCALE.to_string()
        } else {
            locale.trim().to_lowercase()
        };
        let fingerprint = fingerprint(&normalized, &locale);

        Ok(Self {
            raw,
            normalized,
            locale,
            fingerprint,
        })
    }

    /// The text exactly as the caller sent it.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Trimmed, lower-cased, punctuation-folded text.
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    /// Stable cache key for this query.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

/// Normalize query text: lower-case, fold punctuation to spaces, collapse
/// whitespace. Apostrophes and in-word hyphens are kept ("c'est", "anti-inflammatoire").
pub fn normalize(text: &str) -> String {
    let lowered: Vec<char> = text
        .trim()
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            '\u{2019}' | '\u{2018}' | '`' => '\'',
            other => other,
        })
        .collect();

    let mut folded = String::with_capacity(lowered.len());
    for (i, &c) in lowered.iter().enumerate() {
        let keep = if c.is_alphanumeric() {
            true
        } else if c == '\'' || c == '-' {
            let prev = i.checked_sub(1).and_then(|p| lowered.get(p));
            let next = lowered.get(i + 1);
            matches!((prev, next), (Some(p), Some(n)) if p.is_alphanumeric() && n.is_alphanumeric())
        } else {
            false
        };
        folded.push(if keep { c } else { ' ' });
    }

    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// SHA-256 fingerprint of the normalized text plus its locale.
pub fn fingerprint(normalized: &str, locale: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(locale.as_bytes());
    hasher.update([0x1f]);
    hasher.update(normalized.as_bytes());
    format!("{:x}", hasher.finalize())
}
