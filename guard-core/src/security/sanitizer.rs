/// Allowed-character filtering for normalized text

use crate::security::normalizer::{is_normalized, normalize, NormalizedText};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;

/// Inclusive range of code points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharRange {
    pub start: char,
    pub end: char,
}

impl CharRange {
    pub fn contains(&self, c: char) -> bool {
        self.start <= c && c <= self.end
    }
}

/// The set of code points the sanitizer keeps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AllowedCharset {
    /// U+0020 through U+007E.
    #[default]
    PrintableAscii,
    Ranges { ranges: Vec<CharRange> },
    Explicit { chars: String },
}

impl AllowedCharset {
    pub fn contains(&self, c: char) -> bool {
        match self {
            AllowedCharset::PrintableAscii => matches!(c, ' '..='~'),
            AllowedCharset::Ranges { ranges } => ranges.iter().any(|r| r.contains(c)),
            AllowedCharset::Explicit { chars } => chars.contains(c),
        }
    }

    /// Reject ranges whose start lies after their end.
    pub fn check(&self) -> Result<(), String> {
        if let AllowedCharset::Ranges { ranges } = self {
            if let Some(bad) = ranges.iter().find(|r| r.start > r.end) {
                return Err(format!(
                    "charset range U+{:04X}..U+{:04X} is inverted",
                    bad.start as u32, bad.end as u32
                ));
            }
        }
        Ok(())
    }
}

/// Normalized text with every disallowed code point removed.
///
/// Always in NFKC form: stripping can expose sequences that compose
/// (`e` + U+FDEF + U+0301 becomes `e` + U+0301), so the sanitizer
/// renormalizes until stripping leaves the text unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SanitizedText(String);

impl SanitizedText {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for SanitizedText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SanitizedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Upper bound on strip/renormalize rounds before the ASCII fallback.
const MAX_PASSES: usize = 8;

/// Drop every code point of `text` that `allowed` does not contain.
///
/// Removal can join fragments that were separated before, so the result
/// must be scanned again; the pipeline always does.
pub fn sanitize(text: NormalizedText, allowed: &AllowedCharset) -> SanitizedText {
    match sanitize_with(text, allowed, |_| Ok::<(), Infallible>(())) {
        Ok(sanitized) => sanitized,
        Err(never) => match never {},
    }
}

/// [`sanitize`], calling `inspect` on every renormalized intermediate.
///
/// When stripping leaves text that is not NFKC, it is normalized again and
/// stripped again. Each intermediate is canonical text a forbidden pattern
/// can match, so `inspect` sees it before the next round discards parts
/// of it.
pub fn sanitize_with<E, F>(
    text: NormalizedText,
    allowed: &AllowedCharset,
    mut inspect: F,
) -> Result<SanitizedText, E>
where
    F: FnMut(&NormalizedText) -> Result<(), E>,
{
    let mut current = text;
    for _ in 0..MAX_PASSES {
        let stripped = strip(current.as_str(), allowed);
        if is_normalized(&stripped) {
            return Ok(SanitizedText(stripped));
        }
        current = normalize(&stripped);
        inspect(&current)?;
    }

    // ASCII text is always NFKC.
    tracing::debug!(passes = MAX_PASSES, "sanitizer did not settle, keeping allowed ASCII only");
    Ok(SanitizedText(
        current
            .as_str()
            .chars()
            .filter(|&c| c.is_ascii() && allowed.contains(c))
            .collect(),
    ))
}

fn strip(text: &str, allowed: &AllowedCharset) -> String {
    text.chars().filter(|&c| allowed.contains(c)).collect()
}
