/// Unicode normalization for untrusted text

use serde::Serialize;
use std::fmt;
use thiserror::Error;
use unicode_normalization::{is_nfkc_quick, IsNormalized, UnicodeNormalization};

/// Raw bytes could not be decoded as UTF-8.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("input is not valid UTF-8 (first invalid byte at offset {valid_up_to})")]
pub struct EncodingError {
    pub valid_up_to: usize,
}

/// Text in NFKC form. Only [`normalize`] and [`normalize_bytes`] build one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NormalizedText(String);

impl NormalizedText {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for NormalizedText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NormalizedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Apply compatibility decomposition followed by canonical composition.
///
/// Presentation and compatibility variants collapse onto their canonical
/// counterparts, so `\u{FE64}` (SMALL LESS-THAN SIGN) and `\u{FF1C}`
/// (FULLWIDTH LESS-THAN SIGN) both become `<`.
pub fn normalize(text: &str) -> NormalizedText {
    // Already-normalized ASCII is the common case.
    if is_normalized(text) {
        return NormalizedText(text.to_string());
    }
    NormalizedText(text.nfkc().collect())
}

/// Decode `bytes` strictly as UTF-8, then [`normalize`].
pub fn normalize_bytes(bytes: &[u8]) -> Result<NormalizedText, EncodingError> {
    let text = std::str::from_utf8(bytes).map_err(|e| EncodingError {
        valid_up_to: e.valid_up_to(),
    })?;
    Ok(normalize(text))
}

/// Whether `text` is already in NFKC form.
pub fn is_normalized(text: &str) -> bool {
    match is_nfkc_quick(text.chars()) {
        IsNormalized::Yes => true,
        IsNormalized::No => false,
        IsNormalized::Maybe => text.nfkc().eq(text.chars()),
    }
}
