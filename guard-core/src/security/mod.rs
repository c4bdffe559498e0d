/// Canonicalization-aware validation of untrusted text and paths

pub mod normalizer;
pub mod sanitizer;
pub mod patterns;
pub mod canonicalizer;
pub mod pipeline;

pub use normalizer::{normalize, normalize_bytes, EncodingError, NormalizedText};
pub use sanitizer::{sanitize, sanitize_with, AllowedCharset, CharRange, SanitizedText};
pub use patterns::{ForbiddenRule, MatchResult, RuleKind, RuleMatch, RuleSet};
pub use canonicalizer::{
    canonicalize, lexical_normalize, CanonicalPath, ProvisionalPath, ResolutionError,
    ResolutionFailure, TrustedRoot,
};
pub use pipeline::{
    BlacklistViolation, Rejection, ScanStage, SharedPipeline, TraversalError, ValidationPipeline,
    Verdict,
};
