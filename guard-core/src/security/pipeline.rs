/// Ordered validation of untrusted text and path fragments
///
/// Text: normalize, scan, sanitize, scan again. Path: canonicalize, then
/// check containment. Every call produces exactly one [`Verdict`].

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::log_audit;
use crate::security::canonicalizer::{
    self, CanonicalPath, ProvisionalError, ProvisionalPath, ResolutionError,
};
use crate::security::normalizer::{self, EncodingError, NormalizedText};
use crate::security::patterns::{CanonicalText, MatchResult, RuleMatch};
use crate::security::sanitizer::{self, SanitizedText};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Which text form a forbidden rule matched in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStage {
    Normalized,
    Sanitized,
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("forbidden rule '{rule_id}' matched at byte {byte_offset} of {stage:?} text")]
pub struct BlacklistViolation {
    pub rule_id: String,
    pub byte_offset: usize,
    pub matched: String,
    pub stage: ScanStage,
}

impl BlacklistViolation {
    fn new(found: RuleMatch, stage: ScanStage) -> Self {
        Self {
            rule_id: found.rule_id,
            byte_offset: found.byte_offset,
            matched: found.matched,
            stage,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("'{fragment}' resolves to {resolved:?}, outside trusted root {root:?}")]
pub struct TraversalError {
    pub fragment: String,
    pub resolved: PathBuf,
    pub root: PathBuf,
}

/// Why an input was refused.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rejection {
    #[error(transparent)]
    Encoding(EncodingError),
    #[error(transparent)]
    BlacklistViolation(BlacklistViolation),
    #[error(transparent)]
    Resolution(ResolutionError),
    #[error(transparent)]
    Traversal(TraversalError),
}

impl Rejection {
    /// Stable label used for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Rejection::Encoding(_) => "encoding",
            Rejection::BlacklistViolation(_) => "blacklist_violation",
            Rejection::Resolution(_) => "resolution",
            Rejection::Traversal(_) => "traversal",
        }
    }
}

/// The single outcome of one pipeline call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", content = "value", rename_all = "snake_case")]
pub enum Verdict<T> {
    Accept(T),
    Reject(Rejection),
}

impl<T> Verdict<T> {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accept(_))
    }

    pub fn accepted(self) -> Option<T> {
        match self {
            Verdict::Accept(value) => Some(value),
            Verdict::Reject(_) => None,
        }
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Verdict::Accept(_) => None,
            Verdict::Reject(reason) => Some(reason),
        }
    }

    pub fn into_result(self) -> std::result::Result<T, Rejection> {
        match self {
            Verdict::Accept(value) => Ok(value),
            Verdict::Reject(reason) => Err(reason),
        }
    }
}

impl<T> From<std::result::Result<T, Rejection>> for Verdict<T> {
    fn from(result: std::result::Result<T, Rejection>) -> Self {
        match result {
            Ok(value) => Verdict::Accept(value),
            Err(reason) => Verdict::Reject(reason),
        }
    }
}

/// Validates text and paths against one immutable configuration.
///
/// Holds no mutable state, so a single instance can be shared across
/// threads without locking.
#[derive(Debug)]
pub struct ValidationPipeline {
    config: PipelineConfig,
}

impl ValidationPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Validate well-formed Unicode text.
    pub fn validate_text(&self, raw: &str) -> Verdict<SanitizedText> {
        let verdict: Verdict<SanitizedText> = self.screen(normalizer::normalize(raw)).into();
        self.audit_text(raw.len(), &verdict);
        verdict
    }

    /// Validate undecoded bytes; malformed UTF-8 is rejected.
    pub fn validate_text_bytes(&self, raw: &[u8]) -> Verdict<SanitizedText> {
        let verdict: Verdict<SanitizedText> = normalizer::normalize_bytes(raw)
            .map_err(Rejection::Encoding)
            .and_then(|normalized| self.screen(normalized))
            .into();
        self.audit_text(raw.len(), &verdict);
        verdict
    }

    /// Scan before and after sanitizing. Stripping can join two halves of
    /// a forbidden pattern, so the second scan is unconditional. Forms the
    /// sanitizer renormalizes along the way are scanned as well.
    fn screen(&self, normalized: NormalizedText) -> std::result::Result<SanitizedText, Rejection> {
        self.scan(&normalized, ScanStage::Normalized)?;
        let sanitized = sanitizer::sanitize_with(normalized, self.config.allowed_charset(), |n| {
            self.scan(n, ScanStage::Sanitized)
        })?;
        self.scan(&sanitized, ScanStage::Sanitized)?;
        Ok(sanitized)
    }

    fn scan<T: CanonicalText>(&self, text: &T, stage: ScanStage) -> std::result::Result<(), Rejection> {
        match self.config.rules().validate(text) {
            MatchResult::Clean => Ok(()),
            MatchResult::Matched(found) => Err(Rejection::BlacklistViolation(
                BlacklistViolation::new(found, stage),
            )),
        }
    }

    /// Validate a fragment relative to the trusted root. The target must exist.
    pub fn validate_path(&self, fragment: &str) -> Verdict<CanonicalPath> {
        let verdict: Verdict<CanonicalPath> = self.resolve_contained(fragment).into();
        self.audit_path(fragment, &verdict);
        verdict
    }

    fn resolve_contained(&self, fragment: &str) -> std::result::Result<CanonicalPath, Rejection> {
        self.contain(fragment, canonicalizer::canonicalize(self.config.trusted_root(), fragment))
    }

    fn contain(
        &self,
        fragment: &str,
        resolved: std::result::Result<CanonicalPath, ResolutionError>,
    ) -> std::result::Result<CanonicalPath, Rejection> {
        let root = self.config.trusted_root();
        let canonical = resolved.map_err(Rejection::Resolution)?;
        if !root.contains(canonical.as_path()) {
            return Err(Rejection::Traversal(TraversalError {
                fragment: fragment.to_string(),
                resolved: canonical.into_path_buf(),
                root: root.as_path().to_path_buf(),
            }));
        }
        Ok(canonical)
    }

    /// Validate a fragment whose target may not exist yet.
    ///
    /// Only the existing ancestor is canonically resolved. Once the target
    /// is created, call [`ProvisionalPath::confirm`].
    pub fn validate_new_path(&self, fragment: &str) -> Verdict<ProvisionalPath> {
        let root = self.config.trusted_root();
        let verdict = match canonicalizer::resolve_provisional(root, fragment) {
            Ok(provisional) if root.contains(provisional.as_path()) => Verdict::Accept(provisional),
            Ok(provisional) => Verdict::Reject(Rejection::Traversal(TraversalError {
                fragment: fragment.to_string(),
                resolved: provisional.path,
                root: root.as_path().to_path_buf(),
            })),
            Err(ProvisionalError::Escapes) => Verdict::Reject(Rejection::Traversal(TraversalError {
                fragment: fragment.to_string(),
                resolved: root.as_path().join(fragment),
                root: root.as_path().to_path_buf(),
            })),
            Err(ProvisionalError::Resolution(err)) => Verdict::Reject(Rejection::Resolution(err)),
        };
        self.audit_path(fragment, &verdict);
        verdict
    }

    /// Run [`validate_path`](Self::validate_path) on tokio's blocking pool.
    ///
    /// Canonicalization does synchronous I/O; this keeps it off async
    /// worker threads. There is no timeout; wrap the future if one is needed.
    pub async fn validate_path_offloaded(
        self: Arc<Self>,
        fragment: String,
    ) -> Result<Verdict<CanonicalPath>> {
        let verdict =
            tokio::task::spawn_blocking(move || self.validate_path(&fragment)).await?;
        Ok(verdict)
    }

    fn audit_text(&self, input_len: usize, verdict: &Verdict<SanitizedText>) {
        match verdict {
            Verdict::Accept(text) => {
                log_audit!(debug, "text", input_len, output_len = text.as_str().len(), "accepted");
            }
            Verdict::Reject(reason) => {
                log_audit!(warn, "text", input_len, reason = reason.kind(), detail = %reason, "rejected");
            }
        }
    }

    fn audit_path<T>(&self, fragment: &str, verdict: &Verdict<T>) {
        match verdict {
            Verdict::Accept(_) => {
                log_audit!(debug, "path", fragment_len = fragment.len(), "accepted");
            }
            Verdict::Reject(reason) => {
                log_audit!(warn, "path", fragment_len = fragment.len(), reason = reason.kind(), detail = %reason, "rejected");
            }
        }
    }
}

impl ProvisionalPath {
    /// Re-validate canonically after the target has been created.
    ///
    /// Resolves the provisional path itself, not the original fragment:
    /// the two differ when the fragment has `..` after a symlink.
    pub fn confirm(self, pipeline: &ValidationPipeline) -> Verdict<CanonicalPath> {
        let verdict: Verdict<CanonicalPath> =
            pipeline.contain(&self.fragment, self.canonicalize()).into();
        pipeline.audit_path(&self.fragment, &verdict);
        verdict
    }
}

/// Holder for the current pipeline that supports whole-snapshot reload.
///
/// Readers clone the `Arc` and validate without holding the lock; a reload
/// swaps in a fully built pipeline, never a partially updated one.
#[derive(Debug)]
pub struct SharedPipeline {
    current: RwLock<Arc<ValidationPipeline>>,
}

impl SharedPipeline {
    pub fn new(pipeline: ValidationPipeline) -> Self {
        Self {
            current: RwLock::new(Arc::new(pipeline)),
        }
    }

    pub fn snapshot(&self) -> Arc<ValidationPipeline> {
        // The guarded value is an immutable Arc, so a poisoned lock still holds a valid one.
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Replace the configuration, returning the previous pipeline.
    pub fn reload(&self, config: PipelineConfig) -> Arc<ValidationPipeline> {
        let next = Arc::new(ValidationPipeline::new(config));
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        tracing::info!(rules = next.config().rules().len(), "pipeline configuration reloaded");
        std::mem::replace(&mut *guard, next)
    }
}
