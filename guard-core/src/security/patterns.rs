/// Forbidden-pattern scanning

use crate::error::{GuardError, Result};
use crate::security::normalizer::NormalizedText;
use crate::security::sanitizer::SanitizedText;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

mod sealed {
    pub trait Sealed {}
    impl Sealed for crate::security::normalizer::NormalizedText {}
    impl Sealed for crate::security::sanitizer::SanitizedText {}
}

/// Text that has been through the normalizer. Only the pipeline's own
/// text types implement it, so a raw `&str` can never be scanned.
pub trait CanonicalText: sealed::Sealed {
    fn text(&self) -> &str;
}

impl CanonicalText for NormalizedText {
    fn text(&self) -> &str {
        self.as_str()
    }
}

impl CanonicalText for SanitizedText {
    fn text(&self) -> &str {
        self.as_str()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    #[default]
    Literal,
    Regex,
}

/// A blacklist entry as it appears in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForbiddenRule {
    pub id: String,
    #[serde(default)]
    pub kind: RuleKind,
    pub pattern: String,
    #[serde(default)]
    pub case_insensitive: bool,
}

impl ForbiddenRule {
    pub fn literal(id: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: RuleKind::Literal,
            pattern: pattern.into(),
            case_insensitive: false,
        }
    }

    pub fn regex(id: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: RuleKind::Regex,
            pattern: pattern.into(),
            case_insensitive: false,
        }
    }

    pub fn case_insensitive(mut self) -> Self {
        self.case_insensitive = true;
        self
    }
}

/// Rules applied when configuration names none.
pub fn default_rules() -> Vec<ForbiddenRule> {
    vec![ForbiddenRule::regex("script-tag", r"<\s*script\b").case_insensitive()]
}

/// The first rule hit in a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleMatch {
    pub rule_id: String,
    /// Byte offset of the leftmost match.
    pub byte_offset: usize,
    pub matched: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchResult {
    Clean,
    Matched(RuleMatch),
}

impl MatchResult {
    pub fn is_clean(&self) -> bool {
        matches!(self, MatchResult::Clean)
    }
}

#[derive(Debug)]
struct CompiledRule {
    id: String,
    regex: Regex,
}

/// An immutable, compiled set of forbidden rules.
#[derive(Debug)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    pub fn compile(rules: Vec<ForbiddenRule>) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut compiled = Vec::with_capacity(rules.len());

        for rule in rules {
            if rule.id.trim().is_empty() {
                return Err(GuardError::InvalidConfig(
                    "forbidden rule id must not be empty".to_string(),
                ));
            }
            if rule.pattern.is_empty() {
                return Err(GuardError::InvalidConfig(format!(
                    "forbidden rule '{}' has an empty pattern",
                    rule.id
                )));
            }
            if !seen.insert(rule.id.clone()) {
                return Err(GuardError::InvalidConfig(format!(
                    "duplicate forbidden rule id '{}'",
                    rule.id
                )));
            }

            let source = match rule.kind {
                RuleKind::Literal => regex::escape(&rule.pattern),
                RuleKind::Regex => rule.pattern.clone(),
            };
            let regex = RegexBuilder::new(&source)
                .case_insensitive(rule.case_insensitive)
                .build()
                .map_err(|source| GuardError::InvalidRule {
                    id: rule.id.clone(),
                    source,
                })?;

            compiled.push(CompiledRule { id: rule.id, regex });
        }

        Ok(Self { rules: compiled })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.id.as_str())
    }

    /// Report the first rule, in declaration order, that matches `text`.
    pub fn validate<T: CanonicalText + ?Sized>(&self, text: &T) -> MatchResult {
        let haystack = text.text();
        for rule in &self.rules {
            if let Some(m) = rule.regex.find(haystack) {
                return MatchResult::Matched(RuleMatch {
                    rule_id: rule.id.clone(),
                    byte_offset: m.start(),
                    matched: m.as_str().to_string(),
                });
            }
        }
        MatchResult::Clean
    }
}
