/// Pipeline configuration
///
/// [`GuardSettings`] is the raw, serde-facing form read from TOML.
/// [`PipelineConfig`] is the validated snapshot the pipeline runs on: the
/// rules are compiled, the charset checked and the trusted root
/// canonicalized. A `PipelineConfig` is never mutated after construction;
/// reloading means building a new one.
///
/// ```toml
/// trusted_root = "/srv/uploads"
///
/// [allowed_charset]
/// kind = "printable_ascii"
///
/// [[forbidden_rules]]
/// id = "script-tag"
/// kind = "regex"
/// pattern = '<\s*script\b'
/// case_insensitive = true
/// ```

use crate::error::{GuardError, Result};
use crate::security::canonicalizer::TrustedRoot;
use crate::security::patterns::{default_rules, ForbiddenRule, RuleSet};
use crate::security::sanitizer::AllowedCharset;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable that overrides `trusted_root`.
pub const TRUSTED_ROOT_ENV: &str = "GUARD_TRUSTED_ROOT";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardSettings {
    pub trusted_root: PathBuf,

    #[serde(default)]
    pub allowed_charset: AllowedCharset,

    #[serde(default = "default_rules")]
    pub forbidden_rules: Vec<ForbiddenRule>,
}

impl GuardSettings {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Apply `GUARD_TRUSTED_ROOT` if it is set and non-empty.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(root) = std::env::var(TRUSTED_ROOT_ENV) {
            if !root.is_empty() {
                self.trusted_root = PathBuf::from(root);
            }
        }
        self
    }
}

/// Immutable configuration snapshot.
#[derive(Debug)]
pub struct PipelineConfig {
    rules: RuleSet,
    allowed_charset: AllowedCharset,
    trusted_root: TrustedRoot,
}

impl PipelineConfig {
    pub fn new(
        forbidden_rules: Vec<ForbiddenRule>,
        allowed_charset: AllowedCharset,
        trusted_root: impl AsRef<Path>,
    ) -> Result<Self> {
        allowed_charset.check().map_err(GuardError::InvalidConfig)?;
        let rules = RuleSet::compile(forbidden_rules)?;
        let trusted_root = TrustedRoot::new(trusted_root)?;

        tracing::debug!(
            rules = rules.len(),
            root = %trusted_root.as_path().display(),
            "pipeline configuration built"
        );

        Ok(Self {
            rules,
            allowed_charset,
            trusted_root,
        })
    }

    pub fn from_settings(settings: GuardSettings) -> Result<Self> {
        Self::new(
            settings.forbidden_rules,
            settings.allowed_charset,
            settings.trusted_root,
        )
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Self::from_settings(GuardSettings::from_toml_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::from_settings(GuardSettings::load(path)?)
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn allowed_charset(&self) -> &AllowedCharset {
        &self.allowed_charset
    }

    pub fn trusted_root(&self) -> &TrustedRoot {
        &self.trusted_root
    }
}
