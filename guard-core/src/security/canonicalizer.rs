/// Filesystem canonicalization of untrusted path fragments
///
/// Nothing here decides whether a path is allowed; it only resolves.
/// Containment is checked by the pipeline on the resolved value.

use crate::error::{GuardError, Result};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Why the filesystem could not resolve a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionFailure {
    NotFound,
    PermissionDenied,
    InvalidInput,
    Other,
}

impl From<io::ErrorKind> for ResolutionFailure {
    fn from(kind: io::ErrorKind) -> Self {
        match kind {
            io::ErrorKind::NotFound => ResolutionFailure::NotFound,
            io::ErrorKind::PermissionDenied => ResolutionFailure::PermissionDenied,
            io::ErrorKind::InvalidInput => ResolutionFailure::InvalidInput,
            _ => ResolutionFailure::Other,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("cannot resolve '{fragment}': {message}")]
pub struct ResolutionError {
    pub fragment: String,
    pub failure: ResolutionFailure,
    pub message: String,
}

impl ResolutionError {
    fn from_io(fragment: &str, err: &io::Error) -> Self {
        Self {
            fragment: fragment.to_string(),
            failure: err.kind().into(),
            message: err.to_string(),
        }
    }

    fn invalid(fragment: &str, message: impl Into<String>) -> Self {
        Self {
            fragment: fragment.to_string(),
            failure: ResolutionFailure::InvalidInput,
            message: message.into(),
        }
    }
}

/// Canonical directory that every accepted path must live under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedRoot(PathBuf);

impl TrustedRoot {
    /// `path` must be absolute and name an existing directory.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_absolute() {
            return Err(GuardError::InvalidConfig(format!(
                "trusted root must be absolute: {}",
                path.display()
            )));
        }

        let canonical = fs::canonicalize(path)?;
        if !canonical.is_dir() {
            return Err(GuardError::InvalidConfig(format!(
                "trusted root is not a directory: {}",
                canonical.display()
            )));
        }

        Ok(Self(canonical))
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// Component-wise containment; `/srv/a` does not contain `/srv/ab`.
    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.0)
    }
}

/// A path as the filesystem resolved it. Only [`canonicalize`] and
/// `ProvisionalPath` confirmation build one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CanonicalPath(PathBuf);

impl CanonicalPath {
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    pub fn into_path_buf(self) -> PathBuf {
        self.0
    }
}

impl AsRef<Path> for CanonicalPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

/// Resolve `root.join(fragment)` through the filesystem.
///
/// Symlinks and `.`/`..` segments are resolved by the host's
/// `realpath`. An empty fragment resolves to the root itself.
pub fn canonicalize(
    root: &TrustedRoot,
    fragment: &str,
) -> std::result::Result<CanonicalPath, ResolutionError> {
    let joined = root.as_path().join(fragment);
    fs::canonicalize(&joined)
        .map(CanonicalPath)
        .map_err(|e| ResolutionError::from_io(fragment, &e))
}

/// Collapse `.` and `..` by string manipulation only.
///
/// Returns `None` if the fragment is absolute or `..` climbs above its
/// start. The result says nothing about where the path really points.
pub fn lexical_normalize(fragment: &str) -> Option<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in Path::new(fragment).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    return None;
                }
            }
            Component::Normal(part) => normalized.push(part),
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(normalized)
}

/// A path that may not exist yet, resolved as far as the filesystem allows.
///
/// Only its existing ancestor went through canonical resolution, so this
/// is weaker than a [`CanonicalPath`]. Create the target and then call
/// `ProvisionalPath::confirm` to re-validate it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisionalPath {
    pub(crate) fragment: String,
    pub(crate) resolved_ancestor: PathBuf,
    pub(crate) path: PathBuf,
}

impl ProvisionalPath {
    pub fn as_path(&self) -> &Path {
        &self.path
    }

    /// Deepest ancestor that existed at validation time, canonicalized.
    pub fn resolved_ancestor(&self) -> &Path {
        &self.resolved_ancestor
    }

    pub fn fragment(&self) -> &str {
        &self.fragment
    }

    /// Whether every component already existed.
    pub fn exists(&self) -> bool {
        self.resolved_ancestor == self.path
    }

    /// Canonicalize the provisional path now that it should exist.
    pub(crate) fn canonicalize(&self) -> std::result::Result<CanonicalPath, ResolutionError> {
        fs::canonicalize(&self.path)
            .map(CanonicalPath)
            .map_err(|e| ResolutionError::from_io(&self.fragment, &e))
    }
}

/// How resolution of a not-yet-existing path failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionalError {
    /// `..` climbed above the root before touching the filesystem.
    Escapes,
    Resolution(ResolutionError),
}

/// Resolve a fragment whose target need not exist.
///
/// The fragment is normalized lexically, the deepest existing ancestor is
/// canonicalized (following symlinks) and the missing tail is appended.
pub fn resolve_provisional(
    root: &TrustedRoot,
    fragment: &str,
) -> std::result::Result<ProvisionalPath, ProvisionalError> {
    if fragment.contains('\0') {
        return Err(ProvisionalError::Resolution(ResolutionError::invalid(
            fragment,
            "path contains a NUL byte",
        )));
    }
    let relative = lexical_normalize(fragment).ok_or(ProvisionalError::Escapes)?;
    let candidate = root.as_path().join(&relative);

    let mut existing = candidate.as_path();
    let mut missing = Vec::new();
    loop {
        match fs::symlink_metadata(existing) {
            Ok(_) => break,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                match (existing.parent(), existing.file_name()) {
                    (Some(parent), Some(name)) => {
                        missing.push(name.to_os_string());
                        existing = parent;
                    }
                    _ => {
                        return Err(ProvisionalError::Resolution(ResolutionError::from_io(
                            fragment, &e,
                        )))
                    }
                }
            }
            Err(e) => {
                return Err(ProvisionalError::Resolution(ResolutionError::from_io(
                    fragment, &e,
                )))
            }
        }
    }

    // A dangling symlink exists but does not canonicalize; that fails here.
    let resolved_ancestor = fs::canonicalize(existing)
        .map_err(|e| ProvisionalError::Resolution(ResolutionError::from_io(fragment, &e)))?;

    let mut path = resolved_ancestor.clone();
    for name in missing.iter().rev() {
        path.push(name);
    }

    Ok(ProvisionalPath {
        fragment: fragment.to_string(),
        resolved_ancestor,
        path,
    })
}
