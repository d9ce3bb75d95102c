//! Path confinement for user-supplied inputs.
//!
//! `PathGuard` is the only path-sanitization boundary in the service: every
//! path that crosses the facade goes through it, and all downstream
//! components assume their inputs already have. Candidate paths are
//! normalized (resolving `.` and `..` segments and, where the path exists,
//! symlinks) and accepted only when the result is a descendant of one of the
//! configured root directories.

use std::path::{Component, Path, PathBuf};

use crate::Result;
use crate::error::OptimarrError;

/// Resolves and confines candidate paths to a set of allowed roots.
#[derive(Debug, Clone)]
pub struct PathGuard {
    roots: Vec<PathBuf>,
}

impl PathGuard {
    /// Create a guard for the given allowed roots.
    ///
    /// Roots are canonicalized when they exist so that symlinked roots
    /// compare correctly; a root that does not exist yet is kept in
    /// lexically-normalized form.
    pub fn new<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let roots = roots
            .into_iter()
            .map(|r| {
                let r = r.as_ref();
                r.canonicalize().unwrap_or_else(|_| normalize_lexically(r))
            })
            .collect();
        Self { roots }
    }

    /// Resolve `candidate` against the allowed roots.
    ///
    /// Relative candidates are interpreted relative to the first root.
    /// Returns the resolved absolute path, or fails when the input is empty
    /// or its normalized form is not a descendant of any root.
    pub fn resolve<P: AsRef<Path>>(&self, candidate: P) -> Result<PathBuf> {
        let candidate = candidate.as_ref();
        if candidate.as_os_str().is_empty() {
            return Err(OptimarrError::InvalidPath("empty path".to_string()));
        }
        let first_root = self
            .roots
            .first()
            .ok_or_else(|| OptimarrError::InvalidPath("no allowed roots configured".to_string()))?;

        let absolute = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            first_root.join(candidate)
        };
        let resolved = resolve_existing(&absolute);

        if self.roots.iter().any(|root| resolved.starts_with(root)) {
            Ok(resolved)
        } else {
            Err(OptimarrError::PathOutsideRoots {
                path: candidate.display().to_string(),
            })
        }
    }

    /// The configured roots, post-normalization.
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }
}

/// Canonicalize as much of the path as exists, then append the remainder
/// lexically normalized. Resolves symlinks on the existing prefix so a link
/// pointing outside the roots cannot smuggle a path in.
fn resolve_existing(path: &Path) -> PathBuf {
    let normalized = normalize_lexically(path);
    if let Ok(canonical) = normalized.canonicalize() {
        return canonical;
    }
    // Walk up to the deepest existing ancestor and canonicalize that.
    let mut existing = normalized.as_path();
    let mut tail = Vec::new();
    while let Some(parent) = existing.parent() {
        if existing.exists() {
            break;
        }
        if let Some(name) = existing.file_name() {
            tail.push(name.to_os_string());
        }
        existing = parent;
    }
    let mut out = existing
        .canonicalize()
        .unwrap_or_else(|_| existing.to_path_buf());
    for segment in tail.iter().rev() {
        out.push(segment);
    }
    out
}

/// Resolve `.` and `..` components without touching the filesystem.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
