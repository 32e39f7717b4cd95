//! Commit resolution for dependencies: the resolver seam and the per-key task.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::error::ResolveError;
use crate::import_path::ImportPath;
use crate::types::PackageMeta;

/// Looks up which commit of a dependency to pin.
///
/// Implementations answer with the nearest commit at or before `before`,
/// or with the repository's default-branch commit when nothing is that old.
pub trait CommitResolver: Send + Sync {
    /// Commit sha of `author/repo` to pin for a package committed at `before`.
    ///
    /// # Errors
    ///
    /// Returns a `ResolveError` when the repository is unknown, the upstream
    /// is unavailable, or no commit can be named.
    fn nearest_commit(&self, author: &str, repo: &str, before: DateTime<Utc>) -> Result<String, ResolveError>;
}

/// Outcome of resolving one dependency key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCommit {
    /// Dependency key, `author/repo`.
    pub key: String,
    /// Pinned commit, or why none could be found.
    pub result: Result<String, ResolveError>,
}

/// Resolve the dependency `import_path` points at.
///
/// Sub-packages of the package being pinned resolve to its own commit
/// without asking `resolver`. Blank answers count as failures.
pub fn resolve_dependency(import: &ImportPath<'_>, package: &PackageMeta, resolver: &dyn CommitResolver) -> ResolvedCommit {
    let key = import.key();
    if import.author == package.author && import.repo == package.repo {
        debug!(%key, sha = %package.sha, "sub-package resolves to the package commit");
        return ResolvedCommit {
            key,
            result: Ok(package.sha.clone()),
        };
    }

    let result = match resolver.nearest_commit(import.author, import.repo, package.commit_date) {
        Ok(sha) if sha.trim().is_empty() => Err(ResolveError::Empty { key: key.clone() }),
        other => other,
    };
    match &result {
        Ok(sha) => debug!(%key, %sha, "resolved dependency"),
        Err(e) => warn!(%key, "could not resolve dependency: {e}"),
    }
    return ResolvedCommit { key, result };
}
