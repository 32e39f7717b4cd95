/// Data passed between the dependency rewriter's stages.
use std::ops::Range;
use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::error::Error;

/// One import-path literal in a Go file that points at an upstream dependency.
/// The byte range covers the literal including its quotes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSpec {
    /// Go source file containing the import.
    pub file: PathBuf,
    /// Unquoted import path, e.g. `github.com/a/b/c`.
    pub import_path: String,
    /// Byte offsets of the quoted literal.
    pub range: Range<usize>,
}

/// The package clause of a Go file. Every scanned file yields exactly one,
/// marking the point after which all of the file's imports are known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSpec {
    /// Go source file.
    pub file: PathBuf,
    /// Byte offset of the `package` keyword.
    pub offset: usize,
}

/// The package being pinned: where it lives upstream and which commit it is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageMeta {
    /// Upstream owner, e.g. `skeswa`.
    pub author: String,
    /// Time of `sha`; dependencies are pinned to commits at or before it.
    pub commit_date: DateTime<Utc>,
    /// Upstream repository name.
    pub repo: String,
    /// Pinned commit of this package.
    pub sha: String,
}

/// A planned edit to one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revision {
    /// File the edit applies to.
    pub file: PathBuf,
    /// Whether this rewrites an import or marks the package clause.
    pub kind: RevisionKind,
    /// Byte range the edit covers; empty for package barriers.
    pub range: Range<usize>,
}

/// The two kinds of revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevisionKind {
    /// Replace an import literal with these bytes.
    Import(Vec<u8>),
    /// Completion barrier anchored at the package clause; carries no payload.
    Package,
}

/// Host names and reserved names the rewriter works with.
/// Passed explicitly to every stage rather than held globally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteSettings {
    /// Directory name Go reserves for package-private code.
    pub internal_dir: String,
    /// Host written into pinned imports, e.g. `gophr.pm`.
    pub proxy_host: String,
    /// Host whose imports are pinned, e.g. `github.com`.
    pub upstream_host: String,
}

impl PackageMeta {
    /// Dependency key of the package itself.
    pub fn key(&self) -> String {
        return format!("{}/{}", self.author, self.repo);
    }

    /// Reject metadata the rewriter cannot work with.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidPackage` if the author, repo or sha is blank.
    pub fn validate(&self) -> Result<(), Error> {
        for (field, value) in [("author", &self.author), ("repo", &self.repo), ("sha", &self.sha)] {
            if value.trim().is_empty() {
                return Err(Error::InvalidPackage {
                    reason: format!("{field} was empty"),
                });
            }
        }
        return Ok(());
    }
}

impl Revision {
    /// An import rewrite replacing the spec's literal with `replacement`.
    pub fn import(spec: ImportSpec, replacement: Vec<u8>) -> Self {
        return Self {
            file: spec.file,
            kind: RevisionKind::Import(replacement),
            range: spec.range,
        };
    }

    /// Whether this is a package barrier.
    pub const fn is_package(&self) -> bool {
        return matches!(self.kind, RevisionKind::Package);
    }

    /// A package barrier for the spec's file.
    pub fn package(spec: PackageSpec) -> Self {
        return Self {
            file: spec.file,
            kind: RevisionKind::Package,
            range: spec.offset..spec.offset,
        };
    }
}

impl Default for RewriteSettings {
    /// Pin `github.com` imports to `gophr.pm`.
    fn default() -> Self {
        return Self {
            internal_dir: "internal".to_string(),
            proxy_host: "gophr.pm".to_string(),
            upstream_host: "github.com".to_string(),
        };
    }
}
