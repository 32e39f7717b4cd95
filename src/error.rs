/// Crate-level error types.
use std::fmt::Display;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

/// All errors in gophr carry enough context to produce a useful diagnostic
/// without a debugger. Each variant names the input, segment, or file that failed.
#[allow(clippy::error_impl_error, reason = "crate-level error type shared by lib and binary")]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Several independent failures collected during one run.
    #[error(
        "failed to {context}: bumped into {} problem(s): [ {} ]",
        problems.len(),
        problems.join(", ")
    )]
    Aggregate {
        /// What the run was trying to do.
        context: String,
        /// Rendered description of each problem, in arrival order.
        problems: Vec<String>,
    },

    /// A byte diff does not describe a valid range of the buffer it targets.
    #[error("invalid byte diff [{from}, {to}) against a buffer of {len} bytes: {reason}")]
    BytesDiffInvalid {
        /// Inclusive start offset of the diff.
        from: usize,
        /// Length of the buffer being patched.
        len: usize,
        /// Why the diff was rejected.
        reason: &'static str,
        /// Exclusive end offset of the diff.
        to: usize,
    },

    /// Source file exceeds the scan size limit.
    #[error("file too large ({size_bytes} bytes, max {max_bytes}): {}", file.display())]
    FileTooLarge {
        /// File that exceeded the size limit.
        file: PathBuf,
        /// Maximum allowed file size in bytes.
        max_bytes: u64,
        /// Actual file size in bytes.
        size_bytes: u64,
    },

    /// A planned import rewrite no longer lines up with a string literal in the file.
    #[error("import literal [{from}, {to}) is out of bounds in {}", file.display())]
    ImportLiteralOutOfBounds {
        /// File whose bytes were inspected.
        file: PathBuf,
        /// Inclusive start offset of the expected literal.
        from: usize,
        /// Exclusive end offset of the expected literal.
        to: usize,
    },

    /// The advertisement declared more bytes than it actually carries.
    #[error("refs data is incomplete: record at byte {cursor} declares {declared} bytes but only {available} remain")]
    IncompleteRefs {
        /// Bytes left in the buffer from the cursor onwards.
        available: usize,
        /// Offset of the record's length prefix.
        cursor: usize,
        /// Record length as decoded from the prefix.
        declared: usize,
    },

    /// Candidate fields failed validation.
    #[error("invalid semver candidate: {reason}")]
    InvalidCandidate {
        /// Description of the invalid field.
        reason: String,
    },

    /// Package metadata handed to the rewriter is unusable.
    #[error("invalid package metadata: {reason}")]
    InvalidPackage {
        /// Description of the invalid field.
        reason: String,
    },

    /// Underlying I/O error from the filesystem.
    #[error("io: {0}")]
    Io(
        /// The wrapped I/O error.
        #[from]
        std::io::Error,
    ),

    /// JSON serialization failed.
    #[error("json: {0}")]
    Json(
        /// The wrapped JSON error.
        #[from]
        serde_json::Error,
    ),

    /// A pkt-line length prefix is not four hex digits.
    #[error("could not parse refs line size {raw:?} at byte {cursor}")]
    MalformedPktLength {
        /// Offset of the length prefix.
        cursor: usize,
        /// The offending prefix, lossily decoded.
        raw: String,
    },

    /// No advertised version satisfies the request.
    #[error("no version matching {request}")]
    NoMatchingVersion {
        /// The request text as given.
        request: String,
    },

    /// Tree-sitter could not make sense of a Go source file.
    #[error("parse failed: {}: {reason}", file.display())]
    ParseFailed {
        /// File that failed to parse.
        file: PathBuf,
        /// Description of the parse failure.
        reason: String,
    },

    /// Pins file lists one repository more than once.
    #[error("pins file corrupt: {reason}")]
    PinsCorrupt {
        /// Description of the corruption.
        reason: String,
    },

    /// Expected pins file does not exist on disk.
    #[error("pins file not found: {}", path.display())]
    PinsNotFound {
        /// Path to the missing pins file.
        path: PathBuf,
    },

    /// A selector segment is neither a number nor a wildcard.
    #[error("invalid semver {segment} specified: {value}")]
    SelectorInvalidSegment {
        /// Name of the segment being parsed.
        segment: &'static str,
        /// The rejected text.
        value: String,
    },

    /// The selector has no major version.
    #[error("selector major segment was unspecified")]
    SelectorMissingMajor,

    /// A tilde or carat prefix was combined with a wildcard.
    #[error("version prefixes cannot be mixed with version wildcards")]
    SelectorPrefixWithWildcard,

    /// A `+` or `-` suffix was combined with a prefix or wildcard.
    #[error("version suffixes cannot be mixed with version wildcards or prefixes")]
    SelectorSuffixOnFlexible,

    /// A segment was given after an earlier segment ended the version.
    #[error("could not parse the {segment} segment because the version was already complete")]
    SelectorVersionComplete {
        /// Name of the segment that arrived too late.
        segment: &'static str,
    },

    /// TOML deserialization failed.
    #[error("toml deserialize: {0}")]
    TomlDe(
        /// The wrapped TOML deserialization error.
        #[from]
        toml::de::Error,
    ),
}

/// Failure reported by a commit resolver for one dependency.
/// These never abort a run; they are tallied and the dependency stays unpinned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// The resolver answered with a blank commit hash.
    #[error("commit sha for {key} came back empty")]
    Empty {
        /// Dependency key (`author/repo`).
        key: String,
    },

    /// The upstream has no such repository.
    #[error("{key} was not found upstream")]
    NotFound {
        /// Dependency key (`author/repo`).
        key: String,
    },

    /// The upstream refused to answer for now.
    #[error("upstream rate limit reached while resolving {key}")]
    RateLimited {
        /// Dependency key (`author/repo`).
        key: String,
    },

    /// Any other upstream failure.
    #[error("could not resolve {key}: {reason}")]
    Upstream {
        /// Dependency key (`author/repo`).
        key: String,
        /// Description of the failure.
        reason: String,
    },
}

/// Failures collected from many threads during one run.
/// Nothing is surfaced until the run ends, so callers see every problem at once.
#[derive(Debug, Default)]
pub struct SyncedErrors {
    /// Rendered problems in arrival order.
    problems: Mutex<Vec<String>>,
}

impl SyncedErrors {
    /// Put `problem` ahead of everything collected so far.
    pub fn insert_first(&self, problem: impl Display) {
        self.problems
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(0, problem.to_string());
    }

    /// Whether nothing has gone wrong so far.
    pub fn is_empty(&self) -> bool {
        return self.problems.lock().unwrap_or_else(PoisonError::into_inner).is_empty();
    }

    /// Number of problems collected so far.
    pub fn len(&self) -> usize {
        return self.problems.lock().unwrap_or_else(PoisonError::into_inner).len();
    }

    /// Record one problem.
    pub fn push(&self, problem: impl Display) {
        self.problems
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(problem.to_string());
    }

    /// Take every problem, leaving the collection empty.
    /// Returns `None` when nothing went wrong.
    pub fn take_aggregate(&self, context: &str) -> Option<Error> {
        let problems = std::mem::take(&mut *self.problems.lock().unwrap_or_else(PoisonError::into_inner));
        if problems.is_empty() {
            return None;
        }
        return Some(Error::Aggregate {
            context: context.to_string(),
            problems,
        });
    }
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc, reason = "tests")]
mod tests {
    use super::*;

    #[test]
    fn aggregate_lists_every_problem() {
        let errors = SyncedErrors::default();
        assert!(errors.take_aggregate("version dependencies").is_none());

        errors.push("first");
        errors.push(ResolveError::NotFound { key: "a/b".to_string() });
        errors.insert_first("walk");
        assert_eq!(errors.len(), 3);

        let err = errors.take_aggregate("version dependencies").unwrap();
        assert_eq!(
            err.to_string(),
            "failed to version dependencies: bumped into 3 problem(s): [ walk, first, a/b was not found upstream ]"
        );
        assert_eq!(errors.len(), 0);
    }
}
