//! Concrete versions observed in a refs advertisement.

use std::cmp::Ordering;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::error::Error;

/// Prefix shared by every branch ref name.
const BRANCH_REF_PREFIX: &str = "refs/heads/";

/// Tag or branch names that start like versions, with an optional peel suffix.
/// Only a prefix has to match: `refs/heads/v1.x` is version 1.
/// Groups: 1 label, 2 major, 3 minor, 4 patch, 5 prerelease label, 6 prerelease number.
#[allow(clippy::expect_used, reason = "pattern is a compile-time literal")]
static VERSION_REF_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    return Regex::new(
        r"^refs/(?:tags|heads)/(v?([0-9]+)(?:\.([0-9]+))?(?:\.([0-9]+))?(?:-([a-zA-Z0-9\-_]+))?(?:\.([0-9]+))?)(?:\^\{\})?",
    )
    .expect("valid regex");
});

/// A version that actually exists upstream, tied to the ref that carries it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SemverCandidate {
    /// Major version number.
    pub major: u64,
    /// Minor version number, 0 when the ref omitted it.
    pub minor: u64,
    /// Patch version number, 0 when the ref omitted it.
    pub patch: u64,
    /// Whether the ref carried a prerelease label at all.
    pub prerelease_exists: bool,
    /// Prerelease label such as `beta`, empty when absent.
    pub prerelease_label: String,
    /// Number trailing the prerelease label, 0 when absent.
    pub prerelease_number: u64,
    /// Commit hash the ref points at.
    pub ref_hash: String,
    /// Version-looking portion of the ref name, e.g. `v1.2-unstable`.
    pub ref_label: String,
    /// Full ref name without any peel suffix, e.g. `refs/tags/v1.2.3`.
    pub ref_name: String,
}

/// Raw version captures, each possibly empty, as they come out of a version pattern.
#[derive(Debug, Clone, Copy, Default)]
pub struct VersionCaptures<'a> {
    /// Major version digits. Required.
    pub major: &'a str,
    /// Minor version digits.
    pub minor: &'a str,
    /// Patch version digits.
    pub patch: &'a str,
    /// Prerelease label.
    pub prerelease_label: &'a str,
    /// Prerelease number digits.
    pub prerelease_number: &'a str,
}

impl SemverCandidate {
    /// Recognize a tag or branch ref whose name starts with a version.
    /// Anything after the version is ignored. A trailing `^{}` peel marker is stripped from the stored name.
    /// Returns `None` when the name does not look like a version.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidCandidate` when the name matches but a number overflows.
    pub fn from_ref(ref_hash: &str, ref_name: &str) -> Result<Option<Self>, Error> {
        let Some(caps) = VERSION_REF_PATTERN.captures(ref_name) else {
            return Ok(None);
        };
        let group = |index: usize| return caps.get(index).map_or("", |m| return m.as_str());
        let name = ref_name.strip_suffix("^{}").unwrap_or(ref_name);

        let captures = VersionCaptures {
            major: group(2),
            minor: group(3),
            patch: group(4),
            prerelease_label: group(5),
            prerelease_number: group(6),
        };
        return Self::new(ref_hash, name, group(1), captures).map(Some);
    }

    /// Whether the candidate's ref is a branch rather than a tag.
    pub fn is_branch(&self) -> bool {
        return self.ref_name.starts_with(BRANCH_REF_PREFIX);
    }

    /// Build a candidate from a ref and its version captures.
    /// Empty minor, patch and prerelease number captures default to 0.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidCandidate` if the hash, name or major is empty,
    /// or if a numeric capture is not a number.
    pub fn new(
        ref_hash: &str,
        ref_name: &str,
        ref_label: &str,
        captures: VersionCaptures<'_>,
    ) -> Result<Self, Error> {
        if ref_hash.is_empty() {
            return Err(Error::InvalidCandidate {
                reason: "ref hash was empty".to_string(),
            });
        }
        if ref_name.is_empty() {
            return Err(Error::InvalidCandidate {
                reason: "ref name was empty".to_string(),
            });
        }
        if captures.major.is_empty() {
            return Err(Error::InvalidCandidate {
                reason: format!("major version of {ref_name} was empty"),
            });
        }

        return Ok(Self {
            major: parse_version_number("major", captures.major)?,
            minor: parse_version_number("minor", captures.minor)?,
            patch: parse_version_number("patch", captures.patch)?,
            prerelease_exists: !captures.prerelease_label.is_empty(),
            prerelease_label: captures.prerelease_label.to_string(),
            prerelease_number: parse_version_number("prerelease number", captures.prerelease_number)?,
            ref_hash: ref_hash.to_string(),
            ref_label: ref_label.to_string(),
            ref_name: ref_name.to_string(),
        });
    }

    /// Prerelease portion of `version_cmp`.
    fn prerelease_cmp(&self, other: &Self) -> Ordering {
        return match (self.prerelease_exists, other.prerelease_exists) {
            (false, false) => Ordering::Equal,
            (false, true) => Ordering::Greater,
            (true, false) => Ordering::Less,
            (true, true) => self
                .prerelease_label
                .cmp(&other.prerelease_label)
                .then(self.prerelease_number.cmp(&other.prerelease_number)),
        };
    }

    /// Whether two candidates describe the same version, ignoring ref metadata.
    pub fn same_version(&self, other: &Self) -> bool {
        return self.version_cmp(other) == Ordering::Equal;
    }

    /// Total version order: major, minor, patch, then prerelease.
    /// A release ranks above any prerelease of the same numbers; differing
    /// prerelease labels order lexically before their numbers are compared.
    pub fn version_cmp(&self, other: &Self) -> Ordering {
        return self
            .major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.patch.cmp(&other.patch))
            .then_with(|| return self.prerelease_cmp(other));
    }
}

impl fmt::Display for SemverCandidate {
    /// Canonical version text, e.g. `1.2.3-beta.2`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if self.prerelease_exists {
            write!(f, "-{}", self.prerelease_label)?;
            if self.prerelease_number > 0 {
                write!(f, ".{}", self.prerelease_number)?;
            }
        }
        return Ok(());
    }
}

/// Parse one numeric capture, treating an empty capture as 0.
///
/// # Errors
///
/// Returns `Error::InvalidCandidate` if the capture is not a `u64`.
fn parse_version_number(segment: &str, raw: &str) -> Result<u64, Error> {
    if raw.is_empty() {
        return Ok(0);
    }
    return raw.parse().map_err(|_err| {
        return Error::InvalidCandidate {
            reason: format!("{segment} segment {raw:?} is not a version number"),
        };
    });
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc, reason = "tests")]
mod tests {
    use super::*;

    fn candidate(name: &str) -> SemverCandidate {
        return SemverCandidate::from_ref("fakeHash", name).unwrap().unwrap();
    }

    #[test]
    fn recognizes_tags_and_branches() {
        let tag = candidate("refs/tags/v1.2.3-beta.4");
        assert_eq!((tag.major, tag.minor, tag.patch), (1, 2, 3));
        assert_eq!(tag.prerelease_label, "beta");
        assert_eq!(tag.prerelease_number, 4);
        assert_eq!(tag.ref_label, "v1.2.3-beta.4");
        assert!(!tag.is_branch());

        let branch = candidate("refs/heads/v1.2-unstable");
        assert_eq!((branch.major, branch.minor, branch.patch), (1, 2, 0));
        assert_eq!(branch.prerelease_label, "unstable");
        assert!(branch.is_branch());
    }

    #[test]
    fn strips_peel_suffix() {
        let peeled = candidate("refs/tags/v2.0.1^{}");
        assert_eq!(peeled.ref_name, "refs/tags/v2.0.1");
        assert_eq!(peeled.ref_label, "v2.0.1");
    }

    #[test]
    fn ignores_non_version_refs() {
        for name in ["refs/heads/master", "refs/tags/release", "refs/pull/1/head", "refs/tags/vx1"] {
            assert!(SemverCandidate::from_ref("fakeHash", name).unwrap().is_none(), "{name}");
        }
    }

    #[test]
    fn versions_only_need_to_lead_the_name() {
        let wildcard_branch = candidate("refs/heads/v1.x");
        assert_eq!((wildcard_branch.major, wildcard_branch.minor, wildcard_branch.patch), (1, 0, 0));
        assert_eq!(wildcard_branch.ref_label, "v1");
        assert_eq!(wildcard_branch.ref_name, "refs/heads/v1.x");
        assert!(wildcard_branch.is_branch());

        let suffixed_tag = candidate("refs/tags/v1.2.3rc");
        assert_eq!((suffixed_tag.major, suffixed_tag.minor, suffixed_tag.patch), (1, 2, 3));
        assert!(!suffixed_tag.prerelease_exists);
        assert_eq!(suffixed_tag.ref_label, "v1.2.3");
        assert_eq!(suffixed_tag.ref_name, "refs/tags/v1.2.3rc");
    }

    #[test]
    fn rejects_missing_fields() {
        let captures = VersionCaptures {
            major: "1",
            ..VersionCaptures::default()
        };
        assert!(SemverCandidate::new("", "refs/tags/v1", "v1", captures).is_err());
        assert!(SemverCandidate::new("hash", "", "v1", captures).is_err());
        assert!(SemverCandidate::new("hash", "refs/tags/v1", "v1", VersionCaptures::default()).is_err());
    }

    #[test]
    fn orders_releases_above_prereleases() {
        let mut versions = vec![
            candidate("refs/tags/v1.2.3"),
            candidate("refs/tags/v1.2.3-beta.2"),
            candidate("refs/tags/v1.10.0"),
            candidate("refs/tags/v1.2.3-alpha"),
            candidate("refs/tags/v1.2.3-beta"),
            candidate("refs/tags/v0.9.9"),
        ];
        versions.sort_by(SemverCandidate::version_cmp);
        let rendered: Vec<String> = versions.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            ["0.9.9", "1.2.3-alpha", "1.2.3-beta", "1.2.3-beta.2", "1.2.3", "1.10.0"]
        );
    }

    #[test]
    fn same_version_ignores_ref_metadata() {
        let tag = candidate("refs/tags/v1.0.0");
        let branch = SemverCandidate::from_ref("otherHash", "refs/heads/1.0").unwrap().unwrap();
        assert!(tag.same_version(&branch));
        assert_ne!(tag, branch);
    }
}
