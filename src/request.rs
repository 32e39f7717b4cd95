//! Version requests as clients phrase them, resolved against an advertisement.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::best::best;
use crate::candidate::SemverCandidate;
use crate::error::Error;
use crate::refs::RefAdvertisement;
use crate::selector::{SelectorCaptures, SemverSelector};

/// Release channel requests: `v<major>[.<minor>]-<label>`, e.g. `v1-unstable`.
#[allow(clippy::expect_used, reason = "pattern is a compile-time literal")]
static CHANNEL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    return Regex::new(r"^v?([0-9]+)(?:\.([0-9]+))?-([a-zA-Z0-9\-_]*[a-zA-Z0-9])$").expect("valid regex");
});

/// What a client asked for after the `@` in a package path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionRequest {
    /// Newest prerelease carrying `label` within a major (or minor) line.
    Channel {
        /// Prerelease label every match must carry.
        label: String,
        /// Wildcard selector for the version line, e.g. `1.x`.
        line: SemverSelector,
        /// The request as written.
        text: String,
    },
    /// A regular selector.
    Selector(SemverSelector),
}

/// Outcome of resolving a request against an advertisement.
#[derive(Debug, Clone)]
pub struct ResolvedRefs {
    /// The promoted candidate; `None` when no version was requested.
    pub candidate: Option<SemverCandidate>,
    /// Commit the client will receive, if the advertisement names one.
    pub hash: Option<String>,
    /// Advertisement bytes to serve.
    pub refs: Vec<u8>,
}

impl VersionRequest {
    /// Pick the candidate this request resolves to.
    pub fn best<'a>(&self, candidates: &'a [SemverCandidate]) -> Option<&'a SemverCandidate> {
        return match self {
            Self::Selector(selector) => best(candidates, selector),
            Self::Channel { .. } => candidates
                .iter()
                .filter(|candidate| return self.matches(candidate))
                .max_by(|a, b| return a.version_cmp(b)),
        };
    }

    /// Whether `candidate` satisfies the request.
    pub fn matches(&self, candidate: &SemverCandidate) -> bool {
        return match self {
            Self::Selector(selector) => selector.matches(candidate),
            Self::Channel { label, line, .. } => {
                candidate.prerelease_exists && candidate.prerelease_label == *label && line.matches(candidate)
            },
        };
    }
}

impl fmt::Display for VersionRequest {
    /// The request as written for channels, canonical selector text otherwise.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return match self {
            Self::Channel { text, .. } => f.write_str(text),
            Self::Selector(selector) => write!(f, "{selector}"),
        };
    }
}

impl FromStr for VersionRequest {
    type Err = Error;

    /// Parse a channel request or, failing that, a selector.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let text = text.trim();
        let Some(caps) = CHANNEL_PATTERN.captures(text) else {
            return text.parse().map(Self::Selector);
        };
        let group = |index: usize| return caps.get(index).map_or("", |m| return m.as_str());

        let minor = group(2);
        let line = SemverSelector::new(SelectorCaptures {
            major: group(1),
            minor: if minor.is_empty() { "x" } else { minor },
            patch: if minor.is_empty() { "" } else { "x" },
            ..SelectorCaptures::default()
        })?;
        return Ok(Self::Channel {
            label: group(3).to_string(),
            line,
            text: text.to_string(),
        });
    }
}

/// Resolve `request` against an advertisement and produce the refs to serve.
///
/// Without a request the advertisement is served unchanged and the default
/// branch (or HEAD) commit is reported.
///
/// # Errors
///
/// Returns `Error::NoMatchingVersion` when no candidate satisfies the request.
pub fn resolve_refs(advertisement: &RefAdvertisement, request: Option<&VersionRequest>) -> Result<ResolvedRefs, Error> {
    let Some(request) = request else {
        let hash = advertisement.default_branch_hash().or_else(|| return advertisement.head_hash());
        return Ok(ResolvedRefs {
            candidate: None,
            hash: hash.map(str::to_string),
            refs: advertisement.data().to_vec(),
        });
    };

    let Some(candidate) = request.best(advertisement.candidates()) else {
        return Err(Error::NoMatchingVersion {
            request: request.to_string(),
        });
    };
    debug!(%request, version = %candidate, ref_name = %candidate.ref_name, "resolved version request");

    return Ok(ResolvedRefs {
        candidate: Some(candidate.clone()),
        hash: Some(candidate.ref_hash.clone()),
        refs: advertisement.reserialize(candidate),
    });
}
