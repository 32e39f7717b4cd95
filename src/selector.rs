//! Version selectors and how they match candidates.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use crate::candidate::SemverCandidate;
use crate::error::Error;

/// Selector text: prefix, major, minor, patch, prerelease label, prerelease number, suffix.
/// A leading `v` is tolerated and dropped.
#[allow(clippy::expect_used, reason = "pattern is a compile-time literal")]
static SELECTOR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    return Regex::new(
        r"^([~^]?)v?([0-9]+)(?:\.([0-9]+|[xX]))?(?:\.([0-9]+|[xX]))?(?:-([a-zA-Z0-9\-_]*[a-zA-Z0-9])(?:\.([0-9]+|[xX]))?)?([+-]?)$",
    )
    .expect("valid regex");
});

/// Flexibility prefix allowing later versions within a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prefix {
    /// `^`: same major, minor and patch at least the selector's.
    Carat,
    /// `~`: same major and minor, patch at least the selector's.
    Tilde,
}

/// One of minor, patch, or prerelease number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    /// A concrete number.
    Number(u64),
    /// Not given; the version ended before this segment.
    Unspecified,
    /// `x`: any value.
    Wildcard,
}

/// Inequality suffix turning a version into an open-ended bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suffix {
    /// `+`: the version or anything after it.
    GreaterThan,
    /// `-`: the version or anything before it.
    LessThan,
}

/// The seven raw captures a selector is built from, each possibly empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectorCaptures<'a> {
    /// Major version digits. Required.
    pub major: &'a str,
    /// Minor version digits or a wildcard.
    pub minor: &'a str,
    /// Patch version digits or a wildcard.
    pub patch: &'a str,
    /// `~`, `^`, or empty.
    pub prefix: &'a str,
    /// Prerelease label.
    pub prerelease_label: &'a str,
    /// Prerelease number digits or a wildcard.
    pub prerelease_number: &'a str,
    /// `+`, `-`, or empty.
    pub suffix: &'a str,
}

/// A version query. Only obtainable through validation, so every
/// selector in hand satisfies the segment ordering rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemverSelector {
    /// Set by a prefix, a wildcard, or a suffix.
    flexible: bool,
    /// Major version; always given.
    major: u64,
    /// Minor segment.
    minor: Segment,
    /// Patch segment.
    patch: Segment,
    /// Optional `~` or `^`.
    prefix: Option<Prefix>,
    /// Prerelease label, empty when absent.
    prerelease_label: String,
    /// Prerelease number segment.
    prerelease_number: Segment,
    /// Optional `+` or `-`.
    suffix: Option<Suffix>,
}

/// Running state of selector validation.
struct SegmentParser {
    /// A wildcard or unspecified segment ended the version.
    complete: bool,
    /// A prefix or wildcard has been seen.
    flexible: bool,
    /// Whether a prefix was given; prefixes forbid wildcards.
    prefixed: bool,
}

impl SegmentParser {
    /// Parse the prerelease number, which may only follow a label.
    ///
    /// # Errors
    ///
    /// Returns selector errors for a number without label, prefixed wildcards, or non-numbers.
    fn prerelease_number(&mut self, has_label: bool, raw: &str) -> Result<Segment, Error> {
        if raw.is_empty() {
            return Ok(Segment::Unspecified);
        }
        if !has_label {
            return Err(Error::SelectorVersionComplete {
                segment: "prerelease number",
            });
        }
        if is_wildcard(raw) {
            self.wildcard()?;
            return Ok(Segment::Wildcard);
        }
        return parse_number("prerelease number", raw).map(Segment::Number);
    }

    /// Parse minor or patch: a number, a wildcard that ends the version,
    /// or nothing, which also ends the version.
    ///
    /// # Errors
    ///
    /// Returns selector errors for late segments, prefixed wildcards, or non-numbers.
    fn version_segment(&mut self, segment: &'static str, raw: &str) -> Result<Segment, Error> {
        if raw.is_empty() {
            self.complete = true;
            return Ok(Segment::Unspecified);
        }
        if self.complete {
            return Err(Error::SelectorVersionComplete { segment });
        }
        if is_wildcard(raw) {
            self.wildcard()?;
            self.complete = true;
            return Ok(Segment::Wildcard);
        }
        return parse_number(segment, raw).map(Segment::Number);
    }

    /// Record a wildcard.
    ///
    /// # Errors
    ///
    /// Returns `Error::SelectorPrefixWithWildcard` when a prefix was given.
    fn wildcard(&mut self) -> Result<(), Error> {
        if self.prefixed {
            return Err(Error::SelectorPrefixWithWildcard);
        }
        self.flexible = true;
        return Ok(());
    }
}

impl SemverSelector {
    /// Whether any of minor, patch, or prerelease number is a wildcard.
    pub fn has_wildcard(&self) -> bool {
        return [self.minor, self.patch, self.prerelease_number].contains(&Segment::Wildcard);
    }

    /// Decide whether `candidate` satisfies this selector.
    pub fn matches(&self, candidate: &SemverCandidate) -> bool {
        if !self.flexible {
            return self.matches_exactly(candidate);
        }
        return match (self.suffix, self.prefix) {
            (Some(Suffix::GreaterThan), _) => self.matches_floor(candidate),
            (Some(Suffix::LessThan), _) => self.matches_ceiling(candidate),
            (None, Some(Prefix::Carat)) => {
                candidate.major == self.major
                    && candidate.minor >= self.minor.number_or_zero()
                    && candidate.patch >= self.patch.number_or_zero()
                    && !candidate.prerelease_exists
            },
            (None, Some(Prefix::Tilde)) => {
                candidate.major == self.major
                    && candidate.minor == self.minor.number_or_zero()
                    && candidate.patch >= self.patch.number_or_zero()
                    && !candidate.prerelease_exists
            },
            (None, None) => self.matches_wildcard(candidate),
        };
    }

    /// `-` suffix: the candidate is at or below the selector.
    fn matches_ceiling(&self, candidate: &SemverCandidate) -> bool {
        let numbers = (candidate.major, candidate.minor, candidate.patch).cmp(&self.numbers());
        if numbers.is_ne() {
            return numbers.is_lt();
        }
        if self.prerelease_label.is_empty() || !candidate.prerelease_exists {
            return self.prerelease_label.is_empty() && !candidate.prerelease_exists;
        }
        if self.prerelease_label != candidate.prerelease_label {
            return false;
        }
        return match self.prerelease_number {
            Segment::Number(number) => candidate.prerelease_number <= number,
            Segment::Unspecified | Segment::Wildcard => candidate.prerelease_number == 0,
        };
    }

    /// Exact mode: specified numbers equal, labels equal, and the prerelease
    /// number equal unless unspecified.
    fn matches_exactly(&self, candidate: &SemverCandidate) -> bool {
        let numbers_match = self.major == candidate.major
            && self.minor.accepts(candidate.minor)
            && self.patch.accepts(candidate.patch);
        if !numbers_match || self.prerelease_label != candidate.prerelease_label {
            return false;
        }
        return self.prerelease_number.accepts(candidate.prerelease_number);
    }

    /// `+` suffix: the candidate is at or above the selector.
    fn matches_floor(&self, candidate: &SemverCandidate) -> bool {
        let numbers = (candidate.major, candidate.minor, candidate.patch).cmp(&self.numbers());
        if numbers.is_ne() {
            return numbers.is_gt();
        }
        if self.prerelease_label.is_empty() {
            return !candidate.prerelease_exists;
        }
        if !candidate.prerelease_exists {
            return true;
        }
        if self.prerelease_label != candidate.prerelease_label {
            return false;
        }
        return match self.prerelease_number {
            Segment::Number(number) => candidate.prerelease_number >= number,
            Segment::Unspecified | Segment::Wildcard => true,
        };
    }

    /// Wildcard mode: major equal, then anything once a wildcard or gap is reached.
    fn matches_wildcard(&self, candidate: &SemverCandidate) -> bool {
        if candidate.major != self.major {
            return false;
        }
        if !matches!(self.minor, Segment::Number(_)) {
            return true;
        }
        if candidate.minor != self.minor.number_or_zero() {
            return false;
        }
        if !matches!(self.patch, Segment::Number(_)) {
            return true;
        }
        if candidate.patch != self.patch.number_or_zero() || self.prerelease_label != candidate.prerelease_label {
            return false;
        }
        return self.prerelease_number.accepts(candidate.prerelease_number);
    }

    /// Validate captures into a selector, checking prefix, major, minor,
    /// patch, prerelease label, prerelease number, then suffix.
    ///
    /// # Errors
    ///
    /// Returns the first selector error encountered; nothing partial is returned.
    pub fn new(captures: SelectorCaptures<'_>) -> Result<Self, Error> {
        let prefix = match captures.prefix {
            "" => None,
            "^" => Some(Prefix::Carat),
            "~" => Some(Prefix::Tilde),
            other => {
                return Err(Error::SelectorInvalidSegment {
                    segment: "prefix",
                    value: other.to_string(),
                });
            },
        };

        if captures.major.is_empty() {
            return Err(Error::SelectorMissingMajor);
        }
        let major = parse_number("major", captures.major)?;

        let mut parser = SegmentParser {
            complete: false,
            flexible: prefix.is_some(),
            prefixed: prefix.is_some(),
        };
        let minor = parser.version_segment("minor", captures.minor)?;
        let patch = parser.version_segment("patch", captures.patch)?;

        if !captures.prerelease_label.is_empty() && parser.complete {
            return Err(Error::SelectorVersionComplete {
                segment: "prerelease label",
            });
        }
        let has_label = !captures.prerelease_label.is_empty();
        let prerelease_number = parser.prerelease_number(has_label, captures.prerelease_number)?;

        let suffix = match captures.suffix {
            "" => None,
            "+" => Some(Suffix::GreaterThan),
            "-" => Some(Suffix::LessThan),
            other => {
                return Err(Error::SelectorInvalidSegment {
                    segment: "suffix",
                    value: other.to_string(),
                });
            },
        };
        if suffix.is_some() {
            if parser.flexible {
                return Err(Error::SelectorSuffixOnFlexible);
            }
            parser.flexible = true;
        }

        return Ok(Self {
            flexible: parser.flexible,
            major,
            minor,
            patch,
            prefix,
            prerelease_label: captures.prerelease_label.to_string(),
            prerelease_number,
            suffix,
        });
    }

    /// Major, minor and patch with unspecified segments read as 0.
    fn numbers(&self) -> (u64, u64, u64) {
        return (self.major, self.minor.number_or_zero(), self.patch.number_or_zero());
    }

    /// Whether `best` should favor the newest match: open-ended ranges
    /// (wildcards and `-`) prefer recency, floors prefer the minimum.
    pub fn prefers_highest(&self) -> bool {
        return self.has_wildcard() || self.suffix == Some(Suffix::LessThan);
    }
}

impl Segment {
    /// Whether a candidate value satisfies this segment in exact or wildcard mode.
    fn accepts(self, value: u64) -> bool {
        return match self {
            Self::Number(number) => number == value,
            Self::Unspecified | Self::Wildcard => true,
        };
    }

    /// The number, or 0 for wildcards and gaps.
    const fn number_or_zero(self) -> u64 {
        return match self {
            Self::Number(number) => number,
            Self::Unspecified | Self::Wildcard => 0,
        };
    }

    /// Write `.N` or `.x`; returns `false` for an unspecified segment.
    fn write_dotted(self, f: &mut fmt::Formatter<'_>) -> Result<bool, fmt::Error> {
        return match self {
            Self::Number(number) => write!(f, ".{number}").map(|()| return true),
            Self::Wildcard => f.write_str(".x").map(|()| return true),
            Self::Unspecified => Ok(false),
        };
    }
}

impl fmt::Display for SemverSelector {
    /// Canonical selector text, e.g. `^1.2.3` or `1.2.2-beta.1+`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.prefix {
            Some(Prefix::Tilde) => f.write_str("~")?,
            Some(Prefix::Carat) => f.write_str("^")?,
            None => {},
        }

        write!(f, "{}", self.major)?;

        if self.minor.write_dotted(f)? && self.patch.write_dotted(f)? && !self.prerelease_label.is_empty() {
            write!(f, "-{}", self.prerelease_label)?;
            self.prerelease_number.write_dotted(f)?;
        }

        match self.suffix {
            Some(Suffix::GreaterThan) => f.write_str("+")?,
            Some(Suffix::LessThan) => f.write_str("-")?,
            None => {},
        }
        return Ok(());
    }
}

impl FromStr for SemverSelector {
    type Err = Error;

    /// Parse selector text such as `~1.2.3`, `1.x`, or `1.2.2-beta.1+`.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let Some(caps) = SELECTOR_PATTERN.captures(text.trim()) else {
            return Err(Error::SelectorInvalidSegment {
                segment: "selector",
                value: text.to_string(),
            });
        };
        let group = |index: usize| return caps.get(index).map_or("", |m| return m.as_str());

        return Self::new(SelectorCaptures {
            major: group(2),
            minor: group(3),
            patch: group(4),
            prefix: group(1),
            prerelease_label: group(5),
            prerelease_number: group(6),
            suffix: group(7),
        });
    }
}

/// Whether a segment is the wildcard character, in either case.
fn is_wildcard(raw: &str) -> bool {
    return raw.eq_ignore_ascii_case("x");
}

/// Parse a numeric segment.
///
/// # Errors
///
/// Returns `Error::SelectorInvalidSegment` if the text is not a `u64`.
fn parse_number(segment: &'static str, raw: &str) -> Result<u64, Error> {
    return raw.parse().map_err(|_err| {
        return Error::SelectorInvalidSegment {
            segment,
            value: raw.to_string(),
        };
    });
}
