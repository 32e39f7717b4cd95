//! Picking one candidate out of everything a selector matches.

use crate::candidate::SemverCandidate;
use crate::selector::SemverSelector;

/// Choose the candidate a selector should resolve to.
///
/// Open-ended selectors (wildcards and `-`) take the highest match so the
/// newest release in range wins. Floors (exact, `^`, `~`, `+`) take the
/// lowest match, the minimal version satisfying the constraint.
pub fn best<'a>(candidates: &'a [SemverCandidate], selector: &SemverSelector) -> Option<&'a SemverCandidate> {
    let mut matching = candidates.iter().filter(|candidate| return selector.matches(candidate));
    if selector.prefers_highest() {
        return matching.max_by(|a, b| return a.version_cmp(b));
    }
    return matching.min_by(|a, b| return a.version_cmp(b));
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc, reason = "tests")]
mod tests {
    use super::*;

    fn candidates() -> Vec<SemverCandidate> {
        return [
            "refs/tags/v1.0.0",
            "refs/tags/v1.2.0",
            "refs/tags/v1.2.4",
            "refs/tags/v1.3.0-beta",
            "refs/tags/v2.0.0",
        ]
        .iter()
        .map(|name| return SemverCandidate::from_ref("fakeHash", name).unwrap().unwrap())
        .collect();
    }

    fn pick(selector: &str) -> Option<String> {
        let list = candidates();
        let parsed: SemverSelector = selector.parse().unwrap();
        return best(&list, &parsed).map(ToString::to_string);
    }

    #[test]
    fn floors_take_the_lowest_match() {
        assert_eq!(pick("^1.0.0").as_deref(), Some("1.0.0"));
        assert_eq!(pick("~1.2.0").as_deref(), Some("1.2.0"));
        assert_eq!(pick("1.1.0+").as_deref(), Some("1.2.0"));
        assert_eq!(pick("1").as_deref(), Some("1.0.0"));
    }

    #[test]
    fn open_ranges_take_the_highest_match() {
        assert_eq!(pick("1.x").as_deref(), Some("1.3.0-beta"));
        assert_eq!(pick("1.2.x").as_deref(), Some("1.2.4"));
        assert_eq!(pick("1.2.9-").as_deref(), Some("1.2.4"));
    }

    #[test]
    fn single_and_missing_matches() {
        assert_eq!(pick("2.0.0").as_deref(), Some("2.0.0"));
        assert_eq!(pick("3.x"), None);
    }
}
