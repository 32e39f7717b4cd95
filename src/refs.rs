//! Pkt-line reference advertisements: parsing and rewriting with a promoted version.

use std::ops::Range;

use serde::Serialize;
use tracing::debug;

use crate::candidate::SemverCandidate;
use crate::error::Error;

/// Ref name used for the default branch unless configured otherwise.
pub const DEFAULT_BRANCH_REF: &str = "refs/heads/master";

/// Capability that names HEAD's target; downgraded when HEAD is replaced.
const SYMREF_CAPABILITY: &str = "symref=";

/// Replacement for `symref=` so clients ignore the stale target.
const OLDREF_CAPABILITY: &str = "oldref=";

/// Length of a hex commit hash at the start of a ref record.
const HASH_LEN: usize = 40;

/// Size of the hex length prefix, which also counts towards the record length.
const PKT_LEN_SIZE: usize = 4;

/// An upstream refs advertisement, parsed once and never mutated.
#[derive(Debug, Clone, Serialize)]
pub struct RefAdvertisement {
    /// Version candidates in ascending version order, one per version.
    candidates: Vec<SemverCandidate>,
    /// Raw advertisement bytes.
    #[serde(skip)]
    data: Vec<u8>,
    /// Ref name treated as the default branch.
    default_branch: String,
    /// Commit the default branch points at, if advertised.
    default_branch_hash: Option<String>,
    /// Record bounds (length prefix included) of the default-branch line.
    #[serde(skip)]
    default_branch_line: Option<Range<usize>>,
    /// Start of the first ref record, where a missing HEAD line is inserted.
    #[serde(skip)]
    first_ref_start: Option<usize>,
    /// Commit HEAD points at, if advertised.
    head_hash: Option<String>,
    /// Record bounds (length prefix included) of the HEAD line.
    #[serde(skip)]
    head_line: Option<Range<usize>>,
}

/// Hash and name of one ref record.
struct RefRecord<'a> {
    /// Commit hash.
    hash: &'a str,
    /// Ref name, e.g. `refs/tags/v1.0.0`.
    name: &'a str,
}

impl RefAdvertisement {
    /// Version candidates in ascending order.
    pub fn candidates(&self) -> &[SemverCandidate] {
        return &self.candidates;
    }

    /// File one ref record under HEAD, the default branch, or the candidates.
    /// Version refs whose numbers overflow are skipped.
    fn classify(&mut self, record: &RefRecord<'_>, bounds: Range<usize>) {
        if self.first_ref_start.is_none() {
            self.first_ref_start = Some(bounds.start);
        }

        if record.name == "HEAD" {
            if self.head_line.is_none() {
                self.head_line = Some(bounds);
                self.head_hash = Some(record.hash.to_string());
            }
            return;
        }
        if record.name == self.default_branch {
            if self.default_branch_line.is_none() {
                self.default_branch_line = Some(bounds);
                self.default_branch_hash = Some(record.hash.to_string());
            }
            return;
        }

        match SemverCandidate::from_ref(record.hash, record.name) {
            Ok(Some(candidate)) => self.candidates.push(candidate),
            Ok(None) => {},
            Err(e) => debug!(name = record.name, "skipping version ref: {e}"),
        }
    }

    /// Raw advertisement bytes.
    pub fn data(&self) -> &[u8] {
        return &self.data;
    }

    /// Commit the default branch points at, if it was advertised.
    pub fn default_branch_hash(&self) -> Option<&str> {
        return self.default_branch_hash.as_deref();
    }

    /// HEAD's original capability list with `symref=` turned into `oldref=`.
    fn downgraded_capabilities(&self) -> String {
        let Some(head) = &self.head_line else {
            return String::new();
        };
        let payload = self
            .data
            .get(head.start.saturating_add(PKT_LEN_SIZE)..head.end)
            .unwrap_or_default();
        let Some(nul) = payload.iter().position(|byte| return *byte == b'\0') else {
            return String::new();
        };
        let capabilities = payload.get(nul.saturating_add(1)..).unwrap_or_default();
        let capabilities = capabilities.strip_suffix(b"\n").unwrap_or(capabilities);
        return String::from_utf8_lossy(capabilities).replace(SYMREF_CAPABILITY, OLDREF_CAPABILITY);
    }

    /// Commit HEAD points at, if it was advertised.
    pub fn head_hash(&self) -> Option<&str> {
        return self.head_hash.as_deref();
    }

    /// Parse an advertisement whose default branch is `refs/heads/master`.
    ///
    /// # Errors
    ///
    /// Returns `Error::MalformedPktLength` or `Error::IncompleteRefs` for broken framing.
    pub fn parse(data: Vec<u8>) -> Result<Self, Error> {
        return Self::parse_with_default_branch(data, DEFAULT_BRANCH_REF);
    }

    /// Parse an advertisement, treating `default_branch` as the default branch.
    ///
    /// Records that are not refs (service headers, flushes) are skipped.
    /// Candidates are sorted by version, keeping the first ref of each version.
    ///
    /// # Errors
    ///
    /// Returns `Error::MalformedPktLength` if a length prefix is not hex,
    /// or `Error::IncompleteRefs` if a record runs past the end of the data.
    pub fn parse_with_default_branch(data: Vec<u8>, default_branch: &str) -> Result<Self, Error> {
        let mut advertisement = Self {
            candidates: Vec::new(),
            data: Vec::new(),
            default_branch: default_branch.to_string(),
            default_branch_hash: None,
            default_branch_line: None,
            first_ref_start: None,
            head_hash: None,
            head_line: None,
        };

        let mut cursor = 0;
        while cursor < data.len() {
            let record = pkt_record_bounds(&data, cursor)?;
            let payload = data.get(cursor.saturating_add(PKT_LEN_SIZE)..record.end).unwrap_or_default();
            cursor = record.end;

            if let Some(parsed) = Self::ref_record(payload) {
                advertisement.classify(&parsed, record);
            }
        }

        advertisement.candidates.sort_by(SemverCandidate::version_cmp);
        advertisement.candidates.dedup_by(|later, earlier| return later.same_version(earlier));
        advertisement.data = data;
        return Ok(advertisement);
    }

    /// Commit hash and ref-name slices of a record payload.
    /// Records without a 40-byte hash followed by a space are not refs.
    fn ref_record(payload: &[u8]) -> Option<RefRecord<'_>> {
        if payload.iter().position(|byte| return *byte == b' ') != Some(HASH_LEN) {
            return None;
        }
        let hash = std::str::from_utf8(payload.get(..HASH_LEN)?).ok()?;
        let rest = payload.get(HASH_LEN.saturating_add(1)..)?;
        let name_len = rest
            .iter()
            .position(|byte| return matches!(*byte, b' ' | b'\0' | b'\n'))
            .unwrap_or(rest.len());
        let name = std::str::from_utf8(rest.get(..name_len)?).ok()?;
        if name.is_empty() {
            return None;
        }
        return Some(RefRecord { hash, name });
    }

    /// Rebuild the advertisement with `candidate` promoted to HEAD and the default branch.
    ///
    /// The original HEAD capabilities are kept with `symref=` downgraded to
    /// `oldref=`; branches get a fresh `symref=HEAD:<ref>`. The original
    /// default-branch line is dropped in favor of one pointing at the candidate.
    pub fn reserialize(&self, candidate: &SemverCandidate) -> Vec<u8> {
        let insert_at = self.first_ref_start.unwrap_or(self.data.len());
        let head = self.head_line.clone().unwrap_or(insert_at..insert_at);
        let elided = self.default_branch_line.as_ref();

        let mut head_text = format!("{} HEAD", candidate.ref_hash);
        let mut annotations = Vec::new();
        if candidate.is_branch() {
            annotations.push(format!("{SYMREF_CAPABILITY}HEAD:{}", candidate.ref_name));
        }
        let capabilities = self.downgraded_capabilities();
        if !capabilities.is_empty() {
            annotations.push(capabilities);
        }
        if !annotations.is_empty() {
            head_text.push('\0');
            head_text.push_str(&annotations.join(" "));
        }
        head_text.push('\n');

        let mut out = Vec::with_capacity(self.data.len().saturating_add(head_text.len()));
        extend_without(&mut out, &self.data, 0..head.start, elided);
        push_pkt_line(&mut out, head_text.as_bytes());
        push_pkt_line(
            &mut out,
            format!("{} {}\n", candidate.ref_hash, self.default_branch).as_bytes(),
        );
        extend_without(&mut out, &self.data, head.end..self.data.len(), elided);
        return out;
    }
}

/// Append `data[span]` to `out`, leaving out `hole` when it lies inside `span`.
fn extend_without(out: &mut Vec<u8>, data: &[u8], span: Range<usize>, hole: Option<&Range<usize>>) {
    let Some(hole) = hole.filter(|h| return h.start >= span.start && h.end <= span.end) else {
        out.extend_from_slice(data.get(span).unwrap_or_default());
        return;
    };
    out.extend_from_slice(data.get(span.start..hole.start).unwrap_or_default());
    out.extend_from_slice(data.get(hole.end..span.end).unwrap_or_default());
}

/// Bounds of the pkt-line record starting at `cursor`, length prefix included.
/// Lengths below the 4-byte minimum (flush and delimiter packets) count as 4.
///
/// # Errors
///
/// Returns `Error::MalformedPktLength` for a non-hex prefix,
/// or `Error::IncompleteRefs` when the record runs past the buffer.
fn pkt_record_bounds(data: &[u8], cursor: usize) -> Result<Range<usize>, Error> {
    let available = data.len().saturating_sub(cursor);
    let Some(prefix) = data.get(cursor..cursor.saturating_add(PKT_LEN_SIZE)) else {
        return Err(Error::IncompleteRefs {
            available,
            cursor,
            declared: PKT_LEN_SIZE,
        });
    };

    let raw = String::from_utf8_lossy(prefix);
    let declared = if prefix.iter().all(u8::is_ascii_hexdigit) {
        usize::from_str_radix(&raw, 16).ok()
    } else {
        None
    };
    let Some(declared) = declared else {
        return Err(Error::MalformedPktLength {
            cursor,
            raw: raw.into_owned(),
        });
    };

    let declared = declared.max(PKT_LEN_SIZE);
    if declared > available {
        return Err(Error::IncompleteRefs {
            available,
            cursor,
            declared,
        });
    }
    return Ok(cursor..cursor.saturating_add(declared));
}

/// Append one pkt-line framed record carrying `payload`.
pub fn push_pkt_line(out: &mut Vec<u8>, payload: &[u8]) {
    let len = payload.len().saturating_add(PKT_LEN_SIZE);
    out.extend_from_slice(format!("{len:04x}").as_bytes());
    out.extend_from_slice(payload);
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc, reason = "tests")]
mod tests {
    use super::*;

    fn reflines(lines: &[&str]) -> Vec<u8> {
        let mut out = b"001e# service=git-upload-pack\n0000".to_vec();
        for line in lines {
            push_pkt_line(&mut out, format!("{line}\n").as_bytes());
        }
        out.extend_from_slice(b"0000");
        return out;
    }

    fn hash(n: u8) -> String {
        return format!("00000000000000000000000000000000000hash{n}");
    }

    fn names(advertisement: &RefAdvertisement) -> Vec<(&str, &str)> {
        return advertisement
            .candidates()
            .iter()
            .map(|c| return (c.ref_hash.as_str(), c.ref_name.as_str()))
            .collect();
    }

    fn check_rewrite(original: &[String], promoted: &str, expected: &[String]) {
        let as_refs = |lines: &[String]| return reflines(&lines.iter().map(String::as_str).collect::<Vec<_>>());
        let advertisement = RefAdvertisement::parse(as_refs(original)).unwrap();
        let candidate = advertisement
            .candidates()
            .iter()
            .find(|c| return c.ref_name == promoted)
            .unwrap();
        let rewritten = advertisement.reserialize(candidate);
        assert_eq!(
            String::from_utf8_lossy(&rewritten),
            String::from_utf8_lossy(&as_refs(expected))
        );
    }

    #[test]
    fn short_hashes_are_not_refs() {
        let advertisement = RefAdvertisement::parse(reflines(&["hash1 HEAD\0caps"])).unwrap();
        assert!(advertisement.candidates().is_empty());
        assert_eq!(advertisement.head_hash(), None);
    }

    #[test]
    fn collects_branch_candidates_in_version_order() {
        let data = reflines(&[
            &format!("{} HEAD", hash(1)),
            &format!("{} refs/heads/v1.1", hash(2)),
            &format!("{} refs/heads/v1.3", hash(3)),
            &format!("{} refs/heads/v1.2", hash(4)),
            &format!("{} refs/pull/7/head", hash(5)),
        ]);
        let advertisement = RefAdvertisement::parse(data).unwrap();
        assert_eq!(
            names(&advertisement),
            [
                (hash(2).as_str(), "refs/heads/v1.1"),
                (hash(4).as_str(), "refs/heads/v1.2"),
                (hash(3).as_str(), "refs/heads/v1.3"),
            ]
        );
        assert_eq!(advertisement.head_hash(), Some(hash(1).as_str()));
        assert_eq!(advertisement.default_branch_hash(), None);
    }

    #[test]
    fn promotes_major_version_branch() {
        check_rewrite(
            &[
                format!("{} HEAD", hash(1)),
                format!("{} refs/heads/v0", hash(2)),
                format!("{} refs/heads/v1", hash(3)),
                format!("{} refs/heads/v2", hash(4)),
            ],
            "refs/heads/v2",
            &[
                format!("{} HEAD\0symref=HEAD:refs/heads/v2", hash(4)),
                format!("{} refs/heads/master", hash(4)),
                format!("{} refs/heads/v0", hash(2)),
                format!("{} refs/heads/v1", hash(3)),
                format!("{} refs/heads/v2", hash(4)),
            ],
        );
    }

    #[test]
    fn downgrades_original_symref_for_branches() {
        check_rewrite(
            &[
                format!("{} HEAD\0foo symref=bar baz", hash(1)),
                format!("{} refs/heads/v1", hash(2)),
            ],
            "refs/heads/v1",
            &[
                format!("{} HEAD\0symref=HEAD:refs/heads/v1 foo oldref=bar baz", hash(2)),
                format!("{} refs/heads/master", hash(2)),
                format!("{} refs/heads/v1", hash(2)),
            ],
        );
    }

    #[test]
    fn downgrades_original_symref_for_tags() {
        check_rewrite(
            &[
                format!("{} HEAD\0foo symref=bar baz", hash(1)),
                format!("{} refs/tags/v1", hash(2)),
            ],
            "refs/tags/v1",
            &[
                format!("{} HEAD\0foo oldref=bar baz", hash(2)),
                format!("{} refs/heads/master", hash(2)),
                format!("{} refs/tags/v1", hash(2)),
            ],
        );
    }

    #[test]
    fn replaces_original_master_branch() {
        check_rewrite(
            &[
                format!("{} HEAD", hash(1)),
                format!("{} refs/heads/master", hash(1)),
                format!("{} refs/heads/v1", hash(2)),
            ],
            "refs/heads/v1",
            &[
                format!("{} HEAD\0symref=HEAD:refs/heads/v1", hash(2)),
                format!("{} refs/heads/master", hash(2)),
                format!("{} refs/heads/v1", hash(2)),
            ],
        );
    }

    #[test]
    fn tags_get_no_symref() {
        check_rewrite(
            &[
                format!("{} HEAD", hash(1)),
                format!("{} refs/tags/v0", hash(2)),
                format!("{} refs/tags/v1", hash(3)),
            ],
            "refs/tags/v1",
            &[
                format!("{} HEAD", hash(3)),
                format!("{} refs/heads/master", hash(3)),
                format!("{} refs/tags/v0", hash(2)),
                format!("{} refs/tags/v1", hash(3)),
            ],
        );
    }

    #[test]
    fn peeled_tags_keep_the_first_ref_of_a_version() {
        let data = reflines(&[
            &format!("{} HEAD", hash(1)),
            &format!("{} refs/heads/master", hash(2)),
            &format!("{} refs/tags/v1", hash(3)),
            &format!("{} refs/tags/v1^{{}}", hash(4)),
            &format!("{} refs/tags/v2", hash(5)),
        ]);
        let advertisement = RefAdvertisement::parse(data).unwrap();
        assert_eq!(
            names(&advertisement),
            [(hash(3).as_str(), "refs/tags/v1"), (hash(5).as_str(), "refs/tags/v2")]
        );
        assert_eq!(advertisement.default_branch_hash(), Some(hash(2).as_str()));
    }

    #[test]
    fn inserts_head_when_missing() {
        let data = reflines(&[&format!("{} refs/tags/v1", hash(3))]);
        let advertisement = RefAdvertisement::parse(data).unwrap();
        let candidate = advertisement.candidates().first().unwrap().clone();
        let reparsed = RefAdvertisement::parse(advertisement.reserialize(&candidate)).unwrap();
        assert_eq!(reparsed.head_hash(), Some(hash(3).as_str()));
        assert_eq!(reparsed.default_branch_hash(), Some(hash(3).as_str()));
        assert!(reparsed.data().starts_with(b"001e# service=git-upload-pack\n0000"));
    }

    #[test]
    fn custom_default_branch_is_elided() {
        let data = reflines(&[
            &format!("{} HEAD", hash(1)),
            &format!("{} refs/heads/main", hash(1)),
            &format!("{} refs/heads/v3", hash(2)),
        ]);
        let advertisement = RefAdvertisement::parse_with_default_branch(data, "refs/heads/main").unwrap();
        let candidate = advertisement.candidates().first().unwrap().clone();
        let text = String::from_utf8(advertisement.reserialize(&candidate)).unwrap();
        assert_eq!(text.matches("refs/heads/main").count(), 1);
        assert!(text.contains(&format!("{} refs/heads/main\n", hash(2))));
    }

    #[test]
    fn reparse_recovers_promoted_hash() {
        let data = reflines(&[
            &format!("{} HEAD\0multi_ack symref=HEAD:refs/heads/master", hash(1)),
            &format!("{} refs/heads/master", hash(1)),
            &format!("{} refs/heads/v1", hash(2)),
            &format!("{} refs/tags/v1.0.1", hash(3)),
            &format!("{} refs/tags/v1.0.2-rc.1", hash(4)),
        ]);
        let advertisement = RefAdvertisement::parse(data).unwrap();
        for candidate in advertisement.candidates() {
            let reparsed = RefAdvertisement::parse(advertisement.reserialize(candidate)).unwrap();
            assert_eq!(reparsed.head_hash(), Some(candidate.ref_hash.as_str()));
            assert_eq!(reparsed.default_branch_hash(), Some(candidate.ref_hash.as_str()));
            assert_eq!(reparsed.candidates().len(), advertisement.candidates().len());
        }
    }

    #[test]
    fn no_adjacent_equal_versions() {
        let data = reflines(&[
            &format!("{} refs/heads/v1", hash(1)),
            &format!("{} refs/tags/v1.0.0", hash(2)),
            &format!("{} refs/tags/1.0", hash(3)),
            &format!("{} refs/tags/v1.0.0-beta", hash(4)),
            &format!("{} refs/heads/v1.0-beta", hash(5)),
        ]);
        let advertisement = RefAdvertisement::parse(data).unwrap();
        let pairs = advertisement.candidates().windows(2);
        for pair in pairs {
            if let [a, b] = pair {
                assert!(!a.same_version(b), "{a} repeated");
            }
        }
        assert_eq!(advertisement.candidates().len(), 2);
    }

    #[test]
    fn malformed_length_fails() {
        let err = RefAdvertisement::parse(b"001z# service=git-upload-pack\n0000".to_vec()).unwrap_err();
        assert!(matches!(err, Error::MalformedPktLength { cursor: 0, .. }));
    }

    #[test]
    fn oversized_length_fails() {
        let err = RefAdvertisement::parse(b"9999# service=git-upload-pack\n0000".to_vec()).unwrap_err();
        assert!(matches!(err, Error::IncompleteRefs { cursor: 0, declared: 0x9999, .. }));
    }

    #[test]
    fn truncated_prefix_fails() {
        let err = RefAdvertisement::parse(b"0000000".to_vec()).unwrap_err();
        assert!(matches!(err, Error::IncompleteRefs { cursor: 4, .. }));
    }
}
