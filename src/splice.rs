//! Byte-level splicing of many edits into one buffer.

use std::ops::Range;

use crate::error::Error;

/// Replace `range` of a buffer with `bytes`. The replacement may be longer,
/// shorter, or empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BytesDiff {
    /// Replacement bytes.
    pub bytes: Vec<u8>,
    /// Half-open range of the original buffer being replaced.
    pub range: Range<usize>,
}

/// Apply `diffs` to `base` and return the patched buffer.
///
/// Diffs may arrive in any order. They are validated first, then spliced
/// from the back so earlier offsets stay valid. `base` is never modified.
///
/// # Errors
///
/// Returns `Error::BytesDiffInvalid` for an empty or inverted range, a range
/// past the end of `base`, or two overlapping ranges.
pub fn compose_bytes_diffs(base: &[u8], mut diffs: Vec<BytesDiff>) -> Result<Vec<u8>, Error> {
    diffs.sort_by(|a, b| return b.range.start.cmp(&a.range.start));

    let mut floor = base.len();
    for diff in &diffs {
        let Range { start, end } = diff.range;
        let reason = if end <= start {
            Some("end must be greater than start")
        } else if end > base.len() {
            Some("range ends past the buffer")
        } else if end > floor {
            Some("range overlaps a later diff")
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(Error::BytesDiffInvalid {
                from: start,
                len: base.len(),
                reason,
                to: end,
            });
        }
        floor = start;
    }

    let mut out = base.to_vec();
    for diff in diffs {
        out.splice(diff.range, diff.bytes);
    }
    return Ok(out);
}
