//! Per-file revision accumulation and patch application.
//!
//! A file is patched once its package barrier and every one of its import
//! rewrites have arrived. Patches for different files run on the rayon pool
//! in no particular order.

use std::collections::HashMap;
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

use crossbeam_channel::{Receiver, Sender, unbounded};
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::error::{Error, SyncedErrors};
use crate::scanner::find_package_import_comment;
use crate::splice::{BytesDiff, compose_bytes_diffs};
use crate::types::{Revision, RevisionKind};

/// What happened to one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchOutcome {
    /// The patched file.
    pub file: PathBuf,
    /// Import rewrites applied.
    pub imports: usize,
    /// Whether the bytes changed and were written back.
    pub written: bool,
}

/// Totals for one revision pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RevisionTally {
    /// Files that never received every expected import.
    pub files_missed: usize,
    /// Files whose bytes changed.
    pub files_patched: usize,
    /// Imports expected but never received.
    pub imports_missed: usize,
    /// Import rewrites applied.
    pub imports_pinned: usize,
}

/// Revisions received so far for one file.
#[derive(Debug, Default)]
struct RevisionGroup {
    /// Import rewrites.
    imports: Vec<Revision>,
    /// The package barrier, once it arrives.
    package: Option<Revision>,
}

impl RevisionGroup {
    /// Every revision in the group.
    fn into_revisions(self) -> Vec<Revision> {
        let mut revisions = self.imports;
        revisions.extend(self.package);
        return revisions;
    }

    /// Whether the barrier and exactly `expected` imports have arrived.
    fn is_ready(&self, expected: Option<usize>) -> bool {
        return self.package.is_some() && expected == Some(self.imports.len());
    }

    /// Add one revision. A second barrier for the same file is ignored.
    fn push(&mut self, revision: Revision) {
        if !revision.is_package() {
            self.imports.push(revision);
            return;
        }
        if self.package.is_some() {
            warn!(file = %revision.file.display(), "duplicate package barrier ignored");
            return;
        }
        self.package = Some(revision);
    }
}

/// Apply `revisions` to `file`, writing it back only if its bytes change.
///
/// Import rewrites must still land on a quoted literal. The package barrier
/// drops a package import comment if the package line carries one.
///
/// # Errors
///
/// Returns `Error::Io` if the file cannot be read or written,
/// `Error::ImportLiteralOutOfBounds` if a rewrite no longer lines up with a
/// literal, or `Error::BytesDiffInvalid` if two rewrites overlap.
pub fn apply_revisions(file: &Path, revisions: &[Revision]) -> Result<PatchOutcome, Error> {
    let original = fs::read(file)?;
    let mut diffs = Vec::with_capacity(revisions.len());
    let mut imports = 0_usize;
    for revision in revisions {
        match &revision.kind {
            RevisionKind::Import(bytes) => {
                check_literal(file, &original, &revision.range)?;
                diffs.push(BytesDiff {
                    bytes: bytes.clone(),
                    range: revision.range.clone(),
                });
                imports = imports.saturating_add(1);
            },
            RevisionKind::Package => {
                if let Some(range) = find_package_import_comment(&original, revision.range.start) {
                    diffs.push(BytesDiff { bytes: Vec::new(), range });
                }
            },
        }
    }

    let patched = compose_bytes_diffs(&original, diffs)?;
    let written = patched != original;
    if written {
        fs::write(file, &patched)?;
        debug!(file = %file.display(), imports, "patched file");
    }
    return Ok(PatchOutcome {
        file: file.to_path_buf(),
        imports,
        written,
    });
}

/// Group incoming revisions per file and patch each file once it is complete.
///
/// Runs until every sender of `revisions` is gone. Files still incomplete by
/// then get whatever revisions did arrive. Patch failures go to `errors`.
pub fn revise(
    revisions: &Receiver<Revision>,
    counts: &DashMap<PathBuf, usize>,
    errors: &SyncedErrors,
) -> RevisionTally {
    let (done_tx, done_rx) = unbounded();
    let mut groups: HashMap<PathBuf, RevisionGroup> = HashMap::new();
    for revision in revisions {
        let file = revision.file.clone();
        let group = groups.entry(file.clone()).or_default();
        group.push(revision);
        if !group.is_ready(counts.get(&file).map(|count| return *count)) {
            continue;
        }
        if let Some(group) = groups.remove(&file) {
            spawn_patch(file, group, &done_tx);
        }
    }

    let mut tally = RevisionTally::default();
    for (file, group) in groups {
        let expected = counts.get(&file).map_or(0, |count| return *count);
        tally.files_missed = tally.files_missed.saturating_add(1);
        tally.imports_missed = tally.imports_missed.saturating_add(expected.saturating_sub(group.imports.len()));
        spawn_patch(file, group, &done_tx);
    }
    if tally.files_missed > 0 {
        warn!("missed {} imports in {} files", tally.imports_missed, tally.files_missed);
    }

    drop(done_tx);
    for outcome in &done_rx {
        match outcome {
            Ok(outcome) => {
                tally.imports_pinned = tally.imports_pinned.saturating_add(outcome.imports);
                if outcome.written {
                    tally.files_patched = tally.files_patched.saturating_add(1);
                }
            },
            Err(e) => errors.push(e),
        }
    }
    return tally;
}

/// Whether `range` of `source` is still a quoted literal.
///
/// # Errors
///
/// Returns `Error::ImportLiteralOutOfBounds` if it is not.
fn check_literal(file: &Path, source: &[u8], range: &Range<usize>) -> Result<(), Error> {
    let quoted = |at: usize| return source.get(at).is_some_and(|byte| return matches!(byte, b'"' | b'`'));
    let long_enough = range.end > range.start.saturating_add(1);
    if long_enough && quoted(range.start) && quoted(range.end.saturating_sub(1)) {
        return Ok(());
    }
    return Err(Error::ImportLiteralOutOfBounds {
        file: file.to_path_buf(),
        from: range.start,
        to: range.end,
    });
}

/// Patch one file on the rayon pool and report back on `done`.
fn spawn_patch(file: PathBuf, group: RevisionGroup, done: &Sender<Result<PatchOutcome, Error>>) {
    let done = done.clone();
    rayon::spawn(move || {
        let outcome = apply_revisions(&file, &group.into_revisions());
        if let Err(e) = &outcome {
            warn!(file = %file.display(), "could not patch file: {e}");
        }
        if done.send(outcome).is_err() {
            debug!(file = %file.display(), "patch outcome dropped");
        }
    });
}
