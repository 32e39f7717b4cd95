//! The dependency rewriter: walks a package tree, pins every upstream import
//! to a commit, and patches the files in place.
//!
//! Three stages run at once. The walk emits imports and package barriers.
//! A coordinating loop resolves each dependency once and turns imports into
//! revisions. The reviser patches each file as soon as it is complete.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::Scope;

use crossbeam_channel::{Receiver, Sender, never, select, unbounded};
use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Error, SyncedErrors};
use crate::import_path::ImportPath;
use crate::resolution::{CommitResolver, ResolvedCommit, resolve_dependency};
use crate::revise::{RevisionTally, revise};
use crate::traversal::{Traversal, TraversalSink};
use crate::types::{ImportSpec, PackageMeta, Revision, RewriteSettings};
use crate::vendor::VendorScopes;
use crate::waitlist::SpecWaitingList;

/// What a successful run did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RewriteSummary {
    /// Files whose bytes changed.
    pub files_patched: usize,
    /// Imports that could not be pinned.
    pub imports_missed: usize,
    /// Imports rewritten to a pinned path.
    pub imports_pinned: usize,
    /// Dependency key and pinned commit, sorted by key.
    pub resolutions: Vec<(String, String)>,
}

/// Turns imports into revisions, resolving each dependency key once.
struct Coordinator<'a> {
    /// Pinned commit per dependency key.
    cache: DashMap<String, String>,
    /// Failures that do not stop the run.
    errors: &'a SyncedErrors,
    /// The package being pinned.
    package: &'a PackageMeta,
    /// Upstream commit lookup.
    resolver: &'a dyn CommitResolver,
    /// Hosts and reserved names.
    settings: &'a RewriteSettings,
    /// Imports parked on a dependency that is still resolving.
    waiting: DashMap<String, Arc<SpecWaitingList>>,
}

/// Bookkeeping owned by the coordinating loop.
#[derive(Debug, Default)]
struct LoopState {
    /// Keys whose resolution failed.
    failed: HashSet<String>,
    /// Resolutions started and not yet received.
    pending: usize,
}

/// Senders the coordinating loop writes to.
#[derive(Debug)]
struct Outbound {
    /// Finished resolutions, back to the loop itself.
    resolved: Sender<ResolvedCommit>,
    /// Import revisions for the reviser.
    revisions: Sender<Revision>,
}

impl Coordinator<'_> {
    /// Pinned commit for `key`, if its resolution already landed.
    fn cached(&self, key: &str) -> Option<String> {
        return self.cache.get(key).map(|sha| return sha.value().clone());
    }

    /// Turn `spec` into a revision pinned at `sha`.
    fn emit(&self, spec: ImportSpec, sha: &str, revisions: &Sender<Revision>) {
        let Some(import) = ImportPath::parse(&spec.import_path, &self.settings.upstream_host) else {
            return;
        };
        let literal = import.pinned_literal(&self.settings.proxy_host, sha, &self.settings.internal_dir);
        if revisions.send(Revision::import(spec, literal.into_bytes())).is_err() {
            debug!("revision receiver gone; import revision dropped");
        }
    }

    /// Route one discovered import: straight to a revision when its key is
    /// cached, onto a waiting list otherwise, starting a resolution for the
    /// first import of a key.
    fn on_import<'scope>(
        &'scope self,
        threads: &'scope Scope<'scope, '_>,
        spec: ImportSpec,
        outbound: &Outbound,
        state: &mut LoopState,
    ) {
        let Some(import) = ImportPath::parse(&spec.import_path, &self.settings.upstream_host) else {
            return;
        };
        let key = import.key();
        let (author, repo) = (import.author.to_string(), import.repo.to_string());

        if let Some(sha) = self.cached(&key) {
            self.emit(spec, &sha, &outbound.revisions);
            return;
        }
        if state.failed.contains(&key) {
            debug!(%key, import = %spec.import_path, "dependency already failed; import left as is");
            return;
        }

        let mut first = Some(spec);
        let mut created = false;
        let list = Arc::clone(
            self.waiting
                .entry(key.clone())
                .or_insert_with(|| {
                    created = true;
                    return Arc::new(first.take().map_or_else(SpecWaitingList::default, SpecWaitingList::new));
                })
                .value(),
        );
        if created {
            state.pending = state.pending.saturating_add(1);
            let resolved = outbound.resolved.clone();
            threads.spawn(move || {
                let import = ImportPath {
                    author: &author,
                    repo: &repo,
                    subpath: "",
                };
                let commit = resolve_dependency(&import, self.package, self.resolver);
                if let Ok(sha) = &commit.result {
                    self.cache.insert(commit.key.clone(), sha.clone());
                }
                if resolved.send(commit).is_err() {
                    debug!("coordinator gone; resolution dropped");
                }
            });
            return;
        }

        let Some(spec) = first else {
            return;
        };
        if let Err(spec) = list.add(spec) {
            match self.cached(&key) {
                Some(sha) => self.emit(spec, &sha, &outbound.revisions),
                None => debug!(%key, "late import for an unresolved dependency"),
            }
        }
    }

    /// Release everything parked on a finished resolution.
    fn on_resolved(&self, commit: ResolvedCommit, revisions: &Sender<Revision>, state: &mut LoopState) {
        state.pending = state.pending.saturating_sub(1);
        let specs = self
            .waiting
            .get(&commit.key)
            .and_then(|list| return list.clear())
            .unwrap_or_default();
        match commit.result {
            Ok(sha) => {
                for spec in specs {
                    self.emit(spec, &sha, revisions);
                }
            },
            Err(e) => {
                warn!(key = %commit.key, dropped = specs.len(), "leaving dependency unpinned");
                state.failed.insert(commit.key);
                self.errors.push(e);
            },
        }
    }

    /// Multiplex discovered imports and finished resolutions until the walk
    /// is done and no resolution is outstanding.
    fn run<'scope>(
        &'scope self,
        threads: &'scope Scope<'scope, '_>,
        imports: &Receiver<ImportSpec>,
        revisions: Sender<Revision>,
    ) {
        let (resolved_tx, resolved_rx) = unbounded();
        let outbound = Outbound {
            resolved: resolved_tx,
            revisions,
        };
        let closed = never();
        let mut imports_open = true;
        let mut state = LoopState::default();

        while imports_open || state.pending > 0 {
            let incoming = if imports_open { imports } else { &closed };
            select! {
                recv(incoming) -> spec => match spec {
                    Ok(spec) => self.on_import(threads, spec, &outbound, &mut state),
                    Err(_) => {
                        debug!(pending = state.pending, "import stream closed");
                        imports_open = false;
                    },
                },
                recv(resolved_rx) -> commit => {
                    if let Ok(commit) = commit {
                        self.on_resolved(commit, &outbound.revisions, &mut state);
                    }
                },
            }
        }

        for entry in &self.waiting {
            if entry.value().clear().is_some_and(|specs| return !specs.is_empty()) {
                debug!(key = %entry.key(), "cleared leftover waiting list");
            }
        }
        self.waiting.clear();
    }
}

/// Pin every upstream import under `root` for `package` and patch the files.
///
/// Each dependency is resolved at most once per run, however many files
/// import it. Imports of the package's own sub-packages are pinned to
/// `package.sha` without asking `resolver`. A file is written once all of
/// its rewrites are known, and only if its bytes change.
///
/// # Errors
///
/// Returns `Error::InvalidPackage` for unusable metadata, or
/// `Error::Aggregate` listing every traversal, resolution and patch failure.
/// Files unaffected by a failure are still patched.
pub fn version_deps(
    root: &Path,
    package: &PackageMeta,
    settings: &RewriteSettings,
    resolver: &dyn CommitResolver,
) -> Result<RewriteSummary, Error> {
    package.validate()?;
    info!(root = %root.display(), package = %package.key(), sha = %package.sha, "versioning dependencies");

    let counts: DashMap<PathBuf, usize> = DashMap::new();
    let scopes = VendorScopes::new();
    let errors = SyncedErrors::default();
    let coordinator = Coordinator {
        cache: DashMap::new(),
        errors: &errors,
        package,
        resolver,
        settings,
        waiting: DashMap::new(),
    };

    let (walk_errors_tx, walk_errors_rx) = unbounded();
    let (imports_tx, imports_rx) = unbounded();
    let (revisions_tx, revisions_rx) = unbounded();
    let sink = TraversalSink {
        errors: walk_errors_tx,
        imports: imports_tx,
        revisions: revisions_tx.clone(),
    };
    let traversal = Traversal {
        counts: &counts,
        package,
        scopes: &scopes,
        settings,
    };

    let tally = std::thread::scope(|threads| {
        let reviser = threads.spawn(|| return revise(&revisions_rx, &counts, &errors));
        threads.spawn(move || return traversal.run(root, &sink));
        coordinator.run(threads, &imports_rx, revisions_tx);
        return reviser.join().unwrap_or_else(|_| {
            errors.push("revision worker panicked");
            return RevisionTally::default();
        });
    });

    let walk_failures = walk_errors_rx.try_iter().count();
    if walk_failures > 0 {
        errors.insert_first(format!(
            "failed to read package directory \"{}\" due to {walk_failures} error(s) with file system traversal",
            root.display()
        ));
    }
    if let Some(err) = errors.take_aggregate("version dependencies") {
        return Err(err);
    }

    let mut resolutions: Vec<(String, String)> = coordinator.cache.into_iter().collect();
    resolutions.sort();
    info!(
        files = tally.files_patched,
        imports = tally.imports_pinned,
        dependencies = resolutions.len(),
        "dependencies versioned"
    );
    return Ok(RewriteSummary {
        files_patched: tally.files_patched,
        imports_missed: tally.imports_missed,
        imports_pinned: tally.imports_pinned,
        resolutions,
    });
}
