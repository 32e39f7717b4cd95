//! Parallel-recursive walk of a package tree.
//!
//! Every subdirectory and every Go file is its own unit of work on the rayon
//! pool. A `vendor` directory is walked to completion before anything else in
//! its parent, so the scope it fills is final by the time sibling files are
//! filtered against it.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crossbeam_channel::{Sender, unbounded};
use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::grammar::is_go_source;
use crate::import_path::internal_dir_name;
use crate::scanner::scan_go_source;
use crate::types::{ImportSpec, PackageMeta, Revision, RewriteSettings};
use crate::vendor::{ScopeId, VendorScopes};

/// Go's vendor directory name.
const VENDOR_DIR: &str = "vendor";

/// Where traversal results go.
#[derive(Debug, Clone)]
pub struct TraversalSink {
    /// Filesystem and scan failures.
    pub errors: Sender<Error>,
    /// Upstream imports that need a pinned commit.
    pub imports: Sender<ImportSpec>,
    /// Package barriers, one per scanned file.
    pub revisions: Sender<Revision>,
}

/// State shared by every unit of work in one walk.
#[derive(Debug)]
pub struct Traversal<'a> {
    /// Import count per file, recorded before the file's imports are sent.
    pub counts: &'a DashMap<PathBuf, usize>,
    /// The package being pinned.
    pub package: &'a PackageMeta,
    /// Vendor scope arena.
    pub scopes: &'a VendorScopes,
    /// Hosts and reserved names.
    pub settings: &'a RewriteSettings,
}

/// Where one directory sits relative to vendor trees.
#[derive(Debug, Clone)]
struct Level {
    /// Whether files here record their import counts. Off inside a vendor
    /// tree, whose output is counted once the tree is complete.
    counting: bool,
    /// Innermost vendor scope governing this directory.
    scope: ScopeId,
    /// Root that provided packages are named relative to, inside a vendor tree.
    vendor_root: Option<PathBuf>,
}

/// Entries of one directory, bucketed.
#[derive(Debug, Default)]
struct Listing {
    /// Subdirectories other than `vendor`.
    dirs: Vec<PathBuf>,
    /// Go source files.
    files: Vec<PathBuf>,
    /// The `vendor` subdirectory.
    vendor: Option<PathBuf>,
}

impl Traversal<'_> {
    /// Walk a vendor tree synchronously and hand its output to `sink`,
    /// minus imports the finished scope provides.
    /// Returns the new scope, or `None` when the tree had failures.
    fn enter_vendor(&self, vendor: &Path, level: &Level, sink: &TraversalSink) -> Option<ScopeId> {
        let src = vendor.join("src");
        let vendor_root = if src.is_dir() { src } else { vendor.to_path_buf() };
        let child = self.scopes.child(level.scope);
        debug!(dir = %vendor_root.display(), depth = self.scopes.depth(child), "entering vendor tree");

        let (errors_tx, errors_rx) = unbounded();
        let (imports_tx, imports_rx) = unbounded();
        let (revisions_tx, revisions_rx) = unbounded();
        let buffered = TraversalSink {
            errors: errors_tx,
            imports: imports_tx,
            revisions: revisions_tx,
        };
        let inner = Level {
            counting: false,
            scope: child,
            vendor_root: Some(vendor_root.clone()),
        };
        rayon::scope(|scope| return self.visit_dir(scope, &vendor_root, &inner, &buffered));
        self.scopes.finalize(child);
        drop(buffered);

        let mut failed = false;
        for err in errors_rx.try_iter() {
            failed = true;
            sink.fail(err);
        }
        if failed {
            warn!(dir = %vendor.display(), "vendor tree had failures; skipping its parent directory");
            return None;
        }

        let imports: Vec<ImportSpec> = imports_rx
            .try_iter()
            .filter(|spec| return !self.scopes.contains(child, &spec.import_path))
            .collect();
        let barriers: Vec<Revision> = revisions_rx.try_iter().collect();
        if level.counting {
            let mut per_file: HashMap<&Path, usize> = HashMap::new();
            for spec in &imports {
                let count = per_file.entry(spec.file.as_path()).or_insert(0);
                *count = count.saturating_add(1);
            }
            for barrier in &barriers {
                let count = per_file.get(barrier.file.as_path()).copied().unwrap_or(0);
                self.counts.insert(barrier.file.clone(), count);
            }
        }
        for barrier in barriers {
            sink.barrier(barrier);
        }
        for spec in imports {
            sink.import(spec);
        }
        return Some(child);
    }

    /// Register `dir` as a package of the vendor tree it sits in.
    fn register_provided(&self, dir: &Path, level: &Level) {
        let Some(vendor_root) = &level.vendor_root else {
            return;
        };
        let Some(package) = provided_package(dir, vendor_root) else {
            return;
        };
        if self.scopes.add(level.scope, &package) {
            debug!(%package, "vendored package registered");
        }
    }

    /// Move an `internal` directory aside to the name derived from the
    /// package being pinned.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the target already exists or the rename fails.
    fn rename_internal(&self, dir: &Path) -> Result<PathBuf, Error> {
        let name = internal_dir_name(&self.package.author, &self.package.repo, &self.package.sha);
        let target = dir.with_file_name(name);
        if target.exists() {
            return Err(Error::Io(std::io::Error::new(
                ErrorKind::AlreadyExists,
                format!("cannot rename {} to {}: target exists", dir.display(), target.display()),
            )));
        }
        fs::rename(dir, &target)?;
        info!(from = %dir.display(), to = %target.display(), "renamed internal directory");
        return Ok(target);
    }

    /// Walk `root` and everything beneath it. Returns once all work is done.
    pub fn run(&self, root: &Path, sink: &TraversalSink) {
        let level = Level {
            counting: true,
            scope: ScopeId::ROOT,
            vendor_root: None,
        };
        rayon::scope(|scope| return self.visit_dir(scope, root, &level, sink));
    }

    /// Schedule everything in `dir`.
    fn visit_dir<'s>(&'s self, scope: &rayon::Scope<'s>, dir: &Path, level: &Level, sink: &'s TraversalSink) {
        debug!(dir = %dir.display(), "entering directory");
        let listing = match list_dir(dir) {
            Ok(listing) => listing,
            Err(e) => {
                warn!(dir = %dir.display(), "could not read directory: {e}");
                sink.fail(e);
                return;
            },
        };
        if !listing.files.is_empty() {
            self.register_provided(dir, level);
        }

        let mut level = level.clone();
        if let Some(vendor) = &listing.vendor {
            let Some(child) = self.enter_vendor(vendor, &level, sink) else {
                return;
            };
            level.scope = child;
        }

        for subdir in listing.dirs {
            let is_internal = subdir
                .file_name()
                .is_some_and(|name| return name == self.settings.internal_dir.as_str());
            let subdir = if is_internal && level.vendor_root.is_none() {
                match self.rename_internal(&subdir) {
                    Ok(renamed) => renamed,
                    Err(e) => {
                        warn!(dir = %subdir.display(), "aborting subtree: {e}");
                        sink.fail(e);
                        continue;
                    },
                }
            } else {
                subdir
            };
            let level = level.clone();
            scope.spawn(move |scope| return self.visit_dir(scope, &subdir, &level, sink));
        }

        for file in listing.files {
            let level = level.clone();
            scope.spawn(move |_| return self.visit_file(&file, &level, sink));
        }
    }

    /// Scan one Go file and emit its barrier and imports.
    fn visit_file(&self, file: &Path, level: &Level, sink: &TraversalSink) {
        let scanned = fs::read(file)
            .map_err(Error::from)
            .and_then(|source| return scan_go_source(file, &source, &self.settings.upstream_host));
        let scanned = match scanned {
            Ok(scanned) => scanned,
            Err(e) => {
                warn!(file = %file.display(), "could not scan file: {e}");
                sink.fail(e);
                return;
            },
        };

        let imports: Vec<ImportSpec> = scanned
            .imports
            .into_iter()
            .filter(|spec| return !self.scopes.contains(level.scope, &spec.import_path))
            .collect();
        if level.counting {
            self.counts.insert(file.to_path_buf(), imports.len());
        }
        debug!(file = %file.display(), imports = imports.len(), "scanned file");

        sink.barrier(Revision::package(scanned.package));
        for spec in imports {
            sink.import(spec);
        }
    }
}

impl TraversalSink {
    /// Send a package barrier.
    fn barrier(&self, revision: Revision) {
        if self.revisions.send(revision).is_err() {
            debug!("revision receiver gone; barrier dropped");
        }
    }

    /// Record a failure.
    fn fail(&self, err: Error) {
        if let Err(unsent) = self.errors.send(err) {
            debug!("error receiver gone: {}", unsent.into_inner());
        }
    }

    /// Send an import for resolution.
    fn import(&self, spec: ImportSpec) {
        if self.imports.send(spec).is_err() {
            debug!("import receiver gone; import dropped");
        }
    }
}

/// Read `dir` and bucket its entries. Hidden entries are skipped.
///
/// # Errors
///
/// Returns `Error::Io` if the directory or an entry cannot be read.
fn list_dir(dir: &Path) -> Result<Listing, Error> {
    let mut listing = Listing::default();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if name.to_string_lossy().starts_with('.') {
            continue;
        }
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            if name == VENDOR_DIR {
                listing.vendor = Some(path);
            } else {
                listing.dirs.push(path);
            }
        } else if file_type.is_file() && is_go_source(&path) {
            listing.files.push(path);
        }
    }
    listing.dirs.sort();
    listing.files.sort();
    return Ok(listing);
}

/// Import path `dir` provides inside `vendor_root`, with `/` separators.
fn provided_package(dir: &Path, vendor_root: &Path) -> Option<String> {
    let relative = dir.strip_prefix(vendor_root).ok()?;
    let parts = relative
        .components()
        .map(|part| return part.as_os_str().to_str())
        .collect::<Option<Vec<&str>>>()?;
    if parts.is_empty() {
        return None;
    }
    return Some(parts.join("/"));
}
