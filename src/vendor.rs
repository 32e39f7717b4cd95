//! Nested vendor scopes: which import paths a level of the tree provides itself.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::warn;

/// Handle to one scope in a `VendorScopes` arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(usize);

/// One vendor directory's worth of provided packages.
#[derive(Debug)]
struct ScopeNode {
    /// Nesting level; the root scope is 0.
    depth: usize,
    /// Once set, the package set is read-only.
    finalized: AtomicBool,
    /// Import paths provided by this vendor directory.
    packages: RwLock<HashSet<String>>,
    /// Enclosing scope.
    parent: Option<ScopeId>,
}

/// Arena of vendor scopes linked to their parents.
///
/// A scope is filled while its vendor directory is traversed, then finalized.
/// Lookups walk from a scope up through every enclosing scope.
#[derive(Debug)]
pub struct VendorScopes {
    /// Scope nodes indexed by `ScopeId`.
    nodes: RwLock<Vec<Arc<ScopeNode>>>,
}

impl ScopeId {
    /// The outermost scope, which never provides anything itself.
    pub const ROOT: Self = Self(0);
}

impl VendorScopes {
    /// Register `package` as provided by `scope`.
    /// Returns `false`, leaving the scope unchanged, once the scope is finalized.
    pub fn add(&self, scope: ScopeId, package: &str) -> bool {
        let Some(node) = self.node(scope) else {
            return false;
        };
        if node.finalized.load(Ordering::Acquire) {
            warn!(package, depth = node.depth, "vendor scope already finalized");
            return false;
        }
        node.packages
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(package.to_string());
        return true;
    }

    /// Open a scope nested inside `parent`.
    pub fn child(&self, parent: ScopeId) -> ScopeId {
        let depth = self.depth(parent).saturating_add(1);
        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        nodes.push(Arc::new(ScopeNode {
            depth,
            finalized: AtomicBool::new(false),
            packages: RwLock::new(HashSet::new()),
            parent: Some(parent),
        }));
        return ScopeId(nodes.len().saturating_sub(1));
    }

    /// Whether `import_path`, or a package it lives under, is provided by
    /// `scope` or any scope enclosing it.
    pub fn contains(&self, scope: ScopeId, import_path: &str) -> bool {
        let mut current = Some(scope);
        while let Some(id) = current {
            let Some(node) = self.node(id) else {
                return false;
            };
            let packages = node.packages.read().unwrap_or_else(PoisonError::into_inner);
            if package_prefixes(import_path).any(|prefix| return packages.contains(prefix)) {
                return true;
            }
            current = node.parent;
        }
        return false;
    }

    /// Nesting level of `scope`.
    pub fn depth(&self, scope: ScopeId) -> usize {
        return self.node(scope).map_or(0, |node| return node.depth);
    }

    /// Make `scope` read-only.
    pub fn finalize(&self, scope: ScopeId) {
        if let Some(node) = self.node(scope) {
            node.finalized.store(true, Ordering::Release);
        }
    }

    /// An arena holding only the root scope.
    pub fn new() -> Self {
        let root = Arc::new(ScopeNode {
            depth: 0,
            finalized: AtomicBool::new(false),
            packages: RwLock::new(HashSet::new()),
            parent: None,
        });
        return Self {
            nodes: RwLock::new(vec![root]),
        };
    }

    /// Shared handle to a node.
    fn node(&self, scope: ScopeId) -> Option<Arc<ScopeNode>> {
        return self
            .nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(scope.0)
            .cloned();
    }
}

impl Default for VendorScopes {
    fn default() -> Self {
        return Self::new();
    }
}

/// `a/b/c`, `a/b`, `a`: the path and each parent path on a `/` boundary.
fn package_prefixes(import_path: &str) -> impl Iterator<Item = &str> {
    let parents = import_path
        .match_indices('/')
        .filter_map(|(at, _)| return import_path.get(..at));
    return std::iter::once(import_path).chain(parents);
}
