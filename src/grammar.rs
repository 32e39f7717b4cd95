//! Tree-sitter grammar handles for the Go sources the rewriter scans.
use std::path::Path;

use tree_sitter::Language;

/// File extension of Go sources.
const GO_EXTENSION: &str = "go";

/// The tree-sitter Go language.
pub fn go_language() -> Language {
    return tree_sitter_go::LANGUAGE.into();
}

/// Whether `path` names a Go source file.
pub fn is_go_source(path: &Path) -> bool {
    return path.extension().is_some_and(|ext| return ext == GO_EXTENSION);
}
