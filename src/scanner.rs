//! Go source scanning for upstream import literals and the package clause.

use std::ops::Range;
use std::path::Path;
use std::sync::LazyLock;

use regex::bytes::Regex;
use tree_sitter::{Node, Parser};

use crate::error::Error;
use crate::grammar::go_language;
use crate::import_path::ImportPath;
use crate::types::{ImportSpec, PackageSpec};

/// Maximum source file size (16 MiB).
const MAX_FILE_SIZE: u64 = 16 * 1024 * 1024;

/// `package foo // import "..."` or `package foo /* import "..." */`.
/// Group 1 spans from the whitespace after the package name to the end of the line.
#[allow(clippy::expect_used, reason = "pattern is a compile-time literal")]
static PACKAGE_IMPORT_COMMENT: LazyLock<Regex> = LazyLock::new(|| {
    let annotation = r#"import\s+(?:"[^"]*"|`[^`]*`)"#;
    let comment = format!(r"(?://\s*{annotation}\s*$|/\*\s*{annotation}\s*\*/)");
    return Regex::new(&format!(r"(?:package\s+\w+)(\s+{comment}(?:.*))")).expect("valid regex");
});

/// Everything the rewriter needs from one Go file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoFileScan {
    /// Upstream imports, in source order.
    pub imports: Vec<ImportSpec>,
    /// The package clause anchor.
    pub package: PackageSpec,
}

/// Byte range of a package import comment on the package clause's line,
/// or `None` if the line carries none.
pub fn find_package_import_comment(source: &[u8], package_offset: usize) -> Option<Range<usize>> {
    let line_start = source
        .get(..package_offset)?
        .iter()
        .rposition(|byte| return *byte == b'\n')
        .map_or(0, |at| return at.saturating_add(1));
    let line_end = source
        .get(package_offset..)?
        .iter()
        .position(|byte| return *byte == b'\n')
        .map_or(source.len(), |at| return at.saturating_add(package_offset));

    let line = source.get(line_start..line_end)?;
    let comment = PACKAGE_IMPORT_COMMENT.captures(line)?.get(1)?;
    return Some(line_start.saturating_add(comment.start())..line_start.saturating_add(comment.end()));
}

/// Parse one Go file and collect imports rooted at `upstream_host` plus the
/// package clause offset.
///
/// # Errors
///
/// Returns `Error::FileTooLarge` past the size limit, or `Error::ParseFailed`
/// if tree-sitter fails or the file has no package clause.
pub fn scan_go_source(file: &Path, source: &[u8], upstream_host: &str) -> Result<GoFileScan, Error> {
    let source_len: u64 = source.len().try_into().unwrap_or(u64::MAX);
    if source_len > MAX_FILE_SIZE {
        return Err(Error::FileTooLarge {
            file: file.to_path_buf(),
            max_bytes: MAX_FILE_SIZE,
            size_bytes: source_len,
        });
    }

    let mut parser = Parser::new();
    parser.set_language(&go_language()).map_err(|e| {
        return Error::ParseFailed {
            file: file.to_path_buf(),
            reason: e.to_string(),
        };
    })?;
    let tree = parser.parse(source, None).ok_or_else(|| {
        return Error::ParseFailed {
            file: file.to_path_buf(),
            reason: "tree-sitter returned None".to_string(),
        };
    })?;

    let root = tree.root_node();
    let mut package = None;
    let mut imports = Vec::new();
    let mut cursor = root.walk();
    for node in root.children(&mut cursor) {
        match node.kind() {
            "package_clause" if package.is_none() => package = Some(node.start_byte()),
            "import_declaration" => collect_import_specs(node, source, file, upstream_host, &mut imports),
            _ => {},
        }
    }

    let Some(offset) = package else {
        return Err(Error::ParseFailed {
            file: file.to_path_buf(),
            reason: "no package clause".to_string(),
        });
    };
    return Ok(GoFileScan {
        imports,
        package: PackageSpec {
            file: file.to_path_buf(),
            offset,
        },
    });
}

/// Walk an `import_declaration` (single spec or parenthesized list).
fn collect_import_specs(node: Node<'_>, source: &[u8], file: &Path, upstream_host: &str, out: &mut Vec<ImportSpec>) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "import_spec" => out.extend(upstream_import(child, source, file, upstream_host)),
            "import_spec_list" => collect_import_specs(child, source, file, upstream_host, out),
            _ => {},
        }
    }
}

/// The spec for one `import_spec` node if its path is an upstream import.
fn upstream_import(spec: Node<'_>, source: &[u8], file: &Path, upstream_host: &str) -> Option<ImportSpec> {
    let literal = spec.child_by_field_name("path")?;
    let text = literal.utf8_text(source).ok()?;
    let import_path = unquote(text)?;
    ImportPath::parse(import_path, upstream_host)?;

    return Some(ImportSpec {
        file: file.to_path_buf(),
        import_path: import_path.to_string(),
        range: literal.start_byte()..literal.end_byte(),
    });
}

/// Strip the quotes of an interpreted or raw string literal.
fn unquote(literal: &str) -> Option<&str> {
    return literal
        .strip_prefix('"')
        .and_then(|rest| return rest.strip_suffix('"'))
        .or_else(|| return literal.strip_prefix('`')?.strip_suffix('`'));
}
