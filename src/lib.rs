//! Version pinning for Go packages served through a proxy.
//!
//! Three parts work together: a codec for git refs advertisements, a semver
//! selector engine that picks which advertised version to serve, and a
//! dependency rewriter that pins every upstream import of a source tree to a
//! commit.

pub mod best;
pub mod candidate;
pub mod commands;
pub mod config;
pub mod digest;
pub mod error;
pub mod grammar;
pub mod import_path;
pub mod pins;
pub mod refs;
pub mod request;
pub mod resolution;
pub mod revise;
pub mod rewriter;
pub mod scanner;
pub mod selector;
pub mod splice;
pub mod traversal;
pub mod types;
pub mod vendor;
pub mod waitlist;
