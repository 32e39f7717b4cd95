//! CLI commands for gophr: refs, match, pin, digest.

use std::io::{Read as _, Write as _};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::{DateTime, Utc};

use crate::best::best;
use crate::candidate::SemverCandidate;
use crate::config::Config;
use crate::digest::tree_digest;
use crate::error::Error;
use crate::pins::PinFile;
use crate::refs::RefAdvertisement;
use crate::request::{VersionRequest, resolve_refs};
use crate::rewriter::version_deps;
use crate::selector::SemverSelector;
use crate::types::PackageMeta;

/// Pins file name looked up in the package root when `--pins` is absent.
pub const DEFAULT_PINS_FILE: &str = "gophr.pins.toml";

/// Inputs of the `pin` command.
#[derive(Debug, Clone)]
pub struct PinArgs {
    /// Upstream owner of the package.
    pub author: String,
    /// Commit time of `sha`, RFC 3339.
    pub date: String,
    /// Package root.
    pub dir: PathBuf,
    /// Pins file; `<dir>/gophr.pins.toml` when absent.
    pub pins: Option<PathBuf>,
    /// Upstream repository name.
    pub repo: String,
    /// Commit the package is pinned at.
    pub sha: String,
}

/// Print the tree digest of `dir`.
///
/// # Errors
///
/// Returns `Error::Io` if the tree cannot be read.
pub fn digest(dir: &Path) -> Result<(), Error> {
    println!("{}", tree_digest(dir)?);
    return Ok(());
}

/// Report which of `versions` satisfy `selector` and which one is best.
/// Exits 1 when none match.
///
/// # Errors
///
/// Returns selector construction errors, or `Error::InvalidCandidate` for a
/// version that does not parse.
pub fn match_versions(selector: &str, versions: &[String]) -> Result<ExitCode, Error> {
    let selector: SemverSelector = selector.parse()?;
    let candidates = versions
        .iter()
        .map(String::as_str)
        .map(version_candidate)
        .collect::<Result<Vec<_>, _>>()?;

    for candidate in &candidates {
        let verdict = if selector.matches(candidate) { "match" } else { "no match" };
        println!("{}: {verdict}", candidate.ref_label);
    }

    let matching: Vec<SemverCandidate> = candidates
        .into_iter()
        .filter(|candidate| return selector.matches(candidate))
        .collect();
    let Some(chosen) = best(&matching, &selector) else {
        return Ok(ExitCode::FAILURE);
    };
    println!("best: {}", chosen.ref_label);
    return Ok(ExitCode::SUCCESS);
}

/// Pin every upstream import under `args.dir` using a pins file, then print
/// a summary and the resulting tree digest.
///
/// # Errors
///
/// Returns `Error::InvalidPackage` for a bad date or blank metadata,
/// pins file errors, or `Error::Aggregate` when any part of the run failed.
pub fn pin(args: &PinArgs) -> Result<(), Error> {
    let config = Config::load(&args.dir)?;
    let commit_date = DateTime::parse_from_rfc3339(&args.date)
        .map_err(|e| {
            return Error::InvalidPackage {
                reason: format!("commit date {:?} is not RFC 3339: {e}", args.date),
            };
        })?
        .with_timezone(&Utc);
    let package = PackageMeta {
        author: args.author.clone(),
        commit_date,
        repo: args.repo.clone(),
        sha: args.sha.clone(),
    };
    let pins_path = args.pins.clone().unwrap_or_else(|| return args.dir.join(DEFAULT_PINS_FILE));
    let pins = PinFile::load(&pins_path)?;

    let summary = version_deps(&args.dir, &package, &config.rewrite_settings(), &pins)?;
    println!(
        "patched {} file(s), pinned {} import(s), missed {} import(s)",
        summary.files_patched, summary.imports_pinned, summary.imports_missed
    );
    for (key, sha) in &summary.resolutions {
        println!("resolved {key} -> {sha}");
    }
    println!("digest: {}", tree_digest(&args.dir)?);
    return Ok(());
}

/// Parse a refs advertisement from `input` (`-` for stdin).
///
/// Without `select`, lists the version candidates. With it, writes the
/// advertisement rewritten around the chosen version to stdout.
///
/// # Errors
///
/// Returns `Error::Io` on read or write failure, refs framing errors,
/// request parse errors, or `Error::NoMatchingVersion`.
pub fn refs(input: &str, select: Option<&str>, json: bool) -> Result<(), Error> {
    let config = Config::load(Path::new("."))?;
    let data = read_input(input)?;
    let advertisement = RefAdvertisement::parse_with_default_branch(data, &config.default_branch)?;

    let Some(select) = select else {
        if json {
            println!("{}", serde_json::to_string_pretty(advertisement.candidates())?);
        } else {
            for candidate in advertisement.candidates() {
                println!("{candidate} {} {}", candidate.ref_hash, candidate.ref_name);
            }
        }
        return Ok(());
    };

    let request: VersionRequest = select.parse()?;
    let resolved = resolve_refs(&advertisement, Some(&request))?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&resolved.refs)?;
    stdout.flush()?;
    return Ok(());
}

/// Bytes of a file, or of stdin for `-`.
///
/// # Errors
///
/// Returns `Error::Io` if the input cannot be read.
fn read_input(input: &str) -> Result<Vec<u8>, Error> {
    if input != "-" {
        return Ok(std::fs::read(input)?);
    }
    let mut data = Vec::new();
    std::io::stdin().lock().read_to_end(&mut data)?;
    return Ok(data);
}

/// A candidate for a bare version string such as `v1.2.3-beta.1`.
///
/// # Errors
///
/// Returns `Error::InvalidCandidate` if the text is not a version.
fn version_candidate(version: &str) -> Result<SemverCandidate, Error> {
    let name = format!("refs/tags/{version}");
    return SemverCandidate::from_ref(version, &name)?.ok_or_else(|| {
        return Error::InvalidCandidate {
            reason: format!("{version:?} is not a version"),
        };
    });
}
