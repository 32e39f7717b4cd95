//! Offline commit history, used to resolve dependencies without asking upstream.
//!
//! A pins file lists, per repository, the commits a lookup may land on and
//! the default-branch head to fall back to:
//!
//! ```toml
//! [[pins]]
//! author = "a"
//! repo = "lib"
//! default_sha = "libhead"
//!
//! [[pins.commits]]
//! sha = "lib2016"
//! date = "2016-05-01T00:00:00Z"
//! ```

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::{Error, ResolveError};
use crate::resolution::CommitResolver;

/// Commits of one repository, oldest first, plus the fallback head.
#[derive(Debug)]
struct History {
    /// Commits sorted by date.
    commits: Vec<PinnedCommit>,
    /// Default-branch head, used when no commit is old enough.
    default_sha: String,
}

/// Histories keyed by `author/repo`, as loaded from a pins file.
#[derive(Debug, Default)]
pub struct PinFile {
    /// One history per repository.
    histories: HashMap<String, History>,
}

/// One `[[pins]]` table.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PinTable {
    /// Repository owner.
    author: String,
    /// Known commits, in any order.
    #[serde(default)]
    commits: Vec<PinnedCommit>,
    /// Default-branch head.
    default_sha: String,
    /// Repository name.
    repo: String,
}

/// One `[[pins.commits]]` row.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PinnedCommit {
    /// Commit time.
    date: DateTime<Utc>,
    /// Commit sha.
    sha: String,
}

/// Top level of the file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PinsDocument {
    /// Every `[[pins]]` table, in file order.
    #[serde(default)]
    pins: Vec<PinTable>,
}

impl History {
    /// Sha of the newest commit dated at or before `before`, else the default head.
    fn sha_at(&self, before: DateTime<Utc>) -> &str {
        let not_after = self.commits.partition_point(|commit| return commit.date <= before);
        return not_after
            .checked_sub(1)
            .and_then(|newest| return self.commits.get(newest))
            .map_or(self.default_sha.as_str(), |commit| return commit.sha.as_str());
    }
}

impl PinFile {
    /// Index the histories in a pins document.
    ///
    /// # Errors
    ///
    /// Returns `Error::TomlDe` for malformed TOML or unknown keys, or
    /// `Error::PinsCorrupt` when a repository is listed twice.
    pub fn from_toml(content: &str) -> Result<Self, Error> {
        let document: PinsDocument = toml::from_str(content)?;
        let mut histories = HashMap::with_capacity(document.pins.len());
        for table in document.pins {
            let key = format!("{}/{}", table.author, table.repo);
            let mut commits = table.commits;
            commits.sort_by_key(|commit| return commit.date);
            let history = History {
                commits,
                default_sha: table.default_sha,
            };
            if histories.insert(key.clone(), history).is_some() {
                return Err(Error::PinsCorrupt {
                    reason: format!("{key} is listed more than once"),
                });
            }
        }
        return Ok(Self { histories });
    }

    /// Load the pins file at `path`.
    ///
    /// # Errors
    ///
    /// Returns `Error::PinsNotFound` if there is no file, `Error::Io` if it
    /// cannot be read, or any `from_toml` error.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                return Error::PinsNotFound { path: path.to_path_buf() };
            }
            return Error::Io(e);
        })?;
        return Self::from_toml(&content);
    }
}

impl CommitResolver for PinFile {
    fn nearest_commit(&self, author: &str, repo: &str, before: DateTime<Utc>) -> Result<String, ResolveError> {
        let key = format!("{author}/{repo}");
        let Some(history) = self.histories.get(&key) else {
            return Err(ResolveError::NotFound { key });
        };
        let sha = history.sha_at(before);
        if sha.is_empty() {
            return Err(ResolveError::Empty { key });
        }
        return Ok(sha.to_string());
    }
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc, reason = "tests")]
mod tests {
    use super::*;

    const PINS: &str = r#"
[[pins]]
author = "b"
repo = "util"
default_sha = "bhead"

[[pins.commits]]
sha = "future"
date = "2018-01-01T00:00:00Z"

[[pins.commits]]
sha = "old"
date = "2016-01-01T00:00:00Z"

[[pins.commits]]
sha = "newer"
date = "2016-06-01T00:00:00Z"

[[pins]]
author = "a"
repo = "lib"
default_sha = "head"

[[pins]]
author = "c"
repo = "blank"
default_sha = ""
"#;

    fn date(text: &str) -> DateTime<Utc> {
        return DateTime::parse_from_rfc3339(text).unwrap().with_timezone(&Utc);
    }

    #[test]
    fn picks_latest_commit_not_after_the_date() {
        let pins = PinFile::from_toml(PINS).unwrap();
        assert_eq!(pins.nearest_commit("b", "util", date("2017-01-01T00:00:00Z")), Ok("newer".to_string()));
        assert_eq!(pins.nearest_commit("b", "util", date("2016-01-01T00:00:00Z")), Ok("old".to_string()));
        assert_eq!(pins.nearest_commit("b", "util", date("2019-01-01T00:00:00Z")), Ok("future".to_string()));
    }

    #[test]
    fn falls_back_to_default_branch() {
        let pins = PinFile::from_toml(PINS).unwrap();
        assert_eq!(pins.nearest_commit("b", "util", date("2015-01-01T00:00:00Z")), Ok("bhead".to_string()));
        assert_eq!(pins.nearest_commit("a", "lib", date("2015-01-01T00:00:00Z")), Ok("head".to_string()));
    }

    #[test]
    fn unknown_and_blank_repositories_fail() {
        let pins = PinFile::from_toml(PINS).unwrap();
        let at = date("2017-01-01T00:00:00Z");
        assert_eq!(
            pins.nearest_commit("c", "gone", at),
            Err(ResolveError::NotFound { key: "c/gone".to_string() })
        );
        assert_eq!(
            pins.nearest_commit("c", "blank", at),
            Err(ResolveError::Empty { key: "c/blank".to_string() })
        );
    }

    #[test]
    fn repeated_repositories_are_rejected() {
        let twice = "[[pins]]\nauthor = \"a\"\nrepo = \"r\"\ndefault_sha = \"1\"\n\n[[pins]]\nauthor = \"a\"\nrepo = \"r\"\ndefault_sha = \"2\"\n";
        let err = PinFile::from_toml(twice).unwrap_err();
        assert!(matches!(err, Error::PinsCorrupt { ref reason } if reason.contains("a/r")), "{err}");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let typo = "[[pins]]\nauthor = \"a\"\nrepo = \"r\"\ndefault = \"1\"\n";
        assert!(matches!(PinFile::from_toml(typo), Err(Error::TomlDe(_))));
    }

    #[test]
    fn load_reads_from_disk_and_reports_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gophr.pins.toml");
        std::fs::write(&path, PINS).unwrap();
        let pins = PinFile::load(&path).unwrap();
        assert_eq!(pins.nearest_commit("a", "lib", date("2017-01-01T00:00:00Z")), Ok("head".to_string()));

        let err = PinFile::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, Error::PinsNotFound { .. }));
    }
}
