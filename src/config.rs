use std::path::Path;

use serde::Deserialize;

use crate::error::Error;
use crate::refs::DEFAULT_BRANCH_REF;
use crate::types::RewriteSettings;

/// Config file name looked up in the package root.
pub const CONFIG_FILE: &str = "gophr.toml";

/// Project configuration loaded from `gophr.toml`.
/// Every key is optional; missing keys keep their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Ref name of the default branch in refs advertisements.
    pub default_branch: String,
    /// Directory name renamed before descent.
    pub internal_dir: String,
    /// Host written into pinned imports.
    pub proxy_host: String,
    /// Host whose imports are pinned.
    pub upstream_host: String,
}

impl Config {
    /// Load config from `gophr.toml` in the given root directory.
    /// Returns defaults if the file doesn't exist.
    /// Returns an error if the file exists but is malformed, never silently
    /// falling back to defaults when the user wrote a config file.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if reading fails (other than not-found),
    /// or `Error::TomlDe` if the TOML is malformed.
    pub fn load(root: &Path) -> Result<Self, Error> {
        let path = root.join(CONFIG_FILE);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(Error::Io(e)),
        };
        return Ok(toml::from_str(&content)?);
    }

    /// The settings the dependency rewriter runs with.
    pub fn rewrite_settings(&self) -> RewriteSettings {
        return RewriteSettings {
            internal_dir: self.internal_dir.clone(),
            proxy_host: self.proxy_host.clone(),
            upstream_host: self.upstream_host.clone(),
        };
    }
}

impl Default for Config {
    fn default() -> Self {
        let settings = RewriteSettings::default();
        return Self {
            default_branch: DEFAULT_BRANCH_REF.to_string(),
            internal_dir: settings.internal_dir,
            proxy_host: settings.proxy_host,
            upstream_host: settings.upstream_host,
        };
    }
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc, reason = "tests")]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.default_branch, "refs/heads/master");
        assert_eq!(config.rewrite_settings(), RewriteSettings::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "proxy_host = \"proxy.local\"\n").unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.proxy_host, "proxy.local");
        assert_eq!(config.upstream_host, "github.com");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "proxy_host = [").unwrap();
        assert!(matches!(Config::load(dir.path()), Err(Error::TomlDe(_))));

        std::fs::write(dir.path().join(CONFIG_FILE), "unknown_key = 1\n").unwrap();
        assert!(matches!(Config::load(dir.path()), Err(Error::TomlDe(_))));
    }
}
