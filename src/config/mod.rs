mod env;
mod types;


pub use types::*;

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, bail};

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Reject settings the indexer cannot run with.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid setting.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.index.concurrency == 0 {
            bail!("index.concurrency must be at least 1");
        }
        if self.index.max_attempts == 0 {
            bail!("index.max_attempts must be at least 1");
        }
        if self.search.prefetch_limit == 0 || self.search.result_limit == 0 {
            bail!("search limits must be at least 1");
        }
        if self.qdrant.collection.trim().is_empty() {
            bail!("qdrant.collection must not be empty");
        }
        let mut seen = HashSet::new();
        for repo in &self.repos {
            if repo.name.trim().is_empty() {
                bail!("repository name must not be empty");
            }
            if !seen.insert(repo.name.as_str()) {
                bail!("duplicate repository name: {}", repo.name);
            }
        }
        Ok(())
    }

    /// Repositories selected by `--repo`, or all of them.
    ///
    /// # Errors
    ///
    /// Returns an error if `name` matches no configured repository.
    pub fn select_repos(&self, name: Option<&str>) -> anyhow::Result<Vec<&RepoEntry>> {
        match name {
            Some(name) => match self.repos.iter().find(|r| r.name == name) {
                Some(repo) => Ok(vec![repo]),
                None => bail!("no repository named {name} in configuration"),
            },
            None => Ok(self.repos.iter().collect()),
        }
    }
}
