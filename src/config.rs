use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::extract::{ExtractProfile, MAX_CHUNK_SIZE};

pub const DEFAULT_CONFIG_FILE: &str = ".pr-etl.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{0} is required")]
    Missing(&'static str),

    #[error("Invalid setting {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Top-level configuration loaded from `.pr-etl.toml`, then overridden by
/// environment variables.
///
/// Everything is optional here; [`Config::validate`] enforces what a run
/// actually needs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub github: GitHubConfig,

    #[serde(default)]
    pub bigquery: BigQueryConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitHubConfig {
    /// API token. Without one the quota is much lower and private
    /// repositories are invisible.
    pub token: Option<String>,
    /// Repositories to crawl, as `owner/repo`.
    #[serde(default)]
    pub repos: Vec<String>,
    /// Alternative API root, e.g. a local mock server.
    pub api_url: Option<String>,
    /// Pull requests per page (and per chunk), 1..=100.
    pub chunk_size: Option<u32>,
    /// Fetch per-commit file stats (one extra request per commit).
    pub commit_files: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BigQueryConfig {
    pub project: Option<String>,
    pub dataset: Option<String>,
    /// Emulator endpoint used instead of the public API.
    pub emulator_host: Option<String>,
    /// OAuth access token sent with insert requests.
    pub access_token: Option<String>,
}

/// A validated configuration: every setting a run needs is present.
#[derive(Debug, Clone)]
pub struct Settings {
    pub github_token: Option<String>,
    pub github_api_url: Option<String>,
    pub repos: Vec<String>,
    pub profile: ExtractProfile,
    pub bigquery_project: String,
    pub bigquery_dataset: String,
    pub bigquery_endpoint: Option<String>,
    pub bigquery_access_token: Option<String>,
}

impl Config {
    /// Load configuration from `path`, or from `.pr-etl.toml` in the current
    /// directory when it exists, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);
        let mut config = match path {
            Some(path) => Self::load_from(path)?,
            None if default_path.exists() => Self::load_from(default_path)?,
            None => Config::default(),
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Load from a specific path without looking at the environment.
    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Override file values with any set (non-empty) environment variable.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(token) = var("GITHUB_TOKEN") {
            self.github.token = Some(token);
        }
        if let Some(repos) = var("GITHUB_REPOS") {
            self.github.repos = split_repos(&repos);
        }
        if let Some(url) = var("GITHUB_API_URL") {
            self.github.api_url = Some(url);
        }
        if let Some(project) = var("BIGQUERY_PROJECT") {
            self.bigquery.project = Some(project);
        }
        if let Some(dataset) = var("BIGQUERY_DATASET") {
            self.bigquery.dataset = Some(dataset);
        }
        if let Some(host) = var("BIGQUERY_EMULATOR_HOST") {
            self.bigquery.emulator_host = Some(host);
        }
        if let Some(token) = var("BIGQUERY_ACCESS_TOKEN") {
            self.bigquery.access_token = Some(token);
        }
    }

    /// Check required settings and resolve defaults.
    pub fn validate(self) -> Result<Settings, ConfigError> {
        let repos: Vec<String> = self
            .github
            .repos
            .iter()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect();
        if repos.is_empty() {
            return Err(ConfigError::Missing("GITHUB_REPOS"));
        }
        if let Some(bad) = repos.iter().find(|r| !is_owner_repo(r)) {
            return Err(ConfigError::Invalid {
                name: "GITHUB_REPOS",
                reason: format!("{bad:?} is not in owner/repo form"),
            });
        }

        let project = self
            .bigquery
            .project
            .ok_or(ConfigError::Missing("BIGQUERY_PROJECT"))?;
        let dataset = self
            .bigquery
            .dataset
            .ok_or(ConfigError::Missing("BIGQUERY_DATASET"))?;

        let mut profile = ExtractProfile::default();
        if let Some(size) = self.github.chunk_size {
            if size == 0 || size > MAX_CHUNK_SIZE {
                return Err(ConfigError::Invalid {
                    name: "chunk_size",
                    reason: format!("{size} is outside 1..={MAX_CHUNK_SIZE}"),
                });
            }
            profile.chunk_size = size;
        }
        if let Some(commit_files) = self.github.commit_files {
            profile.commit_files = commit_files;
        }

        Ok(Settings {
            github_token: self.github.token,
            github_api_url: self.github.api_url,
            repos,
            profile,
            bigquery_project: project,
            bigquery_dataset: dataset,
            bigquery_endpoint: self.bigquery.emulator_host,
            bigquery_access_token: self.bigquery.access_token,
        })
    }
}

fn split_repos(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_owner_repo(repo: &str) -> bool {
    matches!(repo.split_once('/'), Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/'))
}
