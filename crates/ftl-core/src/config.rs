//! Persisted configuration outside any single chart: the user's chart
//! registry, per-chart user-profile overrides, and the credential files a
//! registry plugin reads/writes.
//!
//! Grounded on `cli/__init__.py::load_charts` and the `{user_home}/.ftl/`
//! layout. Every path here is rooted at `FTL_HOME` (default
//! `{home}/.ftl`), resolved with `directories-next`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{FtlError, Result};

/// Root of the persisted `.ftl` directory. Honors `FTL_HOME` for tests and
/// non-standard layouts; otherwise `{home}/.ftl`.
pub fn ftl_home() -> Result<PathBuf> {
    if let Ok(override_path) = std::env::var("FTL_HOME") {
        return Ok(PathBuf::from(override_path));
    }
    directories_next::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".ftl"))
        .ok_or_else(|| FtlError::config("FTL_HOME", "cannot determine user home directory"))
}

pub fn charts_registry_path() -> Result<PathBuf> {
    Ok(ftl_home()?.join("charts.yaml"))
}

pub fn chart_dir(prefix: &str) -> Result<PathBuf> {
    Ok(ftl_home()?.join(prefix))
}

pub fn user_profile_path(prefix: &str) -> Result<PathBuf> {
    Ok(chart_dir(prefix)?.join("user_profile.yaml"))
}

pub fn build_log_path(prefix: &str) -> Result<PathBuf> {
    Ok(chart_dir(prefix)?.join("build.log"))
}

pub fn docker_creds_path(prefix: &str) -> Result<PathBuf> {
    Ok(chart_dir(prefix)?.join("docker-creds"))
}

pub fn aws_token_path(prefix: &str) -> Result<PathBuf> {
    Ok(chart_dir(prefix)?.join("aws-token"))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChartEntry {
    pub path: PathBuf,
}

/// `{user_home}/.ftl/charts.yaml`: the set of chart directories `ftl chart
/// add`/`ftl chart list` knows about.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChartRegistry {
    #[serde(default)]
    pub charts: Vec<ChartEntry>,
}

impl ChartRegistry {
    pub fn load() -> Result<Self> {
        let path = charts_registry_path()?;
        if !path.is_file() {
            return Ok(ChartRegistry::default());
        }
        let text = fs::read_to_string(&path).map_err(|e| FtlError::config(path.display().to_string(), e.to_string()))?;
        serde_yaml::from_str(&text).map_err(|e| FtlError::config(path.display().to_string(), e.to_string()))
    }

    pub fn save(&self) -> Result<()> {
        let path = charts_registry_path()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let text = serde_yaml::to_string(self).map_err(|e| FtlError::config(path.display().to_string(), e.to_string()))?;
        fs::write(&path, text).map_err(FtlError::from)
    }

    /// Adds `path` if it isn't already registered (by canonical comparison).
    pub fn add(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if !self.charts.iter().any(|c| c.path == path) {
            self.charts.push(ChartEntry { path });
        }
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.charts.iter().map(|c| c.path.as_path())
    }
}

/// `{user_home}/.ftl/{prefix}/docker-creds`: a single colon-separated line
/// `user:password:url`, written by `registry login` and read by the plain
/// registry handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockerCreds {
    pub username: String,
    pub password: String,
    pub url: String,
}

impl DockerCreds {
    pub fn load(prefix: &str) -> Result<Option<Self>> {
        let path = docker_creds_path(prefix)?;
        if !path.is_file() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path).map_err(|e| FtlError::config(path.display().to_string(), e.to_string()))?;
        Self::parse(text.trim()).map(Some)
    }

    fn parse(line: &str) -> Result<Self> {
        let mut parts = line.splitn(3, ':');
        let (Some(username), Some(password), Some(url)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(FtlError::config("docker-creds", "expected user:password:url"));
        };
        Ok(DockerCreds {
            username: username.to_string(),
            password: password.to_string(),
            url: url.to_string(),
        })
    }

    pub fn save(&self, prefix: &str) -> Result<()> {
        let path = docker_creds_path(prefix)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, format!("{}:{}:{}\n", self.username, self.password, self.url)).map_err(FtlError::from)
    }
}

/// `{user_home}/.ftl/{prefix}/aws-token`: `access:secret`, consumed by the
/// (out-of-core) AWS ECR registry handler plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsToken {
    pub access_key: String,
    pub secret_key: String,
}

impl AwsToken {
    pub fn load(prefix: &str) -> Result<Option<Self>> {
        let path = aws_token_path(prefix)?;
        if !path.is_file() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path).map_err(|e| FtlError::config(path.display().to_string(), e.to_string()))?;
        let trimmed = text.trim();
        let Some((access, secret)) = trimmed.split_once(':') else {
            return Err(FtlError::config("aws-token", "expected access:secret"));
        };
        Ok(Some(AwsToken { access_key: access.to_string(), secret_key: secret.to_string() }))
    }
}

/// Extra plugin configuration carried verbatim from the chart manifest
/// (`plugin_configuration`); core only transports it, plugins interpret it.
pub type PluginConfiguration = BTreeMap<String, serde_yaml::Value>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn docker_creds_parses_colon_separated_line() {
        let creds = DockerCreds::parse("alice:hunter2:https://registry.example.com").unwrap();
        assert_eq!(creds.username, "alice");
        assert_eq!(creds.password, "hunter2");
        assert_eq!(creds.url, "https://registry.example.com");
    }

    #[test]
    fn docker_creds_rejects_malformed_line() {
        assert!(DockerCreds::parse("alice-only").is_err());
    }

    #[test]
    fn chart_registry_add_is_idempotent() {
        let mut registry = ChartRegistry::default();
        registry.add("/charts/acme");
        registry.add("/charts/acme");
        assert_eq!(registry.charts.len(), 1);
    }
}
