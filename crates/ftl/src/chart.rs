//! Chart resolution: finding the chart root a command should operate on and
//! assembling its profile stack.
//!
//! Grounded on `cli/__init__.py::load_charts` + the chart discovery the
//! teacher's `commands::shared::workspace` module does for devcontainer
//! folders: walk up from the current directory looking for the manifest
//! file, falling back to an explicit `--chart` path.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use ftl_core::config;
use ftl_core::profile::{Profile, ProfileStack};

pub const MANIFEST_FILE: &str = "ftl.yaml";

/// Finds the chart root: an explicit `--chart` path if given, otherwise the
/// nearest ancestor of the current directory that contains `ftl.yaml`.
pub fn resolve_chart_path(explicit: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if !path.join(MANIFEST_FILE).is_file() {
            bail!("{} does not contain a {MANIFEST_FILE} manifest", path.display());
        }
        return Ok(path);
    }

    let mut dir = std::env::current_dir().context("reading current directory")?;
    loop {
        if dir.join(MANIFEST_FILE).is_file() {
            return Ok(dir);
        }
        if !dir.pop() {
            bail!("no {MANIFEST_FILE} manifest found in the current directory or any parent");
        }
    }
}

#[derive(Debug, Default, serde::Deserialize)]
struct InheritancePeek {
    inherits: Option<String>,
}

/// Loads the profile stack for a chart: the named-profile inheritance chain
/// rooted at `{chart_path}/profiles/{profile_name}.yaml` (each file's
/// `inherits` key points at its parent), with the user's
/// persisted override (`~/.ftl/{prefix}/user_profile.yaml`, if present)
/// applied innermost.
pub fn load_profile_stack(chart_path: &Path, prefix: &str, profile_name: Option<&str>) -> Result<ProfileStack> {
    let mut ancestors = Vec::new();
    if let Some(start) = profile_name {
        let profiles_dir = chart_path.join("profiles");
        let mut current = Some(start.to_string());
        let mut visited = HashSet::new();
        while let Some(name) = current.take() {
            if !visited.insert(name.clone()) {
                bail!("profile inheritance cycle detected at '{name}'");
            }
            let path = profiles_dir.join(format!("{name}.yaml"));
            let text = fs::read_to_string(&path)
                .with_context(|| format!("reading profile {}", path.display()))?;
            let peek: InheritancePeek = serde_yaml::from_str(&text).unwrap_or_default();
            let profile = Profile::load(&path).with_context(|| format!("loading profile '{name}'"))?;
            ancestors.push(profile);
            current = peek.inherits;
        }
    }

    let user_override = {
        let path = config::user_profile_path(prefix)?;
        if path.is_file() {
            Some(Profile::load(&path).with_context(|| format!("loading user profile {}", path.display()))?)
        } else {
            None
        }
    };

    Ok(ProfileStack::build(ancestors, user_override))
}
