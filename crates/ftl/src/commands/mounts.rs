//! `ftl mounts|mount|unmount`: dev-mode bind-mount groups, toggled by
//! persisting the enabled set into the user's profile override.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use ftl_core::config;
use ftl_core::profile::Profile;

use crate::context::AppContext;

pub fn list(chart: Option<PathBuf>, profile: Option<String>, container: String) -> Result<()> {
    let ctx = AppContext::load(chart, profile.as_deref())?;
    let target = ctx
        .graph
        .get(&container)
        .with_context(|| format!("container '{container}' not found in chart"))?;
    let enabled = ctx.graph.options(&container).map(|o| o.devmodes.clone()).unwrap_or_default();

    if target.devmodes.is_empty() {
        println!("'{container}' declares no dev-mode groups");
        return Ok(());
    }
    for name in target.devmodes.keys() {
        let marker = if enabled.contains(name) { "*" } else { " " };
        println!("{marker} {name}");
    }
    Ok(())
}

fn toggle(chart: Option<PathBuf>, profile: Option<String>, container: String, devmode: String, enable: bool) -> Result<()> {
    let ctx = AppContext::load(chart, profile.as_deref())?;
    let target = ctx
        .graph
        .get(&container)
        .with_context(|| format!("container '{container}' not found in chart"))?;
    if !target.devmodes.contains_key(&devmode) {
        bail!("'{container}' declares no dev-mode group named '{devmode}'");
    }

    let path = config::user_profile_path(&ctx.graph.prefix)?;
    let mut user_profile = if path.is_file() { Profile::load(&path)? } else { Profile::default() };

    let entry = user_profile.containers.entry(container.clone()).or_default();
    if enable {
        entry.devmodes.insert(devmode.clone());
    } else {
        entry.devmodes.remove(&devmode);
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    user_profile.save(&path)?;

    let verb = if enable { "enabled" } else { "disabled" };
    println!("{verb} dev-mode '{devmode}' on '{container}'");
    Ok(())
}

pub fn mount(chart: Option<PathBuf>, profile: Option<String>, container: String, devmode: String) -> Result<()> {
    toggle(chart, profile, container, devmode, true)
}

pub fn unmount(chart: Option<PathBuf>, profile: Option<String>, container: String, devmode: String) -> Result<()> {
    toggle(chart, profile, container, devmode, false)
}
