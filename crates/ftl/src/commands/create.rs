//! `ftl create project`: scaffolds a new chart directory with a minimal
//! manifest and a single sample container.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::cli::CreateAction;

const SAMPLE_DOCKERFILE: &str = "FROM alpine:latest\nCMD [\"sleep\", \"infinity\"]\n";

pub fn run(action: CreateAction) -> Result<()> {
    match action {
        CreateAction::Project { name } => scaffold_project(&name),
    }
}

fn scaffold_project(name: &str) -> Result<()> {
    let root = Path::new(name);
    if root.exists() {
        bail!("{} already exists", root.display());
    }
    fs::create_dir_all(root).with_context(|| format!("creating {}", root.display()))?;

    let manifest = format!("prefix: {name}\n");
    fs::write(root.join(crate::chart::MANIFEST_FILE), manifest)?;

    let app_dir = root.join("app");
    fs::create_dir_all(&app_dir)?;
    fs::write(app_dir.join("Dockerfile"), SAMPLE_DOCKERFILE)?;

    println!("created chart '{name}' at {}", root.display());
    Ok(())
}
