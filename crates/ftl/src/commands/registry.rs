//! `ftl registry status|login`: registry credential operations.

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use ftl_core::config::DockerCreds;

use crate::cli::RegistryAction;
use crate::context::AppContext;

pub fn run(chart: Option<PathBuf>, profile: Option<String>, action: RegistryAction) -> Result<()> {
    let ctx = AppContext::load(chart, profile.as_deref())?;

    match action {
        RegistryAction::Status => {
            match &ctx.graph.registry {
                Some(url) => println!("registry: {url}"),
                None => println!("no registry configured for this chart"),
            }
            match DockerCreds::load(&ctx.graph.prefix)? {
                Some(creds) => println!("credentials stored for {} as {}", creds.url, creds.username),
                None => println!("no stored credentials"),
            }
            Ok(())
        }
        RegistryAction::Login => {
            let Some(url) = ctx.graph.registry.clone() else {
                bail!("chart has no registry configured");
            };
            print!("username: ");
            io::stdout().flush()?;
            let mut username = String::new();
            io::stdin().read_line(&mut username).context("reading username")?;
            let username = username.trim().to_string();

            let password = read_password()?;

            ctx.engine.login(&url, &username, &password)?;
            DockerCreds { username, password, url: url.clone() }.save(&ctx.graph.prefix)?;
            println!("logged in to {url}");
            Ok(())
        }
    }
}

/// Reads a password line from stdin. There's no no-echo input primitive in
/// this crate's dependency set, so this is a plain `read_line` rather than a
/// hidden prompt.
fn read_password() -> Result<String> {
    print!("password: ");
    io::stdout().flush()?;
    let mut password = String::new();
    io::stdin().read_line(&mut password).context("reading password")?;
    Ok(password.trim().to_string())
}
