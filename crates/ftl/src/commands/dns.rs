//! `ftl hosts` / `ftl dns configure`: the `/etc/hosts` entries a chart's
//! domain names need for local container-name resolution.
//!
//! Grounded on the `domainname` chart-manifest key: one
//! `127.0.0.1 <container>.<suffix>` line per declared suffix per container.
//! Actually rewriting `/etc/hosts` needs root and touches shared host state,
//! so `dns configure` only prints the block a user (or their own tooling)
//! should append, same as `hosts` — it never edits the file itself.

use std::path::PathBuf;

use anyhow::Result;

use crate::cli::DnsAction;
use crate::context::AppContext;

fn render_entries(ctx: &AppContext) -> Vec<String> {
    let mut names: Vec<&String> = ctx.graph.names().collect();
    names.sort();
    let mut lines = Vec::new();
    for suffix in &ctx.graph.domainname {
        for name in &names {
            lines.push(format!("127.0.0.1\t{name}.{suffix}"));
        }
    }
    lines
}

pub fn hosts(chart: Option<PathBuf>, profile: Option<String>) -> Result<()> {
    let ctx = AppContext::load(chart, profile.as_deref())?;
    let entries = render_entries(&ctx);
    if entries.is_empty() {
        println!("chart declares no domainname suffixes");
        return Ok(());
    }
    for line in entries {
        println!("{line}");
    }
    Ok(())
}

pub fn run(chart: Option<PathBuf>, profile: Option<String>, action: DnsAction) -> Result<()> {
    match action {
        DnsAction::Configure => {
            let ctx = AppContext::load(chart, profile.as_deref())?;
            let entries = render_entries(&ctx);
            if entries.is_empty() {
                println!("chart declares no domainname suffixes");
                return Ok(());
            }
            println!("append the following to /etc/hosts:");
            for line in entries {
                println!("{line}");
            }
            Ok(())
        }
    }
}
