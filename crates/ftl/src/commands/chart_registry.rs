//! `ftl chart add|list`: the persisted `~/.ftl/charts.yaml` registry of known
//! chart directories, independent of the current working directory.

use anyhow::{Context, Result};
use ftl_core::config::ChartRegistry;

use crate::cli::ChartAction;

pub fn run(action: ChartAction) -> Result<()> {
    match action {
        ChartAction::Add { path } => {
            let canonical = path.canonicalize().with_context(|| format!("resolving {}", path.display()))?;
            if !canonical.join(crate::chart::MANIFEST_FILE).is_file() {
                anyhow::bail!("{} does not contain a {} manifest", canonical.display(), crate::chart::MANIFEST_FILE);
            }
            let mut registry = ChartRegistry::load()?;
            registry.add(canonical.clone());
            registry.save()?;
            println!("added {}", canonical.display());
            Ok(())
        }
        ChartAction::List => {
            let registry = ChartRegistry::load()?;
            let mut any = false;
            for path in registry.paths() {
                println!("{}", path.display());
                any = true;
            }
            if !any {
                println!("no charts registered");
            }
            Ok(())
        }
    }
}
