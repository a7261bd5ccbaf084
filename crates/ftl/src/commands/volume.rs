//! `ftl volume list|destroy|copy-to-docker`: named-volume operations.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::cli::VolumeAction;
use crate::context::AppContext;

pub fn run(chart: Option<PathBuf>, profile: Option<String>, action: VolumeAction) -> Result<()> {
    let ctx = AppContext::load(chart, profile.as_deref())?;

    match action {
        VolumeAction::List => {
            let names = ctx.graph.devmode_names();
            if names.is_empty() {
                println!("no named volumes declared in this chart");
            }
            for name in &names {
                let labels = ctx.engine.inspect_volume(name)?;
                match labels {
                    Some(labels) => println!("{name}\t{:?}", labels),
                    None => println!("{name}\t<not created>"),
                }
            }
            Ok(())
        }
        VolumeAction::Destroy { name } => {
            let consumers = ctx.engine.containers_using_volume(&name)?;
            for consumer in &consumers {
                ctx.engine.stop(&consumer.id, false)?;
                ctx.engine.remove_container(&consumer.id)?;
            }
            ctx.engine.remove_volume(&name)?;
            println!("removed volume {name}");
            Ok(())
        }
        VolumeAction::CopyToDocker { name, path } => {
            let canonical = path
                .canonicalize()
                .with_context(|| format!("resolving host path {}", path.display()))?;
            ctx.engine.copy_path_to_volume(&canonical.display().to_string(), &name)?;
            println!("copied {} into volume {name}", canonical.display());
            Ok(())
        }
    }
}
