//! `ftl image list|destroy`: local image identities for every container in
//! the chart.

use std::path::PathBuf;

use anyhow::Result;

use crate::cli::ImageAction;
use crate::context::AppContext;

pub fn run(chart: Option<PathBuf>, profile: Option<String>, action: ImageAction) -> Result<()> {
    let ctx = AppContext::load(chart, profile.as_deref())?;
    let images = ctx.image_repository();

    match action {
        ImageAction::List => {
            let mut names: Vec<&String> = ctx.graph.names().collect();
            names.sort();
            for name in names {
                let container = ctx.graph.get(name).expect("name came from graph.names()");
                let id = images
                    .image_version(&container.image_name(), &container.image_tag, true)?
                    .unwrap_or_else(|| "<not built>".to_string());
                println!("{}\t{}\t{id}", container.tagged_image_name(), container.name);
            }
            Ok(())
        }
        ImageAction::Destroy { name } => {
            let container = ctx
                .graph
                .get(&name)
                .ok_or_else(|| anyhow::anyhow!("container '{name}' not found in chart"))?;
            ctx.engine.remove_image(&container.tagged_image_name())?;
            println!("removed {}", container.tagged_image_name());
            Ok(())
        }
    }
}
