//! `ftl push`: push one or more containers' images to the configured
//! registry.

use std::path::PathBuf;

use anyhow::{Context, Result};
use ftl_core::task_tree::Task;

use crate::context::AppContext;

pub fn run(chart: Option<PathBuf>, profile: Option<String>, containers: Vec<String>) -> Result<()> {
    let ctx = AppContext::load(chart, profile.as_deref())?;
    let images = ctx.image_repository();

    let names: Vec<String> = if containers.is_empty() {
        ctx.graph.names().cloned().collect()
    } else {
        containers
    };

    let root = Task::root();
    let group_task = Task::new("Pushing images", &root);
    for name in &names {
        let container = ctx
            .graph
            .get(name)
            .with_context(|| format!("container '{name}' not found in chart"))?;
        images.push_image_version(&container.image_name(), &container.image_tag, &group_task)?;
    }
    group_task.finish("Done", ftl_core::task_tree::StatusFlavor::Good);
    Ok(())
}
