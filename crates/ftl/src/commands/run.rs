use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use ftl_core::introspect::FormationIntrospector;
use ftl_core::runner::{resolve_boot, FormationRunner};
use ftl_core::task_tree::{StatusFlavor, Task};

use crate::context::AppContext;
use crate::desired;

/// Expands `names` with any required boot-container siblings.
fn with_boot_containers(ctx: &AppContext, names: &[String]) -> Vec<String> {
    let mut expanded: Vec<String> = names.to_vec();
    for name in names {
        let boot = resolve_boot(&ctx.graph, name);
        for (sibling, required) in boot.run {
            if required && !expanded.contains(&sibling) {
                expanded.push(sibling);
            }
        }
    }
    expanded
}

fn converge(mut ctx: AppContext, names: Vec<String>) -> Result<()> {
    let names = with_boot_containers(&ctx, &names);
    let images = ctx.image_repository();
    let introspector = FormationIntrospector::new(Arc::clone(&ctx.engine), &ctx.graph, &images, None);
    let actual = introspector.introspect()?;

    let desired = desired::build_desired_formation(&mut ctx.graph, &images, &names, None, false)?;

    let graph = Arc::new(ctx.graph);
    let runner = FormationRunner::new(Arc::clone(&ctx.engine), Arc::clone(&graph), Arc::clone(&ctx.hooks));

    let root = Task::root();
    let group_task = Task::new("Converging formation", &root);
    match runner.converge(&desired, &actual, &group_task)? {
        None => {
            group_task.finish("Done", StatusFlavor::Good);
            Ok(())
        }
        Some(handler) => {
            group_task.finish("Attaching", StatusFlavor::Neutral);
            let _pause = root.paused_output();
            handler();
            Ok(())
        }
    }
}

pub fn start(chart: Option<PathBuf>, profile: Option<String>, containers: Vec<String>) -> Result<()> {
    let ctx = AppContext::load(chart, profile.as_deref())?;
    let names = if containers.is_empty() { ctx.default_boot_containers() } else { containers };
    converge(ctx, names)
}

pub fn up(chart: Option<PathBuf>, profile: Option<String>) -> Result<()> {
    let ctx = AppContext::load(chart, profile.as_deref())?;
    let names = ctx.default_boot_containers();
    converge(ctx, names)
}

pub fn restart(chart: Option<PathBuf>, profile: Option<String>, containers: Vec<String>) -> Result<()> {
    let ctx = AppContext::load(chart, profile.as_deref())?;
    let names = if containers.is_empty() { ctx.default_boot_containers() } else { containers };
    super::stop::stop_names(&ctx, &names)?;
    converge(ctx, names)
}
