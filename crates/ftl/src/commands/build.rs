use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use ftl_core::builder::Builder;
use ftl_core::graph::ContainerGraph;
use ftl_core::plugins::{Hook, HookPayload};
use ftl_core::task_tree::Task;

use crate::context::AppContext;

/// Ancestor-first build order for `requested` (or every container in the
/// chart when `requested` is empty), each container built at most once.
fn build_order(graph: &ContainerGraph, requested: &[String]) -> Vec<String> {
    let names: Vec<String> = if requested.is_empty() {
        let mut all: Vec<String> = graph.names().cloned().collect();
        all.sort();
        all
    } else {
        requested.to_vec()
    };

    let mut order = Vec::new();
    let mut seen = HashSet::new();
    for name in &names {
        for ancestor in graph.build_ancestry(name) {
            if seen.insert(ancestor.clone()) {
                order.push(ancestor);
            }
        }
        if seen.insert(name.clone()) {
            order.push(name.clone());
        }
    }
    order
}

pub fn run(chart: Option<PathBuf>, profile: Option<String>, containers: Vec<String>, no_cache: bool) -> Result<()> {
    let ctx = AppContext::load(chart, profile.as_deref())?;
    let order = build_order(&ctx.graph, &containers);

    let builder = Builder::new(Arc::clone(&ctx.engine), !no_cache);
    let root = Task::root();
    let group_task = Task::new("Build", &root);

    ctx.hooks.fire(Hook::InitGroupBuild, &HookPayload::default())?;
    ctx.hooks.fire(Hook::PreGroupBuild, &HookPayload::default())?;

    for name in &order {
        let container = ctx
            .graph
            .get(name)
            .with_context(|| format!("container '{name}' not found in chart"))?;

        ctx.hooks.fire(Hook::PreBuild, &HookPayload::for_container(name.clone()))?;
        let result = builder.build(&ctx.chart_path, container, &container.build_dir, &group_task);
        ctx.hooks.fire(Hook::PostBuild, &HookPayload::for_container(name.clone()))?;
        result.with_context(|| format!("building '{name}'"))?;
    }

    ctx.hooks.fire(Hook::PostGroupBuild, &HookPayload::default())?;
    group_task.finish("Done", ftl_core::task_tree::StatusFlavor::Good);
    Ok(())
}
