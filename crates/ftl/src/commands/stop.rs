use std::collections::{BTreeSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use ftl_core::formation::InstanceSnapshot;
use ftl_core::introspect::FormationIntrospector;
use ftl_core::runner::FormationRunner;
use ftl_core::task_tree::{StatusFlavor, Task};

use crate::context::AppContext;

/// Expands `runtime_names` with every instance (in `snapshot`) that
/// transitively links to one of them, so stopping a dependency also stops
/// its dependents first (e.g. `stop db` cascades to `api`).
fn cascade_dependents(
    snapshot: &std::collections::BTreeMap<String, InstanceSnapshot>,
    seed: BTreeSet<String>,
) -> Vec<InstanceSnapshot> {
    let mut selected = seed.clone();
    let mut queue: VecDeque<String> = seed.into_iter().collect();
    while let Some(target) = queue.pop_front() {
        for (name, inst) in snapshot {
            if selected.contains(name) {
                continue;
            }
            if inst.link_targets.values().any(|t| t == &target) {
                selected.insert(name.clone());
                queue.push_back(name.clone());
            }
        }
    }
    selected.into_iter().filter_map(|name| snapshot.get(&name).cloned()).collect()
}

pub fn stop_names(ctx: &AppContext, container_names: &[String]) -> Result<()> {
    let images = ctx.image_repository();
    let introspector = FormationIntrospector::new(Arc::clone(&ctx.engine), &ctx.graph, &images, None);
    let actual = introspector.introspect()?;
    let snapshot = actual.snapshot_all();

    let seed: BTreeSet<String> = snapshot
        .values()
        .filter(|i| container_names.iter().any(|n| n == &i.container_name))
        .map(|i| i.runtime_name.clone())
        .collect();
    if seed.is_empty() {
        return Ok(());
    }

    let items = cascade_dependents(&snapshot, seed);
    let graph = Arc::new(ctx.graph.clone());
    let runner = FormationRunner::new(Arc::clone(&ctx.engine), graph, Arc::clone(&ctx.hooks));
    let root = Task::root();
    let task = Task::new("Stopping containers", &root);
    runner.stop_instances(&items, &task)?;
    task.finish("Done", StatusFlavor::Good);
    Ok(())
}

pub fn run(chart: Option<PathBuf>, profile: Option<String>, containers: Vec<String>) -> Result<()> {
    let ctx = AppContext::load(chart, profile.as_deref())?;
    let names = if containers.is_empty() {
        ctx.graph.names().cloned().collect()
    } else {
        containers
    };
    stop_names(&ctx, &names)
}
