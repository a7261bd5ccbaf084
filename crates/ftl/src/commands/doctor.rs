//! `ftl doctor`: a fixed set of host sanity checks.
//!
//! The catalog-driven exam extension point (`ftl_core::plugins::Catalog`'s
//! `doctor-exam` collection) has no concrete exams in core as a non-goal;
//! this command runs the checks every chart needs regardless of plugins
//! instead of leaving `doctor` a no-op. Unlike every other command, it never
//! bails out through `AppContext::load` — a down engine or a broken chart is
//! exactly what it's meant to report, not propagate as a top-level error.

use std::path::PathBuf;

use anyhow::Result;
use ftl_core::engine::{ContainerEngine, DockerCliEngine};
use ftl_core::graph::ContainerGraph;

use crate::chart;

fn report(name: &str, outcome: &Result<()>) {
    match outcome {
        Ok(()) => println!("[ok]   {name}"),
        Err(e) => println!("[fail] {name}: {e:#}"),
    }
}

pub fn run(chart_path: Option<PathBuf>, _profile: Option<String>) -> Result<()> {
    let mut failures = 0;

    let resolved = chart::resolve_chart_path(chart_path);
    report("chart manifest resolves", &resolved.as_ref().map(|_| ()).map_err(|e| anyhow::anyhow!("{e}")));
    let Ok(chart_path) = resolved else {
        return Ok(());
    };

    let graph = ContainerGraph::load(&chart_path).map_err(anyhow::Error::from);
    report("chart parses without error", &graph.as_ref().map(|_| ()).map_err(|e| anyhow::anyhow!("{e}")));

    let engine = DockerCliEngine::default();
    let ping = engine.ping().map_err(anyhow::Error::from);
    report("container engine reachable", &ping);
    if ping.is_err() {
        failures += 1;
    }

    if let Ok(graph) = &graph {
        for name in graph.names() {
            let container = graph.get(name).expect("name came from graph.names()");
            let outcome = engine
                .inspect_image(&container.tagged_image_name())
                .map_err(anyhow::Error::from)
                .and_then(|id| {
                    id.ok_or_else(|| anyhow::anyhow!("image {} not built", container.tagged_image_name()))
                })
                .map(|_| ());
            if outcome.is_err() {
                failures += 1;
            }
            report(&format!("image present for '{name}'"), &outcome);
        }
    } else {
        failures += 1;
    }

    if failures > 0 {
        println!("\n{failures} check(s) failed");
    } else {
        println!("\nall checks passed");
    }
    Ok(())
}
