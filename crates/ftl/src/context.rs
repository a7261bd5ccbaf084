//! Per-invocation context: the graph, hooks, and engine handles a command
//! needs, threaded explicitly instead of stashed in module-scope statics the
//! way the original's global `App` object was.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use ftl_core::engine::{ContainerEngine, DockerCliEngine};
use ftl_core::graph::ContainerGraph;
use ftl_core::image_repo::{ImageRepository, PlainRegistryHandler, RegistryHandler};
use ftl_core::plugins::HookBus;

use crate::chart;

pub struct AppContext {
    pub chart_path: PathBuf,
    pub graph: ContainerGraph,
    pub engine: Arc<dyn ContainerEngine>,
    pub hooks: Arc<HookBus>,
}

impl AppContext {
    pub fn load(chart_path: Option<PathBuf>, profile_name: Option<&str>) -> Result<Self> {
        let chart_path = chart::resolve_chart_path(chart_path)?;
        let mut graph = ContainerGraph::load(&chart_path)
            .with_context(|| format!("loading chart at {}", chart_path.display()))?;
        let stack = chart::load_profile_stack(&chart_path, &graph.prefix, profile_name)?;
        stack.apply(&mut graph)?;

        let engine: Arc<dyn ContainerEngine> = Arc::new(DockerCliEngine::default());
        engine.ping().context(
            "container engine unavailable (is the engine daemon running and DOCKER_HOST reachable?)",
        )?;

        Ok(AppContext {
            chart_path,
            graph,
            engine,
            hooks: Arc::new(HookBus::new()),
        })
    }

    /// Builds an `ImageRepository` over this context's engine, using the
    /// chart's configured registry URL (or `FTL_NO_REGISTRY` to proceed
    /// without one) as the plain registry handler.
    pub fn image_repository(&self) -> ImageRepository {
        let handler: Option<Arc<dyn RegistryHandler>> = self
            .graph
            .registry
            .clone()
            .map(|url| Arc::new(PlainRegistryHandler::new(url)) as Arc<dyn RegistryHandler>);
        ImageRepository::new(Arc::clone(&self.engine), handler)
    }

    /// Names of containers in default-boot scope: those whose resolved
    /// option carries `default_boot == Some(true)` and aren't `system`.
    pub fn default_boot_containers(&self) -> Vec<String> {
        self.graph
            .names()
            .filter(|name| {
                let Some(container) = self.graph.get(name.as_str()) else { return false };
                if container.flags.system {
                    return false;
                }
                self.graph
                    .options(name.as_str())
                    .and_then(|o| o.default_boot)
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }
}
