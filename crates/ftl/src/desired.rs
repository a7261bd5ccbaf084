//! Builds a desired `Formation` for a set of container names, resolving
//! dependency closure and image identities the way `containers/formation.py`
//! expects `add_container` to be driven.

use anyhow::{Context, Result};
use ftl_core::formation::Formation;
use ftl_core::graph::ContainerGraph;
use ftl_core::image_repo::ImageRepository;

pub fn build_desired_formation(
    graph: &mut ContainerGraph,
    images: &ImageRepository,
    container_names: &[String],
    network_name: Option<String>,
    ignore_dependencies: bool,
) -> Result<Formation> {
    let prefix = graph.prefix.clone();
    let mut formation = Formation::new(prefix, network_name);
    let lookup = |name: &str, tag: &str| images.image_version(name, tag, true).ok().flatten();

    for name in container_names {
        formation
            .add_container(graph, name, &lookup, ignore_dependencies)
            .with_context(|| format!("resolving desired state for '{name}'"))?;
    }
    formation.resolve_links()?;
    Ok(formation)
}
