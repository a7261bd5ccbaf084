//! Introspector: reconstructs a `Formation` from the running containers on a
//! live host, for comparison against the desired formation.
//!
//! Grounded on `docker/introspect.py`. The container-identity label is
//! `container-identity` per the schema (the original used a
//! `com.quarkworks.ftl.container`-named label; see DESIGN.md for why the
//! unambiguous, explicitly-named schema field wins over the original's
//! internal naming).

use std::sync::Arc;

use tracing::{instrument, warn};

use crate::engine::ContainerEngine;
use crate::errors::Result;
use crate::formation::{Formation, Instance, Link};
use crate::graph::ContainerGraph;
use crate::image_repo::ImageRepository;

pub const CONTAINER_IDENTITY_LABEL: &str = "container-identity";

pub struct FormationIntrospector<'a> {
    engine: Arc<dyn ContainerEngine>,
    graph: &'a ContainerGraph,
    images: &'a ImageRepository,
    network: String,
}

impl<'a> FormationIntrospector<'a> {
    pub fn new(engine: Arc<dyn ContainerEngine>, graph: &'a ContainerGraph, images: &'a ImageRepository, network: Option<String>) -> Self {
        let network = network.unwrap_or_else(|| graph.prefix.clone());
        FormationIntrospector { engine, graph, images, network }
    }

    #[instrument(skip(self))]
    pub fn introspect(&self) -> Result<Formation> {
        let mut formation = Formation::new(self.graph.prefix.clone(), Some(self.network.clone()));
        let containers = self.engine.containers(None)?;
        for summary in containers {
            if let Some(instance) = self.create_instance(&summary.id)? {
                formation.add_instance(instance);
            }
        }
        formation.resolve_links()?;
        Ok(formation)
    }

    fn create_instance(&self, container_id: &str) -> Result<Option<Instance>> {
        let Some(details) = self.engine.inspect_container(container_id)? else { return Ok(None) };

        let Some(container_name) = details.labels.get(CONTAINER_IDENTITY_LABEL) else {
            warn!(container_id, "skipping container with no container-identity label");
            return Ok(None);
        };
        let Some(container) = self.graph.get(container_name) else {
            warn!(container_id, container_name, "container-identity points at a container no longer in the graph");
            return Ok(None);
        };

        let image_id = if let Some(stripped) = details.image.strip_prefix("sha256:") {
            format!("sha256:{stripped}")
        } else if let Some((name, tag)) = details.image.split_once(':') {
            match self.images.image_version(name, tag, true)? {
                Some(id) => id,
                None => details.image.clone(),
            }
        } else {
            details.image.clone()
        };

        let mut links = std::collections::BTreeMap::new();
        for raw_link in &details.links_raw {
            if let Some((target, alias)) = raw_link.split_once(':') {
                links.insert(alias.to_string(), Link::Name(target.trim_start_matches('/').to_string()));
            }
        }

        let mounted: std::collections::BTreeSet<String> = details.mounts.iter().cloned().collect();
        let devmodes = container
            .devmodes
            .iter()
            .filter(|(_, mounts)| mounts.keys().all(|dest| mounted.contains(dest)))
            .map(|(name, _)| name.clone())
            .collect();

        Ok(Some(Instance {
            runtime_name: details.name.clone(),
            container_name: container.name.clone(),
            image_id: Some(image_id),
            links,
            devmodes,
            ports: container.ports.clone(),
            environment: container.environment.clone(),
            mem_limit: container.mem_limit,
            command: None,
            foreground: container.flags.foreground,
            ip_address: details.ip_address.clone(),
            port_mapping: details.port_mapping.iter().map(|(k, v)| (*k, *v)).collect(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::CONTAINER_IDENTITY_LABEL;

    #[test]
    fn label_name_matches_schema() {
        assert_eq!(CONTAINER_IDENTITY_LABEL, "container-identity");
    }
}
