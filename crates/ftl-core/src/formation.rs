//! Formation: a desired or actual set of container instances scoped to one
//! host and one network.
//!
//! Grounded on `containers/formation.py`. `Link` replaces the original's
//! string-that-gets-mutated-into-a-reference trick with an explicit two-state
//! enum: a `Name` link is unresolved (as introspection first sees it), an
//! `Instance` link is resolved, and `Formation::resolve_links` performs the
//! transition in place.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use crate::errors::{FtlError, Result};
use crate::graph::ContainerGraph;

#[derive(Debug, Clone)]
pub enum Link {
    Name(String),
    Instance(Rc<RefCell<Instance>>),
}

impl Link {
    pub fn target_name(&self) -> String {
        match self {
            Link::Name(n) => n.clone(),
            Link::Instance(i) => i.borrow().runtime_name.clone(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Link::Instance(_))
    }
}

impl PartialEq for Link {
    fn eq(&self, other: &Self) -> bool {
        self.target_name() == other.target_name()
    }
}
impl Eq for Link {}

#[derive(Debug, Clone)]
pub struct Instance {
    pub runtime_name: String,
    pub container_name: String,
    pub image_id: Option<String>,
    pub links: BTreeMap<String, Link>,
    pub devmodes: BTreeSet<String>,
    pub ports: BTreeMap<String, u16>,
    pub environment: BTreeMap<String, String>,
    pub mem_limit: u64,
    pub command: Option<Vec<String>>,
    pub foreground: bool,
    pub ip_address: Option<String>,
    pub port_mapping: BTreeMap<u16, u16>,
}

impl Instance {
    /// Compares every field the runner cares about for convergence;
    /// `foreground` on either side always forces a diff (a foreground
    /// container is never treated as already-satisfied).
    pub fn different_from(&self, other: &Instance) -> bool {
        if self.foreground || other.foreground {
            return true;
        }
        self.runtime_name != other.runtime_name
            || self.image_id != other.image_id
            || self.link_names() != other.link_names()
            || self.devmodes != other.devmodes
            || self.ports != other.ports
            || self.environment != other.environment
            || self.mem_limit != other.mem_limit
            || self.command != other.command
    }

    fn link_names(&self) -> BTreeMap<String, String> {
        self.links.iter().map(|(alias, link)| (alias.clone(), link.target_name())).collect()
    }

    pub fn clone_detached(&self) -> Instance {
        self.clone()
    }

    /// A `Send`-safe snapshot for handing to worker threads: a resolved
    /// `Link::Instance` holds an `Rc`, which isn't `Send`, so the runner works
    /// from plain link-target names instead of live references.
    pub fn snapshot(&self) -> InstanceSnapshot {
        InstanceSnapshot {
            runtime_name: self.runtime_name.clone(),
            container_name: self.container_name.clone(),
            image_id: self.image_id.clone(),
            link_targets: self.link_names(),
            devmodes: self.devmodes.clone(),
            ports: self.ports.clone(),
            environment: self.environment.clone(),
            mem_limit: self.mem_limit,
            command: self.command.clone(),
            foreground: self.foreground,
        }
    }
}

/// See [`Instance::snapshot`].
#[derive(Debug, Clone)]
pub struct InstanceSnapshot {
    pub runtime_name: String,
    pub container_name: String,
    pub image_id: Option<String>,
    pub link_targets: BTreeMap<String, String>,
    pub devmodes: BTreeSet<String>,
    pub ports: BTreeMap<String, u16>,
    pub environment: BTreeMap<String, String>,
    pub mem_limit: u64,
    pub command: Option<Vec<String>>,
    pub foreground: bool,
}

impl InstanceSnapshot {
    /// Same comparison as [`Instance::different_from`], for use once the
    /// runner has already dropped down to plain snapshots.
    pub fn different_from(&self, other: &InstanceSnapshot) -> bool {
        if self.foreground || other.foreground {
            return true;
        }
        self.runtime_name != other.runtime_name
            || self.image_id != other.image_id
            || self.link_targets != other.link_targets
            || self.devmodes != other.devmodes
            || self.ports != other.ports
            || self.environment != other.environment
            || self.mem_limit != other.mem_limit
            || self.command != other.command
    }
}

pub struct Formation {
    pub prefix: String,
    pub network_name: String,
    instances: BTreeMap<String, Rc<RefCell<Instance>>>,
}

fn runtime_name(prefix: &str, container_name: &str) -> String {
    format!("{prefix}.{container_name}.1")
}

impl Formation {
    pub fn new(prefix: impl Into<String>, network_name: Option<String>) -> Self {
        let prefix = prefix.into();
        let network_name = network_name.unwrap_or_else(|| prefix.clone());
        Formation {
            prefix,
            network_name,
            instances: BTreeMap::new(),
        }
    }

    pub fn get(&self, runtime_name: &str) -> Option<Rc<RefCell<Instance>>> {
        self.instances.get(runtime_name).cloned()
    }

    pub fn get_container_instance(&self, container_name: &str) -> Option<Rc<RefCell<Instance>>> {
        let name = runtime_name(&self.prefix, container_name);
        self.get(&name)
    }

    pub fn instances(&self) -> impl Iterator<Item = &Rc<RefCell<Instance>>> {
        self.instances.values()
    }

    /// `Send`-safe snapshots of every instance, keyed by runtime-name.
    pub fn snapshot_all(&self) -> BTreeMap<String, InstanceSnapshot> {
        self.instances.iter().map(|(name, inst)| (name.clone(), inst.borrow().snapshot())).collect()
    }

    pub fn add_instance(&mut self, instance: Instance) -> Rc<RefCell<Instance>> {
        let handle = Rc::new(RefCell::new(instance));
        self.instances.insert(handle.borrow().runtime_name.clone(), Rc::clone(&handle));
        handle
    }

    /// Adds `container_name` and, recursively, every runtime-dependency
    /// ancestor not already represented, in topological (leaves-first) order.
    pub fn add_container(
        &mut self,
        graph: &mut ContainerGraph,
        container_name: &str,
        image_lookup: &dyn Fn(&str, &str) -> Option<String>,
        ignore_dependencies: bool,
    ) -> Result<Rc<RefCell<Instance>>> {
        let ancestry = graph.runtime_dependency_order(vec![container_name.to_string()])?;

        for name in &ancestry {
            if name == container_name {
                continue;
            }
            if self.get_container_instance(name).is_none() {
                let result = self.add_container(graph, name, image_lookup, ignore_dependencies);
                match result {
                    Ok(_) => {}
                    Err(FtlError::ImageNotFound { image, tag, container: None }) => {
                        return Err(FtlError::ImageNotFound {
                            image,
                            tag,
                            container: Some(name.clone()),
                        });
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        let container = graph
            .get(container_name)
            .ok_or_else(|| FtlError::config(container_name.to_string(), "container not found in graph"))?
            .clone();

        let mut links = BTreeMap::new();
        for dep_name in graph.dependencies(container_name) {
            if let Some(dep_instance) = self.get_container_instance(&dep_name) {
                links.insert(dep_name.clone(), Link::Instance(dep_instance));
            } else {
                links.insert(dep_name.clone(), Link::Name(dep_name));
            }
        }

        let image_id = image_lookup(&container.image_name(), &container.image_tag);
        if image_id.is_none() {
            return Err(FtlError::ImageNotFound {
                image: container.image_name(),
                tag: container.image_tag.clone(),
                container: None,
            });
        }

        let devmodes = graph
            .options(container_name)
            .map(|o| o.devmodes.clone())
            .unwrap_or_default();

        let instance = Instance {
            runtime_name: runtime_name(&self.prefix, container_name),
            container_name: container_name.to_string(),
            image_id,
            links,
            devmodes,
            ports: container.ports.clone(),
            environment: container.environment.clone(),
            mem_limit: container.mem_limit,
            command: None,
            foreground: container.flags.foreground,
            ip_address: None,
            port_mapping: BTreeMap::new(),
        };

        Ok(self.add_instance(instance))
    }

    /// Removes `instance`. Under default semantics, every instance whose
    /// container transitively depends (via runtime links) on `instance`'s
    /// container is removed too. Under `ignore_dependencies`, only the
    /// dependency edge from each such dependent is discarded instead, and
    /// `instance` alone is removed.
    pub fn remove_instance(&mut self, graph: &mut ContainerGraph, runtime_name: &str, ignore_dependencies: bool) {
        let Some(instance) = self.get(runtime_name) else { return };
        let container_name = instance.borrow().container_name.clone();

        let dependents: Vec<(String, String)> = self
            .instances
            .values()
            .filter_map(|inst| {
                let inst_ref = inst.borrow();
                if inst_ref.runtime_name == runtime_name {
                    return None;
                }
                if graph.dependents(&container_name).contains(&inst_ref.container_name) {
                    Some((inst_ref.runtime_name.clone(), inst_ref.container_name.clone()))
                } else {
                    None
                }
            })
            .collect();

        for (dep_runtime_name, dep_container_name) in dependents {
            if ignore_dependencies {
                graph.discard_dependency(&dep_container_name, &container_name);
            } else {
                self.remove_instance(graph, &dep_runtime_name, ignore_dependencies);
            }
        }

        self.instances.remove(runtime_name);
    }

    pub fn clone_formation(&self) -> Formation {
        Formation {
            prefix: self.prefix.clone(),
            network_name: self.network_name.clone(),
            instances: self
                .instances
                .iter()
                .map(|(k, v)| (k.clone(), Rc::new(RefCell::new(v.borrow().clone_detached()))))
                .collect(),
        }
    }

    pub fn different_from(&self, other: &Formation) -> bool {
        let self_names: BTreeSet<String> = self.instances.keys().cloned().collect();
        let other_names: BTreeSet<String> = other.instances.keys().cloned().collect();
        if self_names != other_names {
            return true;
        }
        self.instances.iter().any(|(name, inst)| {
            other
                .get(name)
                .map(|other_inst| inst.borrow().different_from(&other_inst.borrow()))
                .unwrap_or(true)
        })
    }

    pub fn get_instances_using_volume(&self, volume_name: &str) -> Vec<Rc<RefCell<Instance>>> {
        self.instances
            .values()
            .filter(|inst| {
                inst.borrow()
                    .devmodes
                    .iter()
                    .any(|d| d == volume_name)
            })
            .cloned()
            .collect()
    }

    /// Resolves every unresolved `Link::Name` to a `Link::Instance` by
    /// looking up the formation; links with no matching instance anywhere in
    /// the formation are dropped (orphans remain stoppable but unlinked).
    pub fn resolve_links(&mut self) -> Result<()> {
        let instances: Vec<Rc<RefCell<Instance>>> = self.instances.values().cloned().collect();
        for inst in &instances {
            let resolved: BTreeMap<String, Link> = inst
                .borrow()
                .links
                .iter()
                .filter_map(|(alias, link)| {
                    if link.is_resolved() {
                        return Some((alias.clone(), link.clone()));
                    }
                    let target_name = link.target_name();
                    self.get(&target_name).map(|target| (alias.clone(), Link::Instance(target)))
                })
                .collect();
            inst.borrow_mut().links = resolved;
        }
        Ok(())
    }

    /// Validates that every link on every instance is resolved; returns the
    /// first unresolved link found.
    pub fn validate(&self) -> Result<()> {
        for inst in self.instances.values() {
            for link in inst.borrow().links.values() {
                if !link.is_resolved() {
                    return Err(FtlError::UnresolvedLink(link.target_name()));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_instance(name: &str) -> Instance {
        Instance {
            runtime_name: name.to_string(),
            container_name: name.to_string(),
            image_id: Some("sha256:abc".to_string()),
            links: BTreeMap::new(),
            devmodes: BTreeSet::new(),
            ports: BTreeMap::new(),
            environment: BTreeMap::new(),
            mem_limit: 0,
            command: None,
            foreground: false,
            ip_address: None,
            port_mapping: BTreeMap::new(),
        }
    }

    #[test]
    fn different_from_detects_image_change() {
        let a = sample_instance("acme.web.1");
        let mut b = sample_instance("acme.web.1");
        assert!(!a.different_from(&b));
        b.image_id = Some("sha256:def".to_string());
        assert!(a.different_from(&b));
    }

    #[test]
    fn foreground_always_forces_recreate() {
        let a = sample_instance("acme.web.1");
        let mut b = sample_instance("acme.web.1");
        b.foreground = true;
        assert!(a.different_from(&b));
    }

    #[test]
    fn resolve_links_drops_orphans() {
        let mut formation = Formation::new("acme", None);
        formation.add_instance(sample_instance("acme.web.1"));
        let mut with_link = sample_instance("acme.app.1");
        with_link.links.insert("web".to_string(), Link::Name("acme.web.1".to_string()));
        with_link.links.insert("ghost".to_string(), Link::Name("acme.ghost.1".to_string()));
        formation.add_instance(with_link);
        formation.resolve_links().unwrap();
        let app = formation.get_container_instance("app").unwrap();
        let app_ref = app.borrow();
        assert!(app_ref.links.get("web").unwrap().is_resolved());
        assert!(!app_ref.links.contains_key("ghost"));
    }

    #[test]
    fn validate_reports_the_unresolved_link_target_name() {
        let mut formation = Formation::new("acme", None);
        let mut with_link = sample_instance("acme.app.1");
        with_link.links.insert("db".to_string(), Link::Name("acme.db.1".to_string()));
        formation.add_instance(with_link);

        let err = formation.validate().unwrap_err();
        match err {
            FtlError::UnresolvedLink(target) => assert_eq!(target, "acme.db.1"),
            other => panic!("expected UnresolvedLink, got {other:?}"),
        }
        // FtlError must stay Send + Sync so `?` can convert it into anyhow::Error
        // at every CLI call site; this is a compile-time assertion, not a runtime one.
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<FtlError>();
    }
}
