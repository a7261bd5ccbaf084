//! Plugin/hook/catalog composition.
//!
//! Grounded on `plugins/base.py` + `cli/__init__.py::load_plugins`: a fixed
//! hook vocabulary dispatched in registration order, a named catalog of
//! plugin-contributed items, and a `provides`/`requires` plugin graph loaded
//! in topological order. Concrete plugins (AWS ECR login, DNS/hosts editing,
//! doctor exams, `legacy_env`) are out of scope for this crate; this module
//! only exposes the composition machinery and the trait objects they'd
//! implement.

use std::any::Any;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;

use crate::errors::{FtlError, Result};
use crate::util::dependency_sort;

/// The fixed hook vocabulary every lifecycle stage dispatches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Hook {
    InitGroupBuild,
    PreGroupBuild,
    PreBuild,
    PostBuild,
    PostGroupBuild,
    PreRunContainer,
    PostRunContainer,
    PostRunContainerFullyStarted,
    PreGroupStart,
    PostGroupStart,
    DockerFailure,
    ContainerFailure,
}

/// Keyword-style payload a hook receiver gets, mirroring the Python
/// implementation's `**kwargs` dispatch without a dynamically-typed map: the
/// container/instance name plus a free-form opaque value for plugin-specific
/// data (e.g. a build-request).
#[derive(Debug, Clone, Default)]
pub struct HookPayload {
    pub container_name: Option<String>,
    pub instance_name: Option<String>,
    pub detail: Option<String>,
}

impl HookPayload {
    pub fn for_container(name: impl Into<String>) -> Self {
        HookPayload { container_name: Some(name.into()), ..Default::default() }
    }

    pub fn for_instance(name: impl Into<String>) -> Self {
        HookPayload { instance_name: Some(name.into()), ..Default::default() }
    }
}

pub type HookReceiver = Box<dyn Fn(&HookPayload) -> Result<()> + Send + Sync>;

/// Dispatches to registered receivers in registration order; the first error
/// aborts the dispatch (hooks never swallow exceptions).
#[derive(Default)]
pub struct HookBus {
    receivers: Mutex<std::collections::BTreeMap<Hook, Vec<HookReceiver>>>,
}

impl HookBus {
    pub fn new() -> Self {
        HookBus::default()
    }

    pub fn register(&self, hook: Hook, receiver: HookReceiver) {
        self.receivers.lock().unwrap().entry(hook).or_default().push(receiver);
    }

    pub fn fire(&self, hook: Hook, payload: &HookPayload) -> Result<()> {
        let receivers = self.receivers.lock().unwrap();
        if let Some(list) = receivers.get(&hook) {
            for receiver in list {
                receiver(payload)?;
            }
        }
        Ok(())
    }
}

/// A named, ordered collection of plugin-contributed items (`wait`,
/// `registry`, `doctor-exam`, `domainname`, `external_secrets`, `charts`).
/// `IndexMap` preserves registration order like the Python `OrderedDict`.
/// Re-registering a collection name, or an item name within one, is a
/// configuration error rather than a silent overwrite.
#[derive(Default)]
pub struct Catalog {
    collections: Mutex<std::collections::BTreeMap<String, IndexMap<String, Arc<dyn Any + Send + Sync>>>>,
}

impl Catalog {
    pub fn new() -> Self {
        Catalog::default()
    }

    pub fn register(&self, collection: impl Into<String>, item_name: impl Into<String>, item: Arc<dyn Any + Send + Sync>) -> Result<()> {
        let collection = collection.into();
        let item_name = item_name.into();
        let mut collections = self.collections.lock().unwrap();
        let entry = collections.entry(collection.clone()).or_default();
        if entry.contains_key(&item_name) {
            return Err(FtlError::config(collection, format!("item already registered: {item_name}")));
        }
        entry.insert(item_name, item);
        Ok(())
    }

    pub fn get(&self, collection: &str, item_name: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        self.collections.lock().unwrap().get(collection)?.get(item_name).cloned()
    }

    pub fn names(&self, collection: &str) -> Vec<String> {
        self.collections
            .lock()
            .unwrap()
            .get(collection)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }
}

/// A plugin's declared contribution to the `provides`/`requires` graph.
/// `load` is called once, after topological ordering, with shared access to
/// the hook bus and catalog it is expected to populate — an explicit context
/// argument rather than the original's module-scope globals, so a plugin
/// never reaches for ambient state.
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;
    fn provides(&self) -> &[&str];
    fn requires(&self) -> &[&str];
    fn load(&self, hooks: &HookBus, catalog: &Catalog) -> Result<()>;
}

/// Verifies `provides`/`requires` satisfiability across `plugins`, then
/// topologically sorts them (a plugin's dependencies are every other plugin
/// that provides one of its `requires` names) and calls `load()` on each in
/// that order.
pub fn load_plugins(plugins: Vec<Arc<dyn Plugin>>, hooks: &HookBus, catalog: &Catalog) -> Result<()> {
    let mut provided_by: std::collections::BTreeMap<String, String> = std::collections::BTreeMap::new();
    for plugin in &plugins {
        for name in plugin.provides() {
            if let Some(existing) = provided_by.insert((*name).to_string(), plugin.name().to_string()) {
                return Err(FtlError::config(
                    "plugins",
                    format!("'{name}' is provided by both '{existing}' and '{}'", plugin.name()),
                ));
            }
        }
    }

    let provided: BTreeSet<String> = provided_by.keys().cloned().collect();
    for plugin in &plugins {
        for name in plugin.requires() {
            if !provided.contains(*name) {
                return Err(FtlError::config(
                    "plugins",
                    format!("'{}' requires '{name}' but no plugin provides it", plugin.name()),
                ));
            }
        }
    }

    let by_name: std::collections::BTreeMap<String, Arc<dyn Plugin>> =
        plugins.iter().map(|p| (p.name().to_string(), Arc::clone(p))).collect();

    let names: Vec<String> = by_name.keys().cloned().collect();
    let ordered = dependency_sort(names, |name| {
        let plugin = &by_name[name];
        plugin
            .requires()
            .iter()
            .filter_map(|req| provided_by.get(*req).cloned())
            .collect()
    })?;

    for name in ordered {
        by_name[&name].load(hooks, catalog)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn hook_bus_dispatches_in_registration_order() {
        let bus = HookBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let o1 = Arc::clone(&order);
        bus.register(Hook::PreBuild, Box::new(move |_| { o1.lock().unwrap().push(1); Ok(()) }));
        let o2 = Arc::clone(&order);
        bus.register(Hook::PreBuild, Box::new(move |_| { o2.lock().unwrap().push(2); Ok(()) }));
        bus.fire(Hook::PreBuild, &HookPayload::for_container("web")).unwrap();
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn hook_bus_propagates_first_error() {
        let bus = HookBus::new();
        bus.register(Hook::PreBuild, Box::new(|_| Err(FtlError::config("x", "boom"))));
        assert!(bus.fire(Hook::PreBuild, &HookPayload::default()).is_err());
    }

    #[test]
    fn catalog_rejects_duplicate_registration() {
        let catalog = Catalog::new();
        catalog.register("wait", "tcp", Arc::new(1u32)).unwrap();
        assert!(catalog.register("wait", "tcp", Arc::new(2u32)).is_err());
    }

    struct FakePlugin {
        name: &'static str,
        provides: Vec<&'static str>,
        requires: Vec<&'static str>,
        loaded: Arc<AtomicUsize>,
    }

    impl Plugin for FakePlugin {
        fn name(&self) -> &str {
            self.name
        }
        fn provides(&self) -> &[&str] {
            &self.provides
        }
        fn requires(&self) -> &[&str] {
            &self.requires
        }
        fn load(&self, _hooks: &HookBus, _catalog: &Catalog) -> Result<()> {
            self.loaded.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn load_plugins_orders_by_requires() {
        let loaded = Arc::new(AtomicUsize::new(0));
        let base = Arc::new(FakePlugin { name: "base", provides: vec!["dns"], requires: vec![], loaded: Arc::clone(&loaded) });
        let dependent = Arc::new(FakePlugin { name: "dependent", provides: vec![], requires: vec!["dns"], loaded: Arc::clone(&loaded) });
        let hooks = HookBus::new();
        let catalog = Catalog::new();
        load_plugins(vec![dependent, base], &hooks, &catalog).unwrap();
        assert_eq!(loaded.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn load_plugins_rejects_unsatisfied_requirement() {
        let loaded = Arc::new(AtomicUsize::new(0));
        let dependent = Arc::new(FakePlugin { name: "dependent", provides: vec![], requires: vec!["dns"], loaded });
        let hooks = HookBus::new();
        let catalog = Catalog::new();
        assert!(load_plugins(vec![dependent], &hooks, &catalog).is_err());
    }
}
