//! Formation runner: converges a running formation toward a desired one.
//!
//! Grounded on `docker/runner.py` + `docker/seedship.py`. Converging is two
//! phases, stop then start, each driven by the same generic bounded-parallel
//! executor: every container in a phase that has no unmet ordering
//! constraint runs on its own OS thread (true OS threads, no async
//! runtime), polled every 100ms, with a 10-consecutive-idle-iteration cap
//! that turns a genuine ordering cycle into a `Deadlock` error instead of an
//! infinite hang.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use tracing::{instrument, warn};

use crate::boot_probe::{BootProbe, BootStatus};
use crate::engine::{ContainerEngine, ContainerSummary, CreateContainerSpec};
use crate::errors::{FtlError, Result};
use crate::formation::{Formation, InstanceSnapshot};
use crate::graph::{Container, ContainerGraph, WaitSpec};
use crate::introspect::CONTAINER_IDENTITY_LABEL;
use crate::plugins::{Hook, HookBus, HookPayload};
use crate::task_tree::{StatusFlavor, Task};
use crate::util::{ExceptionalWorker, NamedLockSet, WorkerOutcome};
use crate::waits::{FileWait, HttpWait, HttpsWait, TcpWait, TimeWait, WaitCheck};

/// Serializes lifecycle operations on the same runtime-name across
/// concurrent runner invocations in this process (per-container mutual
/// exclusion). Process-global rather than per-`FormationRunner` since
/// two independently-constructed runners must still not race the same
/// container.
static NAME_LOCKS: Lazy<Arc<NamedLockSet>> = Lazy::new(|| Arc::new(NamedLockSet::new()));

/// Docker network creation isn't safe to race even under the per-name lock:
/// two containers can both be the first to touch a brand new network.
static NETWORK_CREATE_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const BOOT_POLL_INTERVAL: Duration = Duration::from_millis(500);
const MAX_IDLE_ITERATIONS: u32 = 10;
const DEFAULT_WAIT_TIMEOUT_SECS: u64 = 60;

/// The stop/start sets that converge an actual formation toward a desired one.
pub struct Delta {
    pub to_stop: Vec<InstanceSnapshot>,
    pub to_start: Vec<InstanceSnapshot>,
}

/// Computes `to_stop` (present in `actual` but absent, or different, in
/// `desired`) and `to_start` (present in `desired` but absent, or different,
/// from `actual`).
pub fn compute_delta(desired: &Formation, actual: &Formation) -> Delta {
    let desired_snap = desired.snapshot_all();
    let actual_snap = actual.snapshot_all();

    let mut to_stop: Vec<InstanceSnapshot> = actual_snap
        .iter()
        .filter(|(name, inst)| match desired_snap.get(*name) {
            None => true,
            Some(desired_inst) => desired_inst.different_from(inst),
        })
        .map(|(_, inst)| inst.clone())
        .collect();

    let mut to_start: Vec<InstanceSnapshot> = desired_snap
        .iter()
        .filter(|(name, inst)| match actual_snap.get(*name) {
            None => true,
            Some(actual_inst) => (*inst).different_from(actual_inst),
        })
        .map(|(_, inst)| inst.clone())
        .collect();

    to_stop.sort_by(|a, b| a.runtime_name.cmp(&b.runtime_name));
    to_start.sort_by(|a, b| a.runtime_name.cmp(&b.runtime_name));
    Delta { to_stop, to_start }
}

/// Runs every ready item in `items` concurrently, feeding finished runtime
/// names into `done` so dependents become ready in turn, until the set is
/// empty or a worker hands back an interactive takeover. A node whose
/// ordering constraint never clears after `MAX_IDLE_ITERATIONS` consecutive
/// no-progress polls is reported as a deadlock rather than hung on forever.
fn parallel_execute(
    mut items: Vec<InstanceSnapshot>,
    mut done: BTreeSet<String>,
    ready: impl Fn(&InstanceSnapshot, &BTreeSet<String>) -> bool,
    exec: Arc<dyn Fn(InstanceSnapshot) -> WorkerOutcome<()> + Send + Sync>,
) -> Result<Option<Box<dyn FnOnce() + Send>>> {
    let mut processing: Vec<(String, ExceptionalWorker<()>)> = Vec::new();
    let mut idle_iterations: u32 = 0;

    loop {
        if items.is_empty() && processing.is_empty() {
            return Ok(None);
        }

        let mut progressed = false;

        let mut still_waiting = Vec::new();
        for item in items.into_iter() {
            if ready(&item, &done) {
                progressed = true;
                let name = item.runtime_name.clone();
                let exec = Arc::clone(&exec);
                processing.push((name, ExceptionalWorker::spawn(move || exec(item))));
            } else {
                still_waiting.push(item);
            }
        }
        items = still_waiting;

        let mut still_processing = Vec::new();
        for (name, worker) in processing.into_iter() {
            if !worker.is_finished() {
                still_processing.push((name, worker));
                continue;
            }
            progressed = true;
            match worker.join() {
                WorkerOutcome::Done(Ok(())) => {
                    done.insert(name);
                }
                WorkerOutcome::Done(Err(e)) => return Err(e),
                WorkerOutcome::Interactive(handler) => return Ok(Some(handler)),
            }
        }
        processing = still_processing;

        if progressed {
            idle_iterations = 0;
        } else {
            idle_iterations += 1;
        }

        if idle_iterations > MAX_IDLE_ITERATIONS && processing.is_empty() && !items.is_empty() {
            let stuck: Vec<String> = items.iter().map(|i| i.runtime_name.clone()).collect();
            return Err(FtlError::Deadlock(stuck));
        }

        std::thread::sleep(POLL_INTERVAL);
    }
}

fn find_by_runtime_name(engine: &dyn ContainerEngine, runtime_name: &str) -> Result<Option<ContainerSummary>> {
    let slashed = format!("/{runtime_name}");
    for summary in engine.containers_all(None)? {
        if summary.names.iter().any(|n| n == runtime_name || n == &slashed) {
            return Ok(Some(summary));
        }
    }
    Ok(None)
}

/// Appends `,cached` to a bind mode when the engine advertises cached-volume
/// support and the mode doesn't already request it (macOS Docker Desktop's
/// delegated-consistency escape hatch for bind-mount I/O).
fn mode_with_cache_hint(mode: &str, cached_supported: bool) -> String {
    if cached_supported && !mode.split(',').any(|m| m == "cached") {
        format!("{mode},cached")
    } else {
        mode.to_string()
    }
}

/// Resolves a bound-volume's host source. Absolute (or `~`-relative) sources
/// are used verbatim; a bare relative source is rooted at `FTL_VOLUME_HOME`
/// when set, falling back to the literal string otherwise (an unresolvable
/// relative source is a configuration error the engine will surface on
/// create).
fn resolve_bind_source(source: &str) -> String {
    if source.starts_with('/') || source.starts_with('~') {
        return source.to_string();
    }
    match std::env::var("FTL_VOLUME_HOME") {
        Ok(home) => format!("{}/{}", home.trim_end_matches('/'), source),
        Err(_) => source.to_string(),
    }
}

/// Builds the `-v` bind list for a container: bound (host) volumes, then
/// named volumes, then the mounts of whichever devmodes are active on this
/// instance — later entries win on a destination collision, so an active
/// devmode's mount shadows the named-volume default at the same path.
///
/// Bound-volume sources must exist on the host unless marked
/// `required: false`; devmode sources must always exist (they have no
/// `required` flag to opt out). A named volume's source is a docker-managed
/// volume name, not a host path, so it is never existence-checked.
fn build_binds(
    container: &Container,
    active_devmodes: &BTreeSet<String>,
    cached_supported: bool,
    runtime_name: &str,
) -> Result<Vec<String>> {
    let mut binds: BTreeMap<String, String> = BTreeMap::new();
    for (dest, bound) in &container.bound_volumes {
        let source = resolve_bind_source(&bound.source);
        if bound.required && !std::path::Path::new(&source).exists() {
            return Err(FtlError::Runtime {
                message: format!("bound volume source '{source}' for {dest} does not exist"),
                code: None,
                instance: Some(runtime_name.to_string()),
            });
        }
        let mode = mode_with_cache_hint(&bound.mode, cached_supported);
        binds.insert(dest.clone(), format!("{source}:{dest}:{mode}"));
    }
    for (dest, named) in &container.named_volumes {
        let mode = mode_with_cache_hint(&named.mode, cached_supported);
        binds.insert(dest.clone(), format!("{}:{dest}:{mode}", named.source));
    }
    for devmode_name in active_devmodes {
        if let Some(mounts) = container.devmodes.get(devmode_name) {
            for (dest, named) in mounts {
                if !std::path::Path::new(&named.source).exists() {
                    return Err(FtlError::Runtime {
                        message: format!("devmode '{devmode_name}' source '{}' for {dest} does not exist", named.source),
                        code: None,
                        instance: Some(runtime_name.to_string()),
                    });
                }
                let mode = mode_with_cache_hint(&named.mode, cached_supported);
                binds.insert(dest.clone(), format!("{}:{dest}:{mode}", named.source));
            }
        }
    }
    Ok(binds.into_values().collect())
}

enum StartAction {
    Started,
    Interactive(String),
}

/// Formation runner: holds the engine, the (logically read-only, post
/// profile-apply) container graph, and the hook bus every container action
/// fires into.
pub struct FormationRunner {
    engine: Arc<dyn ContainerEngine>,
    graph: Arc<ContainerGraph>,
    hooks: Arc<HookBus>,
}

impl FormationRunner {
    pub fn new(engine: Arc<dyn ContainerEngine>, graph: Arc<ContainerGraph>, hooks: Arc<HookBus>) -> Self {
        FormationRunner { engine, graph, hooks }
    }

    /// Converges `actual` toward `desired` on `desired`'s network: stops
    /// everything `to_stop` (leaf-dependents first), then starts everything
    /// `to_start` (link targets first). Returns an interactive takeover
    /// handler if a foreground container's turn came up — the caller drops
    /// the rest of its own task-tree rendering and invokes it directly.
    #[instrument(skip(self, desired, actual, parent_task))]
    pub fn converge(
        &self,
        desired: &Formation,
        actual: &Formation,
        parent_task: &Arc<Task>,
    ) -> Result<Option<Box<dyn FnOnce() + Send>>> {
        let delta = compute_delta(desired, actual);
        if delta.to_stop.is_empty() && delta.to_start.is_empty() {
            return Ok(None);
        }

        self.hooks.fire(Hook::PreGroupStart, &HookPayload::default())?;

        if !delta.to_stop.is_empty() {
            let stop_task = Task::new("Stopping containers", parent_task);
            self.run_stop_phase(&delta.to_stop, &stop_task)?;
            stop_task.finish("Done", StatusFlavor::Good);
        }

        let stopped: BTreeSet<String> = delta.to_stop.iter().map(|i| i.runtime_name.clone()).collect();
        let survivors: BTreeSet<String> =
            actual.snapshot_all().into_keys().filter(|n| !stopped.contains(n)).collect();

        let outcome = if delta.to_start.is_empty() {
            None
        } else {
            let start_task = Task::new("Starting containers", parent_task);
            let outcome = self.run_start_phase(&delta.to_start, survivors, &desired.network_name, &start_task)?;
            if outcome.is_none() {
                start_task.finish("Done", StatusFlavor::Good);
            }
            outcome
        };

        self.hooks.fire(Hook::PostGroupStart, &HookPayload::default())?;
        Ok(outcome)
    }

    /// Stops exactly `items` (e.g. an explicit `ftl stop <names>`), ordering
    /// so a container only stops once every other member of `items` that
    /// depends on it has already stopped.
    pub fn stop_instances(&self, items: &[InstanceSnapshot], parent_task: &Arc<Task>) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        let task = Task::new("Stopping containers", parent_task);
        self.run_stop_phase(items, &task)?;
        task.finish("Done", StatusFlavor::Good);
        Ok(())
    }

    fn run_stop_phase(&self, items: &[InstanceSnapshot], task: &Arc<Task>) -> Result<()> {
        let in_set: BTreeSet<String> = items.iter().map(|i| i.runtime_name.clone()).collect();
        let mut dependents_of: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for item in items {
            for target in item.link_targets.values() {
                if in_set.contains(target) {
                    dependents_of.entry(target.clone()).or_default().insert(item.runtime_name.clone());
                }
            }
        }

        let engine = Arc::clone(&self.engine);
        let graph = Arc::clone(&self.graph);
        let task = Arc::clone(task);
        let exec: Arc<dyn Fn(InstanceSnapshot) -> WorkerOutcome<()> + Send + Sync> = Arc::new(move |item| {
            WorkerOutcome::Done(stop_one(&engine, &graph, &task, &item))
        });

        let ready = move |item: &InstanceSnapshot, done: &BTreeSet<String>| {
            dependents_of.get(&item.runtime_name).map(|ds| ds.iter().all(|d| done.contains(d))).unwrap_or(true)
        };

        match parallel_execute(items.to_vec(), BTreeSet::new(), ready, exec)? {
            None => Ok(()),
            Some(_) => unreachable!("stopping a container never requests an interactive takeover"),
        }
    }

    fn run_start_phase(
        &self,
        items: &[InstanceSnapshot],
        done: BTreeSet<String>,
        network_name: &str,
        task: &Arc<Task>,
    ) -> Result<Option<Box<dyn FnOnce() + Send>>> {
        let ready = |item: &InstanceSnapshot, done: &BTreeSet<String>| {
            item.link_targets.values().all(|target| done.contains(target))
        };

        let engine = Arc::clone(&self.engine);
        let graph = Arc::clone(&self.graph);
        let hooks = Arc::clone(&self.hooks);
        let task = Arc::clone(task);
        let network_name = network_name.to_string();
        let exec: Arc<dyn Fn(InstanceSnapshot) -> WorkerOutcome<()> + Send + Sync> = Arc::new(move |item| {
            start_one(&engine, &graph, &hooks, &task, &network_name, item)
        });

        parallel_execute(items.to_vec(), done, ready, exec)
    }
}

fn stop_one(engine: &Arc<dyn ContainerEngine>, graph: &Arc<ContainerGraph>, task: &Arc<Task>, item: &InstanceSnapshot) -> Result<()> {
    let _guard = NAME_LOCKS.entry_lock(item.runtime_name.clone());
    let subtask = Task::new(format!("Stopping {}", item.runtime_name), task);

    let Some(summary) = find_by_runtime_name(engine.as_ref(), &item.runtime_name)? else {
        subtask.finish("Not running", StatusFlavor::Neutral);
        return Ok(());
    };

    let fast_kill = graph.get(&item.container_name).map(|c| c.flags.fast_kill).unwrap_or(false);
    engine.stop(&summary.id, fast_kill)?;
    engine.remove_container(&summary.id)?;
    subtask.finish("Stopped", StatusFlavor::Good);
    Ok(())
}

fn start_one(
    engine: &Arc<dyn ContainerEngine>,
    graph: &Arc<ContainerGraph>,
    hooks: &Arc<HookBus>,
    task: &Arc<Task>,
    network_name: &str,
    item: InstanceSnapshot,
) -> WorkerOutcome<()> {
    let _guard = NAME_LOCKS.entry_lock(item.runtime_name.clone());
    let subtask = Task::new(format!("Starting {}", item.runtime_name), task);

    match start_one_inner(engine, graph, hooks, &subtask, network_name, &item) {
        Ok(StartAction::Started) => {
            subtask.finish("Up", StatusFlavor::Good);
            WorkerOutcome::Done(Ok(()))
        }
        Ok(StartAction::Interactive(container_id)) => {
            subtask.finish("Attaching", StatusFlavor::Neutral);
            let engine = Arc::clone(engine);
            WorkerOutcome::Interactive(Box::new(move || {
                if let Err(e) = engine.start_foreground(&container_id) {
                    warn!(error = %e, "foreground container exited with an error");
                }
            }))
        }
        Err(e) => {
            subtask.finish("Failed", StatusFlavor::Bad);
            WorkerOutcome::Done(Err(e))
        }
    }
}

fn start_one_inner(
    engine: &Arc<dyn ContainerEngine>,
    graph: &Arc<ContainerGraph>,
    hooks: &Arc<HookBus>,
    task: &Arc<Task>,
    network_name: &str,
    item: &InstanceSnapshot,
) -> Result<StartAction> {
    let container = graph
        .get(&item.container_name)
        .ok_or_else(|| FtlError::config(item.container_name.clone(), "container vanished from the graph mid-run"))?;

    if container.flags.abstract_ && !item.foreground {
        return Err(FtlError::config(
            item.container_name.clone(),
            "abstract containers cannot be started in the background",
        ));
    }

    if let Some(existing) = find_by_runtime_name(engine.as_ref(), &item.runtime_name)? {
        let running = engine.inspect_container(&existing.id)?.map(|d| d.state_running).unwrap_or(false);
        if running {
            return Err(FtlError::Runtime {
                message: format!("container {} is already running", item.runtime_name),
                code: None,
                instance: Some(item.runtime_name.clone()),
            });
        }
        engine.remove_container(&existing.id)?;
    }

    hooks.fire(Hook::PreRunContainer, &HookPayload::for_instance(item.runtime_name.clone()))?;

    {
        let _net_guard = NETWORK_CREATE_LOCK.lock().unwrap();
        engine.create_network(network_name)?;
    }

    let binds = build_binds(container, &item.devmodes, engine.supports_cached_volumes(), &item.runtime_name)?;
    let ports: HashMap<u16, u16> = container.ports.values().map(|p| (*p, *p)).collect();
    let links: Vec<String> = item.link_targets.iter().map(|(alias, target)| format!("{target}:{alias}")).collect();
    let mut labels = HashMap::new();
    labels.insert(CONTAINER_IDENTITY_LABEL.to_string(), item.container_name.clone());

    let spec = CreateContainerSpec {
        name: item.runtime_name.clone(),
        image: item.image_id.clone().unwrap_or_else(|| container.tagged_image_name()),
        network: network_name.to_string(),
        network_aliases: vec![item.container_name.clone()],
        links,
        binds,
        ports,
        publish_all_ports: true,
        environment: item.environment.clone().into_iter().collect(),
        mem_limit: item.mem_limit,
        command: item.command.clone(),
        labels,
        detach: !item.foreground,
        tty: item.foreground,
        stdin_open: item.foreground,
        security_opt: vec!["seccomp:unconfined".to_string()],
        cap_add: vec!["SYS_PTRACE".to_string()],
    };

    let container_id = engine.create_container(&spec)?;

    if item.foreground {
        return Ok(StartAction::Interactive(container_id));
    }

    engine.start(&container_id)?;
    hooks.fire(Hook::PostRunContainer, &HookPayload::for_instance(item.runtime_name.clone()))?;

    run_boot_probe(engine, task, &item.runtime_name, &container_id)?;

    hooks.fire(Hook::PostRunContainerFullyStarted, &HookPayload::for_instance(item.runtime_name.clone()))?;

    for wait in &container.waits {
        run_wait(engine.as_ref(), &container_id, wait, task)?;
    }

    Ok(StartAction::Started)
}

fn run_boot_probe(engine: &Arc<dyn ContainerEngine>, task: &Arc<Task>, runtime_name: &str, container_id: &str) -> Result<()> {
    let mut probe = BootProbe::new(Arc::clone(engine), container_id.to_string());
    loop {
        match probe.status() {
            BootStatus::Done(_) => return Ok(()),
            BootStatus::Failed(message) => {
                let log_tail = engine.logs(container_id, Some(15)).unwrap_or_default();
                return Err(FtlError::ContainerBoot { instance: runtime_name.to_string(), message, log_tail });
            }
            BootStatus::InProgress(message) => {
                if let Some(message) = message {
                    task.update(Some(message), None, None);
                }
            }
        }
        std::thread::sleep(BOOT_POLL_INTERVAL);
    }
}

/// Builds the concrete check for one `WaitSpec`. Waits run against the
/// published host-port mapping, so the host here is always the local
/// machine the runner itself is on, never the container's own address.
fn build_wait<'a>(engine: &'a dyn ContainerEngine, container_id: &str, spec: &WaitSpec) -> Result<Box<dyn WaitCheck + 'a>> {
    let host = "127.0.0.1".to_string();
    let port = spec.params.get("port").and_then(|p| p.parse::<u16>().ok()).unwrap_or(0);
    let timeout = Duration::from_secs(spec.params.get("timeout").and_then(|t| t.parse().ok()).unwrap_or(1));

    match spec.kind.as_str() {
        "tcp" => Ok(Box::new(TcpWait { host, port, timeout })),
        "http" | "https" => {
            let path = spec.params.get("path").cloned().unwrap_or_else(|| "/".to_string());
            let method = spec.params.get("method").cloned().unwrap_or_else(|| "GET".to_string());
            let expected_codes = 200u16..400u16;
            if spec.kind == "https" {
                let verify_cert = spec.params.get("verify_cert").map(|v| v != "false").unwrap_or(true);
                Ok(Box::new(HttpsWait { host, port, path, method, timeout, expected_codes, verify_cert }))
            } else {
                Ok(Box::new(HttpWait { host, port, path, method, timeout, expected_codes }))
            }
        }
        "time" => {
            let seconds = spec.params.get("seconds").and_then(|s| s.parse().ok()).unwrap_or(0);
            Ok(Box::new(TimeWait::new(seconds)))
        }
        "file" => {
            let path = spec.params.get("path").cloned().unwrap_or_default();
            Ok(Box::new(FileWait {
                engine,
                container_id: container_id.to_string(),
                path,
                waiting_name: spec.params.get("name").cloned(),
            }))
        }
        other => Err(FtlError::config("wait", format!("unknown wait type: {other}"))),
    }
}

fn run_wait(engine: &dyn ContainerEngine, container_id: &str, spec: &WaitSpec, task: &Arc<Task>) -> Result<()> {
    let mut check = build_wait(engine, container_id, spec)?;
    let timeout_secs = spec.params.get("wait_timeout").and_then(|s| s.parse().ok()).unwrap_or(DEFAULT_WAIT_TIMEOUT_SECS);
    let deadline = Instant::now() + Duration::from_secs(timeout_secs);
    task.update(Some(format!("Waiting: {}", check.description())), None, None);
    loop {
        if check.ready()? {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(FtlError::ContainerBoot {
                instance: container_id.to_string(),
                message: format!("wait timed out: {}", check.description()),
                log_tail: String::new(),
            });
        }
        std::thread::sleep(Duration::from_millis(200));
    }
}

/// Boot-container resolution (the `boot: {build, run}` chart key): ancestral
/// accumulation of the sibling containers a target needs built and/or
/// running before it can itself build or run, merged build-ancestor-first so
/// a closer override wins, with `required` always winning over `optional`
/// for the same name at the same level.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootResolution {
    pub build: BTreeSet<String>,
    pub run: BTreeMap<String, bool>,
}

pub fn resolve_boot(graph: &ContainerGraph, name: &str) -> BootResolution {
    let mut resolution = BootResolution::default();
    for value in graph.get_ancestral_extra_data(name, "boot") {
        let Some(map) = value.as_mapping() else { continue };
        if let Some(seq) = map.get(serde_yaml::Value::String("build".into())).and_then(|v| v.as_sequence()) {
            for item in seq {
                if let Some(s) = item.as_str() {
                    resolution.build.insert(s.to_string());
                }
            }
        }
        match map.get(serde_yaml::Value::String("run".into())) {
            Some(serde_yaml::Value::Sequence(seq)) => {
                for item in seq {
                    if let Some(s) = item.as_str() {
                        resolution.run.entry(s.to_string()).or_insert(true);
                    }
                }
            }
            Some(serde_yaml::Value::Mapping(m)) => {
                for (k, v) in m {
                    let Some(k) = k.as_str() else { continue };
                    let required = v.as_bool().unwrap_or(true);
                    let slot = resolution.run.entry(k.to_string()).or_insert(required);
                    if required {
                        *slot = true;
                    }
                }
            }
            _ => {}
        }
    }
    resolution
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{BoundVolume, ContainerFlags};
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn snapshot(name: &str, links: &[(&str, &str)]) -> InstanceSnapshot {
        InstanceSnapshot {
            runtime_name: name.to_string(),
            container_name: name.to_string(),
            image_id: Some("sha256:abc".to_string()),
            link_targets: links.iter().map(|(a, t)| (a.to_string(), t.to_string())).collect(),
            devmodes: BTreeSet::new(),
            ports: BTreeMap::new(),
            environment: BTreeMap::new(),
            mem_limit: 0,
            command: None,
            foreground: false,
        }
    }

    #[test]
    fn compute_delta_detects_added_and_removed() {
        let mut desired = Formation::new("acme", None);
        desired.add_instance(crate::formation::Instance {
            runtime_name: "acme.web.1".to_string(),
            container_name: "web".to_string(),
            image_id: Some("sha256:new".to_string()),
            links: BTreeMap::new(),
            devmodes: BTreeSet::new(),
            ports: BTreeMap::new(),
            environment: BTreeMap::new(),
            mem_limit: 0,
            command: None,
            foreground: false,
            ip_address: None,
            port_mapping: BTreeMap::new(),
        });

        let mut actual = Formation::new("acme", None);
        actual.add_instance(crate::formation::Instance {
            runtime_name: "acme.db.1".to_string(),
            container_name: "db".to_string(),
            image_id: Some("sha256:old".to_string()),
            links: BTreeMap::new(),
            devmodes: BTreeSet::new(),
            ports: BTreeMap::new(),
            environment: BTreeMap::new(),
            mem_limit: 0,
            command: None,
            foreground: false,
            ip_address: None,
            port_mapping: BTreeMap::new(),
        });

        let delta = compute_delta(&desired, &actual);
        assert_eq!(delta.to_stop.iter().map(|i| i.runtime_name.clone()).collect::<Vec<_>>(), vec!["acme.db.1"]);
        assert_eq!(delta.to_start.iter().map(|i| i.runtime_name.clone()).collect::<Vec<_>>(), vec!["acme.web.1"]);
    }

    #[test]
    fn parallel_execute_respects_link_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let items = vec![snapshot("app", &[("db", "db")]), snapshot("db", &[])];

        let order_clone = Arc::clone(&order);
        let exec: Arc<dyn Fn(InstanceSnapshot) -> WorkerOutcome<()> + Send + Sync> = Arc::new(move |item| {
            order_clone.lock().unwrap().push(item.runtime_name.clone());
            WorkerOutcome::Done(Ok(()))
        });

        let ready = |item: &InstanceSnapshot, done: &BTreeSet<String>| {
            item.link_targets.values().all(|t| done.contains(t))
        };

        let outcome = parallel_execute(items, BTreeSet::new(), ready, exec).unwrap();
        assert!(outcome.is_none());
        assert_eq!(*order.lock().unwrap(), vec!["db".to_string(), "app".to_string()]);
    }

    #[test]
    fn parallel_execute_detects_deadlock() {
        let items = vec![snapshot("a", &[("b", "b")]), snapshot("b", &[("a", "a")])];
        let exec: Arc<dyn Fn(InstanceSnapshot) -> WorkerOutcome<()> + Send + Sync> =
            Arc::new(|_item| WorkerOutcome::Done(Ok(())));
        let ready = |item: &InstanceSnapshot, done: &BTreeSet<String>| {
            item.link_targets.values().all(|t| done.contains(t))
        };
        let err = parallel_execute(items, BTreeSet::new(), ready, exec).unwrap_err();
        assert!(matches!(err, FtlError::Deadlock(_)));
    }

    #[test]
    fn parallel_execute_surfaces_interactive_takeover() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let items = vec![snapshot("shell", &[])];
        let exec: Arc<dyn Fn(InstanceSnapshot) -> WorkerOutcome<()> + Send + Sync> = Arc::new(move |_item| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            WorkerOutcome::Interactive(Box::new(|| {}))
        });
        let ready = |_: &InstanceSnapshot, _: &BTreeSet<String>| true;
        let outcome = parallel_execute(items, BTreeSet::new(), ready, exec).unwrap();
        assert!(outcome.is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn mode_with_cache_hint_appends_once() {
        assert_eq!(mode_with_cache_hint("rw", true), "rw,cached");
        assert_eq!(mode_with_cache_hint("rw,cached", true), "rw,cached");
        assert_eq!(mode_with_cache_hint("rw", false), "rw");
    }

    #[test]
    fn resolve_bind_source_leaves_absolute_paths_alone() {
        assert_eq!(resolve_bind_source("/srv/data"), "/srv/data");
    }

    fn test_container() -> Container {
        Container {
            name: "web".to_string(),
            build_dir: "web".to_string(),
            graph_prefix: "acme".to_string(),
            image_tag: "local".to_string(),
            build_parent: "debian:bookworm".to_string(),
            build_parent_in_prefix: false,
            build_args: BTreeSet::new(),
            links: BTreeMap::new(),
            waits: Vec::new(),
            bound_volumes: BTreeMap::new(),
            named_volumes: BTreeMap::new(),
            devmodes: BTreeMap::new(),
            ports: BTreeMap::new(),
            flags: ContainerFlags::default(),
            environment: BTreeMap::new(),
            mem_limit: 0,
            extra_data: BTreeMap::new(),
        }
    }

    #[test]
    fn build_binds_rejects_missing_required_bound_volume() {
        let mut container = test_container();
        container.bound_volumes.insert(
            "/data".to_string(),
            BoundVolume { source: "/no/such/path/on/this/host".to_string(), mode: "rw".to_string(), required: true },
        );
        let err = build_binds(&container, &BTreeSet::new(), false, "acme.web.1").unwrap_err();
        assert!(matches!(err, FtlError::Runtime { .. }));
    }

    #[test]
    fn build_binds_allows_missing_optional_bound_volume() {
        let mut container = test_container();
        container.bound_volumes.insert(
            "/data".to_string(),
            BoundVolume { source: "/no/such/path/on/this/host".to_string(), mode: "rw".to_string(), required: false },
        );
        let binds = build_binds(&container, &BTreeSet::new(), false, "acme.web.1").unwrap();
        assert_eq!(binds.len(), 1);
    }
}
