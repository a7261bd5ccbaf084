//! Container graph: loads a chart directory into an immutable catalog of
//! container definitions plus the runtime/build dependency edges between them.
//!
//! Grounded on `containers/container.py` and `containers/graph.py`. The FROM/
//! ARG extraction and legacy-compat coercions (bare-list links, `extra_links`,
//! non-dict wait params) are ported line-for-line from the original parser
//! rather than redesigned, since changing their behavior would silently break
//! charts written against the old schema.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use crate::errors::{FtlError, Result};
use crate::util::dependency_sort;

pub const DEFAULT_BUILD_FILE: &str = "Dockerfile";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkSpec {
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitSpec {
    pub kind: String,
    pub params: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundVolume {
    pub source: String,
    pub mode: String,
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedVolume {
    pub source: String,
    pub mode: String,
}

pub type DevMode = BTreeMap<String, NamedVolume>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerFlags {
    pub foreground: bool,
    pub fast_kill: bool,
    pub system: bool,
    pub abstract_: bool,
}

/// An immutable container definition as loaded from the chart.
#[derive(Debug, Clone)]
pub struct Container {
    pub name: String,
    /// The on-disk subdirectory this container was loaded from. Equal to
    /// `name` unless a `versions` suffix was applied, in which case this is
    /// the shared directory name the suffixed containers all build from.
    pub build_dir: String,
    pub graph_prefix: String,
    pub image_tag: String,
    pub build_parent: String,
    pub build_parent_in_prefix: bool,
    pub build_args: BTreeSet<String>,
    pub links: BTreeMap<String, LinkSpec>,
    pub waits: Vec<WaitSpec>,
    pub bound_volumes: BTreeMap<String, BoundVolume>,
    pub named_volumes: BTreeMap<String, NamedVolume>,
    pub devmodes: BTreeMap<String, DevMode>,
    pub ports: BTreeMap<String, u16>,
    pub flags: ContainerFlags,
    pub environment: BTreeMap<String, String>,
    pub mem_limit: u64,
    pub extra_data: BTreeMap<String, serde_yaml::Value>,
}

impl Container {
    pub fn image_name(&self) -> String {
        format!("{}/{}", self.graph_prefix, self.name)
    }

    pub fn tagged_image_name(&self) -> String {
        format!("{}:{}", self.image_name(), self.image_tag)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ContainerOptions {
    pub default_boot: Option<bool>,
    pub in_profile: bool,
    pub devmodes: BTreeSet<String>,
}

/// The immutable catalog of every container in a chart plus the dependency
/// edges between them.
#[derive(Debug, Clone)]
pub struct ContainerGraph {
    pub prefix: String,
    pub registry: Option<String>,
    pub plugin_configuration: BTreeMap<String, serde_yaml::Value>,
    pub external_secrets: Option<String>,
    pub domainname: Vec<String>,
    containers: BTreeMap<String, Container>,
    runtime_deps: BTreeMap<String, BTreeSet<String>>,
    build_deps: BTreeMap<String, String>,
    options: BTreeMap<String, ContainerOptions>,
}

#[derive(Debug, Deserialize)]
struct ManifestFile {
    prefix: String,
    registry: Option<String>,
    plugin_configuration: Option<BTreeMap<String, serde_yaml::Value>>,
    external_secrets: Option<String>,
    domainname: Option<Vec<String>>,
    #[serde(flatten)]
    rest: BTreeMap<String, serde_yaml::Value>,
}

const MANIFEST_KNOWN_KEYS: &[&str] = &[
    "prefix",
    "registry",
    "plugin_configuration",
    "external_secrets",
    "domainname",
];

#[derive(Debug, Default, Deserialize)]
struct ContainerManifest {
    versions: Option<BTreeMap<String, serde_yaml::Value>>,
    links: Option<serde_yaml::Value>,
    #[serde(default)]
    extra_links: Vec<String>,
    waits: Option<Vec<serde_yaml::Value>>,
    volumes: Option<BTreeMap<String, serde_yaml::Value>>,
    devmodes: Option<BTreeMap<String, BTreeMap<String, serde_yaml::Value>>>,
    ports: Option<BTreeMap<String, u16>>,
    foreground: Option<bool>,
    fast_kill: Option<bool>,
    system: Option<bool>,
    #[serde(rename = "abstract")]
    abstract_: Option<bool>,
    environment: Option<BTreeMap<String, String>>,
    mem_limit: Option<u64>,
    image_tag: Option<String>,
    #[serde(flatten)]
    extra_data: BTreeMap<String, serde_yaml::Value>,
}

impl ContainerGraph {
    /// Loads a chart rooted at `path`: reads the top-level manifest, then
    /// walks immediate subdirectories containing a build file.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let manifest_path = path.join("ftl.yaml");
        let manifest_text = fs::read_to_string(&manifest_path).map_err(|e| {
            FtlError::config(manifest_path.display().to_string(), e.to_string())
        })?;
        let raw: serde_yaml::Value = serde_yaml::from_str(&manifest_text)
            .map_err(|e| FtlError::config(manifest_path.display().to_string(), e.to_string()))?;
        if let serde_yaml::Value::Mapping(map) = &raw {
            for key in map.keys() {
                if let Some(key) = key.as_str() {
                    if !MANIFEST_KNOWN_KEYS.contains(&key) {
                        return Err(FtlError::config(
                            manifest_path.display().to_string(),
                            format!("unknown top-level key: {key}"),
                        ));
                    }
                }
            }
        }
        let manifest: ManifestFile = serde_yaml::from_value(raw)
            .map_err(|e| FtlError::config(manifest_path.display().to_string(), e.to_string()))?;
        let _ = manifest.rest;

        let mut graph = ContainerGraph {
            prefix: manifest.prefix,
            registry: manifest.registry,
            plugin_configuration: manifest.plugin_configuration.unwrap_or_default(),
            external_secrets: manifest.external_secrets,
            domainname: manifest.domainname.unwrap_or_default(),
            containers: BTreeMap::new(),
            runtime_deps: BTreeMap::new(),
            build_deps: BTreeMap::new(),
            options: BTreeMap::new(),
        };

        if graph.prefix.is_empty() {
            return Err(FtlError::config(manifest_path.display().to_string(), "prefix must be non-empty"));
        }

        let mut entries: Vec<PathBuf> = fs::read_dir(path)
            .map_err(|e| FtlError::config(path.display().to_string(), e.to_string()))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        entries.sort();

        for dir in entries {
            let build_file = dir.join(DEFAULT_BUILD_FILE);
            if !build_file.is_file() {
                continue;
            }
            let dir_name = dir.file_name().unwrap().to_string_lossy().to_string();
            let container_manifest_path = dir.join("ftl.yaml");
            let container_manifest: ContainerManifest = if container_manifest_path.is_file() {
                let text = fs::read_to_string(&container_manifest_path)
                    .map_err(|e| FtlError::config(container_manifest_path.display().to_string(), e.to_string()))?;
                serde_yaml::from_str(&text)
                    .map_err(|e| FtlError::config(container_manifest_path.display().to_string(), e.to_string()))?
            } else {
                ContainerManifest::default()
            };

            let (from_ref, build_args) = parse_build_file(&build_file)?;

            let suffixes: Vec<Option<String>> = match &container_manifest.versions {
                Some(versions) if !versions.is_empty() => {
                    versions.keys().map(|k| Some(k.clone())).collect()
                }
                _ => vec![None],
            };

            for suffix in suffixes {
                let name = match &suffix {
                    Some(s) => format!("{dir_name}-{s}"),
                    None => dir_name.clone(),
                };
                let container = build_container(
                    &name,
                    &dir_name,
                    &graph.prefix,
                    &from_ref,
                    &build_args,
                    &container_manifest,
                )?;
                graph.options.insert(name.clone(), ContainerOptions::default());
                graph.containers.insert(name.clone(), container);
            }
        }

        graph.compute_build_edges();
        graph.compute_runtime_edges()?;
        graph.apply_inheritance();
        Ok(graph)
    }

    fn compute_build_edges(&mut self) {
        for (name, container) in &self.containers {
            if container.build_parent_in_prefix {
                let parent_image = container.build_parent.clone();
                let parent_name = parent_image
                    .rsplit_once('/')
                    .map(|(_, n)| n.to_string())
                    .unwrap_or(parent_image);
                let parent_name = parent_name.split(':').next().unwrap_or(&parent_name).to_string();
                if self.containers.contains_key(&parent_name) {
                    self.build_deps.insert(name.clone(), parent_name);
                }
            }
        }
    }

    fn compute_runtime_edges(&mut self) -> Result<()> {
        for (name, container) in &self.containers {
            let mut deps = BTreeSet::new();
            for (link_name, spec) in &container.links {
                if !spec.required {
                    continue;
                }
                if !self.containers.contains_key(link_name) {
                    return Err(FtlError::config(
                        name.clone(),
                        format!("required link target not found in graph: {link_name}"),
                    ));
                }
                deps.insert(link_name.clone());
            }
            self.runtime_deps.insert(name.clone(), deps);
        }
        Ok(())
    }

    fn apply_inheritance(&mut self) {
        let names: Vec<String> = self.containers.keys().cloned().collect();
        for name in names {
            let ancestry = self.build_ancestry(&name);
            if ancestry.is_empty() {
                continue;
            }
            let mut bound = BTreeMap::new();
            let mut named = BTreeMap::new();
            let mut devmodes = BTreeMap::new();
            for ancestor_name in &ancestry {
                if let Some(ancestor) = self.containers.get(ancestor_name) {
                    bound.extend(ancestor.bound_volumes.clone());
                    named.extend(ancestor.named_volumes.clone());
                    devmodes.extend(ancestor.devmodes.clone());
                }
            }
            if let Some(container) = self.containers.get_mut(&name) {
                let mut merged_bound = bound;
                merged_bound.extend(container.bound_volumes.clone());
                container.bound_volumes = merged_bound;

                let mut merged_named = named;
                merged_named.extend(container.named_volumes.clone());
                container.named_volumes = merged_named;

                let mut merged_devmodes = devmodes;
                merged_devmodes.extend(container.devmodes.clone());
                container.devmodes = merged_devmodes;
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Container> {
        self.containers.get(name)
    }

    pub fn containers(&self) -> impl Iterator<Item = &Container> {
        self.containers.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.containers.keys()
    }

    pub fn dependencies(&self, name: &str) -> BTreeSet<String> {
        self.runtime_deps.get(name).cloned().unwrap_or_default()
    }

    pub fn dependents(&self, name: &str) -> BTreeSet<String> {
        self.runtime_deps
            .iter()
            .filter(|(_, deps)| deps.contains(name))
            .map(|(n, _)| n.clone())
            .collect()
    }

    pub fn build_parent(&self, name: &str) -> Option<&String> {
        self.build_deps.get(name)
    }

    /// Ordered list from furthest ancestor down to immediate parent, excluding `name` itself.
    pub fn build_ancestry(&self, name: &str) -> Vec<String> {
        let mut chain = Vec::new();
        let mut current = name.to_string();
        while let Some(parent) = self.build_deps.get(&current) {
            chain.push(parent.clone());
            current = parent.clone();
        }
        chain.reverse();
        chain
    }

    pub fn set_dependencies(&mut self, name: &str, providers: BTreeSet<String>) {
        self.runtime_deps.insert(name.to_string(), providers);
    }

    pub fn discard_dependency(&mut self, name: &str, dependency: &str) {
        if let Some(deps) = self.runtime_deps.get_mut(name) {
            deps.remove(dependency);
        }
    }

    pub fn devmode_names(&self) -> BTreeSet<String> {
        self.containers
            .values()
            .flat_map(|c| c.devmodes.keys().cloned())
            .collect()
    }

    pub fn options(&self, name: &str) -> Option<&ContainerOptions> {
        self.options.get(name)
    }

    pub fn set_option(&mut self, name: &str, options: ContainerOptions) {
        self.options.insert(name.to_string(), options);
    }

    pub fn set_container_ports(&mut self, name: &str, ports: BTreeMap<String, u16>) {
        if let Some(container) = self.containers.get_mut(name) {
            container.ports = ports;
        }
    }

    pub fn set_container_image_tag(&mut self, name: &str, tag: String) {
        if let Some(container) = self.containers.get_mut(name) {
            container.image_tag = tag;
        }
    }

    pub fn merge_container_environment(&mut self, name: &str, environment: BTreeMap<String, String>) {
        if let Some(container) = self.containers.get_mut(name) {
            container.environment.extend(environment);
        }
    }

    pub fn set_container_mem_limit(&mut self, name: &str, mem_limit: u64) {
        if let Some(container) = self.containers.get_mut(name) {
            container.mem_limit = mem_limit;
        }
    }

    /// Ancestral extra-data lookup: walks build ancestry top-down (furthest
    /// ancestor first), then `name` itself, collecting `extra_data[key]` where present.
    pub fn get_ancestral_extra_data(&self, name: &str, key: &str) -> Vec<serde_yaml::Value> {
        let mut chain = self.build_ancestry(name);
        chain.push(name.to_string());
        chain
            .into_iter()
            .filter_map(|n| self.containers.get(&n).and_then(|c| c.extra_data.get(key).cloned()))
            .collect()
    }

    /// Topologically orders `names` and their runtime dependency closure, leaves first.
    pub fn runtime_dependency_order(&self, names: Vec<String>) -> Result<Vec<String>> {
        let deps = self.runtime_deps.clone();
        dependency_sort(names, move |n| {
            deps.get(n).map(|s| s.iter().cloned().collect()).unwrap_or_default()
        })
    }
}

fn build_container(
    name: &str,
    build_dir: &str,
    prefix: &str,
    from_ref: &str,
    build_args: &BTreeSet<String>,
    manifest: &ContainerManifest,
) -> Result<Container> {
    let (build_parent, build_parent_in_prefix) = rewrite_from_ref(from_ref, prefix);

    let mut links = BTreeMap::new();
    match &manifest.links {
        Some(serde_yaml::Value::Sequence(seq)) => {
            for item in seq {
                if let Some(s) = item.as_str() {
                    links.insert(s.to_string(), LinkSpec { required: true });
                }
            }
        }
        Some(serde_yaml::Value::Mapping(map)) => {
            for (k, v) in map {
                if let Some(k) = k.as_str() {
                    let required = v
                        .as_mapping()
                        .and_then(|m| m.get(serde_yaml::Value::String("required".into())))
                        .and_then(|r| r.as_bool())
                        .unwrap_or(true);
                    links.insert(k.to_string(), LinkSpec { required });
                }
            }
        }
        _ => {}
    }
    if !manifest.extra_links.is_empty() {
        warn!(container = name, "extra_links is deprecated; prefer links");
        for link in &manifest.extra_links {
            links.entry(link.clone()).or_insert(LinkSpec { required: false });
        }
    }

    let mut waits = Vec::new();
    if let Some(raw_waits) = &manifest.waits {
        for w in raw_waits {
            if let Some(map) = w.as_mapping() {
                // `- tcp: {port: 5432}` — the single key is the wait type, its
                // value is either a params mapping or a bare scalar.
                if let Some((kind_value, params_value)) = map.iter().next() {
                    let kind = kind_value.as_str().unwrap_or_default().to_string();
                    let params = coerce_wait_params(&kind, params_value);
                    waits.push(WaitSpec { kind, params });
                }
            }
        }
    }

    let mut bound_volumes = BTreeMap::new();
    let mut named_volumes = BTreeMap::new();
    for (path, v) in manifest.volumes.clone().unwrap_or_default() {
        let (source, mode, required) = volume_source_mode_required(&v);
        let Some(source) = source else { continue };
        // A named-volume source is a bare name; a bind-mount source is a
        // host-absolute path. The original splits on the presence of `/`.
        if source.contains('/') {
            bound_volumes.insert(path, BoundVolume { source, mode, required });
        } else {
            named_volumes.insert(path, NamedVolume { source, mode });
        }
    }

    let devmodes = manifest
        .devmodes
        .clone()
        .unwrap_or_default()
        .into_iter()
        .map(|(dev_name, mounts)| {
            let dev = mounts
                .into_iter()
                .filter_map(|(path, v)| Some((path, named_volume_from_value(&v)?)))
                .collect();
            (dev_name, dev)
        })
        .collect();

    Ok(Container {
        name: name.to_string(),
        build_dir: build_dir.to_string(),
        graph_prefix: prefix.to_string(),
        image_tag: manifest.image_tag.clone().unwrap_or_else(|| "local".to_string()),
        build_parent,
        build_parent_in_prefix,
        build_args: build_args.clone(),
        links,
        waits,
        bound_volumes,
        named_volumes,
        devmodes,
        ports: manifest.ports.clone().unwrap_or_default(),
        flags: ContainerFlags {
            foreground: manifest.foreground.unwrap_or(false),
            fast_kill: manifest.fast_kill.unwrap_or(false),
            system: manifest.system.unwrap_or(false),
            abstract_: manifest.abstract_.unwrap_or(false),
        },
        environment: manifest.environment.clone().unwrap_or_default(),
        mem_limit: manifest.mem_limit.unwrap_or(0),
        extra_data: manifest.extra_data.clone(),
    })
}

/// A volume/devmode mount value is either a bare source string or a
/// `{source, mode, required}` mapping (§6 chart schema).
fn named_volume_from_value(value: &serde_yaml::Value) -> Option<NamedVolume> {
    if let Some(source) = value.as_str() {
        return Some(NamedVolume { source: source.to_string(), mode: "rw".to_string() });
    }
    let map = value.as_mapping()?;
    Some(NamedVolume {
        source: map.get(serde_yaml::Value::String("source".into()))?.as_str()?.to_string(),
        mode: map
            .get(serde_yaml::Value::String("mode".into()))
            .and_then(|m| m.as_str())
            .unwrap_or("rw")
            .to_string(),
    })
}

/// Splits a `volumes` entry into `(source, mode, required)`; `required`
/// defaults to `true` and is only meaningful for bind-mounted (bound) volumes.
fn volume_source_mode_required(value: &serde_yaml::Value) -> (Option<String>, String, bool) {
    if let Some(source) = value.as_str() {
        return (Some(source.to_string()), "rw".to_string(), true);
    }
    let Some(map) = value.as_mapping() else { return (None, "rw".to_string(), true) };
    let source = map
        .get(serde_yaml::Value::String("source".into()))
        .and_then(|s| s.as_str())
        .map(|s| s.to_string());
    let mode = map
        .get(serde_yaml::Value::String("mode".into()))
        .and_then(|m| m.as_str())
        .unwrap_or("rw")
        .to_string();
    let required = map
        .get(serde_yaml::Value::String("required".into()))
        .and_then(|r| r.as_bool())
        .unwrap_or(true);
    (source, mode, required)
}

/// Legacy compat: a bare (non-mapping) wait value is assumed to be a plain
/// number — `seconds` for a `time` wait, `port` for everything else — rather
/// than the `{key: value, ...}` params mapping the schema otherwise expects.
fn coerce_wait_params(kind: &str, value: &serde_yaml::Value) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    if let Some(map) = value.as_mapping() {
        for (k, v) in map {
            let Some(key) = k.as_str() else { continue };
            let value_str = match v {
                serde_yaml::Value::String(s) => s.clone(),
                serde_yaml::Value::Number(n) => n.to_string(),
                serde_yaml::Value::Bool(b) => b.to_string(),
                _ => continue,
            };
            params.insert(key.to_string(), value_str);
        }
    } else if let Some(n) = value.as_i64() {
        let key = if kind == "time" { "seconds" } else { "port" };
        params.insert(key.to_string(), n.to_string());
    }
    params
}

/// Rewrites a `FROM` target whose name falls inside the graph prefix,
/// replacing `:` with `-` (legacy compat: in-prefix images never carried a
/// version colon, so a colon there always meant a build variant suffix).
fn rewrite_from_ref(from_ref: &str, prefix: &str) -> (String, bool) {
    if let Some(rest) = from_ref.strip_prefix(&format!("{prefix}/")) {
        if rest.contains(':') {
            let rewritten = format!("{prefix}/{}", rest.replace(':', "-"));
            return (rewritten, true);
        }
        return (from_ref.to_string(), true);
    }
    (from_ref.to_string(), false)
}

fn parse_build_file(path: &Path) -> Result<(String, BTreeSet<String>)> {
    let text = fs::read_to_string(path).map_err(|e| FtlError::config(path.display().to_string(), e.to_string()))?;
    let mut from_ref = None;
    let mut args = BTreeSet::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("FROM ") {
            let target = rest.split_whitespace().next().unwrap_or("").to_string();
            if from_ref.is_none() {
                from_ref = Some(target);
            }
        } else if let Some(rest) = trimmed.strip_prefix("ARG ") {
            let name = rest.split('=').next().unwrap_or("").trim().to_string();
            if !name.is_empty() {
                args.insert(name);
            }
        }
    }
    let from_ref = from_ref
        .ok_or_else(|| FtlError::config(path.display().to_string(), "no FROM line found in build file"))?;
    Ok((from_ref, args))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_chart(dir: &Path, prefix: &str) {
        fs::write(dir.join("ftl.yaml"), format!("prefix: {prefix}\n")).unwrap();
        let web = dir.join("web");
        fs::create_dir_all(&web).unwrap();
        fs::write(web.join("Dockerfile"), format!("FROM {prefix}/base\nARG VERSION\n")).unwrap();
        fs::write(
            web.join("ftl.yaml"),
            "links:\n  db:\n    required: true\n",
        )
        .unwrap();
        let base = dir.join("base");
        fs::create_dir_all(&base).unwrap();
        fs::write(base.join("Dockerfile"), "FROM debian:bookworm\n").unwrap();
        let db = dir.join("db");
        fs::create_dir_all(&db).unwrap();
        fs::write(db.join("Dockerfile"), format!("FROM {prefix}/base\n")).unwrap();
    }

    #[test]
    fn loads_containers_and_build_edges() {
        let tmp = tempfile::tempdir().unwrap();
        write_chart(tmp.path(), "acme");
        let graph = ContainerGraph::load(tmp.path()).unwrap();
        assert_eq!(graph.prefix, "acme");
        assert!(graph.get("web").is_some());
        assert_eq!(graph.build_parent("web"), Some(&"base".to_string()));
        assert_eq!(graph.dependencies("web"), BTreeSet::from(["db".to_string()]));
    }

    #[test]
    fn missing_required_link_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("ftl.yaml"), "prefix: acme\n").unwrap();
        let web = tmp.path().join("web");
        fs::create_dir_all(&web).unwrap();
        fs::write(web.join("Dockerfile"), "FROM debian:bookworm\n").unwrap();
        fs::write(web.join("ftl.yaml"), "links:\n  missing:\n    required: true\n").unwrap();
        let err = ContainerGraph::load(tmp.path()).unwrap_err();
        assert!(matches!(err, FtlError::Config { .. }));
    }

    #[test]
    fn empty_prefix_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("ftl.yaml"), "prefix: \"\"\n").unwrap();
        let err = ContainerGraph::load(tmp.path()).unwrap_err();
        assert!(matches!(err, FtlError::Config { .. }));
    }

    #[test]
    fn image_tag_defaults_to_local_sentinel() {
        let tmp = tempfile::tempdir().unwrap();
        write_chart(tmp.path(), "acme");
        let graph = ContainerGraph::load(tmp.path()).unwrap();
        assert_eq!(graph.get("web").unwrap().image_tag, "local");
    }

    #[test]
    fn waits_are_keyed_by_type() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("ftl.yaml"), "prefix: acme\n").unwrap();
        let web = tmp.path().join("web");
        fs::create_dir_all(&web).unwrap();
        fs::write(web.join("Dockerfile"), "FROM debian:bookworm\n").unwrap();
        fs::write(
            web.join("ftl.yaml"),
            "waits:\n  - tcp:\n      port: 5432\n  - time: 5\n",
        )
        .unwrap();
        let graph = ContainerGraph::load(tmp.path()).unwrap();
        let waits = &graph.get("web").unwrap().waits;
        assert_eq!(waits.len(), 2);
        assert_eq!(waits[0].kind, "tcp");
        assert_eq!(waits[0].params.get("port"), Some(&"5432".to_string()));
        assert_eq!(waits[1].kind, "time");
        assert_eq!(waits[1].params.get("seconds"), Some(&"5".to_string()));
    }

    #[test]
    fn volumes_split_into_bound_and_named_by_source_shape() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("ftl.yaml"), "prefix: acme\n").unwrap();
        let web = tmp.path().join("web");
        fs::create_dir_all(&web).unwrap();
        fs::write(web.join("Dockerfile"), "FROM debian:bookworm\n").unwrap();
        fs::write(
            web.join("ftl.yaml"),
            "volumes:\n  /data: /host/data\n  /cache: cache-volume\n  /opt/app:\n    source: /host/app\n    mode: ro\n    required: false\n",
        )
        .unwrap();
        let graph = ContainerGraph::load(tmp.path()).unwrap();
        let container = graph.get("web").unwrap();
        assert_eq!(container.bound_volumes.get("/data").unwrap().source, "/host/data");
        assert_eq!(container.named_volumes.get("/cache").unwrap().source, "cache-volume");
        let app = container.bound_volumes.get("/opt/app").unwrap();
        assert_eq!(app.mode, "ro");
        assert!(!app.required);
    }
}
