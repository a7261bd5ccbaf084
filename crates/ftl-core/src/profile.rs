//! Profile stack: named overlays applied on top of a loaded container graph.
//!
//! Grounded on `containers/profile.py`. Profiles form a linked list through
//! `parent_profile`; `ProfileStack::apply` walks that chain from the oldest
//! ancestor down so that more specific (later, closer to the user) profiles
//! win ties.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::errors::{FtlError, Result};
use crate::graph::{ContainerGraph, ContainerOptions};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LinkOverride {
    #[serde(default)]
    pub required: BTreeSet<String>,
    #[serde(default)]
    pub optional: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ContainerOverride {
    #[serde(default)]
    pub links: LinkOverride,
    #[serde(default)]
    pub devmodes: BTreeSet<String>,
    #[serde(default)]
    pub ports: BTreeMap<String, serde_yaml::Value>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    #[serde(default)]
    pub ephemeral: bool,
    pub default_boot: Option<bool>,
    pub mem_limit: Option<u64>,
    pub image_tag: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct RawProfile {
    inherits: Option<String>,
    name: Option<String>,
    description: Option<String>,
    #[serde(rename = "min-version")]
    min_version: Option<String>,
    #[serde(rename = "ignore-dependencies", default)]
    ignore_dependencies: bool,
    #[serde(default)]
    containers: BTreeMap<String, RawContainerOverride>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
struct RawContainerOverride {
    #[serde(default)]
    links: Option<serde_yaml::Value>,
    #[serde(default)]
    ignore_links: Vec<String>,
    #[serde(default)]
    extra_links: Vec<String>,
    #[serde(default)]
    devmodes: BTreeSet<String>,
    #[serde(default)]
    ports: BTreeMap<String, serde_yaml::Value>,
    #[serde(default)]
    environment: BTreeMap<String, String>,
    #[serde(default)]
    ephemeral: bool,
    default_boot: Option<bool>,
    mem_limit: Option<u64>,
    image_tag: Option<String>,
}

/// One overlay in the chain. Carries `compatibility`, true only for the
/// top-of-chain profile loaded from the charts directory (never for the
/// innermost user profile), which governs the `default_boot` fallback rule.
#[derive(Debug, Clone, Default)]
pub struct Profile {
    pub name: Option<String>,
    pub description: Option<String>,
    pub min_version: Option<String>,
    pub ignore_dependencies: bool,
    pub compatibility: bool,
    pub containers: BTreeMap<String, ContainerOverride>,
}

impl Profile {
    /// Parses a profile file, merging the legacy `ignore_links`/`extra_links`
    /// per-container keys into `links.optional`/`links.required` verbatim.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| FtlError::config(path.display().to_string(), e.to_string()))?;
        let raw: RawProfile = serde_yaml::from_str(&text)
            .map_err(|e| FtlError::config(path.display().to_string(), e.to_string()))?;

        let mut containers = BTreeMap::new();
        for (name, raw_override) in raw.containers {
            let mut link_override = LinkOverride::default();
            match &raw_override.links {
                Some(serde_yaml::Value::Sequence(seq)) => {
                    for item in seq {
                        if let Some(s) = item.as_str() {
                            link_override.required.insert(s.to_string());
                        }
                    }
                }
                Some(serde_yaml::Value::Mapping(map)) => {
                    if let Some(req) = map.get(serde_yaml::Value::String("required".into())) {
                        if let Some(seq) = req.as_sequence() {
                            for item in seq {
                                if let Some(s) = item.as_str() {
                                    link_override.required.insert(s.to_string());
                                }
                            }
                        }
                    }
                    if let Some(opt) = map.get(serde_yaml::Value::String("optional".into())) {
                        if let Some(seq) = opt.as_sequence() {
                            for item in seq {
                                if let Some(s) = item.as_str() {
                                    link_override.optional.insert(s.to_string());
                                }
                            }
                        }
                    }
                }
                _ => {}
            }
            for link in raw_override.ignore_links {
                link_override.optional.insert(link);
            }
            for link in raw_override.extra_links {
                link_override.required.insert(link);
            }

            containers.insert(
                name,
                ContainerOverride {
                    links: link_override,
                    devmodes: raw_override.devmodes,
                    ports: raw_override.ports,
                    environment: raw_override.environment,
                    ephemeral: raw_override.ephemeral,
                    default_boot: raw_override.default_boot,
                    mem_limit: raw_override.mem_limit,
                    image_tag: raw_override.image_tag,
                },
            );
        }

        Ok(Profile {
            name: raw.name,
            description: raw.description,
            min_version: raw.min_version,
            ignore_dependencies: raw.ignore_dependencies,
            compatibility: false,
            containers,
        })
    }

    /// Serializes user-profile overrides: sorts sets, drops ephemeral
    /// containers, and round-trips `environment`/`ports`/`default_boot` when
    /// populated (see DESIGN.md for why this departs from a one-way dump).
    pub fn dump(&self) -> Result<String> {
        let mut raw = RawProfile {
            inherits: None,
            name: self.name.clone(),
            description: self.description.clone(),
            min_version: self.min_version.clone(),
            ignore_dependencies: self.ignore_dependencies,
            containers: BTreeMap::new(),
        };
        for (name, c_override) in &self.containers {
            if c_override.ephemeral {
                continue;
            }
            raw.containers.insert(
                name.clone(),
                RawContainerOverride {
                    links: Some(serde_yaml::to_value(&serde_json_like_links(&c_override.links)).unwrap()),
                    ignore_links: Vec::new(),
                    extra_links: Vec::new(),
                    devmodes: c_override.devmodes.clone(),
                    ports: c_override.ports.clone(),
                    environment: c_override.environment.clone(),
                    ephemeral: false,
                    default_boot: c_override.default_boot,
                    mem_limit: c_override.mem_limit,
                    image_tag: c_override.image_tag.clone(),
                },
            );
        }
        serde_yaml::to_string(&raw).map_err(|e| FtlError::config("profile".to_string(), e.to_string()))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let text = self.dump()?;
        fs::write(path, text).map_err(FtlError::from)
    }
}

fn serde_json_like_links(links: &LinkOverride) -> BTreeMap<String, Vec<String>> {
    let mut out = BTreeMap::new();
    out.insert("required".to_string(), links.required.iter().cloned().collect());
    out.insert("optional".to_string(), links.optional.iter().cloned().collect());
    out
}

/// An empty profile that never overrides anything; `save` refuses to write.
pub struct NullProfile;

impl NullProfile {
    pub fn apply(&self, _graph: &mut ContainerGraph) -> Result<()> {
        Ok(())
    }

    pub fn calculate_links(&self, _graph: &ContainerGraph, _name: &str) -> BTreeSet<String> {
        BTreeSet::new()
    }

    pub fn save(&self, _path: impl AsRef<Path>) -> Result<()> {
        Err(FtlError::config("profile".to_string(), "cannot save the null profile"))
    }
}

/// The chain of profiles from innermost (user) to outermost (top-of-chain
/// compatibility profile), in load order.
pub struct ProfileStack {
    chain: Vec<Profile>,
}

impl ProfileStack {
    /// Builds a stack from an already-ordered chain (innermost first) and
    /// marks the last entry as the top-of-chain compatibility profile.
    /// Prefer [`ProfileStack::build`] when a user override is involved: it
    /// keeps the "never mark the user profile compatible" rule explicit
    /// instead of relying on call-site ordering.
    pub fn new(mut chain: Vec<Profile>) -> Self {
        if let Some(top) = chain.last_mut() {
            top.compatibility = true;
        }
        ProfileStack { chain }
    }

    /// Builds a stack from the named-profile inheritance chain (`ancestors`,
    /// closest-to-the-user first, outermost ancestor last) plus an optional
    /// user override applied after all of them. Only the outermost named
    /// ancestor is ever marked `compatibility`; the user override never is,
    /// even when no named profile was selected at all.
    pub fn build(mut ancestors: Vec<Profile>, user_override: Option<Profile>) -> Self {
        if let Some(top) = ancestors.last_mut() {
            top.compatibility = true;
        }
        let mut chain = Vec::with_capacity(ancestors.len() + 1);
        if let Some(user) = user_override {
            chain.push(user);
        }
        chain.extend(ancestors);
        ProfileStack { chain }
    }

    /// Applies every profile in the chain, in reverse (outermost/top-level
    /// ancestor first), to `graph`.
    pub fn apply(&self, graph: &mut ContainerGraph) -> Result<()> {
        for profile in self.chain.iter().rev() {
            for (name, c_override) in &profile.containers {
                let Some(container) = graph.get(name) else {
                    continue;
                };
                let current_deps = graph.dependencies(name);
                let container_links: BTreeSet<String> = container.links.keys().cloned().collect();

                for link_name in c_override.links.required.iter().chain(c_override.links.optional.iter()) {
                    if !container_links.contains(link_name) {
                        return Err(FtlError::config(
                            name.clone(),
                            format!("profile references unknown link: {link_name}"),
                        ));
                    }
                }

                if !c_override.links.required.is_empty() || !c_override.links.optional.is_empty() {
                    let desired: BTreeSet<String> = container_links
                        .iter()
                        .filter(|link_name| {
                            (current_deps.contains(*link_name) && !c_override.links.optional.contains(*link_name))
                                || c_override.links.required.contains(*link_name)
                        })
                        .cloned()
                        .collect();
                    graph.set_dependencies(name, desired);
                }

                let mut options = graph.options(name).cloned().unwrap_or_default();
                options.in_profile = profile.compatibility;
                options.default_boot = match c_override.default_boot {
                    Some(explicit) => Some(explicit),
                    None if profile.compatibility => Some(!container.flags.foreground),
                    None => options.default_boot,
                };
                options.devmodes = c_override.devmodes.clone();
                graph.set_option(name, options);

                if !c_override.ports.is_empty() {
                    let mut ports = container.ports.clone();
                    for (port, value) in &c_override.ports {
                        let coerced = match value {
                            serde_yaml::Value::Number(n) => n.as_u64(),
                            serde_yaml::Value::String(s) => s.parse::<u64>().ok(),
                            _ => None,
                        };
                        let Some(coerced) = coerced else {
                            return Err(FtlError::config(
                                name.clone(),
                                format!("non-numeric port override for {port}"),
                            ));
                        };
                        ports.insert(port.clone(), coerced as u16);
                    }
                    graph.set_container_ports(name, ports);
                }

                if let Some(tag) = &c_override.image_tag {
                    graph.set_container_image_tag(name, tag.clone());
                }
                if !c_override.environment.is_empty() {
                    graph.merge_container_environment(name, c_override.environment.clone());
                }
                if let Some(mem_limit) = c_override.mem_limit {
                    graph.set_container_mem_limit(name, mem_limit);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_load_merges_legacy_ignore_links() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        fs::write(
            tmp.path(),
            "containers:\n  web:\n    ignore_links:\n      - db\n",
        )
        .unwrap();
        let profile = Profile::load(tmp.path()).unwrap();
        let web = profile.containers.get("web").unwrap();
        assert!(web.links.optional.contains("db"));
    }

    #[test]
    fn profile_ephemeral_dropped_on_dump() {
        let mut profile = Profile::default();
        profile.containers.insert(
            "scratch".to_string(),
            ContainerOverride {
                ephemeral: true,
                ..Default::default()
            },
        );
        let dumped = profile.dump().unwrap();
        assert!(!dumped.contains("scratch"));
    }

    #[test]
    fn build_marks_only_the_outermost_ancestor_compatible() {
        let inner = Profile { name: Some("inner".into()), ..Default::default() };
        let outer = Profile { name: Some("outer".into()), ..Default::default() };
        let user = Profile { name: Some("user".into()), ..Default::default() };

        let stack = ProfileStack::build(vec![inner, outer], Some(user));

        assert_eq!(stack.chain.len(), 3);
        assert_eq!(stack.chain[0].name.as_deref(), Some("user"));
        assert!(!stack.chain[0].compatibility);
        assert_eq!(stack.chain[1].name.as_deref(), Some("inner"));
        assert!(!stack.chain[1].compatibility);
        assert_eq!(stack.chain[2].name.as_deref(), Some("outer"));
        assert!(stack.chain[2].compatibility);
    }

    #[test]
    fn build_never_marks_a_lone_user_override_compatible() {
        let user = Profile { name: Some("user".into()), ..Default::default() };
        let stack = ProfileStack::build(Vec::new(), Some(user));

        assert_eq!(stack.chain.len(), 1);
        assert!(!stack.chain[0].compatibility);
    }
}
