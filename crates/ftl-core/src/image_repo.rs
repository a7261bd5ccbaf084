//! Image repository: local image identity lookups plus remote pull/push
//! through a pluggable registry handler.
//!
//! Grounded on `docker/images.py`. `pull_image_version` keeps the original's
//! "skip if already present locally, unless tag is latest" optimization, the
//! retry-up-to-3-times-on-credential-failure loop, and dual-tagging the pulled
//! image as both its requested tag and `latest`.

use std::sync::Arc;
use std::time::Instant;

use tracing::{instrument, warn};

use crate::engine::{ContainerEngine, ProgressEvent};
use crate::errors::{FtlError, Result};
use crate::task_tree::{StatusFlavor, Task};

const MAX_PULL_ATTEMPTS: u32 = 3;

/// The `{url, login, logout}` capability a registry plugin exposes. Concrete
/// handlers (ECR, etc.) stay out of core as a non-goal; only the trait and
/// the trivial `PlainRegistryHandler` live here.
pub trait RegistryHandler: Send + Sync {
    fn url(&self) -> Option<String>;
    fn login(&self) -> Result<()> {
        Ok(())
    }
    fn logout(&self) -> Result<()> {
        Ok(())
    }
}

/// A registry handler that always returns the configured URL verbatim and
/// needs no login step, mirroring `BasicRegistryHandler`.
pub struct PlainRegistryHandler {
    url: String,
}

impl PlainRegistryHandler {
    pub fn new(url: impl Into<String>) -> Self {
        PlainRegistryHandler { url: url.into() }
    }
}

impl RegistryHandler for PlainRegistryHandler {
    fn url(&self) -> Option<String> {
        Some(self.url.clone())
    }
}

pub struct ImageRepository {
    engine: Arc<dyn ContainerEngine>,
    registry: Option<Arc<dyn RegistryHandler>>,
}

impl ImageRepository {
    pub fn new(engine: Arc<dyn ContainerEngine>, registry: Option<Arc<dyn RegistryHandler>>) -> Self {
        ImageRepository { engine, registry }
    }

    /// Resolves `{image_name}:{image_tag}` to its local digest. `"local"` is
    /// coerced to `"latest"` before lookup.
    #[instrument(skip(self))]
    pub fn image_version(&self, image_name: &str, image_tag: &str, ignore_not_found: bool) -> Result<Option<String>> {
        let tag = if image_tag == "local" { "latest" } else { image_tag };
        match self.engine.inspect_image(&format!("{image_name}:{tag}"))? {
            Some(id) => Ok(Some(id)),
            None if ignore_not_found => Ok(None),
            None => Err(FtlError::ImageNotFound {
                image: image_name.to_string(),
                tag: image_tag.to_string(),
                container: None,
            }),
        }
    }

    /// Pulls `image_name:image_tag` from the registry unless it's already
    /// present locally (and the tag isn't `latest`, which always re-checks).
    /// Dual-tags the pulled layer as both `image_tag` and `latest`.
    #[instrument(skip(self, parent_task))]
    pub fn pull_image_version(
        &mut self,
        image_name: &str,
        image_tag: &str,
        parent_task: &Arc<Task>,
        fail_silently: bool,
    ) -> Result<()> {
        if image_tag == "local" {
            return if fail_silently {
                Ok(())
            } else {
                Err(FtlError::ImagePull {
                    remote_name: image_name.to_string(),
                    image_tag: image_tag.to_string(),
                    cause: "cannot pull a local image".to_string(),
                })
            };
        }

        if image_tag != "latest" && self.image_version(image_name, image_tag, true)?.is_some() {
            return Ok(());
        }

        let Some(registry_url) = self.registry.as_ref().and_then(|r| r.url()) else {
            return if fail_silently {
                Ok(())
            } else {
                Err(FtlError::ImagePull {
                    remote_name: image_name.to_string(),
                    image_tag: image_tag.to_string(),
                    cause: "no registry configured".to_string(),
                })
            };
        };

        let remote_name = format!("{registry_url}{image_name}");
        let task = Task::new(format!("Pulling remote image {image_name}: {image_tag}"), parent_task);
        let start = Instant::now();

        let result = self.pull_with_retry(&remote_name, image_tag, &task, 0);
        match result {
            Ok(()) => {
                let elapsed = start.elapsed();
                task.finish(format!("Done [{}s]", elapsed.as_secs()), StatusFlavor::Good);
                self.engine.tag(&format!("{remote_name}:{image_tag}"), &format!("{image_name}:{image_tag}"))?;
                self.engine.tag(&format!("{remote_name}:{image_tag}"), &format!("{image_name}:latest"))?;
                Ok(())
            }
            Err(e) if fail_silently => {
                task.finish("Failed", StatusFlavor::Warning);
                warn!(error = %e, "pull failed, continuing silently");
                Ok(())
            }
            Err(e) => {
                task.finish("Failed", StatusFlavor::Warning);
                Err(e)
            }
        }
    }

    fn pull_with_retry(&mut self, remote_name: &str, image_tag: &str, task: &Arc<Task>, attempt: u32) -> Result<()> {
        if attempt >= MAX_PULL_ATTEMPTS {
            task.update(Some("Too many failures while pulling".into()), Some(StatusFlavor::Warning), None);
            return Err(FtlError::ImagePull {
                remote_name: remote_name.to_string(),
                image_tag: image_tag.to_string(),
                cause: "too many failures while pulling".to_string(),
            });
        }

        let stream = self.engine.pull(&format!("{remote_name}:{image_tag}"))?;
        let mut current_by_layer: std::collections::HashMap<String, (u64, u64)> = std::collections::HashMap::new();

        for event in stream {
            match event {
                ProgressEvent::Error(message) => {
                    if message.to_lowercase().contains("credentials") {
                        if let Some(registry) = &self.registry {
                            registry.login()?;
                        }
                        return self.pull_with_retry(remote_name, image_tag, task, attempt + 1);
                    }
                    task.update(Some("Not found".into()), Some(StatusFlavor::Warning), None);
                    return Err(FtlError::ImagePull {
                        remote_name: remote_name.to_string(),
                        image_tag: image_tag.to_string(),
                        cause: message,
                    });
                }
                ProgressEvent::Status { layer: Some(layer), status, current, total } => {
                    if status.to_lowercase() == "downloading" {
                        current_by_layer.insert(layer, (current, total));
                    } else if status.to_lowercase().contains("complete") {
                        if let Some(entry) = current_by_layer.get_mut(&layer) {
                            entry.0 = entry.1;
                        }
                    }
                    if !current_by_layer.is_empty() {
                        let total_current: u64 = current_by_layer.values().map(|(c, _)| c).sum();
                        let total_total: u64 = current_by_layer.values().map(|(_, t)| t).sum();
                        task.update(None, None, Some((total_current, total_total)));
                        task.set_extra_info(vec![format!(
                            "{} / {}",
                            crate::util::file_size(total_current, false),
                            crate::util::file_size(total_total, false)
                        )]);
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Pushes `{image_name}:latest` up as `{remote_name}:{image_tag}`, tagging
    /// and streaming progress identically to pull.
    #[instrument(skip(self, parent_task))]
    pub fn push_image_version(&self, image_name: &str, image_tag: &str, parent_task: &Arc<Task>) -> Result<()> {
        if image_tag == "local" {
            return Err(FtlError::config("push", "cannot push the local version"));
        }
        let Some(registry_url) = self.registry.as_ref().and_then(|r| r.url()) else {
            return Err(FtlError::config("push", "no registry configured"));
        };
        let remote_name = format!("{registry_url}/{image_name}");
        self.engine.tag(&format!("{image_name}:latest"), &format!("{remote_name}:{image_tag}"))?;

        let task = Task::new(format!("Pushing image {image_name}:{image_tag}"), parent_task);
        let stream = self.engine.push(&format!("{remote_name}:{image_tag}"))?;
        let mut current_by_layer: std::collections::HashMap<String, (u64, u64)> = std::collections::HashMap::new();
        for event in stream {
            match event {
                ProgressEvent::Error(message) => {
                    task.finish("Failed", StatusFlavor::Warning);
                    return Err(FtlError::ImagePull { remote_name, image_tag: image_tag.to_string(), cause: message });
                }
                ProgressEvent::Status { layer: Some(layer), status, current, total } => {
                    if status.to_lowercase() == "pushing" {
                        current_by_layer.insert(layer, (current, total));
                    } else if status.to_lowercase().contains("complete") {
                        if let Some(entry) = current_by_layer.get_mut(&layer) {
                            entry.0 = entry.1;
                        }
                    }
                    if !current_by_layer.is_empty() {
                        let total_current: u64 = current_by_layer.values().map(|(c, _)| c).sum();
                        let total_total: u64 = current_by_layer.values().map(|(_, t)| t).sum();
                        task.update(None, None, Some((total_current, total_total)));
                        task.set_extra_info(vec![format!(
                            "{} / {}",
                            crate::util::file_size(total_current, false),
                            crate::util::file_size(total_total, false)
                        )]);
                    }
                }
                _ => {}
            }
        }
        task.finish("Done", StatusFlavor::Good);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ContainerDetails, ContainerSummary, CreateContainerSpec};
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FakeEngine {
        images: Mutex<HashMap<String, String>>,
        tags: Mutex<Vec<(String, String)>>,
    }

    impl ContainerEngine for FakeEngine {
        fn ping(&self) -> Result<()> { Ok(()) }
        fn containers(&self, _label_selector: Option<&str>) -> Result<Vec<ContainerSummary>> { Ok(vec![]) }
        fn inspect_container(&self, _id: &str) -> Result<Option<ContainerDetails>> { Ok(None) }
        fn inspect_image(&self, name_and_tag: &str) -> Result<Option<String>> {
            Ok(self.images.lock().unwrap().get(name_and_tag).cloned())
        }
        fn create_network(&self, _name: &str) -> Result<()> { Ok(()) }
        fn create_container(&self, _spec: &CreateContainerSpec) -> Result<String> { Ok("id".into()) }
        fn start(&self, _id: &str) -> Result<()> { Ok(()) }
        fn start_foreground(&self, _id: &str) -> Result<()> { Ok(()) }
        fn stop(&self, _id: &str, _fast_kill: bool) -> Result<()> { Ok(()) }
        fn remove_container(&self, _id: &str) -> Result<()> { Ok(()) }
        fn create_volume(&self, _name: &str) -> Result<()> { Ok(()) }
        fn remove_volume(&self, _name: &str) -> Result<()> { Ok(()) }
        fn tag(&self, source: &str, target: &str) -> Result<()> {
            self.tags.lock().unwrap().push((source.to_string(), target.to_string()));
            Ok(())
        }
        fn remove_image(&self, _name_and_tag: &str) -> Result<()> { Ok(()) }
        fn build(&self, _c: &[u8], _t: &str, _a: &HashMap<String, String>) -> Result<Box<dyn Iterator<Item = ProgressEvent>>> {
            Ok(Box::new(std::iter::empty()))
        }
        fn pull(&self, _image: &str) -> Result<Box<dyn Iterator<Item = ProgressEvent>>> {
            Ok(Box::new(std::iter::empty()))
        }
        fn push(&self, _image: &str) -> Result<Box<dyn Iterator<Item = ProgressEvent>>> {
            Ok(Box::new(std::iter::empty()))
        }
        fn get_archive(&self, _id: &str, _path: &str) -> Result<Vec<u8>> { Ok(vec![]) }
        fn logs(&self, _id: &str, _tail: Option<usize>) -> Result<String> { Ok(String::new()) }
        fn exec_foreground(&self, _id: &str, _command: &[String]) -> Result<()> { Ok(()) }
        fn attach_foreground(&self, _id: &str) -> Result<()> { Ok(()) }
        fn logs_follow(&self, _id: &str) -> Result<()> { Ok(()) }
        fn login(&self, _registry: &str, _username: &str, _password: &str) -> Result<()> { Ok(()) }
        fn supports_cached_volumes(&self) -> bool { false }
        fn inspect_volume(&self, _name: &str) -> Result<Option<HashMap<String, String>>> { Ok(None) }
        fn create_volume_with_label(&self, _name: &str, _key: &str, _value: &str) -> Result<()> { Ok(()) }
        fn containers_using_volume(&self, _volume_name: &str) -> Result<Vec<ContainerSummary>> { Ok(vec![]) }
        fn run_to_completion(&self, _image: &str, _binds: &[String]) -> Result<()> { Ok(()) }
        fn copy_path_to_volume(&self, _host_path: &str, _volume_name: &str) -> Result<()> { Ok(()) }
    }

    #[test]
    fn image_version_coerces_local_to_latest() {
        let mut images = HashMap::new();
        images.insert("acme/web:latest".to_string(), "sha256:abc".to_string());
        let engine = Arc::new(FakeEngine { images: Mutex::new(images), tags: Mutex::new(vec![]) });
        let repo = ImageRepository::new(engine, None);
        let id = repo.image_version("acme/web", "local", false).unwrap();
        assert_eq!(id, Some("sha256:abc".to_string()));
    }

    #[test]
    fn image_version_not_found_errors_unless_ignored() {
        let engine = Arc::new(FakeEngine { images: Mutex::new(HashMap::new()), tags: Mutex::new(vec![]) });
        let repo = ImageRepository::new(engine.clone(), None);
        assert!(repo.image_version("acme/web", "latest", false).is_err());
        assert_eq!(repo.image_version("acme/web", "latest", true).unwrap(), None);
    }

    #[test]
    fn pull_local_tag_fails_unless_silent() {
        let engine = Arc::new(FakeEngine { images: Mutex::new(HashMap::new()), tags: Mutex::new(vec![]) });
        let mut repo = ImageRepository::new(engine, None);
        let root = Task::root();
        assert!(repo.pull_image_version("acme/web", "local", &root, false).is_err());
        assert!(repo.pull_image_version("acme/web", "local", &root, true).is_ok());
    }
}
