//! Builds a single container's image from its chart directory.
//!
//! Grounded on `docker/build.py`. The build context is assembled
//! deterministically (normalized mtime/mode/uid/gid per entry) so repeated
//! builds hash identically when nothing actually changed; `FTL_BUILD_SRC_REAL_TIME`
//! opts back into real mtimes under `/src/` for source-mounted images where
//! build caching against real timestamps matters more than reproducibility.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use flate2::write::GzEncoder;
use flate2::Compression;
use tar::{Builder as TarBuilder, Header};
use tracing::{info, instrument};

use crate::engine::{ContainerEngine, ProgressEvent};
use crate::errors::{FtlError, Result};
use crate::graph::Container;
use crate::task_tree::{RateLimited, StatusFlavor, Task};

const BUILD_MODE: u32 = 0o775;

pub struct Builder {
    engine: Arc<dyn ContainerEngine>,
    use_cache: bool,
}

impl Builder {
    pub fn new(engine: Arc<dyn ContainerEngine>, use_cache: bool) -> Self {
        Builder { engine, use_cache }
    }

    /// Builds `container` from `chart_path/{container.name}`, tagging the
    /// result as `{image}:{tag}` and, unless the tag is already `latest`,
    /// also as `{image}:latest`. Returns the last build-log lines on failure.
    #[instrument(skip(self, chart_path, parent_task), fields(container = %container.name))]
    pub fn build(&self, chart_path: &Path, container: &Container, build_dir_name: &str, parent_task: &Arc<Task>) -> Result<()> {
        let task = Task::new_with(format!("Building {}", container.name), parent_task, false, true);
        let start = Instant::now();
        let context_dir = chart_path.join(build_dir_name);

        let context_tar_gz = self.make_build_context(&context_dir, container)?;

        let limiter = RateLimited::new(Arc::clone(&task), std::time::Duration::from_millis(100));
        let mut log_tail: Vec<String> = Vec::new();
        let mut progress_dots = 0usize;
        let mut build_failed = false;

        let stream = self.engine.build(&context_tar_gz, &container.tagged_image_name(), &build_args_map(container))?;
        for event in stream {
            match event {
                ProgressEvent::Stream(line) => {
                    let trimmed = line.trim_end().to_string();
                    info!(build_log = %trimmed);
                    push_tail(&mut log_tail, trimmed.clone());
                    if trimmed.starts_with("Step ") {
                        progress_dots += 1;
                        limiter.update(Some(".".repeat(progress_dots)), None, None);
                    }
                }
                ProgressEvent::Error(message) => {
                    push_tail(&mut log_tail, message);
                    build_failed = true;
                }
                ProgressEvent::Status { .. } => {}
            }
        }
        drop(limiter);

        if build_failed {
            task.finish("FAILED", StatusFlavor::Bad);
            return Err(FtlError::Build {
                container: container.name.clone(),
                message: format!("build FAILED for image {}", container.name),
                log_tail: log_tail.join("\n"),
            });
        }

        if container.image_tag != "latest" {
            self.engine.tag(&container.tagged_image_name(), &format!("{}:latest", container.image_name()))?;
        }

        if let Some(volume_name) = provides_volume(container) {
            self.extract_volume(&volume_name, container, &task)?;
        }

        let elapsed = start.elapsed();
        task.finish(format!("Done [{}s]", elapsed.as_secs()), StatusFlavor::Good);
        Ok(())
    }

    /// Extracts a freshly built volume-provider image's `/volume/` contents
    /// into the named engine volume, but only when the volume's `build_id`
    /// label doesn't already match the new image — stopping and removing
    /// any containers still mounting the stale volume first.
    fn extract_volume(&self, volume_name: &str, container: &Container, task: &Arc<Task>) -> Result<()> {
        let image_id = self
            .engine
            .inspect_image(&container.tagged_image_name())?
            .ok_or_else(|| FtlError::config(container.name.clone(), "built image vanished before volume extraction"))?;

        let current_build_id = self.engine.inspect_volume(volume_name)?.and_then(|labels| labels.get("build_id").cloned());
        if current_build_id.as_deref() == Some(image_id.as_str()) {
            return Ok(());
        }

        let subtask = Task::new(format!("Rebuilding volume {volume_name}"), task);

        for consumer in self.engine.containers_using_volume(volume_name)? {
            self.engine.stop(&consumer.id, false)?;
            self.engine.remove_container(&consumer.id)?;
        }

        let _ = self.engine.remove_volume(volume_name);
        self.engine.create_volume_with_label(volume_name, "build_id", &image_id)?;
        self.engine.run_to_completion(&container.tagged_image_name(), &[format!("{volume_name}:/volume/")])?;

        subtask.finish("Done", StatusFlavor::Good);
        Ok(())
    }

    /// Assembles a gzip-encoded tar of `context_dir`: directories get mode
    /// 0o775 and zeroed ownership; regular files get the same plus normalized
    /// mtime (real mtime only when `FTL_BUILD_SRC_REAL_TIME=true` and the path
    /// contains `/src/`); the build file has its `FROM` colon rewritten to a
    /// dash when the parent is in-prefix; symlinks are skipped; anything else
    /// is a hard error (not representable deterministically).
    fn make_build_context(&self, context_dir: &Path, container: &Container) -> Result<Vec<u8>> {
        let real_time_opt_in = std::env::var("FTL_BUILD_SRC_REAL_TIME").map(|v| v == "true").unwrap_or(false);
        let buffer = Vec::new();
        let encoder = GzEncoder::new(buffer, Compression::default());
        let mut tar = TarBuilder::new(encoder);

        let mut entries = Vec::new();
        collect_entries(context_dir, context_dir, &mut entries)?;
        entries.sort();

        for relative in entries {
            let disk_location = context_dir.join(&relative);
            let metadata = std::fs::symlink_metadata(&disk_location)?;

            if metadata.is_dir() {
                let mut header = Header::new_gnu();
                header.set_path(&relative)?;
                header.set_entry_type(tar::EntryType::Directory);
                header.set_mode(BUILD_MODE);
                header.set_uid(0);
                header.set_gid(0);
                header.set_size(0);
                set_mtime(&mut header, &disk_location, real_time_opt_in)?;
                header.set_cksum();
                tar.append(&header, std::io::empty())?;
            } else if metadata.is_file() {
                let is_build_file = relative.to_string_lossy() == DEFAULT_BUILD_FILE_NAME;
                let contents = if is_build_file && container.build_parent_in_prefix {
                    rewrite_from_lines(&std::fs::read_to_string(&disk_location)?)
                } else {
                    std::fs::read(&disk_location)?
                };
                let mut header = Header::new_gnu();
                header.set_path(&relative)?;
                header.set_entry_type(tar::EntryType::Regular);
                header.set_mode(BUILD_MODE);
                header.set_uid(0);
                header.set_gid(0);
                header.set_size(contents.len() as u64);
                set_mtime(&mut header, &disk_location, real_time_opt_in)?;
                header.set_cksum();
                tar.append(&header, contents.as_slice())?;
            } else if metadata.file_type().is_symlink() {
                continue;
            } else {
                return Err(FtlError::config(
                    disk_location.display().to_string(),
                    "cannot add non-file/dir entry to docker build context",
                ));
            }
        }

        let encoder = tar.into_inner()?;
        Ok(encoder.finish()?)
    }
}

const DEFAULT_BUILD_FILE_NAME: &str = "Dockerfile";

fn set_mtime(header: &mut Header, disk_location: &Path, real_time_opt_in: bool) -> Result<()> {
    let use_real_time = real_time_opt_in && disk_location.to_string_lossy().contains("/src/");
    if use_real_time {
        let modified = std::fs::metadata(disk_location)?.modified()?;
        let since_epoch = modified
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        header.set_mtime(since_epoch.as_secs());
    } else {
        header.set_mtime(0);
    }
    Ok(())
}

fn rewrite_from_lines(contents: &str) -> Vec<u8> {
    contents
        .lines()
        .map(|line| {
            if line.to_uppercase().starts_with("FROM") {
                line.replace(':', "-")
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
        .into_bytes()
}

fn collect_entries(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap().to_path_buf();
        let metadata = std::fs::symlink_metadata(&path)?;
        out.push(relative);
        if metadata.is_dir() && !metadata.file_type().is_symlink() {
            collect_entries(root, &path, out)?;
        }
    }
    Ok(())
}

/// Reads the `provides-volume` chart key, if set, naming the engine volume
/// this container's build output should be extracted into.
fn provides_volume(container: &Container) -> Option<String> {
    container
        .extra_data
        .get("provides-volume")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

fn build_args_map(container: &Container) -> HashMap<String, String> {
    container
        .build_args
        .iter()
        .filter_map(|name| std::env::var(name).ok().map(|v| (name.clone(), v)))
        .collect()
}

/// Keeps only the last three lines, matching the original build-log handler's
/// `extra_info[-3:] + [text]` sliding window.
fn push_tail(tail: &mut Vec<String>, line: String) {
    tail.push(line);
    let len = tail.len();
    if len > 15 {
        tail.drain(0..len - 15);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ContainerDetails, ContainerSummary, CreateContainerSpec};
    use crate::graph::ContainerFlags;
    use std::collections::BTreeMap as StdBTreeMap;
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    fn sample_container(name: &str, provides_volume: Option<&str>) -> Container {
        let mut extra_data = StdBTreeMap::new();
        if let Some(v) = provides_volume {
            extra_data.insert("provides-volume".to_string(), serde_yaml::Value::String(v.to_string()));
        }
        Container {
            name: name.to_string(),
            build_dir: name.to_string(),
            graph_prefix: "acme".to_string(),
            image_tag: "latest".to_string(),
            build_parent: String::new(),
            build_parent_in_prefix: false,
            build_args: BTreeSet::new(),
            links: StdBTreeMap::new(),
            waits: Vec::new(),
            bound_volumes: StdBTreeMap::new(),
            named_volumes: StdBTreeMap::new(),
            devmodes: StdBTreeMap::new(),
            ports: StdBTreeMap::new(),
            flags: ContainerFlags::default(),
            environment: StdBTreeMap::new(),
            mem_limit: 0,
            extra_data,
        }
    }

    #[derive(Default)]
    struct FakeEngine {
        image_id: Mutex<Option<String>>,
        volume_labels: Mutex<Option<HashMap<String, String>>>,
        consumers: Mutex<Vec<ContainerSummary>>,
        stopped: Mutex<Vec<String>>,
        created_labels: Mutex<Option<(String, String, String)>>,
        extracted: Mutex<bool>,
    }

    impl ContainerEngine for FakeEngine {
        fn ping(&self) -> Result<()> { Ok(()) }
        fn containers(&self, _l: Option<&str>) -> Result<Vec<ContainerSummary>> { Ok(vec![]) }
        fn inspect_container(&self, _id: &str) -> Result<Option<ContainerDetails>> { Ok(None) }
        fn inspect_image(&self, _n: &str) -> Result<Option<String>> { Ok(self.image_id.lock().unwrap().clone()) }
        fn create_network(&self, _n: &str) -> Result<()> { Ok(()) }
        fn create_container(&self, _s: &CreateContainerSpec) -> Result<String> { Ok("id".into()) }
        fn start(&self, _id: &str) -> Result<()> { Ok(()) }
        fn start_foreground(&self, _id: &str) -> Result<()> { Ok(()) }
        fn stop(&self, id: &str, _f: bool) -> Result<()> {
            self.stopped.lock().unwrap().push(id.to_string());
            Ok(())
        }
        fn remove_container(&self, _id: &str) -> Result<()> { Ok(()) }
        fn create_volume(&self, _n: &str) -> Result<()> { Ok(()) }
        fn remove_volume(&self, _n: &str) -> Result<()> { Ok(()) }
        fn tag(&self, _s: &str, _t: &str) -> Result<()> { Ok(()) }
        fn remove_image(&self, _n: &str) -> Result<()> { Ok(()) }
        fn build(&self, _c: &[u8], _t: &str, _a: &HashMap<String, String>) -> Result<Box<dyn Iterator<Item = ProgressEvent>>> {
            Ok(Box::new(std::iter::empty()))
        }
        fn pull(&self, _i: &str) -> Result<Box<dyn Iterator<Item = ProgressEvent>>> { Ok(Box::new(std::iter::empty())) }
        fn push(&self, _i: &str) -> Result<Box<dyn Iterator<Item = ProgressEvent>>> { Ok(Box::new(std::iter::empty())) }
        fn get_archive(&self, _id: &str, _path: &str) -> Result<Vec<u8>> { Ok(vec![]) }
        fn logs(&self, _id: &str, _t: Option<usize>) -> Result<String> { Ok(String::new()) }
        fn exec_foreground(&self, _id: &str, _c: &[String]) -> Result<()> { Ok(()) }
        fn attach_foreground(&self, _id: &str) -> Result<()> { Ok(()) }
        fn logs_follow(&self, _id: &str) -> Result<()> { Ok(()) }
        fn login(&self, _r: &str, _u: &str, _p: &str) -> Result<()> { Ok(()) }
        fn supports_cached_volumes(&self) -> bool { false }
        fn inspect_volume(&self, _n: &str) -> Result<Option<HashMap<String, String>>> {
            Ok(self.volume_labels.lock().unwrap().clone())
        }
        fn create_volume_with_label(&self, name: &str, key: &str, value: &str) -> Result<()> {
            *self.created_labels.lock().unwrap() = Some((name.to_string(), key.to_string(), value.to_string()));
            Ok(())
        }
        fn containers_using_volume(&self, _n: &str) -> Result<Vec<ContainerSummary>> {
            Ok(self.consumers.lock().unwrap().clone())
        }
        fn run_to_completion(&self, _image: &str, _binds: &[String]) -> Result<()> {
            *self.extracted.lock().unwrap() = true;
            Ok(())
        }
        fn copy_path_to_volume(&self, _host_path: &str, _volume_name: &str) -> Result<()> { Ok(()) }
    }

    #[test]
    fn provides_volume_reads_extra_data_key() {
        let with_volume = sample_container("assets-volume", Some("assets"));
        assert_eq!(provides_volume(&with_volume), Some("assets".to_string()));
        let without = sample_container("web", None);
        assert_eq!(provides_volume(&without), None);
    }

    #[test]
    fn extract_volume_skips_when_build_id_matches() {
        let engine = Arc::new(FakeEngine {
            image_id: Mutex::new(Some("sha256:new".to_string())),
            volume_labels: Mutex::new(Some(HashMap::from([("build_id".to_string(), "sha256:new".to_string())]))),
            ..Default::default()
        });
        let builder = Builder::new(Arc::clone(&engine) as Arc<dyn ContainerEngine>, true);
        let container = sample_container("assets-volume", Some("assets"));
        let root = Task::root();
        builder.extract_volume("assets", &container, &root).unwrap();
        assert!(!*engine.extracted.lock().unwrap());
    }

    #[test]
    fn extract_volume_stops_consumers_and_rebuilds_on_mismatch() {
        let engine = Arc::new(FakeEngine {
            image_id: Mutex::new(Some("sha256:new".to_string())),
            volume_labels: Mutex::new(Some(HashMap::from([("build_id".to_string(), "sha256:old".to_string())]))),
            consumers: Mutex::new(vec![ContainerSummary {
                id: "c1".to_string(),
                names: vec!["acme.app.1".to_string()],
                image: "acme/app:latest".to_string(),
                labels: HashMap::new(),
            }]),
            ..Default::default()
        });
        let builder = Builder::new(Arc::clone(&engine) as Arc<dyn ContainerEngine>, true);
        let container = sample_container("assets-volume", Some("assets"));
        let root = Task::root();
        builder.extract_volume("assets", &container, &root).unwrap();
        assert!(*engine.extracted.lock().unwrap());
        assert_eq!(*engine.stopped.lock().unwrap(), vec!["c1".to_string()]);
        assert_eq!(
            engine.created_labels.lock().unwrap().clone(),
            Some(("assets".to_string(), "build_id".to_string(), "sha256:new".to_string()))
        );
    }

    #[test]
    fn rewrite_from_lines_only_touches_from() {
        let input = "FROM acme/base:v2\nRUN echo hi:there\n";
        let out = String::from_utf8(rewrite_from_lines(input)).unwrap();
        assert!(out.contains("FROM acme/base-v2"));
        assert!(out.contains("echo hi:there"));
    }

    #[test]
    fn push_tail_keeps_last_fifteen() {
        let mut tail = Vec::new();
        for i in 0..20 {
            push_tail(&mut tail, format!("line {i}"));
        }
        assert_eq!(tail.len(), 15);
        assert_eq!(tail[0], "line 5");
    }
}
