//! Boot probe: polls a starting container for the two-file status protocol
//! ("Helios") some base images implement, falling back to a plain timeout for
//! images that don't.
//!
//! Grounded on `docker/seedship.py`: `/helios/boot_status` holds newline-
//! separated JSON status updates (only the last line matters), and
//! `/helios/boot_complete` is a sentinel file whose mere existence means the
//! container finished booting successfully.

use std::io::Read;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::engine::ContainerEngine;

const NO_SEEDSHIP_TIMEOUT: Duration = Duration::from_secs(2);
const BOOT_STATUS_PATH: &str = "/helios/boot_status";
const BOOT_COMPLETE_PATH: &str = "/helios/boot_complete";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootStatus {
    /// Boot finished successfully (Helios-aware or not).
    Done(String),
    /// The container died or disappeared.
    Failed(String),
    /// Still booting; `message` is the most recent status line if any.
    InProgress(Option<String>),
}

pub struct BootProbe {
    engine: Arc<dyn ContainerEngine>,
    container_id: String,
    first_try: Option<Instant>,
}

impl BootProbe {
    pub fn new(engine: Arc<dyn ContainerEngine>, container_id: impl Into<String>) -> Self {
        BootProbe { engine, container_id: container_id.into(), first_try: None }
    }

    fn read_file(&self, path: &str) -> Option<Vec<u8>> {
        let archive = self.engine.get_archive(&self.container_id, path).ok()?;
        let mut tar = tar::Archive::new(std::io::Cursor::new(archive));
        let mut entries = tar.entries().ok()?;
        let mut entry = entries.next()?.ok()?;
        let mut contents = Vec::new();
        entry.read_to_end(&mut contents).ok()?;
        let trimmed = contents.iter().rev().skip_while(|b| b.is_ascii_whitespace()).count();
        contents.truncate(trimmed);
        if contents.is_empty() { None } else { Some(contents) }
    }

    /// One status check. The caller drives polling (500ms cadence, per the runner).
    pub fn status(&mut self) -> BootStatus {
        let details = match self.engine.inspect_container(&self.container_id) {
            Ok(Some(d)) => d,
            _ => return BootStatus::Failed("container does not exist".to_string()),
        };
        if !details.state_running {
            return BootStatus::Failed("container died during boot".to_string());
        }
        if self.first_try.is_none() {
            self.first_try = Some(Instant::now());
        }

        let container_status = self.read_file(BOOT_STATUS_PATH);

        if container_status.is_none() {
            if self.first_try.unwrap().elapsed() > NO_SEEDSHIP_TIMEOUT {
                return BootStatus::Done("non-seedship boot complete".to_string());
            }
            return BootStatus::InProgress(None);
        }

        if self.read_file(BOOT_COMPLETE_PATH).is_some() {
            return BootStatus::Done("seedship boot complete".to_string());
        }

        let status_bytes = container_status.unwrap();
        let last_line = status_bytes.split(|&b| b == b'\n').next_back().unwrap_or(&[]);
        match std::str::from_utf8(last_line).ok().and_then(|s| serde_json::from_str::<serde_json::Value>(s).ok()) {
            Some(payload) => {
                let message = payload
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or_default()
                    .trim_end_matches(':')
                    .to_string();
                BootStatus::InProgress(Some(message))
            }
            None => BootStatus::InProgress(Some(String::from_utf8_lossy(&status_bytes).to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ContainerDetails, ContainerSummary, CreateContainerSpec, ProgressEvent};
    use crate::errors::Result;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FakeEngine {
        running: bool,
        archives: Mutex<HashMap<String, Vec<u8>>>,
    }

    fn make_tar(name: &str, contents: &[u8]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_path(name).unwrap();
        header.set_size(contents.len() as u64);
        header.set_cksum();
        builder.append(&header, contents).unwrap();
        builder.into_inner().unwrap()
    }

    impl ContainerEngine for FakeEngine {
        fn ping(&self) -> Result<()> { Ok(()) }
        fn containers(&self, _l: Option<&str>) -> Result<Vec<ContainerSummary>> { Ok(vec![]) }
        fn inspect_container(&self, _id: &str) -> Result<Option<ContainerDetails>> {
            Ok(Some(ContainerDetails { state_running: self.running, ..Default::default() }))
        }
        fn inspect_image(&self, _n: &str) -> Result<Option<String>> { Ok(None) }
        fn create_network(&self, _n: &str) -> Result<()> { Ok(()) }
        fn create_container(&self, _s: &CreateContainerSpec) -> Result<String> { Ok("id".into()) }
        fn start(&self, _id: &str) -> Result<()> { Ok(()) }
        fn start_foreground(&self, _id: &str) -> Result<()> { Ok(()) }
        fn stop(&self, _id: &str, _f: bool) -> Result<()> { Ok(()) }
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
        fn get_archive(&self, _id: &str, path: &str) -> Result<Vec<u8>> {
            Ok(self.archives.lock().unwrap().get(path).cloned().unwrap_or_default())
        }
        fn logs(&self, _id: &str, _t: Option<usize>) -> Result<String> { Ok(String::new()) }
        fn exec_foreground(&self, _id: &str, _c: &[String]) -> Result<()> { Ok(()) }
        fn attach_foreground(&self, _id: &str) -> Result<()> { Ok(()) }
        fn logs_follow(&self, _id: &str) -> Result<()> { Ok(()) }
        fn login(&self, _r: &str, _u: &str, _p: &str) -> Result<()> { Ok(()) }
        fn supports_cached_volumes(&self) -> bool { false }
        fn inspect_volume(&self, _n: &str) -> Result<Option<HashMap<String, String>>> { Ok(None) }
        fn create_volume_with_label(&self, _n: &str, _k: &str, _v: &str) -> Result<()> { Ok(()) }
        fn containers_using_volume(&self, _n: &str) -> Result<Vec<ContainerSummary>> { Ok(vec![]) }
        fn run_to_completion(&self, _i: &str, _b: &[String]) -> Result<()> { Ok(()) }
        fn copy_path_to_volume(&self, _h: &str, _v: &str) -> Result<()> { Ok(()) }
    }

    #[test]
    fn dead_container_fails_fast() {
        let engine = Arc::new(FakeEngine { running: false, archives: Mutex::new(HashMap::new()) });
        let mut probe = BootProbe::new(engine, "c1");
        assert!(matches!(probe.status(), BootStatus::Failed(_)));
    }

    #[test]
    fn boot_complete_file_means_done() {
        let mut archives = HashMap::new();
        archives.insert(BOOT_STATUS_PATH.to_string(), make_tar("boot_status", b"booting"));
        archives.insert(BOOT_COMPLETE_PATH.to_string(), make_tar("boot_complete", b"ok"));
        let engine = Arc::new(FakeEngine { running: true, archives: Mutex::new(archives) });
        let mut probe = BootProbe::new(engine, "c1");
        assert_eq!(probe.status(), BootStatus::Done("seedship boot complete".to_string()));
    }

    #[test]
    fn in_progress_parses_last_json_line() {
        let mut archives = HashMap::new();
        let status = b"{\"message\": \"starting:\"}\n{\"message\": \"migrating:\"}";
        archives.insert(BOOT_STATUS_PATH.to_string(), make_tar("boot_status", status));
        let engine = Arc::new(FakeEngine { running: true, archives: Mutex::new(archives) });
        let mut probe = BootProbe::new(engine, "c1");
        assert_eq!(probe.status(), BootStatus::InProgress(Some("migrating".to_string())));
    }
}
