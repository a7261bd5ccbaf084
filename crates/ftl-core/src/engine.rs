//! Container engine abstraction: the surface every other module needs from a
//! local container runtime.
//!
//! Grounded on the `Docker`/`DockerLifecycle` traits in `docker.rs`: same
//! "shell out to the CLI binary, parse stdout" strategy, generalized to
//! the operations this orchestrator actually needs (networks, volumes,
//! streaming build/pull/push, archive extraction) instead of devcontainer's
//! narrower exec-focused surface. Calls are synchronous: the runner runs
//! convergence on true OS threads rather than an async runtime, so there is
//! no tokio here.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read};
use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::errors::{FtlError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerSummary {
    pub id: String,
    pub names: Vec<String>,
    pub image: String,
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerDetails {
    pub id: String,
    /// The engine's own name for the container (Docker's `.Name`, leading
    /// slash stripped), i.e. the runtime-name this system created it under.
    pub name: String,
    pub image: String,
    pub labels: HashMap<String, String>,
    pub links_raw: Vec<String>,
    pub mounts: Vec<String>,
    pub ip_address: Option<String>,
    pub port_mapping: HashMap<u16, u16>,
    pub state_running: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CreateContainerSpec {
    pub name: String,
    pub image: String,
    pub network: String,
    pub network_aliases: Vec<String>,
    pub links: Vec<String>,
    pub binds: Vec<String>,
    pub ports: HashMap<u16, u16>,
    pub publish_all_ports: bool,
    pub environment: HashMap<String, String>,
    pub mem_limit: u64,
    pub command: Option<Vec<String>>,
    pub labels: HashMap<String, String>,
    pub detach: bool,
    /// Allocate a pseudo-TTY (`docker create -t`); set for foreground containers.
    pub tty: bool,
    /// Keep stdin open (`docker create -i`); set for foreground containers.
    pub stdin_open: bool,
    pub security_opt: Vec<String>,
    pub cap_add: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Stream(String),
    Status { layer: Option<String>, status: String, current: u64, total: u64 },
    Error(String),
}

/// Everything the runner, builder, and image repository need from a live
/// container runtime. A `DockerCliEngine` shells out to the `docker` binary;
/// tests substitute an in-memory fake.
pub trait ContainerEngine: Send + Sync {
    fn ping(&self) -> Result<()>;
    fn containers(&self, label_selector: Option<&str>) -> Result<Vec<ContainerSummary>>;
    /// Like `containers`, but including stopped ones (`docker ps -a`). Default
    /// delegates to `containers` for engines that don't distinguish.
    fn containers_all(&self, label_selector: Option<&str>) -> Result<Vec<ContainerSummary>> {
        self.containers(label_selector)
    }
    fn inspect_container(&self, id: &str) -> Result<Option<ContainerDetails>>;
    fn inspect_image(&self, name_and_tag: &str) -> Result<Option<String>>;
    fn create_network(&self, name: &str) -> Result<()>;
    fn create_container(&self, spec: &CreateContainerSpec) -> Result<String>;
    fn start(&self, id: &str) -> Result<()>;
    /// Starts a created-but-not-started container attached to the current
    /// terminal (`docker start -a -i`), for the foreground/interactive path.
    fn start_foreground(&self, id: &str) -> Result<()>;
    fn stop(&self, id: &str, fast_kill: bool) -> Result<()>;
    fn remove_container(&self, id: &str) -> Result<()>;
    fn create_volume(&self, name: &str) -> Result<()>;
    fn remove_volume(&self, name: &str) -> Result<()>;
    fn tag(&self, source: &str, target: &str) -> Result<()>;
    /// Removes a local image by name/tag or id (`docker rmi`).
    fn remove_image(&self, name_and_tag: &str) -> Result<()>;
    fn build(&self, context_tar_gz: &[u8], tag: &str, build_args: &HashMap<String, String>)
        -> Result<Box<dyn Iterator<Item = ProgressEvent>>>;
    fn pull(&self, image: &str) -> Result<Box<dyn Iterator<Item = ProgressEvent>>>;
    fn push(&self, image: &str) -> Result<Box<dyn Iterator<Item = ProgressEvent>>>;
    fn get_archive(&self, id: &str, path: &str) -> Result<Vec<u8>>;
    fn logs(&self, id: &str, tail: Option<usize>) -> Result<String>;
    fn exec_foreground(&self, id: &str, command: &[String]) -> Result<()>;
    /// Reattaches this process's stdio to `id`'s primary process (`docker
    /// attach`), blocking until it exits or the terminal detaches.
    fn attach_foreground(&self, id: &str) -> Result<()>;
    /// Streams `id`'s logs to this process's stdout until interrupted
    /// (`docker logs -f`).
    fn logs_follow(&self, id: &str) -> Result<()>;
    fn login(&self, registry: &str, username: &str, password: &str) -> Result<()>;
    fn supports_cached_volumes(&self) -> bool;

    /// Labels on a named volume, or `None` if the volume doesn't exist.
    fn inspect_volume(&self, name: &str) -> Result<Option<HashMap<String, String>>>;
    /// Creates a volume carrying a single label (used to stamp `build_id` on
    /// a volume-provider's output so the next build can tell whether it's stale).
    fn create_volume_with_label(&self, name: &str, key: &str, value: &str) -> Result<()>;
    /// Every container (running or not) with a mount backed by `volume_name`.
    fn containers_using_volume(&self, volume_name: &str) -> Result<Vec<ContainerSummary>>;
    /// Runs `image` to completion with `binds` mounted, blocking until exit;
    /// a non-zero exit is a runtime error. Used for one-shot volume extraction.
    fn run_to_completion(&self, image: &str, binds: &[String]) -> Result<()>;
    /// Copies `host_path` into the root of `volume_name` via a throwaway
    /// helper container (`volume copy-to-docker`).
    fn copy_path_to_volume(&self, host_path: &str, volume_name: &str) -> Result<()>;
}

/// `ContainerEngine` backed by the `docker` CLI binary, invoked via
/// `std::process::Command`.
pub struct DockerCliEngine {
    binary: String,
}

impl Default for DockerCliEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerCliEngine {
    pub fn new() -> Self {
        DockerCliEngine { binary: "docker".to_string() }
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        DockerCliEngine { binary: binary.into() }
    }

    fn run(&self, args: &[&str]) -> Result<String> {
        debug!(args = args.join(" "), "invoking docker CLI");
        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .map_err(|e| FtlError::EngineUnavailable(e.to_string()))?;
        if !output.status.success() {
            return Err(FtlError::Runtime {
                message: String::from_utf8_lossy(&output.stderr).to_string(),
                code: output.status.code().map(|c| c.to_string()),
                instance: None,
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn list_containers(&self, label_selector: Option<&str>, all: bool) -> Result<Vec<ContainerSummary>> {
        let mut args = vec!["ps", "--format", "{{json .}}"];
        if all {
            args.push("-a");
        }
        if let Some(selector) = label_selector {
            args.push("--filter");
            args.push(selector);
        }
        let out = self.run(&args)?;
        let mut result = Vec::new();
        for line in out.lines().filter(|l| !l.trim().is_empty()) {
            let value: Value = serde_json::from_str(line)
                .map_err(|e| FtlError::Runtime { message: e.to_string(), code: None, instance: None })?;
            result.push(ContainerSummary {
                id: value.get("ID").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                names: value
                    .get("Names")
                    .and_then(|v| v.as_str())
                    .map(|s| s.split(',').map(|n| n.to_string()).collect())
                    .unwrap_or_default(),
                image: value.get("Image").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                labels: HashMap::new(),
            });
        }
        Ok(result)
    }

    fn run_streaming(&self, args: Vec<String>) -> Result<Box<dyn Iterator<Item = ProgressEvent>>> {
        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| FtlError::EngineUnavailable(e.to_string()))?;
        let stdout = child.stdout.take().expect("piped stdout");
        let reader = BufReader::new(stdout);
        Ok(Box::new(NdJsonProgress { reader, buffer: String::new(), child: Some(child) }))
    }
}

struct NdJsonProgress {
    reader: BufReader<std::process::ChildStdout>,
    buffer: String,
    child: Option<std::process::Child>,
}

impl Iterator for NdJsonProgress {
    type Item = ProgressEvent;

    /// Reassembles multi-line JSON chunks: accumulates lines until one parses
    /// as a standalone JSON value, matching the engine's line-buffered stream.
    fn next(&mut self) -> Option<ProgressEvent> {
        loop {
            let mut line = String::new();
            let read = self.reader.read_line(&mut line).ok()?;
            if read == 0 {
                if let Some(mut child) = self.child.take() {
                    let _ = child.wait();
                }
                return None;
            }
            self.buffer.push_str(&line);
            match serde_json::from_str::<Value>(self.buffer.trim()) {
                Ok(value) => {
                    self.buffer.clear();
                    if let Some(event) = parse_progress_value(&value) {
                        return Some(event);
                    }
                }
                Err(_) => continue,
            }
        }
    }
}

fn parse_progress_value(value: &Value) -> Option<ProgressEvent> {
    if let Some(error) = value.get("error").and_then(|v| v.as_str()) {
        return Some(ProgressEvent::Error(error.to_string()));
    }
    if let Some(stream) = value.get("stream").and_then(|v| v.as_str()) {
        return Some(ProgressEvent::Stream(stream.to_string()));
    }
    let status = value.get("status")?.as_str()?.to_string();
    let layer = value.get("id").and_then(|v| v.as_str()).map(|s| s.to_string());
    let (current, total) = value
        .get("progressDetail")
        .map(|pd| {
            (
                pd.get("current").and_then(|v| v.as_u64()).unwrap_or(0),
                pd.get("total").and_then(|v| v.as_u64()).unwrap_or(0),
            )
        })
        .unwrap_or((0, 0));
    Some(ProgressEvent::Status { layer, status, current, total })
}

impl ContainerEngine for DockerCliEngine {
    #[instrument(skip(self))]
    fn ping(&self) -> Result<()> {
        self.run(&["version", "--format", "{{.Server.Version}}"]).map(|_| ())
    }

    fn containers(&self, label_selector: Option<&str>) -> Result<Vec<ContainerSummary>> {
        self.list_containers(label_selector, false)
    }

    fn containers_all(&self, label_selector: Option<&str>) -> Result<Vec<ContainerSummary>> {
        self.list_containers(label_selector, true)
    }

    fn inspect_container(&self, id: &str) -> Result<Option<ContainerDetails>> {
        let out = self.run(&["inspect", id]);
        let out = match out {
            Ok(o) => o,
            Err(FtlError::Runtime { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        let values: Vec<Value> = serde_json::from_str(&out)
            .map_err(|e| FtlError::Runtime { message: e.to_string(), code: None, instance: None })?;
        let Some(value) = values.into_iter().next() else { return Ok(None) };
        Ok(Some(parse_container_details(&value)))
    }

    fn inspect_image(&self, name_and_tag: &str) -> Result<Option<String>> {
        let out = self.run(&["inspect", "--format", "{{.Id}}", name_and_tag]);
        match out {
            Ok(o) => Ok(Some(o.trim().to_string())),
            Err(FtlError::Runtime { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn create_network(&self, name: &str) -> Result<()> {
        let exists = self.run(&["network", "inspect", name]).is_ok();
        if exists {
            return Ok(());
        }
        self.run(&["network", "create", name]).map(|_| ())
    }

    fn create_container(&self, spec: &CreateContainerSpec) -> Result<String> {
        let mut args: Vec<String> = vec!["create".into(), "--name".into(), spec.name.clone()];
        args.push("--network".into());
        args.push(spec.network.clone());
        for alias in &spec.network_aliases {
            args.push("--network-alias".into());
            args.push(alias.clone());
        }
        for link in &spec.links {
            args.push("--link".into());
            args.push(link.clone());
        }
        for bind in &spec.binds {
            args.push("-v".into());
            args.push(bind.clone());
        }
        for (container_port, host_port) in &spec.ports {
            args.push("-p".into());
            args.push(format!("{host_port}:{container_port}"));
        }
        if spec.publish_all_ports {
            args.push("-P".into());
        }
        for (key, value) in &spec.environment {
            args.push("-e".into());
            args.push(format!("{key}={value}"));
        }
        if spec.mem_limit > 0 {
            args.push("--memory".into());
            args.push(spec.mem_limit.to_string());
        }
        for (key, value) in &spec.labels {
            args.push("--label".into());
            args.push(format!("{key}={value}"));
        }
        for opt in &spec.security_opt {
            args.push("--security-opt".into());
            args.push(opt.clone());
        }
        for cap in &spec.cap_add {
            args.push("--cap-add".into());
            args.push(cap.clone());
        }
        if spec.tty {
            args.push("-t".into());
        }
        if spec.stdin_open {
            args.push("-i".into());
        }
        args.push(spec.image.clone());
        if let Some(command) = &spec.command {
            args.extend(command.iter().cloned());
        }
        let args_ref: Vec<&str> = args.iter().map(|s| s.as_str()).collect();
        self.run(&args_ref).map(|out| out.trim().to_string())
    }

    fn start(&self, id: &str) -> Result<()> {
        self.run(&["start", id]).map(|_| ())
    }

    fn start_foreground(&self, id: &str) -> Result<()> {
        let status = Command::new(&self.binary)
            .args(["start", "-a", "-i", id])
            .status()
            .map_err(|e| FtlError::EngineUnavailable(e.to_string()))?;
        if status.success() {
            Ok(())
        } else {
            Err(FtlError::Runtime {
                message: "foreground container exited non-zero".to_string(),
                code: status.code().map(|c| c.to_string()),
                instance: Some(id.to_string()),
            })
        }
    }

    fn stop(&self, id: &str, fast_kill: bool) -> Result<()> {
        if fast_kill {
            self.run(&["kill", id]).map(|_| ())
        } else {
            self.run(&["stop", id]).map(|_| ())
        }
    }

    fn remove_container(&self, id: &str) -> Result<()> {
        self.run(&["rm", "-f", id]).map(|_| ())
    }

    fn create_volume(&self, name: &str) -> Result<()> {
        self.run(&["volume", "create", name]).map(|_| ())
    }

    fn remove_volume(&self, name: &str) -> Result<()> {
        self.run(&["volume", "rm", name]).map(|_| ())
    }

    fn tag(&self, source: &str, target: &str) -> Result<()> {
        self.run(&["tag", source, target]).map(|_| ())
    }

    fn remove_image(&self, name_and_tag: &str) -> Result<()> {
        self.run(&["rmi", name_and_tag]).map(|_| ())
    }

    fn build(
        &self,
        context_tar_gz: &[u8],
        tag: &str,
        build_args: &HashMap<String, String>,
    ) -> Result<Box<dyn Iterator<Item = ProgressEvent>>> {
        let context_path = write_temp_context(context_tar_gz)?;
        let mut args = vec!["build".to_string(), "-t".to_string(), tag.to_string()];
        for (key, value) in build_args {
            args.push("--build-arg".to_string());
            args.push(format!("{key}={value}"));
        }
        args.push("-".to_string());
        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| FtlError::EngineUnavailable(e.to_string()))?;
        {
            use std::io::Write;
            let mut stdin = child.stdin.take().expect("piped stdin");
            let bytes = std::fs::read(&context_path)?;
            stdin.write_all(&bytes)?;
        }
        let stdout = child.stdout.take().expect("piped stdout");
        let reader = BufReader::new(stdout);
        Ok(Box::new(NdJsonProgress { reader, buffer: String::new(), child: Some(child) }))
    }

    fn pull(&self, image: &str) -> Result<Box<dyn Iterator<Item = ProgressEvent>>> {
        self.run_streaming(vec!["pull".to_string(), image.to_string()])
    }

    fn push(&self, image: &str) -> Result<Box<dyn Iterator<Item = ProgressEvent>>> {
        self.run_streaming(vec!["push".to_string(), image.to_string()])
    }

    fn get_archive(&self, id: &str, path: &str) -> Result<Vec<u8>> {
        let mut child = Command::new(&self.binary)
            .args(["cp", &format!("{id}:{path}"), "-"])
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|e| FtlError::EngineUnavailable(e.to_string()))?;
        let mut buf = Vec::new();
        child.stdout.take().expect("piped stdout").read_to_end(&mut buf)?;
        child.wait().map_err(|e| FtlError::EngineUnavailable(e.to_string()))?;
        Ok(buf)
    }

    fn logs(&self, id: &str, tail: Option<usize>) -> Result<String> {
        let tail_str = tail.map(|n| n.to_string());
        let mut args = vec!["logs"];
        if let Some(t) = &tail_str {
            args.push("--tail");
            args.push(t);
        }
        args.push(id);
        self.run(&args)
    }

    fn exec_foreground(&self, id: &str, command: &[String]) -> Result<()> {
        let mut args = vec!["exec".to_string(), "-it".to_string(), id.to_string()];
        args.extend(command.iter().cloned());
        let status = Command::new(&self.binary)
            .args(&args)
            .status()
            .map_err(|e| FtlError::EngineUnavailable(e.to_string()))?;
        if status.success() {
            Ok(())
        } else {
            Err(FtlError::Runtime {
                message: "exec returned non-zero".to_string(),
                code: status.code().map(|c| c.to_string()),
                instance: Some(id.to_string()),
            })
        }
    }

    fn attach_foreground(&self, id: &str) -> Result<()> {
        let status = Command::new(&self.binary)
            .args(["attach", id])
            .status()
            .map_err(|e| FtlError::EngineUnavailable(e.to_string()))?;
        if status.success() {
            Ok(())
        } else {
            Err(FtlError::Runtime {
                message: "attach returned non-zero".to_string(),
                code: status.code().map(|c| c.to_string()),
                instance: Some(id.to_string()),
            })
        }
    }

    fn logs_follow(&self, id: &str) -> Result<()> {
        let status = Command::new(&self.binary)
            .args(["logs", "-f", id])
            .status()
            .map_err(|e| FtlError::EngineUnavailable(e.to_string()))?;
        if status.success() {
            Ok(())
        } else {
            Err(FtlError::Runtime {
                message: "logs -f returned non-zero".to_string(),
                code: status.code().map(|c| c.to_string()),
                instance: Some(id.to_string()),
            })
        }
    }

    fn login(&self, registry: &str, username: &str, password: &str) -> Result<()> {
        let mut child = Command::new(&self.binary)
            .args(["login", registry, "-u", username, "--password-stdin"])
            .stdin(Stdio::piped())
            .spawn()
            .map_err(|e| FtlError::EngineUnavailable(e.to_string()))?;
        {
            use std::io::Write;
            child.stdin.take().expect("piped stdin").write_all(password.as_bytes())?;
        }
        let status = child.wait().map_err(|e| FtlError::EngineUnavailable(e.to_string()))?;
        if status.success() {
            Ok(())
        } else {
            Err(FtlError::Runtime { message: "login failed".to_string(), code: None, instance: None })
        }
    }

    fn supports_cached_volumes(&self) -> bool {
        cfg!(target_os = "macos")
    }

    fn inspect_volume(&self, name: &str) -> Result<Option<HashMap<String, String>>> {
        let out = self.run(&["volume", "inspect", name]);
        let out = match out {
            Ok(o) => o,
            Err(FtlError::Runtime { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        let values: Vec<Value> = serde_json::from_str(&out)
            .map_err(|e| FtlError::Runtime { message: e.to_string(), code: None, instance: None })?;
        let Some(value) = values.into_iter().next() else { return Ok(None) };
        let labels = value
            .get("Labels")
            .and_then(|v| v.as_object())
            .map(|obj| obj.iter().filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string()))).collect())
            .unwrap_or_default();
        Ok(Some(labels))
    }

    fn create_volume_with_label(&self, name: &str, key: &str, value: &str) -> Result<()> {
        self.run(&["volume", "create", "--label", &format!("{key}={value}"), name]).map(|_| ())
    }

    fn containers_using_volume(&self, volume_name: &str) -> Result<Vec<ContainerSummary>> {
        self.list_containers(Some(&format!("volume={volume_name}")), true)
    }

    fn run_to_completion(&self, image: &str, binds: &[String]) -> Result<()> {
        let mut args = vec!["run".to_string(), "--rm".to_string()];
        for bind in binds {
            args.push("-v".to_string());
            args.push(bind.clone());
        }
        args.push(image.to_string());
        let args_ref: Vec<&str> = args.iter().map(|s| s.as_str()).collect();
        let status = Command::new(&self.binary)
            .args(&args_ref)
            .status()
            .map_err(|e| FtlError::EngineUnavailable(e.to_string()))?;
        if status.success() {
            Ok(())
        } else {
            Err(FtlError::Runtime {
                message: "volume extraction container exited non-zero".to_string(),
                code: status.code().map(|c| c.to_string()),
                instance: None,
            })
        }
    }

    fn copy_path_to_volume(&self, host_path: &str, volume_name: &str) -> Result<()> {
        let args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "-v".to_string(),
            format!("{host_path}:/from:ro"),
            "-v".to_string(),
            format!("{volume_name}:/to"),
            "busybox".to_string(),
            "cp".to_string(),
            "-a".to_string(),
            "/from/.".to_string(),
            "/to/".to_string(),
        ];
        let status = Command::new(&self.binary)
            .args(&args)
            .status()
            .map_err(|e| FtlError::EngineUnavailable(e.to_string()))?;
        if status.success() {
            Ok(())
        } else {
            Err(FtlError::Runtime {
                message: "volume copy container exited non-zero".to_string(),
                code: status.code().map(|c| c.to_string()),
                instance: None,
            })
        }
    }
}

fn write_temp_context(bytes: &[u8]) -> Result<std::path::PathBuf> {
    let dir = std::env::temp_dir();
    let path = dir.join(format!("ftl-build-ctx-{}.tar.gz", fastrand::u64(..)));
    std::fs::write(&path, bytes)?;
    Ok(path)
}

fn parse_container_details(value: &Value) -> ContainerDetails {
    let id = value.get("Id").and_then(|v| v.as_str()).unwrap_or_default().to_string();
    let name = value
        .get("Name")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .trim_start_matches('/')
        .to_string();
    let image = value
        .get("Config")
        .and_then(|c| c.get("Image"))
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let labels = value
        .get("Config")
        .and_then(|c| c.get("Labels"))
        .and_then(|v| v.as_object())
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default();
    let mounts = value
        .get("Mounts")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|m| m.get("Destination").and_then(|d| d.as_str()).map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default();
    let links_raw = value
        .get("NetworkSettings")
        .and_then(|ns| ns.get("Networks"))
        .and_then(|n| n.as_object())
        .and_then(|nets| nets.values().next())
        .and_then(|net| net.get("Links"))
        .and_then(|l| l.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(|s| s.to_string())).collect())
        .unwrap_or_default();
    let ip_address = value
        .get("NetworkSettings")
        .and_then(|ns| ns.get("IPAddress"))
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string());
    let port_mapping = value
        .get("NetworkSettings")
        .and_then(|ns| ns.get("Ports"))
        .and_then(|p| p.as_object())
        .map(|obj| {
            let mut map = HashMap::new();
            for (port_spec, bindings) in obj {
                let Some((port_str, _proto)) = port_spec.split_once('/') else { continue };
                let Ok(container_port) = port_str.parse::<u16>() else { continue };
                if let Some(first) = bindings.as_array().and_then(|a| a.first()) {
                    if let Some(host_port_str) = first.get("HostPort").and_then(|v| v.as_str()) {
                        if let Ok(host_port) = host_port_str.parse::<u16>() {
                            map.insert(container_port, host_port);
                        }
                    }
                }
            }
            map
        })
        .unwrap_or_default();
    let state_running = value
        .get("State")
        .and_then(|s| s.get("Running"))
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    ContainerDetails { id, name, image, labels, links_raw, mounts, ip_address, port_mapping, state_running }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_progress_value_reads_error() {
        let value: Value = serde_json::from_str(r#"{"error":"no such image"}"#).unwrap();
        match parse_progress_value(&value) {
            Some(ProgressEvent::Error(msg)) => assert_eq!(msg, "no such image"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn parse_progress_value_reads_layer_status() {
        let value: Value = serde_json::from_str(
            r#"{"status":"Downloading","id":"abc123","progressDetail":{"current":10,"total":100}}"#,
        )
        .unwrap();
        match parse_progress_value(&value) {
            Some(ProgressEvent::Status { layer, status, current, total }) => {
                assert_eq!(layer.as_deref(), Some("abc123"));
                assert_eq!(status, "Downloading");
                assert_eq!(current, 10);
                assert_eq!(total, 100);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
