//! Generic sorting and threading helpers shared by the graph, formation, and
//! runner modules.
//!
//! Grounded on `utils/sorting.py` and `utils/threading.py` in the original
//! implementation: a breadth-first-discovery-then-Kahn-peel topological sort, a
//! thread-safe named lock set with a blocking `entry_lock` guard, and a worker
//! handle that re-raises whatever a spawned thread failed with. `file_size`
//! ports `utils/humanize.py`'s byte-count formatting, used by the image
//! repository to render pull/push progress in human-readable units.

use std::collections::{HashSet, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::errors::{FtlError, Result};

/// Dependency-sorts `initial` and everything transitively reachable through
/// `dependencies`, from least-depended-on (depends on nothing) to most (depends
/// on everything before it). `initial` is included at the end only once its own
/// dependencies are satisfied.
///
/// A node with no resolvable predecessors after a full pass over the remainder
/// indicates a cycle; the error names every node still unresolved.
pub fn dependency_sort<T, F>(initial: Vec<T>, dependencies: F) -> Result<Vec<T>>
where
    T: Clone + Eq + Hash + Ord + std::fmt::Debug,
    F: Fn(&T) -> Vec<T>,
{
    // Phase 1: discover every node reachable from `initial`.
    let mut pending: VecDeque<T> = initial.iter().cloned().collect();
    let mut seen: HashSet<T> = initial.iter().cloned().collect();
    let mut deps_of: Vec<(T, Vec<T>)> = Vec::new();
    let mut mapping: std::collections::HashMap<T, Vec<T>> = std::collections::HashMap::new();

    while let Some(current) = pending.pop_front() {
        if mapping.contains_key(&current) {
            continue;
        }
        let deps = dependencies(&current);
        for dep in &deps {
            if !seen.contains(dep) {
                seen.insert(dep.clone());
                pending.push_back(dep.clone());
            }
        }
        mapping.insert(current.clone(), deps.clone());
        deps_of.push((current, deps));
    }

    // Phase 2: repeatedly peel nodes whose dependencies are already resolved,
    // in ascending node order within each pass for determinism.
    let mut remaining: Vec<T> = mapping.keys().cloned().collect();
    remaining.sort();
    let mut result: Vec<T> = Vec::new();
    let mut resolved: HashSet<T> = HashSet::new();

    while !remaining.is_empty() {
        let before = remaining.len();
        let mut next_remaining = Vec::new();
        for node in remaining.into_iter() {
            let deps = &mapping[&node];
            if deps.iter().all(|d| resolved.contains(d)) {
                resolved.insert(node.clone());
                result.push(node);
            } else {
                next_remaining.push(node);
            }
        }
        if next_remaining.len() == before {
            let names: Vec<String> = next_remaining.iter().map(|n| format!("{n:?}")).collect();
            return Err(FtlError::CircularDependency(names));
        }
        next_remaining.sort();
        remaining = next_remaining;
    }

    Ok(result)
}

/// A thread-safe set of names with a blocking check-and-add entry lock, used to
/// serialize lifecycle operations per container runtime-name.
#[derive(Default)]
pub struct NamedLockSet {
    inner: Mutex<HashSet<String>>,
    condvar: Condvar,
}

impl NamedLockSet {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashSet::new()),
            condvar: Condvar::new(),
        }
    }

    /// Returns true and inserts `name` if it was not already present.
    fn check_and_add(&self, name: &str) -> bool {
        let mut set = self.inner.lock().unwrap();
        if set.contains(name) {
            false
        } else {
            set.insert(name.to_string());
            true
        }
    }

    fn remove(&self, name: &str) {
        let mut set = self.inner.lock().unwrap();
        set.remove(name);
        drop(set);
        self.condvar.notify_all();
    }

    /// Blocks until `name` is not held by anyone else, then holds it until the
    /// returned guard is dropped. Polls every `interval` (default 1s).
    pub fn entry_lock(self: &Arc<Self>, name: impl Into<String>) -> NamedLockGuard {
        let name = name.into();
        let interval = Duration::from_secs(1);
        loop {
            if self.check_and_add(&name) {
                break;
            }
            let guard = self.inner.lock().unwrap();
            let _ = self.condvar.wait_timeout(guard, interval);
        }
        NamedLockGuard {
            set: Arc::clone(self),
            name,
        }
    }
}

const BINARY_SUFFIXES: [&str; 9] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB", "ZiB", "YiB"];
const SI_SUFFIXES: [&str; 9] = ["B", "KB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];

/// Humanizes a raw byte count, e.g. `file_size(5500928, false) == "5.2 MiB"`.
/// `si` selects base-1000 (`KB`/`MB`/...) over the default base-1024
/// (`KiB`/`MiB`/...) suffixes.
pub fn file_size(value: u64, si: bool) -> String {
    let (base, suffixes): (f64, [&str; 9]) = if si { (1000.0, SI_SUFFIXES) } else { (1024.0, BINARY_SUFFIXES) };
    let value = value as f64;
    let max_index = suffixes.len() - 1;
    for (i, suffix) in suffixes.iter().enumerate() {
        let unit = base.powi(i as i32 + 1);
        if value < unit || i == max_index {
            return format!("{:.1} {suffix}", base * value / unit);
        }
    }
    unreachable!()
}

pub struct NamedLockGuard {
    set: Arc<NamedLockSet>,
    name: String,
}

impl Drop for NamedLockGuard {
    fn drop(&mut self) {
        self.set.remove(&self.name);
    }
}

/// An error raised by a worker spawned for interactive (PTY) takeover. The
/// handler is boxed because it captures engine state that cannot be cloned
/// into an ordinary error value.
pub enum WorkerOutcome<T> {
    Done(Result<T>),
    Interactive(Box<dyn FnOnce() + Send>),
}

/// Thread that captures its closure's panic/error instead of unwinding across
/// the join boundary, mirroring `ExceptionalThread.maybe_raise()`.
pub struct ExceptionalWorker<T> {
    handle: JoinHandle<WorkerOutcome<T>>,
}

impl<T: Send + 'static> ExceptionalWorker<T> {
    pub fn spawn<F>(f: F) -> Self
    where
        F: FnOnce() -> WorkerOutcome<T> + Send + 'static,
    {
        let handle = std::thread::Builder::new()
            .spawn(move || f())
            .expect("failed to spawn worker thread");
        Self { handle }
    }

    /// Non-blocking check for completion.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Joins the worker, re-raising any captured failure. A panic inside the
    /// closure itself (a programming bug, not a domain error) still unwinds as
    /// a Rust panic via `JoinHandle::join`'s `Result::Err` branch.
    pub fn join(self) -> WorkerOutcome<T> {
        match self.handle.join() {
            Ok(outcome) => outcome,
            Err(payload) => std::panic::resume_unwind(payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependency_sort_orders_leaves_first() {
        // A -> B -> C
        let deps = |n: &char| match n {
            'A' => vec!['B'],
            'B' => vec!['C'],
            _ => vec![],
        };
        let sorted = dependency_sort(vec!['A'], deps).unwrap();
        assert_eq!(sorted, vec!['C', 'B', 'A']);
    }

    #[test]
    fn dependency_sort_detects_cycles() {
        let deps = |n: &char| match n {
            'A' => vec!['B'],
            'B' => vec!['A'],
            _ => vec![],
        };
        let err = dependency_sort(vec!['A'], deps).unwrap_err();
        assert!(matches!(err, FtlError::CircularDependency(_)));
    }

    #[test]
    fn named_lock_set_serializes_entry() {
        let set = Arc::new(NamedLockSet::new());
        let guard = set.entry_lock("web");
        assert!(!set.check_and_add("web"));
        drop(guard);
        assert!(set.check_and_add("web"));
    }

    #[test]
    fn file_size_binary_units() {
        assert_eq!(file_size(1, false), "1.0 B");
        assert_eq!(file_size(1024, false), "1.0 KiB");
        assert_eq!(file_size(1524, false), "1.5 KiB");
        assert_eq!(file_size(5_500_928, false), "5.2 MiB");
        assert_eq!(file_size(7_300_613_312, false), "6.8 GiB");
    }

    #[test]
    fn file_size_si_units() {
        assert_eq!(file_size(1024, true), "1.0 KB");
        assert_eq!(file_size(5_500_928, true), "5.5 MB");
        assert_eq!(file_size(7_300_613_312, true), "7.3 GB");
    }
}
