//! Hierarchical, terminal-aware live-updating task tree.
//!
//! Grounded on `cli/tasks.py`: a `Task` can have subtasks, a status line, an
//! optional progress bar, and extra-info lines; updates bubble to the root,
//! which redraws the whole tree in place using cursor-up + erase-line control
//! sequences under one process-global console mutex.

use once_cell::sync::Lazy;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

const UP_ONE: &str = "\x1b[A\x1b[1000D";
const CLEAR_LINE: &str = "\x1b[2K";
const INDENT_AMOUNT: usize = 2;

static CONSOLE_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

fn console_guard() -> MutexGuard<'static, ()> {
    CONSOLE_LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFlavor {
    #[default]
    Neutral,
    Good,
    Bad,
    Warning,
}

impl StatusFlavor {
    fn paint(self, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }
        let code = match self {
            StatusFlavor::Neutral => return text.to_string(),
            StatusFlavor::Good => "32",
            StatusFlavor::Bad => "31",
            StatusFlavor::Warning => "33",
        };
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

struct TaskState {
    name: String,
    status: Option<String>,
    status_flavor: StatusFlavor,
    progress: Option<(u64, u64)>,
    extra_info: Vec<String>,
    finished: bool,
    hide_if_empty: bool,
    collapse_if_finished: bool,
    children: Vec<Arc<Task>>,
    output_paused: bool,
    cleared_lines: usize,
}

/// A node in the task tree. Cheap to clone (it's an `Arc`); cloning shares the
/// same underlying state so sibling threads can update concurrently.
pub struct Task {
    state: Mutex<TaskState>,
    parent: Option<Arc<Task>>,
}

impl Task {
    /// Creates a new root task (no parent, never rendered directly).
    pub fn root() -> Arc<Task> {
        Arc::new(Task {
            state: Mutex::new(TaskState {
                name: "__root__".to_string(),
                status: None,
                status_flavor: StatusFlavor::default(),
                progress: None,
                extra_info: Vec::new(),
                finished: false,
                hide_if_empty: false,
                collapse_if_finished: false,
                children: Vec::new(),
                output_paused: false,
                cleared_lines: 0,
            }),
            parent: None,
        })
    }

    /// Creates a new child task under `parent` and triggers an initial render.
    pub fn new(name: impl Into<String>, parent: &Arc<Task>) -> Arc<Task> {
        Self::new_with(name, parent, false, false)
    }

    pub fn new_with(
        name: impl Into<String>,
        parent: &Arc<Task>,
        hide_if_empty: bool,
        collapse_if_finished: bool,
    ) -> Arc<Task> {
        let task = Arc::new(Task {
            state: Mutex::new(TaskState {
                name: name.into(),
                status: None,
                status_flavor: StatusFlavor::default(),
                progress: None,
                extra_info: Vec::new(),
                finished: false,
                hide_if_empty,
                collapse_if_finished,
                children: Vec::new(),
                output_paused: false,
                cleared_lines: 0,
            }),
            parent: Some(Arc::clone(parent)),
        });
        {
            let _console = console_guard();
            parent.state.lock().unwrap().children.push(Arc::clone(&task));
        }
        task.update(None, None, None);
        task
    }

    pub fn update(
        &self,
        status: Option<String>,
        status_flavor: Option<StatusFlavor>,
        progress: Option<(u64, u64)>,
    ) {
        {
            let mut state = self.state.lock().unwrap();
            if status.is_some() {
                state.status = status;
            }
            if progress.is_some() {
                state.progress = progress;
            }
            if let Some(flavor) = status_flavor {
                state.status_flavor = flavor;
            }
        }
        self.bubble();
    }

    pub fn set_extra_info(&self, lines: Vec<String>) {
        self.state.lock().unwrap().extra_info = lines;
        self.bubble();
    }

    pub fn add_extra_info(&self, line: String) {
        self.state.lock().unwrap().extra_info.push(line);
        self.bubble();
    }

    pub fn finish(&self, status: impl Into<String>, flavor: StatusFlavor) {
        {
            let mut state = self.state.lock().unwrap();
            state.finished = true;
            state.status = Some(status.into());
            state.status_flavor = flavor;
        }
        self.bubble();
    }

    fn bubble(&self) {
        if let Some(parent) = &self.parent {
            parent.bubble();
        } else {
            self.render_root();
        }
    }

    fn output(&self, terminal_width: usize, indent: usize, out: &mut Vec<String>) {
        let state = self.state.lock().unwrap();
        if state.hide_if_empty && state.children.is_empty() {
            return;
        }
        let progress_string = state
            .progress
            .map(|(count, total)| format!("{} ", make_progress_bar(count, total)))
            .unwrap_or_default();
        let status_string = state.status_flavor.paint(state.status.as_deref().unwrap_or(""));
        let indent_string = " ".repeat(INDENT_AMOUNT * indent);
        let main_line = format!("{indent_string}{}: {progress_string}{status_string}", state.name);
        if indent > 0 {
            out.push(main_line.clone());
        }
        if !(state.finished && state.collapse_if_finished) {
            let child_indent = " ".repeat(INDENT_AMOUNT * (indent + 1));
            let wrap_width = terminal_width.saturating_sub(child_indent.len()).max(1);
            for info in &state.extra_info {
                for chunk in wrap_text(info, wrap_width) {
                    out.push(format!("{child_indent}{chunk}"));
                }
            }
            for child in &state.children {
                child.output(terminal_width, indent + 1, out);
            }
        }
        if indent == 0 {
            out.push(main_line);
        }
    }

    fn render_root(&self) {
        let _console = console_guard();
        let mut state = self.state.lock().unwrap();
        if state.output_paused {
            return;
        }
        let terminal_width = terminal_width();
        drop(state);
        let mut lines = Vec::new();
        self.output(terminal_width, 0, &mut lines);
        state = self.state.lock().unwrap();
        let needed = lines.len();
        let diff = needed as isize - state.cleared_lines as isize;
        if diff > 0 {
            print!("{}", "\n".repeat(diff as usize));
        } else if diff < 0 {
            print!("{}", (UP_ONE.to_string() + CLEAR_LINE).repeat((-diff) as usize));
        }
        state.cleared_lines = needed;
        print!("{}", (UP_ONE.to_string() + CLEAR_LINE).repeat(needed));
        for line in &lines {
            println!("{line}");
        }
        use std::io::Write;
        let _ = std::io::stdout().flush();
    }

    fn set_paused(&self, paused: bool) {
        match &self.parent {
            Some(parent) => parent.set_paused(paused),
            None => {
                {
                    let mut state = self.state.lock().unwrap();
                    state.output_paused = paused;
                    if !paused {
                        state.cleared_lines = 0;
                    }
                }
                if !paused {
                    self.render_root();
                }
            }
        }
    }

    /// Suspends rendering so an external process (PTY attach) may own the
    /// terminal. Rendering resumes, from scratch, when the guard drops.
    pub fn paused_output(self: &Arc<Self>) -> PausedOutput {
        self.set_paused(true);
        PausedOutput { task: Arc::clone(self) }
    }
}

pub struct PausedOutput {
    task: Arc<Task>,
}

impl Drop for PausedOutput {
    fn drop(&mut self) {
        self.task.set_paused(false);
    }
}

fn make_progress_bar(count: u64, total: u64) -> String {
    let width = 30usize;
    let bar_width = width - 2;
    let progress = if total == 0 {
        0.0
    } else {
        (count as f64 / total as f64).clamp(0.0, 1.0)
    };
    let filled = (bar_width as f64 * progress) as usize;
    format!(
        "[{}{}] {}/{}",
        "=".repeat(filled),
        " ".repeat(bar_width - filled),
        count,
        total
    )
}

fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let mut rest = text.trim();
    let mut out = Vec::new();
    while !rest.is_empty() {
        let take = rest.len().min(width.max(1));
        out.push(rest[..take].to_string());
        rest = &rest[take..];
    }
    out
}

fn terminal_width() -> usize {
    std::env::var("COLUMNS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(80)
}

/// A rate-limited proxy that buffers the latest `update`/`set_extra_info` call
/// and flushes on a timer, used to bound render rate under many small worker
/// updates (e.g. build-log streaming).
pub struct RateLimited {
    task: Arc<Task>,
    stop: Arc<Mutex<bool>>,
    handle: Option<std::thread::JoinHandle<()>>,
    pending_status: Arc<Mutex<Option<(Option<String>, Option<StatusFlavor>, Option<(u64, u64)>)>>>,
}

impl RateLimited {
    pub fn new(task: Arc<Task>, interval: Duration) -> Self {
        let stop = Arc::new(Mutex::new(false));
        let pending_status: Arc<Mutex<Option<(Option<String>, Option<StatusFlavor>, Option<(u64, u64)>)>>> =
            Arc::new(Mutex::new(None));
        let thread_task = Arc::clone(&task);
        let thread_stop = Arc::clone(&stop);
        let thread_pending = Arc::clone(&pending_status);
        let handle = std::thread::spawn(move || loop {
            std::thread::sleep(interval);
            if let Some((status, flavor, progress)) = thread_pending.lock().unwrap().take() {
                thread_task.update(status, flavor, progress);
            }
            if *thread_stop.lock().unwrap() {
                break;
            }
        });
        RateLimited {
            task,
            stop,
            handle: Some(handle),
            pending_status,
        }
    }

    pub fn update(&self, status: Option<String>, flavor: Option<StatusFlavor>, progress: Option<(u64, u64)>) {
        *self.pending_status.lock().unwrap() = Some((status, flavor, progress));
    }

    pub fn task(&self) -> &Arc<Task> {
        &self.task
    }
}

impl Drop for RateLimited {
    fn drop(&mut self) {
        *self.stop.lock().unwrap() = true;
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        if let Some((status, flavor, progress)) = self.pending_status.lock().unwrap().take() {
            self.task.update(status, flavor, progress);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_tasks_attach_and_finish() {
        let root = Task::root();
        let child = Task::new("build web", &root);
        child.update(Some("working".into()), None, None);
        child.finish("Done", StatusFlavor::Good);
        assert!(child.state.lock().unwrap().finished);
    }

    #[test]
    fn progress_bar_clamps_to_total() {
        assert_eq!(make_progress_bar(0, 0), "[                            ] 0/0");
        let bar = make_progress_bar(10, 10);
        assert!(bar.contains("10/10"));
    }
}
