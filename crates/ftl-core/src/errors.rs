//! Error taxonomy for the orchestrator core.
//!
//! Mirrors the behavior described in the design's error-handling section rather
//! than any particular upstream exception hierarchy: each variant here is something
//! a caller needs to branch on (retry, annotate with a container, print a log tail),
//! not just a message wrapper.

use thiserror::Error;

/// Domain errors for the container orchestrator.
#[derive(Error, Debug)]
pub enum FtlError {
    /// A YAML file is missing, malformed, or violates the schema, or a build file
    /// has no valid `FROM` line.
    #[error("configuration error in {path}: {message}")]
    Config { path: String, message: String },

    /// An image required to build or run a container does not exist locally.
    #[error("image not found: {image}:{tag}{}", container.as_ref().map(|c| format!(" (needed by {c})")).unwrap_or_default())]
    ImageNotFound {
        image: String,
        tag: String,
        container: Option<String>,
    },

    /// A registry pull failed, possibly after a credential-refresh retry.
    #[error("cannot pull {remote_name}:{image_tag}: {cause}")]
    ImagePull {
        remote_name: String,
        image_tag: String,
        cause: String,
    },

    /// The build stream reported an `error` line, or the engine returned non-zero.
    #[error("build failed for {container}: {message}\n\n{log_tail}")]
    Build { container: String, message: String, log_tail: String },

    /// A container died during start, failed its boot probe, or failed a wait.
    #[error("container {instance} failed to boot: {message}\n\n{log_tail}")]
    ContainerBoot {
        instance: String,
        message: String,
        log_tail: String,
    },

    /// All other engine-side failures.
    #[error("runtime error{}: {message}", code.as_ref().map(|c| format!(" [{c}]")).unwrap_or_default())]
    Runtime {
        message: String,
        code: Option<String>,
        instance: Option<String>,
    },

    /// Not a failure: a worker is handing control to the main thread for a PTY
    /// attach. Carries the runtime name so the driver can report what's being
    /// attached to; the actual takeover closure is stored out-of-band by the
    /// runner (it cannot be cloned into an error value).
    #[error("interactive takeover requested for {0}")]
    Interactive(String),

    /// The engine socket or TLS handshake failed outright.
    #[error("container engine unavailable: {0}")]
    EngineUnavailable(String),

    /// A dependency cycle was detected during topological sort.
    #[error("circular dependency detected among: {0:?}")]
    CircularDependency(Vec<String>),

    /// `parallel_execute` made no progress for 10 consecutive idle iterations.
    #[error("deadlock: cannot proceed on {0:?}")]
    Deadlock(Vec<String>),

    /// A link (or other named reference) still holds an unresolved name instead
    /// of a resolved instance reference. Carries the target's name rather than
    /// the `Link` itself: `Link::Instance` holds an `Rc`, which would make this
    /// error type `!Send`/`!Sync` and break its conversion into `anyhow::Error`
    /// at every CLI call site.
    #[error("unresolved link reference: {0}")]
    UnresolvedLink(String),

    /// Generic I/O failure reading chart/profile files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FtlError {
    pub fn config(path: impl Into<String>, message: impl Into<String>) -> Self {
        FtlError::Config {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Convenience alias for Results across the core crate.
pub type Result<T> = std::result::Result<T, FtlError>;
