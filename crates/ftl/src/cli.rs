use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Container-based development environment orchestrator.
#[derive(Parser, Debug)]
#[command(name = "ftl", version, about = "Container-based development environment orchestrator")]
pub struct Cli {
    /// Chart directory to operate on (default: nearest ancestor containing ftl.yaml).
    #[arg(long, global = true)]
    pub chart: Option<PathBuf>,

    /// Named profile to apply (walks its inheritance chain under profiles/).
    #[arg(long, global = true)]
    pub profile: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build one or more containers (default: every container in the chart).
    Build {
        containers: Vec<String>,
        #[arg(long)]
        no_cache: bool,
    },

    /// Start named containers (or every default-boot container with none given).
    #[command(alias = "start")]
    Run { containers: Vec<String> },

    /// Stop named containers (or every running instance with none given).
    Stop { containers: Vec<String> },

    /// Stop then start named containers.
    #[command(alias = "hup", alias = "reload")]
    Restart { containers: Vec<String> },

    /// Converge the host onto every default-boot (profile-enabled) container.
    Up,

    /// Profile inspection and persistence.
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },

    /// Attach an interactive shell inside a running container.
    Shell { container: String },

    /// Attach to a running container's primary process.
    Attach { container: String },

    /// Print (optionally follow) a container's logs.
    #[command(alias = "logs")]
    Tail {
        container: String,
        #[arg(short, long)]
        follow: bool,
    },

    /// List instances in the desired formation and their actual state.
    Ps,

    /// Summarize desired vs. actual formation state.
    Status,

    /// Local image operations.
    Image {
        #[command(subcommand)]
        action: ImageAction,
    },

    /// Named-volume operations.
    Volume {
        #[command(subcommand)]
        action: VolumeAction,
    },

    /// Registry credential operations.
    Registry {
        #[command(subcommand)]
        action: RegistryAction,
    },

    /// Push one or more containers' images to the configured registry.
    Push { containers: Vec<String> },

    /// Remove stopped containers and dangling images left behind by builds.
    Gc,

    /// Run the registered doctor exams against the current host.
    Doctor,

    /// Print the `/etc/hosts` entries this chart's domain names would need.
    Hosts,

    /// Persisted chart registry.
    Chart {
        #[command(subcommand)]
        action: ChartAction,
    },

    /// Scaffolding for a new chart.
    Create {
        #[command(subcommand)]
        action: CreateAction,
    },

    /// List the dev-mode bind-mount groups a container declares.
    Mounts { container: String },

    /// Enable a dev-mode bind-mount group on a container (profile-scoped).
    Mount { container: String, devmode: String },

    /// Disable a dev-mode bind-mount group on a container.
    #[command(alias = "umount")]
    Unmount { container: String, devmode: String },

    /// DNS/hosts-file integration.
    Dns {
        #[command(subcommand)]
        action: DnsAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ProfileAction {
    /// Print the effective profile-applied option table.
    Show,
    /// Persist the current user-profile overrides.
    Save,
}

#[derive(Subcommand, Debug)]
pub enum ImageAction {
    List,
    Destroy { name: String },
}

#[derive(Subcommand, Debug)]
pub enum VolumeAction {
    List,
    Destroy { name: String },
    CopyToDocker { name: String, path: PathBuf },
}

#[derive(Subcommand, Debug)]
pub enum RegistryAction {
    Status,
    Login,
}

#[derive(Subcommand, Debug)]
pub enum ChartAction {
    Add { path: PathBuf },
    List,
}

#[derive(Subcommand, Debug)]
pub enum CreateAction {
    Project { name: String },
}

#[derive(Subcommand, Debug)]
pub enum DnsAction {
    Configure,
}

pub const KNOWN_COMMANDS: &[&str] = &[
    "build", "run", "start", "stop", "restart", "hup", "reload", "up", "profile", "shell", "attach",
    "tail", "logs", "ps", "status", "image", "volume", "registry", "push", "gc", "doctor", "hosts",
    "chart", "create", "mounts", "mount", "unmount", "umount", "dns", "help",
];
