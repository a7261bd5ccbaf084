//! Command implementations: each resolves the chart, applies the profile
//! stack, and drives the narrow slice of `ftl-core` its subcommand needs.

mod build;
mod chart_registry;
mod create;
mod dns;
mod doctor;
mod gc;
mod image;
mod mounts;
mod profile;
mod ps;
mod push;
mod registry;
mod run;
mod shell;
mod status;
mod stop;
mod volume;

use anyhow::Result;

use crate::cli::{Cli, Commands};

pub fn dispatch(cli: Cli) -> Result<()> {
    let Cli { chart, profile: profile_name, command } = cli;

    match command {
        Commands::Build { containers, no_cache } => build::run(chart, profile_name, containers, no_cache),
        Commands::Run { containers } => run::start(chart, profile_name, containers),
        Commands::Stop { containers } => stop::run(chart, profile_name, containers),
        Commands::Restart { containers } => run::restart(chart, profile_name, containers),
        Commands::Up => run::up(chart, profile_name),
        Commands::Profile { action } => profile::run(chart, profile_name, action),
        Commands::Shell { container } => shell::shell(chart, profile_name, container),
        Commands::Attach { container } => shell::attach(chart, profile_name, container),
        Commands::Tail { container, follow } => shell::tail(chart, profile_name, container, follow),
        Commands::Ps => ps::run(chart, profile_name),
        Commands::Status => status::run(chart, profile_name),
        Commands::Image { action } => image::run(chart, profile_name, action),
        Commands::Volume { action } => volume::run(chart, profile_name, action),
        Commands::Registry { action } => registry::run(chart, profile_name, action),
        Commands::Push { containers } => push::run(chart, profile_name, containers),
        Commands::Gc => gc::run(chart, profile_name),
        Commands::Doctor => doctor::run(chart, profile_name),
        Commands::Hosts => dns::hosts(chart, profile_name),
        Commands::Chart { action } => chart_registry::run(action),
        Commands::Create { action } => create::run(action),
        Commands::Mounts { container } => mounts::list(chart, profile_name, container),
        Commands::Mount { container, devmode } => mounts::mount(chart, profile_name, container, devmode),
        Commands::Unmount { container, devmode } => mounts::unmount(chart, profile_name, container, devmode),
        Commands::Dns { action } => dns::run(chart, profile_name, action),
    }
}
