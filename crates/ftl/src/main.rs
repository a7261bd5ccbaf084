use std::process::ExitCode;

use clap::{error::ErrorKind, Parser};

mod chart;
mod cli;
mod commands;
mod context;
mod desired;
mod spell;

use cli::Cli;

fn main() -> ExitCode {
    if let Err(e) = ftl_core::logging::init() {
        eprintln!("failed to initialize logging: {e}");
    }

    match Cli::try_parse() {
        Ok(cli) => match commands::dispatch(cli) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("error: {e:#}");
                ExitCode::FAILURE
            }
        },
        Err(e) if e.kind() == ErrorKind::InvalidSubcommand => {
            if let Some(offending) = first_positional_arg() {
                if let Some(suggestion) = spell::suggest(&offending, cli::KNOWN_COMMANDS.iter().copied()) {
                    eprintln!("error: unrecognized command '{offending}'");
                    eprintln!("  did you mean '{suggestion}'?");
                    return ExitCode::FAILURE;
                }
            }
            let _ = e.print();
            ExitCode::FAILURE
        }
        Err(e) => {
            let _ = e.print();
            if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn first_positional_arg() -> Option<String> {
    std::env::args().skip(1).find(|a| !a.starts_with('-'))
}
