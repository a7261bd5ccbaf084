//! `ftl profile show|save`: the effective profile-applied option table, and
//! persisting it as the user's own override.

use std::path::PathBuf;

use anyhow::Result;
use ftl_core::config;
use ftl_core::profile::{ContainerOverride, Profile};

use crate::cli::ProfileAction;
use crate::context::AppContext;

pub fn run(chart: Option<PathBuf>, profile_name: Option<String>, action: ProfileAction) -> Result<()> {
    let ctx = AppContext::load(chart, profile_name.as_deref())?;

    match action {
        ProfileAction::Show => {
            let mut names: Vec<&String> = ctx.graph.names().collect();
            names.sort();
            for name in names {
                let Some(options) = ctx.graph.options(name) else { continue };
                let devmodes: Vec<&String> = options.devmodes.iter().collect();
                println!(
                    "{name}\tdefault_boot={:?}\tin_profile={}\tdevmodes={:?}",
                    options.default_boot, options.in_profile, devmodes
                );
            }
            Ok(())
        }
        ProfileAction::Save => {
            let mut user_profile = Profile::default();
            for name in ctx.graph.names() {
                let Some(options) = ctx.graph.options(name) else { continue };
                if options.devmodes.is_empty() && options.default_boot.is_none() {
                    continue;
                }
                user_profile.containers.insert(
                    name.clone(),
                    ContainerOverride {
                        devmodes: options.devmodes.clone(),
                        default_boot: options.default_boot,
                        ..Default::default()
                    },
                );
            }
            let path = config::user_profile_path(&ctx.graph.prefix)?;
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            user_profile.save(&path)?;
            println!("saved user profile to {}", path.display());
            Ok(())
        }
    }
}
