//! `ftl gc`: removes stopped containers this chart created that no longer
//! correspond to a container in the current graph (orphaned by a renamed or
//! removed chart entry).

use std::path::PathBuf;

use anyhow::Result;
use ftl_core::introspect::CONTAINER_IDENTITY_LABEL;

use crate::context::AppContext;

pub fn run(chart: Option<PathBuf>, profile: Option<String>) -> Result<()> {
    let ctx = AppContext::load(chart, profile.as_deref())?;

    let mut removed = 0;
    for summary in ctx.engine.containers_all(None)? {
        let Some(details) = ctx.engine.inspect_container(&summary.id)? else { continue };
        if details.state_running {
            continue;
        }
        let Some(container_name) = details.labels.get(CONTAINER_IDENTITY_LABEL) else { continue };
        if ctx.graph.get(container_name).is_some() {
            continue;
        }
        ctx.engine.remove_container(&summary.id)?;
        println!("removed orphaned container {} ({container_name})", details.name);
        removed += 1;
    }

    if removed == 0 {
        println!("nothing to collect");
    }
    Ok(())
}
