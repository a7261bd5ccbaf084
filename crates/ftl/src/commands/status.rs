//! `ftl status`: summarize desired (default-boot) vs actual formation state.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use ftl_core::introspect::FormationIntrospector;
use ftl_core::runner::compute_delta;

use crate::context::AppContext;
use crate::desired;

pub fn run(chart: Option<PathBuf>, profile: Option<String>) -> Result<()> {
    let mut ctx = AppContext::load(chart, profile.as_deref())?;
    let images = ctx.image_repository();

    let introspector = FormationIntrospector::new(Arc::clone(&ctx.engine), &ctx.graph, &images, None);
    let actual = introspector.introspect()?;

    let names = ctx.default_boot_containers();
    let desired = desired::build_desired_formation(&mut ctx.graph, &images, &names, None, false)?;

    let delta = compute_delta(&desired, &actual);
    if delta.to_stop.is_empty() && delta.to_start.is_empty() {
        println!("formation up to date: {} instance(s)", actual.snapshot_all().len());
        return Ok(());
    }

    for inst in &delta.to_stop {
        println!("- {} ({}) would stop", inst.runtime_name, inst.container_name);
    }
    for inst in &delta.to_start {
        println!("+ {} ({}) would start", inst.runtime_name, inst.container_name);
    }
    Ok(())
}
