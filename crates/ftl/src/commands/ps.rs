//! `ftl ps`: list instances currently on the host and what the chart expects
//! of them.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use ftl_core::introspect::FormationIntrospector;

use crate::context::AppContext;

pub fn run(chart: Option<PathBuf>, profile: Option<String>) -> Result<()> {
    let ctx = AppContext::load(chart, profile.as_deref())?;
    let images = ctx.image_repository();
    let introspector = FormationIntrospector::new(Arc::clone(&ctx.engine), &ctx.graph, &images, None);
    let actual = introspector.introspect()?;
    let snapshot = actual.snapshot_all();

    if snapshot.is_empty() {
        println!("no instances running");
        return Ok(());
    }

    for (runtime_name, instance) in &snapshot {
        let image = instance.image_id.as_deref().unwrap_or("<unknown>");
        let links: Vec<String> = instance.link_targets.keys().cloned().collect();
        println!(
            "{runtime_name}\t{}\timage={image}\tlinks=[{}]",
            instance.container_name,
            links.join(",")
        );
    }
    Ok(())
}
