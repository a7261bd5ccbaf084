//! `ftl shell|attach|tail`: interactive access to a running container.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use ftl_core::introspect::FormationIntrospector;

use crate::context::AppContext;

fn find_runtime_name(ctx: &AppContext, container: &str) -> Result<String> {
    let images = ctx.image_repository();
    let introspector = FormationIntrospector::new(Arc::clone(&ctx.engine), &ctx.graph, &images, None);
    let actual = introspector.introspect()?;
    actual
        .get_container_instance(container)
        .map(|inst| inst.borrow().runtime_name.clone())
        .ok_or_else(|| anyhow::anyhow!("'{container}' is not running"))
}

pub fn shell(chart: Option<PathBuf>, profile: Option<String>, container: String) -> Result<()> {
    let ctx = AppContext::load(chart, profile.as_deref())?;
    let runtime_name = find_runtime_name(&ctx, &container)?;
    ctx.engine
        .exec_foreground(&runtime_name, &["/bin/sh".to_string(), "-c".to_string(), "exec bash 2>/dev/null || exec sh".to_string()])?;
    Ok(())
}

pub fn attach(chart: Option<PathBuf>, profile: Option<String>, container: String) -> Result<()> {
    let ctx = AppContext::load(chart, profile.as_deref())?;
    let runtime_name = find_runtime_name(&ctx, &container)?;
    ctx.engine.attach_foreground(&runtime_name)?;
    Ok(())
}

pub fn tail(chart: Option<PathBuf>, profile: Option<String>, container: String, follow: bool) -> Result<()> {
    let ctx = AppContext::load(chart, profile.as_deref())?;
    let runtime_name = find_runtime_name(&ctx, &container)?;
    if follow {
        ctx.engine.logs_follow(&runtime_name)?;
    } else {
        let logs = ctx.engine.logs(&runtime_name, None)?;
        if logs.is_empty() {
            bail!("no logs for '{container}'");
        }
        print!("{logs}");
    }
    Ok(())
}
