use anyhow::Result;
use log::debug;

use super::open_registry;
use crate::runtime::Runtime;
use crate::session::SessionOptions;

/// List all known packages; installed ones are marked with `i`.
#[tracing::instrument(skip(runtime, options))]
pub async fn list<R: Runtime + 'static>(runtime: R, options: SessionOptions) -> Result<()> {
    let mut registry = open_registry(runtime, options)?;
    let packages = registry.get_all().await?;

    if packages.is_empty() {
        println!("No packages found.");
        return Ok(());
    }

    debug!("Found {} package(s)", packages.len());
    for info in packages {
        let marker = if info.is_installed() { "i" } else { " " };
        println!("{} {:<32} {}", marker, info.deployment_name, info.version);
    }

    Ok(())
}
