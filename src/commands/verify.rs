use anyhow::Result;

use super::open_registry;
use crate::runtime::Runtime;
use crate::session::SessionOptions;

/// Verify installed packages; fails if any of them does not match its digest.
#[tracing::instrument(skip(runtime, options))]
pub async fn verify<R: Runtime + 'static>(
    runtime: R,
    options: SessionOptions,
    names: &[String],
) -> Result<()> {
    let mut registry = open_registry(runtime, options)?;

    let names: Vec<String> = if names.is_empty() {
        registry
            .get_all()
            .await?
            .into_iter()
            .filter(|info| info.is_installed() && !info.is_container())
            .map(|info| info.deployment_name.clone())
            .collect()
    } else {
        names.to_vec()
    };

    let mut failed = Vec::new();
    for name in &names {
        if registry.verify_installed_package(name)? {
            println!("{}: ok", name);
        } else {
            println!("{}: FAILED", name);
            failed.push(name.as_str());
        }
    }

    if !failed.is_empty() {
        anyhow::bail!("Verification failed for: {}", failed.join(", "));
    }
    Ok(())
}
