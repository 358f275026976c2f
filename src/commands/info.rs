use anyhow::Result;

use super::{format_time, open_registry};
use crate::package::PackageInfo;
use crate::runtime::Runtime;
use crate::session::SessionOptions;

/// Show one package.
#[tracing::instrument(skip(runtime, options))]
pub async fn info<R: Runtime + 'static>(
    runtime: R,
    options: SessionOptions,
    name: &str,
    json: bool,
) -> Result<()> {
    let mut registry = open_registry(runtime, options)?;
    registry.load_all().await?;
    let container_path = registry.container_path(name, true)?;
    let info = registry.get_package_info(name)?;

    if json {
        println!("{}", serde_json::to_string_pretty(info)?);
    } else {
        print!("{}", describe(info, &container_path));
    }
    Ok(())
}

fn describe(info: &PackageInfo, container_path: &str) -> String {
    let mut lines = vec![
        format!("Package: {}", info.deployment_name),
        format!("Name: {}", info.display_name),
        format!("Title: {}", info.title),
        format!("Version: {}", info.version),
    ];
    if !container_path.is_empty() {
        lines.push(format!("Category: {}", container_path));
    }
    lines.push(format!("Packaged: {}", format_time(info.time_packaged)));
    lines.push(format!("Installed: {}", format_time(info.time_installed)));
    if info.is_installed() {
        lines.push(format!("Release state: {}", info.release_state));
    }
    if info.is_obsolete {
        lines.push("Obsolete: yes".to_string());
    }
    lines.push(format!(
        "Files: {} run, {} doc, {} source ({} bytes)",
        info.run_files.len(),
        info.doc_files.len(),
        info.source_files.len(),
        info.total_size()
    ));
    if !info.required_packages.is_empty() {
        lines.push(format!("Requires: {}", info.required_packages.join(", ")));
    }
    if !info.required_by.is_empty() {
        lines.push(format!("Required by: {}", info.required_by.join(", ")));
    }
    lines.push(format!("MD5: {}", info.digest));
    if !info.description.is_empty() {
        lines.push(String::new());
        lines.push(info.description.clone());
    }

    let mut text = lines.join("\n");
    text.push('\n');
    text
}
