use anyhow::Result;
use log::debug;
use std::path::{Path, PathBuf};

use super::PACKAGE_DEFINITION_SUFFIX;
use crate::runtime::Runtime;

/// Deployment name encoded in a definition file name (`<name>.tpm`).
pub fn deployment_name_of(path: &Path) -> Option<String> {
    let file_name = path.file_name()?.to_str()?;
    let name = file_name.strip_suffix(PACKAGE_DEFINITION_SUFFIX)?;
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Find the package definition files directly inside `directory` (non-recursive).
///
/// A missing directory contributes no files. Results are sorted by deployment
/// name so that discovery order does not depend on the file system.
#[tracing::instrument(skip(runtime))]
pub fn find_definition_files<R: Runtime>(
    runtime: &R,
    directory: &Path,
) -> Result<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();

    if !runtime.is_dir(directory) {
        debug!("package definition directory {:?} does not exist", directory);
        return Ok(files);
    }

    for path in runtime.read_dir(directory)? {
        if let Some(name) = deployment_name_of(&path)
            && !runtime.is_dir(&path)
        {
            files.push((name, path));
        }
    }

    files.sort();
    Ok(files)
}
