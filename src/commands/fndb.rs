use anyhow::{Context, Result};
use std::io;
use std::path::PathBuf;

use super::open_registry;
use crate::fndb::ListingFndbWriter;
use crate::runtime::Runtime;
use crate::session::SessionOptions;

/// Write the file name database listing to `output`, or to stdout.
#[tracing::instrument(skip(runtime, options))]
pub async fn fndb<R: Runtime + 'static>(
    runtime: R,
    options: SessionOptions,
    output: Option<PathBuf>,
) -> Result<()> {
    let mut registry = open_registry(runtime, options)?;

    match output {
        Some(path) => {
            let mut writer = ListingFndbWriter::new(Vec::new());
            registry.create_fndb(&mut writer).await?;
            let files = writer.files();
            let runtime = registry.runtime();
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                runtime.create_dir_all(parent)?;
            }
            runtime
                .write(&path, &writer.into_inner())
                .with_context(|| format!("Failed to write {:?}", path))?;
            println!("Wrote {} file(s) to {}", files, path.display());
        }
        None => {
            let mut writer = ListingFndbWriter::new(io::stdout().lock());
            registry.create_fndb(&mut writer).await?;
        }
    }
    Ok(())
}
