//! Command implementations behind the `texpm` binary.

mod fndb;
mod info;
mod list;
mod repository;
mod verify;

pub use fndb::fndb;
pub use info::info;
pub use list::list;
pub use repository::{proxy, repository};
pub use verify::verify;

use anyhow::Result;
use log::debug;
use std::sync::Arc;

use crate::registry::PackageRegistry;
use crate::runtime::Runtime;
use crate::session::{Session, SessionOptions};

/// Resolve the session and build a registry over it.
pub(crate) fn open_registry<R: Runtime + 'static>(
    runtime: R,
    options: SessionOptions,
) -> Result<PackageRegistry<R>> {
    let session = Session::from_options(&runtime, options)?;
    debug!("Using session {:?}", session);
    Ok(PackageRegistry::new(Arc::new(runtime), session))
}

/// Render a timestamp for humans; 0 means "never".
pub(crate) fn format_time(seconds: i64) -> String {
    if seconds <= 0 {
        return "-".to_string();
    }
    match chrono::DateTime::from_timestamp(seconds, 0) {
        Some(time) => time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => seconds.to_string(),
    }
}
