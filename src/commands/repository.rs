use anyhow::Result;
use std::sync::Arc;

use crate::repository::{FileConfigStore, RepositorySettings};
use crate::runtime::Runtime;
use crate::session::{Session, SessionOptions};

fn open_settings<R: Runtime>(
    runtime: R,
    options: SessionOptions,
) -> Result<RepositorySettings<R, FileConfigStore<R>>> {
    let session = Session::from_options(&runtime, options)?;
    let runtime = Arc::new(runtime);
    let store = FileConfigStore::for_session(Arc::clone(&runtime), &session)?;
    Ok(RepositorySettings::new(runtime, store))
}

/// Show the default package repository.
#[tracing::instrument(skip(runtime, options))]
pub fn repository<R: Runtime>(runtime: R, options: SessionOptions) -> Result<()> {
    let settings = open_settings(runtime, options)?;
    let repository = settings.default_repository()?;

    let location = if repository.url.is_empty() {
        "(not configured)"
    } else {
        repository.url.as_str()
    };
    println!("Type: {}", repository.repository_type);
    println!("Location: {}", location);
    println!("Release state: {}", repository.release_state);
    Ok(())
}

/// Show the proxy that would be used for `url`.
#[tracing::instrument(skip(runtime, options))]
pub fn proxy<R: Runtime>(runtime: R, options: SessionOptions, url: Option<&str>) -> Result<()> {
    let settings = open_settings(runtime, options)?;
    match settings.try_get_proxy(url)? {
        Some(proxy) => {
            println!("Proxy: {}:{}", proxy.host, proxy.port);
            if proxy.authentication_required {
                println!("User: {}", proxy.user);
            }
        }
        None => println!("No proxy configured."),
    }
    Ok(())
}
