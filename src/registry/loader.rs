use anyhow::{Context, Result};
use futures_util::{StreamExt, TryStreamExt, stream};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{LoadState, PackageRegistry};
use crate::package::{PackageInfo, find_definition_files, targets_this_system, tpm};
use crate::runtime::Runtime;
use crate::session::Scope;

/// Open-file limit requested before parsing a directory.
const MAX_PACKAGE_FILES: u64 = 4000;

/// Descriptors kept free for everything other than definition files.
const RESERVED_DESCRIPTORS: u64 = 64;

/// Parallelism used when the open-file limit cannot be determined.
const FALLBACK_CONCURRENCY: usize = 192;

impl<R: Runtime + 'static> PackageRegistry<R> {
    /// Load the definition directories of every scope, then run the
    /// dependency pass. Only the first call does any work.
    #[tracing::instrument(skip(self))]
    pub async fn load_all(&mut self) -> Result<()> {
        if self.state == LoadState::FullyLoaded {
            return Ok(());
        }

        for scope in self.session.scopes() {
            let directory = self.session.package_definition_dir(scope);
            self.load_directory(&directory).await?;

            if scope == Scope::User && self.session.roots_coincide(self.runtime.as_ref()) {
                debug!("user and common roots coincide, skipping common scope");
                break;
            }
        }

        self.finalize()
    }

    /// Use an unpacked repository database directory as the package table.
    /// Whatever was loaded before is discarded.
    #[tracing::instrument(skip(self))]
    pub async fn load_database(&mut self, path: &Path) -> Result<()> {
        if !self.runtime.is_dir(path) {
            anyhow::bail!(
                "{:?} is not a directory; unpack the package database archive first",
                path
            );
        }
        self.clear();
        self.load_directory(path).await?;
        self.finalize()
    }

    /// Parse the definition files in `directory` and insert them in name order.
    ///
    /// Names that are already defined are skipped, so the first scope loaded
    /// wins. Definitions for other platforms are dropped. Returns the number of
    /// records inserted.
    ///
    /// Leaves the registry partially loaded for the scope owning `directory`;
    /// any other directory counts as the common scope.
    #[tracing::instrument(skip(self))]
    pub async fn load_directory(&mut self, directory: &Path) -> Result<usize> {
        info!("searching {:?} for package definition files", directory);

        let candidates: Vec<PathBuf> = find_definition_files(self.runtime.as_ref(), directory)?
            .into_iter()
            .filter(|(name, _)| !self.packages.contains_key(name))
            .map(|(_, path)| path)
            .collect();

        let parsed = self.parse_all(candidates).await?;

        let mut count = 0;
        for info in parsed {
            if !targets_this_system(&info) {
                debug!(
                    "{}: ignoring {} package",
                    info.deployment_name, info.target_system
                );
                continue;
            }

            let name = info.deployment_name.clone();
            self.define(&name, info)?;
            if let Some(record) = self.packages.get(&name)
                && record.is_installed()
            {
                self.file_refs.add_package(record);
            }
            count += 1;
        }

        self.state = LoadState::PartiallyLoaded(self.scope_of(directory));
        info!("found {} package definition files", count);
        Ok(count)
    }

    fn scope_of(&self, directory: &Path) -> Scope {
        [Scope::User, Scope::Common]
            .into_iter()
            .find(|scope| self.session.package_definition_dir(*scope) == directory)
            .unwrap_or(Scope::Common)
    }

    /// Parse definition files concurrently; results keep the input order.
    async fn parse_all(&self, paths: Vec<PathBuf>) -> Result<Vec<PackageInfo>> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }

        let concurrency = self.parse_concurrency();
        debug!(
            "parsing {} definition files, {} at a time",
            paths.len(),
            concurrency
        );

        let runtime = &self.runtime;
        stream::iter(paths)
            .map(|path| {
                let runtime = Arc::clone(runtime);
                async move {
                    tokio::task::spawn_blocking(move || tpm::parse(runtime.as_ref(), &path))
                        .await
                        .context("Package definition parser task failed")?
                }
            })
            .buffered(concurrency)
            .try_collect()
            .await
    }

    /// Number of definition files that may be open at the same time.
    fn parse_concurrency(&self) -> usize {
        match self.runtime.set_max_open(MAX_PACKAGE_FILES) {
            Ok(limit) => limit
                .saturating_sub(RESERVED_DESCRIPTORS)
                .clamp(1, MAX_PACKAGE_FILES) as usize,
            Err(e) => {
                warn!("Could not raise the open file limit: {:#}", e);
                FALLBACK_CONCURRENCY
            }
        }
    }
}
