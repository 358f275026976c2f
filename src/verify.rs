//! Integrity verification of installed packages.

use anyhow::Result;
use log::{debug, warn};
use md5::{Digest, Md5};
use std::collections::BTreeMap;
use std::path::Path;

use crate::package::{Md5Sum, PACKAGE_DEFINITION_SUFFIX, PackageInfo, strip_texmf_prefix};
use crate::registry::PackageRegistry;
use crate::runtime::{Runtime, to_dos_separators};
use crate::session::Scope;

/// Digest of every installed `texmf/` file of `info` below `root`, keyed by the
/// recorded file name. Definition files are not digested.
///
/// Returns `None` as soon as a listed file is missing.
pub fn collect_file_digests<R: Runtime>(
    runtime: &R,
    root: &Path,
    info: &PackageInfo,
) -> Result<Option<BTreeMap<String, Md5Sum>>> {
    let mut digests = BTreeMap::new();
    for file in info.all_files() {
        let Some(relative) = strip_texmf_prefix(file) else {
            continue;
        };
        let path = root.join(relative);
        if !runtime.exists(&path) {
            warn!("package verification failed: file {:?} does not exist", path);
            return Ok(None);
        }
        if relative.ends_with(PACKAGE_DEFINITION_SUFFIX) {
            continue;
        }
        digests.insert(file.clone(), Md5Sum::of_file(runtime, &path)?);
    }
    Ok(Some(digests))
}

/// Combine per-file digests into the package digest.
///
/// Files are visited in name order; each contributes its backslash-separated
/// name followed by its raw digest bytes.
pub fn aggregate_digest(file_digests: &BTreeMap<String, Md5Sum>) -> Md5Sum {
    let mut hasher = Md5::new();
    for (file, digest) in file_digests {
        hasher.update(to_dos_separators(file).as_bytes());
        hasher.update(digest.as_bytes());
    }
    Md5Sum::from_hasher(hasher)
}

/// Package digest of the files currently installed below `root`, or `None`
/// if a listed file is missing.
pub fn compute_package_digest<R: Runtime>(
    runtime: &R,
    root: &Path,
    info: &PackageInfo,
) -> Result<Option<Md5Sum>> {
    Ok(collect_file_digests(runtime, root, info)?.map(|digests| aggregate_digest(&digests)))
}

impl<R: Runtime + 'static> PackageRegistry<R> {
    /// Check that the installed files of `name` still match its recorded digest.
    ///
    /// Files are read from the user root when the package is user-installed
    /// (outside administrator mode), else from the common root.
    #[tracing::instrument(skip(self))]
    pub fn verify_installed_package(&mut self, name: &str) -> Result<bool> {
        let info = self.get_package_info(name)?.clone();

        let scope = if !self.session.is_admin_mode() && self.overlay.user_time_installed(name)? != 0
        {
            Scope::User
        } else {
            Scope::Common
        };
        let root = self.session.root(scope).to_path_buf();
        debug!("verifying {} below {:?}", name, root);

        let Some(computed) = compute_package_digest(self.runtime.as_ref(), &root, &info)? else {
            return Ok(false);
        };

        if computed != info.digest {
            warn!("package {} verification failed: some files have been modified", name);
            warn!("expected digest: {}", info.digest);
            warn!("computed digest: {}", computed);
            return Ok(false);
        }
        Ok(true)
    }
}
