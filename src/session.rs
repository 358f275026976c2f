//! Session configuration: installation scopes, modes and well-known paths.
//!
//! A `Session` is an explicit value handed to every service; nothing here is global.

use anyhow::{Context, Result};
use log::debug;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::package::PACKAGE_DEFINITION_SUFFIX;
use crate::runtime::{Runtime, normalize_path};

/// Package definition directory, relative to a scope root.
pub const PACKAGE_DEFINITION_DIR: &str = "tpm/packages";

/// Install-state store, relative to a scope root.
pub const PACKAGES_INI: &str = "config/packages.ini";

/// Generic key-value configuration file, relative to a scope root.
pub const CONFIG_INI: &str = "config/texpm.ini";

/// Virtual root of the package manager file name database.
pub const MPM_ROOT_PATH: &str = "//texpm/[MPM]";

/// Installation scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Machine-wide installation.
    Common,
    /// Per-user installation.
    User,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Common => write!(f, "common"),
            Scope::User => write!(f, "user"),
        }
    }
}

/// Overrides collected from the command line or environment.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub common_root: Option<PathBuf>,
    pub user_root: Option<PathBuf>,
    pub admin_mode: Option<bool>,
    pub direct_mode: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    admin_mode: bool,
    direct_mode: bool,
    common_root: PathBuf,
    user_root: PathBuf,
}

impl Session {
    pub fn new(common_root: PathBuf, user_root: PathBuf) -> Self {
        Self {
            admin_mode: false,
            direct_mode: false,
            common_root,
            user_root,
        }
    }

    pub fn with_admin_mode(mut self, admin_mode: bool) -> Self {
        self.admin_mode = admin_mode;
        self
    }

    pub fn with_direct_mode(mut self, direct_mode: bool) -> Self {
        self.direct_mode = direct_mode;
        self
    }

    /// Resolve a session from explicit overrides, falling back to platform defaults.
    #[tracing::instrument(skip(runtime))]
    pub fn from_options<R: Runtime>(runtime: &R, options: SessionOptions) -> Result<Self> {
        let common_root = match options.common_root {
            Some(path) => path,
            None => default_common_root(runtime),
        };
        let user_root = match options.user_root {
            Some(path) => path,
            None => default_user_root(runtime)?,
        };
        let admin_mode = options
            .admin_mode
            .unwrap_or_else(|| runtime.is_privileged());

        debug!(
            "Session: common root {:?}, user root {:?}, admin {}, direct {}",
            common_root, user_root, admin_mode, options.direct_mode
        );

        Ok(Self {
            admin_mode,
            direct_mode: options.direct_mode,
            common_root,
            user_root,
        })
    }

    pub fn is_admin_mode(&self) -> bool {
        self.admin_mode
    }

    pub fn is_direct_mode(&self) -> bool {
        self.direct_mode
    }

    pub fn root(&self, scope: Scope) -> &Path {
        match scope {
            Scope::Common => &self.common_root,
            Scope::User => &self.user_root,
        }
    }

    /// Get the package definition directory of a scope.
    ///
    /// Returns: `<root>/tpm/packages`
    pub fn package_definition_dir(&self, scope: Scope) -> PathBuf {
        self.root(scope).join(PACKAGE_DEFINITION_DIR)
    }

    /// Returns: `<root>/tpm/packages/<name>.tpm`
    pub fn package_definition_file(&self, scope: Scope, deployment_name: &str) -> PathBuf {
        self.package_definition_dir(scope)
            .join(format!("{}{}", deployment_name, PACKAGE_DEFINITION_SUFFIX))
    }

    /// Returns: `<root>/config/packages.ini`
    pub fn install_state_file(&self, scope: Scope) -> PathBuf {
        self.root(scope).join(PACKAGES_INI)
    }

    /// The writable configuration file: common in administrator mode, user otherwise.
    pub fn config_file(&self) -> PathBuf {
        let scope = if self.admin_mode {
            Scope::Common
        } else {
            Scope::User
        };
        self.root(scope).join(CONFIG_INI)
    }

    pub fn mpm_root_path(&self) -> &'static str {
        MPM_ROOT_PATH
    }

    /// Scopes to search for definitions, in precedence order.
    pub fn scopes(&self) -> Vec<Scope> {
        if self.admin_mode {
            vec![Scope::Common]
        } else {
            vec![Scope::User, Scope::Common]
        }
    }

    /// Check whether both scope roots resolve to the same physical location.
    pub fn roots_coincide<R: Runtime>(&self, runtime: &R) -> bool {
        resolve(runtime, &self.common_root) == resolve(runtime, &self.user_root)
    }
}

fn resolve<R: Runtime>(runtime: &R, path: &Path) -> PathBuf {
    runtime
        .canonicalize(path)
        .unwrap_or_else(|_| normalize_path(path))
}

/// Get the default user installation root directory
#[tracing::instrument(skip(runtime))]
pub fn default_user_root<R: Runtime>(runtime: &R) -> Result<PathBuf> {
    let home_dir = runtime
        .home_dir()
        .context("Could not find home directory")?;
    Ok(home_dir.join(".texpm"))
}

#[cfg(target_os = "macos")]
fn default_common_root<R: Runtime>(_runtime: &R) -> PathBuf {
    PathBuf::from("/opt/texpm")
}

#[cfg(target_os = "windows")]
fn default_common_root<R: Runtime>(_runtime: &R) -> PathBuf {
    PathBuf::from(r"C:\ProgramData\texpm")
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn default_common_root<R: Runtime>(_runtime: &R) -> PathBuf {
    PathBuf::from("/usr/local/share/texpm")
}
