use anyhow::{Context, Result};
use log::debug;
use std::path::PathBuf;
use std::sync::Arc;

use super::{RepositoryInfo, RepositoryType, determine_repository_type};
use crate::error::PackageError;
use crate::package::ReleaseState;
use crate::runtime::Runtime;
use crate::session::Session;
use crate::state::{Cfg, ConfigStore};

/// Configuration section holding package manager settings.
pub const MPM_SECTION: &str = "MPM";

/// Environment fallback for the repository location.
pub const REPOSITORY_ENV: &str = "TEXPM_REPOSITORY";

pub(super) const REMOTE_REPOSITORY: &str = "RemoteRepository";
pub(super) const REPOSITORY_RELEASE_STATE: &str = "RepositoryReleaseState";
pub(super) const LOCAL_REPOSITORY: &str = "LocalRepository";
pub(super) const DIRECT_ROOT: &str = "DirectRoot";
pub(super) const REPOSITORY_TYPE: &str = "RepositoryType";

/// INI-file backed [`ConfigStore`]; every change is written through.
pub struct FileConfigStore<R: Runtime> {
    runtime: Arc<R>,
    path: PathBuf,
    cfg: Cfg,
}

impl<R: Runtime> FileConfigStore<R> {
    pub fn open(runtime: Arc<R>, path: PathBuf) -> Result<Self> {
        let cfg = Cfg::load(runtime.as_ref(), &path)?;
        Ok(Self { runtime, path, cfg })
    }

    /// The session's writable configuration file.
    pub fn for_session(runtime: Arc<R>, session: &Session) -> Result<Self> {
        Self::open(runtime, session.config_file())
    }
}

impl<R: Runtime> ConfigStore for FileConfigStore<R> {
    fn try_get_value(&self, section: &str, key: &str) -> Option<String> {
        self.cfg.try_get_value(section, key).map(|v| v.to_string())
    }

    fn set_value(&mut self, section: &str, key: &str, value: &str) -> Result<()> {
        self.cfg.put_value(section, key, value);
        self.cfg
            .save(self.runtime.as_ref(), &self.path)
            .with_context(|| format!("Failed to save configuration {:?}", self.path))
    }
}

/// Repository and proxy settings read from a [`ConfigStore`] with an
/// environment fallback.
pub struct RepositorySettings<R: Runtime, S: ConfigStore> {
    pub(super) runtime: Arc<R>,
    pub(super) store: S,
    /// Proxy credentials are never persisted.
    pub(super) proxy_user: String,
    pub(super) proxy_password: String,
}

impl<R: Runtime, S: ConfigStore> RepositorySettings<R, S> {
    pub fn new(runtime: Arc<R>, store: S) -> Self {
        Self {
            runtime,
            store,
            proxy_user: String::new(),
            proxy_password: String::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub(super) fn value(&self, key: &str) -> Option<String> {
        self.store.try_get_value(MPM_SECTION, key)
    }

    /// `TEXPM_REPOSITORY`, if set and of the wanted kind.
    fn env_repository(&self, wanted: Option<RepositoryType>) -> Option<String> {
        let value = self
            .runtime
            .env_var(REPOSITORY_ENV)
            .ok()
            .filter(|v| !v.is_empty())?;
        match wanted {
            Some(kind) if determine_repository_type(self.runtime.as_ref(), &value) != kind => {
                debug!("{}={:?} is not a {} repository", REPOSITORY_ENV, value, kind);
                None
            }
            _ => Some(value),
        }
    }

    pub fn try_get_remote_repository(&self) -> Option<(String, ReleaseState)> {
        if let Some(url) = self.value(REMOTE_REPOSITORY) {
            let release_state = self
                .value(REPOSITORY_RELEASE_STATE)
                .map(|v| ReleaseState::from_config_value(&v))
                .unwrap_or_default();
            return Some((url, release_state));
        }
        self.env_repository(Some(RepositoryType::Remote))
            .map(|url| (url, ReleaseState::Unknown))
    }

    pub fn remote_repository(&self) -> Result<(String, ReleaseState)> {
        self.try_get_remote_repository()
            .context("No remote package repository is configured")
    }

    pub fn set_remote_repository(&mut self, url: &str, release_state: ReleaseState) -> Result<()> {
        self.store.set_value(MPM_SECTION, REMOTE_REPOSITORY, url)?;
        let state = match release_state {
            ReleaseState::Unknown => "unknown",
            other => other.as_config_value(),
        };
        self.store
            .set_value(MPM_SECTION, REPOSITORY_RELEASE_STATE, state)
    }

    pub fn try_get_local_repository(&self) -> Option<PathBuf> {
        self.value(LOCAL_REPOSITORY)
            .or_else(|| self.env_repository(Some(RepositoryType::Local)))
            .map(PathBuf::from)
    }

    pub fn local_repository(&self) -> Result<PathBuf> {
        self.try_get_local_repository()
            .context("No local package repository is configured")
    }

    pub fn set_local_repository(&mut self, path: &str) -> Result<()> {
        self.store.set_value(MPM_SECTION, LOCAL_REPOSITORY, path)
    }

    pub fn try_get_direct_root(&self) -> Option<PathBuf> {
        self.value(DIRECT_ROOT)
            .or_else(|| self.env_repository(Some(RepositoryType::Direct)))
            .map(PathBuf::from)
    }

    pub fn direct_root(&self) -> Result<PathBuf> {
        self.try_get_direct_root()
            .context("No direct distribution root is configured")
    }

    pub fn set_direct_root(&mut self, path: &str) -> Result<()> {
        self.store.set_value(MPM_SECTION, DIRECT_ROOT, path)
    }

    /// The repository to install from.
    ///
    /// The configured `RepositoryType` decides which location is used; without
    /// it `TEXPM_REPOSITORY` is classified, and without that the result is a
    /// remote repository with an empty URL.
    #[tracing::instrument(skip(self))]
    pub fn default_repository(&self) -> Result<RepositoryInfo> {
        if let Some(kind) = self.value(REPOSITORY_TYPE) {
            return match kind.as_str() {
                "remote" => {
                    let (url, release_state) = self.remote_repository()?;
                    Ok(RepositoryInfo {
                        repository_type: RepositoryType::Remote,
                        release_state,
                        url,
                    })
                }
                "local" => Ok(RepositoryInfo {
                    repository_type: RepositoryType::Local,
                    release_state: ReleaseState::Unknown,
                    url: self.local_repository()?.to_string_lossy().into_owned(),
                }),
                "direct" => Ok(RepositoryInfo {
                    repository_type: RepositoryType::Direct,
                    release_state: ReleaseState::Unknown,
                    url: self.direct_root()?.to_string_lossy().into_owned(),
                }),
                _ => Err(PackageError::UnknownRepositoryType(kind).into()),
            };
        }

        if let Some(url) = self.env_repository(None) {
            return Ok(RepositoryInfo {
                repository_type: determine_repository_type(self.runtime.as_ref(), &url),
                release_state: ReleaseState::Unknown,
                url,
            });
        }

        Ok(RepositoryInfo {
            repository_type: RepositoryType::Remote,
            ..Default::default()
        })
    }

    /// Store `repository` as the default. An `Unknown` type is detected from
    /// the location.
    #[tracing::instrument(skip(self))]
    pub fn set_default_repository(&mut self, repository: &RepositoryInfo) -> Result<()> {
        let repository_type = match repository.repository_type {
            RepositoryType::Unknown => {
                determine_repository_type(self.runtime.as_ref(), &repository.url)
            }
            other => other,
        };

        match repository_type {
            RepositoryType::Remote => {
                self.set_remote_repository(&repository.url, repository.release_state)?
            }
            RepositoryType::Local => self.set_local_repository(&repository.url)?,
            RepositoryType::Direct => self.set_direct_root(&repository.url)?,
            RepositoryType::Unknown => {
                anyhow::bail!("Cannot determine the repository type of {:?}", repository.url)
            }
        }

        let tag = repository_type.as_config_value().unwrap_or_default();
        self.store.set_value(MPM_SECTION, REPOSITORY_TYPE, tag)
    }
}
