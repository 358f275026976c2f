use anyhow::{Context, Result};
use log::{debug, info};
use std::path::PathBuf;
use std::sync::Arc;

use super::Cfg;
use crate::error::PackageError;
use crate::package::ReleaseState;
use crate::runtime::Runtime;
use crate::session::{Scope, Session};

const TIME_INSTALLED: &str = "TimeInstalled";
const OBSOLETE: &str = "Obsolete";
const RELEASE_STATE: &str = "ReleaseState";

/// One scope's `packages.ini` together with the content it had when loaded.
#[derive(Debug)]
struct ScopeStore {
    path: PathBuf,
    cfg: Cfg,
    baseline: Cfg,
}

impl ScopeStore {
    fn load<R: Runtime>(runtime: &R, path: PathBuf) -> Result<Self> {
        let cfg = Cfg::load(runtime, &path)?;
        Ok(Self {
            path,
            baseline: cfg.clone(),
            cfg,
        })
    }

    fn is_modified(&self) -> bool {
        self.cfg != self.baseline
    }

    fn time_installed(&self, name: &str) -> Result<Option<i64>> {
        self.cfg
            .try_get_value(name, TIME_INSTALLED)
            .map(|value| {
                value.parse().with_context(|| {
                    format!("Invalid {} for {:?} in {:?}", TIME_INSTALLED, name, self.path)
                })
            })
            .transpose()
    }
}

#[derive(Debug, Default)]
struct Stores {
    common: Option<ScopeStore>,
    user: Option<ScopeStore>,
}

/// Per-package install state kept in the common and user `packages.ini` stores.
///
/// Reads prefer the user store outside administrator mode; writes go to the
/// user store unless running as administrator or no user store exists. When
/// both roots resolve to the same directory only the common store is used.
/// Stores are read lazily on first access and written back by [`flush`].
///
/// [`flush`]: InstallStateOverlay::flush
pub struct InstallStateOverlay<R: Runtime> {
    runtime: Arc<R>,
    session: Session,
    stores: Option<Stores>,
}

impl<R: Runtime> InstallStateOverlay<R> {
    pub fn new(runtime: Arc<R>, session: Session) -> Self {
        Self {
            runtime,
            session,
            stores: None,
        }
    }

    /// Read both scope stores. Only the first call touches the disk.
    #[tracing::instrument(skip(self))]
    pub fn load(&mut self) -> Result<()> {
        if self.stores.is_some() {
            return Ok(());
        }

        let common_path = self.session.install_state_file(Scope::Common);
        debug!("loading common install state from {:?}", common_path);
        let common = ScopeStore::load(self.runtime.as_ref(), common_path)?;

        let user = if !self.session.is_admin_mode()
            && !self.session.roots_coincide(self.runtime.as_ref())
        {
            let user_path = self.session.install_state_file(Scope::User);
            debug!("loading user install state from {:?}", user_path);
            Some(ScopeStore::load(self.runtime.as_ref(), user_path)?)
        } else {
            None
        };

        self.stores = Some(Stores {
            common: Some(common),
            user,
        });
        Ok(())
    }

    /// Write back every store whose content differs from what was loaded.
    #[tracing::instrument(skip(self))]
    pub fn flush(&mut self) -> Result<()> {
        let Some(stores) = self.stores.as_mut() else {
            return Ok(());
        };
        for store in [stores.common.as_mut(), stores.user.as_mut()]
            .into_iter()
            .flatten()
        {
            if store.is_modified() {
                info!("flushing install state to {:?}", store.path);
                store.cfg.save(self.runtime.as_ref(), &store.path)?;
                store.baseline = store.cfg.clone();
            }
        }
        Ok(())
    }

    /// Discard the in-memory stores; the next access reloads them.
    pub fn reset(&mut self) {
        self.stores = None;
    }

    fn stores(&mut self) -> Result<&mut Stores> {
        self.load()?;
        self.stores
            .as_mut()
            .context("install state stores are not loaded")
    }

    fn read_value(&mut self, name: &str, key: &str) -> Result<Option<String>> {
        let admin_mode = self.session.is_admin_mode();
        let stores = self.stores()?;
        if !admin_mode
            && let Some(value) = stores
                .user
                .as_ref()
                .and_then(|s| s.cfg.try_get_value(name, key))
        {
            return Ok(Some(value.to_string()));
        }
        Ok(stores
            .common
            .as_ref()
            .and_then(|s| s.cfg.try_get_value(name, key))
            .map(|v| v.to_string()))
    }

    /// The store that receives writes.
    fn writable_store(&mut self) -> Result<&mut ScopeStore> {
        let admin_mode = self.session.is_admin_mode();
        let stores = self.stores()?;
        let store = if admin_mode || stores.user.is_none() {
            stores.common.as_mut()
        } else {
            stores.user.as_mut()
        };
        store.context("no writable install state store")
    }

    pub fn time_installed(&mut self, name: &str) -> Result<i64> {
        match self.read_value(name, TIME_INSTALLED)? {
            Some(value) => value
                .parse()
                .with_context(|| format!("Invalid {} for {:?}", TIME_INSTALLED, name)),
            None => Ok(0),
        }
    }

    pub fn common_time_installed(&mut self, name: &str) -> Result<i64> {
        let stores = self.stores()?;
        match stores.common.as_ref() {
            Some(store) => Ok(store.time_installed(name)?.unwrap_or(0)),
            None => Ok(0),
        }
    }

    /// Install time recorded in the user store. Not available to administrators.
    pub fn user_time_installed(&mut self, name: &str) -> Result<i64> {
        if self.session.is_admin_mode() {
            return Err(PackageError::UserScopeInAdminMode {
                operation: "user_time_installed",
            }
            .into());
        }
        let stores = self.stores()?;
        match stores.user.as_ref() {
            Some(store) => Ok(store.time_installed(name)?.unwrap_or(0)),
            None => Ok(0),
        }
    }

    /// Record an install time; `0` forgets the package in the writable store.
    pub fn set_time_installed(&mut self, name: &str, time_installed: i64) -> Result<()> {
        let store = self.writable_store()?;
        if time_installed == 0 {
            store.cfg.delete_section(name);
        } else {
            store
                .cfg
                .put_value(name, TIME_INSTALLED, &time_installed.to_string());
        }
        Ok(())
    }

    pub fn is_installed(&mut self, name: &str) -> Result<bool> {
        Ok(self.time_installed(name)? > 0)
    }

    pub fn is_obsolete(&mut self, name: &str) -> Result<bool> {
        match self.read_value(name, OBSOLETE)? {
            Some(value) => Ok(value
                .trim()
                .parse::<i64>()
                .with_context(|| format!("Invalid {} for {:?}", OBSOLETE, name))?
                != 0),
            None => Ok(false),
        }
    }

    pub fn declare_obsolete(&mut self, name: &str, obsolete: bool) -> Result<()> {
        let store = self.writable_store()?;
        store
            .cfg
            .put_value(name, OBSOLETE, if obsolete { "1" } else { "0" });
        Ok(())
    }

    pub fn release_state(&mut self, name: &str) -> Result<ReleaseState> {
        Ok(self
            .read_value(name, RELEASE_STATE)?
            .map(|value| ReleaseState::from_config_value(&value))
            .unwrap_or_default())
    }

    pub fn set_release_state(&mut self, name: &str, release_state: ReleaseState) -> Result<()> {
        let store = self.writable_store()?;
        store
            .cfg
            .put_value(name, RELEASE_STATE, release_state.as_config_value());
        Ok(())
    }

    /// Administrators may remove what is installed machine-wide; users only
    /// what is recorded in their own store (or the shared one when the roots
    /// coincide).
    pub fn is_removable(&mut self, name: &str) -> Result<bool> {
        if self.session.is_admin_mode() {
            return Ok(self.common_time_installed(name)? != 0);
        }
        let has_user_store = self.stores()?.user.is_some();
        if has_user_store {
            Ok(self.user_time_installed(name)? != 0)
        } else {
            Ok(self.time_installed(name)? != 0)
        }
    }
}
