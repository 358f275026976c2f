//! The package registry: the authoritative table of package records.
//!
//! Records come from bulk loading of the scope definition directories (see
//! `loader`) or from a lazy single-file lookup. Once every scope is loaded the
//! registry runs the dependency pass and adds the synthetic containers.

mod files;
mod graph;
mod loader;

use anyhow::{Context, Result};
use log::{debug, info};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::error::PackageError;
use crate::package::{PackageInfo, ReleaseState, targets_this_system, tpm};
use crate::runtime::Runtime;
use crate::session::{Scope, Session};
use crate::state::InstallStateOverlay;

pub use files::InstalledFileInfo;
pub(crate) use files::FileRefTable;
use graph::DependencyIndex;

/// Synthetic container holding obsolete top-level packages.
pub const OBSOLETE_CONTAINER: &str = "_texpm-obsolete";
/// Synthetic container holding every package no other container claims.
pub const UNCATEGORIZED_CONTAINER: &str = "_texpm-all-the-rest";

/// Loading progress of the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Empty,
    /// Some scope directories were read; the dependency pass has not run.
    PartiallyLoaded(Scope),
    FullyLoaded,
}

pub struct PackageRegistry<R: Runtime + 'static> {
    pub(crate) runtime: Arc<R>,
    pub(crate) session: Session,
    pub(crate) overlay: InstallStateOverlay<R>,
    pub(crate) packages: BTreeMap<String, PackageInfo>,
    pub(crate) file_refs: FileRefTable,
    pub(crate) state: LoadState,
}

impl<R: Runtime + 'static> PackageRegistry<R> {
    pub fn new(runtime: Arc<R>, session: Session) -> Self {
        let overlay = InstallStateOverlay::new(Arc::clone(&runtime), session.clone());
        Self {
            runtime,
            session,
            overlay,
            packages: BTreeMap::new(),
            file_refs: FileRefTable::default(),
            state: LoadState::Empty,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    /// Insert or replace a record under `name`, stamping its install state.
    ///
    /// In direct mode every package counts as installed at its packaged time;
    /// otherwise the install-state overlay is consulted.
    pub fn define(&mut self, name: &str, mut info: PackageInfo) -> Result<&PackageInfo> {
        info.deployment_name = name.to_string();
        if self.session.is_direct_mode() {
            info.is_removable = false;
            info.is_obsolete = false;
            info.time_installed = info.time_packaged;
        } else {
            info.is_removable = self.overlay.is_removable(name)?;
            info.is_obsolete = self.overlay.is_obsolete(name)?;
            info.time_installed = self.overlay.time_installed(name)?;
            if info.is_installed() {
                info.release_state = self.overlay.release_state(name)?;
            }
        }

        let record = match self.packages.entry(name.to_string()) {
            Entry::Occupied(mut entry) => {
                entry.insert(info);
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(info),
        };
        Ok(record)
    }

    /// Look up a package, parsing its definition file on demand.
    ///
    /// Returns `None` when no scope defines the package, or when its
    /// definition targets another platform.
    #[tracing::instrument(skip(self))]
    pub fn try_get_package_info(&mut self, name: &str) -> Result<Option<&PackageInfo>> {
        if self.packages.contains_key(name) {
            return Ok(self.packages.get(name));
        }
        if self.state == LoadState::FullyLoaded {
            return Ok(None);
        }

        let Some(path) = self
            .session
            .scopes()
            .into_iter()
            .map(|scope| self.session.package_definition_file(scope, name))
            .find(|path| self.runtime.exists(path))
        else {
            return Ok(None);
        };

        let info = tpm::parse(self.runtime.as_ref(), &path)?;
        if !targets_this_system(&info) {
            debug!("{}: ignoring {} package", name, info.target_system);
            return Ok(None);
        }

        self.define(name, info)?;
        if let Some(record) = self.packages.get(name)
            && record.is_installed()
        {
            self.file_refs.add_package(record);
        }
        Ok(self.packages.get(name))
    }

    /// Like [`try_get_package_info`](Self::try_get_package_info), but an
    /// unknown package is an error.
    pub fn get_package_info(&mut self, name: &str) -> Result<&PackageInfo> {
        self.try_get_package_info(name)?.ok_or_else(|| {
            PackageError::UnknownPackage {
                name: name.to_string(),
            }
            .into()
        })
    }

    /// Every package, loading all scopes first if needed.
    pub async fn get_all(&mut self) -> Result<Vec<&PackageInfo>> {
        self.load_all().await?;
        Ok(self.packages.values().collect())
    }

    /// Run the dependency pass and add the synthetic containers.
    ///
    /// Must run once, after every real definition has been inserted.
    #[tracing::instrument(skip(self))]
    pub(crate) fn finalize(&mut self) -> Result<()> {
        // Containers from an earlier pass are rebuilt from scratch
        self.packages.remove(OBSOLETE_CONTAINER);
        self.packages.remove(UNCATEGORIZED_CONTAINER);

        DependencyIndex::build(&self.packages).apply(&mut self.packages);

        let obsolete = self.synthesize_container(
            OBSOLETE_CONTAINER,
            "Obsolete",
            "Obsolete packages",
            "Packages that were removed from the package repository.",
            |info| info.is_obsolete,
        )?;
        let uncategorized = self.synthesize_container(
            UNCATEGORIZED_CONTAINER,
            "Uncategorized",
            "Uncategorized packages",
            "",
            |_| true,
        )?;
        debug!(
            "synthetic containers: {} obsolete, {} uncategorized",
            obsolete, uncategorized
        );

        self.state = LoadState::FullyLoaded;
        Ok(())
    }

    /// Group every top-level package matching `select` under a new container.
    /// Returns the number of members; an empty container is not defined.
    fn synthesize_container(
        &mut self,
        name: &str,
        display_name: &str,
        title: &str,
        description: &str,
        select: impl Fn(&PackageInfo) -> bool,
    ) -> Result<usize> {
        let mut members = Vec::new();
        for info in self.packages.values_mut() {
            if !info.is_contained() && !info.is_container() && select(info) {
                members.push(info.deployment_name.clone());
                info.required_by.push(name.to_string());
            }
        }
        if members.is_empty() {
            return Ok(0);
        }

        let count = members.len();
        let container = PackageInfo {
            display_name: display_name.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            required_packages: members,
            ..Default::default()
        };
        self.define(name, container)?;
        Ok(count)
    }

    /// Path of the containers leading to `name`, outermost first, each
    /// segment prefixed with `/`. Only the first container parent is followed.
    pub fn container_path(&mut self, name: &str, use_display_names: bool) -> Result<String> {
        self.get_package_info(name)?;

        let mut segments = Vec::new();
        let mut visited = BTreeSet::from([name.to_string()]);
        let mut current = name.to_string();

        while let Some(parent) = self.packages.get(&current).and_then(|info| {
            info.required_by
                .iter()
                .filter_map(|p| self.packages.get(p))
                .find(|p| p.is_container())
        }) {
            if !visited.insert(parent.deployment_name.clone()) {
                break;
            }
            segments.push(if use_display_names {
                parent.display_name.clone()
            } else {
                parent.deployment_name.clone()
            });
            current = parent.deployment_name.clone();
        }

        Ok(segments
            .iter()
            .rev()
            .map(|segment| format!("/{}", segment))
            .collect())
    }

    /// Forget every record, the file reference table and the install state.
    pub fn clear(&mut self) {
        self.packages.clear();
        self.file_refs.clear();
        self.overlay.reset();
        self.state = LoadState::Empty;
    }

    pub fn unload_database(&mut self) {
        self.clear();
    }

    /// Count the files of a (newly installed) package.
    pub async fn increment_file_ref_counts(&mut self, name: &str) -> Result<()> {
        self.load_all().await?;
        let info = self.packages.get(name).ok_or_else(|| PackageError::UnknownPackage {
            name: name.to_string(),
        })?;
        self.file_refs.add_package(info);
        Ok(())
    }

    pub async fn file_ref_count(&mut self, path: &str) -> Result<u32> {
        self.load_all().await?;
        Ok(self.file_refs.ref_count(path))
    }

    pub async fn installed_file_info(&mut self, path: &str) -> Result<Option<&InstalledFileInfo>> {
        self.load_all().await?;
        Ok(self.file_refs.get(path))
    }

    // Install state

    pub fn is_package_installed(&mut self, name: &str) -> Result<bool> {
        self.overlay.is_installed(name)
    }

    pub fn is_package_obsolete(&mut self, name: &str) -> Result<bool> {
        self.overlay.is_obsolete(name)
    }

    pub fn time_installed(&mut self, name: &str) -> Result<i64> {
        self.overlay.time_installed(name)
    }

    pub fn user_time_installed(&mut self, name: &str) -> Result<i64> {
        self.overlay.user_time_installed(name)
    }

    pub fn common_time_installed(&mut self, name: &str) -> Result<i64> {
        self.overlay.common_time_installed(name)
    }

    /// Record an install time, keeping a loaded record in step.
    pub fn set_time_installed(&mut self, name: &str, time_installed: i64) -> Result<()> {
        self.overlay.set_time_installed(name, time_installed)?;
        if let Some(info) = self.packages.get_mut(name) {
            info.time_installed = time_installed;
        }
        Ok(())
    }

    pub fn declare_package_obsolete(&mut self, name: &str, obsolete: bool) -> Result<()> {
        self.overlay.declare_obsolete(name, obsolete)?;
        if let Some(info) = self.packages.get_mut(name) {
            info.is_obsolete = obsolete;
        }
        Ok(())
    }

    pub fn release_state(&mut self, name: &str) -> Result<ReleaseState> {
        self.overlay.release_state(name)
    }

    pub fn set_release_state(&mut self, name: &str, release_state: ReleaseState) -> Result<()> {
        self.overlay.set_release_state(name, release_state)?;
        if let Some(info) = self.packages.get_mut(name) {
            info.release_state = release_state;
        }
        Ok(())
    }

    pub fn is_removable(&mut self, name: &str) -> Result<bool> {
        self.overlay.is_removable(name)
    }

    pub fn flush_install_state(&mut self) -> Result<()> {
        self.overlay
            .flush()
            .context("Failed to write install state")?;
        info!("install state flushed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RealRuntime;
    use crate::test_utils::{package, write_definition, write_install_state};
    use std::path::PathBuf;
    use tempfile::{TempDir, tempdir};

    struct Roots {
        _dir: TempDir,
        common: PathBuf,
        user: PathBuf,
    }

    fn roots() -> Roots {
        let dir = tempdir().unwrap();
        let common = dir.path().join("common");
        let user = dir.path().join("user");
        std::fs::create_dir_all(&common).unwrap();
        std::fs::create_dir_all(&user).unwrap();
        Roots {
            _dir: dir,
            common,
            user,
        }
    }

    fn open_registry(roots: &Roots, admin: bool) -> PackageRegistry<RealRuntime> {
        let session =
            Session::new(roots.common.clone(), roots.user.clone()).with_admin_mode(admin);
        PackageRegistry::new(Arc::new(RealRuntime), session)
    }

    /// a (no deps), b requires a, c requires a and is obsolete.
    fn abc(roots: &Roots) {
        write_definition(&roots.common, &package("a", &[], &["texmf/tex/a.sty"]));
        write_definition(&roots.common, &package("b", &["a"], &["texmf/tex/b.sty"]));
        write_definition(&roots.common, &package("c", &["a"], &["texmf/tex/c.sty"]));
        write_install_state(
            &roots.common,
            "[a]\nTimeInstalled=100\n\n[c]\nTimeInstalled=200\nObsolete=1\n",
        );
    }

    #[test_log::test(tokio::test)]
    async fn test_load_all_builds_graph_and_containers() {
        let roots = roots();
        abc(&roots);
        let mut registry = open_registry(&roots, false);

        let names: Vec<String> = registry
            .get_all()
            .await
            .unwrap()
            .iter()
            .map(|p| p.deployment_name.clone())
            .collect();
        assert_eq!(
            names,
            vec![UNCATEGORIZED_CONTAINER, OBSOLETE_CONTAINER, "a", "b", "c"]
        );
        assert_eq!(registry.state(), LoadState::FullyLoaded);

        let a = registry.get_package_info("a").unwrap();
        assert_eq!(a.required_by, vec!["b", "c"]);

        let obsolete = registry.get_package_info(OBSOLETE_CONTAINER).unwrap();
        assert_eq!(obsolete.required_packages, vec!["c"]);

        let rest = registry.get_package_info(UNCATEGORIZED_CONTAINER).unwrap();
        assert_eq!(rest.required_packages, vec!["b"]);

        let c = registry.get_package_info("c").unwrap();
        assert!(c.is_obsolete);
        assert_eq!(c.time_installed, 200);
        assert_eq!(c.required_by, vec![OBSOLETE_CONTAINER]);

        assert_eq!(registry.file_ref_count("texmf/tex/a.sty").await.unwrap(), 1);
        // b is not installed
        assert_eq!(registry.file_ref_count("texmf/tex/b.sty").await.unwrap(), 0);
        let info = registry
            .installed_file_info("texmf/tex/c.sty")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(info.packages, vec!["c"]);
    }

    #[tokio::test]
    async fn test_is_installed_matches_time_installed() {
        let roots = roots();
        abc(&roots);

        for admin in [false, true] {
            let mut registry = open_registry(&roots, admin);
            registry.load_all().await.unwrap();
            for name in ["a", "b", "c"] {
                let time = registry.time_installed(name).unwrap();
                assert_eq!(registry.is_package_installed(name).unwrap(), time > 0);
            }
        }
    }

    #[tokio::test]
    async fn test_user_scope_definition_wins() {
        let roots = roots();
        let mut user_version = package("dup", &[], &["texmf/tex/dup.sty"]);
        user_version.version = "2.0".into();
        let mut common_version = package("dup", &[], &["texmf/tex/dup.sty"]);
        common_version.version = "1.0".into();
        write_definition(&roots.user, &user_version);
        write_definition(&roots.common, &common_version);

        let mut registry = open_registry(&roots, false);
        registry.load_all().await.unwrap();
        assert_eq!(registry.get_package_info("dup").unwrap().version, "2.0");

        // Administrators only see the common scope
        let mut registry = open_registry(&roots, true);
        registry.load_all().await.unwrap();
        assert_eq!(registry.get_package_info("dup").unwrap().version, "1.0");
    }

    #[tokio::test]
    async fn test_other_platforms_are_ignored() {
        let roots = roots();
        let mut foreign = package("foreign", &[], &["texmf/tex/foreign.sty"]);
        foreign.target_system = "amiga".into();
        write_definition(&roots.common, &foreign);
        write_definition(&roots.common, &package("native", &[], &[]));

        let mut registry = open_registry(&roots, false);
        assert!(registry.try_get_package_info("foreign").unwrap().is_none());

        let directory = registry.session().package_definition_dir(Scope::Common);
        assert_eq!(registry.load_directory(&directory).await.unwrap(), 1);
        assert_eq!(registry.state(), LoadState::PartiallyLoaded(Scope::Common));
        assert!(registry.try_get_package_info("native").unwrap().is_some());
    }

    #[test]
    fn test_lazy_lookup_before_bulk_load() {
        let roots = roots();
        abc(&roots);
        let mut registry = open_registry(&roots, false);

        let a = registry.try_get_package_info("a").unwrap().unwrap();
        assert_eq!(a.time_installed, 100);
        // No dependency pass has run yet
        assert!(a.required_by.is_empty());
        assert_eq!(registry.state(), LoadState::Empty);
        assert_eq!(registry.file_refs.ref_count("texmf/tex/a.sty"), 1);

        assert!(registry.try_get_package_info("missing").unwrap().is_none());
        let err = registry.get_package_info("missing").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PackageError>(),
            Some(PackageError::UnknownPackage { name }) if name == "missing"
        ));
    }

    #[tokio::test]
    async fn test_lazy_lookup_is_not_counted_twice() {
        let roots = roots();
        abc(&roots);
        let mut registry = open_registry(&roots, false);

        registry.try_get_package_info("a").unwrap();
        registry.load_all().await.unwrap();
        assert_eq!(registry.file_ref_count("texmf/tex/a.sty").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_absent_after_full_load_does_not_touch_disk() {
        let roots = roots();
        abc(&roots);
        let mut registry = open_registry(&roots, false);
        registry.load_all().await.unwrap();

        // Appears on disk after the bulk load: not picked up
        write_definition(&roots.common, &package("late", &[], &[]));
        assert!(registry.try_get_package_info("late").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_malformed_definition_fails_the_load() {
        let roots = roots();
        abc(&roots);
        let dir = roots.common.join("tpm/packages");
        std::fs::write(dir.join("broken.tpm"), "<rdf:RDF><TPM:MD5>xyz").unwrap();

        let mut registry = open_registry(&roots, false);
        let err = registry.load_all().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PackageError>(),
            Some(PackageError::InvalidDefinition { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_directories_contribute_nothing() {
        let roots = roots();
        let mut registry = open_registry(&roots, false);

        assert!(registry.get_all().await.unwrap().is_empty());
        assert_eq!(registry.state(), LoadState::FullyLoaded);
    }

    #[tokio::test]
    async fn test_coinciding_roots_load_once() {
        let roots = roots();
        abc(&roots);
        let session = Session::new(roots.common.clone(), roots.common.join("."));
        let mut registry = PackageRegistry::new(Arc::new(RealRuntime), session);

        registry.load_all().await.unwrap();
        assert_eq!(registry.get_package_info("a").unwrap().required_by, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_direct_mode_treats_everything_as_installed() {
        let roots = roots();
        let mut pkg = package("d", &[], &["texmf/tex/d.sty"]);
        pkg.time_packaged = 1234;
        write_definition(&roots.common, &pkg);
        write_install_state(&roots.common, "[d]\nObsolete=1\n");

        let session = Session::new(roots.common.clone(), roots.user.clone()).with_direct_mode(true);
        let mut registry = PackageRegistry::new(Arc::new(RealRuntime), session);
        registry.load_all().await.unwrap();

        let d = registry.get_package_info("d").unwrap();
        assert_eq!(d.time_installed, 1234);
        assert!(!d.is_obsolete);
        assert!(!d.is_removable);
        assert!(registry.try_get_package_info(OBSOLETE_CONTAINER).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_container_path() {
        let roots = roots();
        let mut outer = package("outer", &["inner"], &[]);
        outer.display_name = "Outer".into();
        let mut inner = package("inner", &["leaf"], &[]);
        inner.display_name = "Inner".into();
        write_definition(&roots.common, &outer);
        write_definition(&roots.common, &inner);
        write_definition(&roots.common, &package("leaf", &[], &["texmf/tex/leaf.sty"]));

        let mut registry = open_registry(&roots, false);
        registry.load_all().await.unwrap();

        assert_eq!(registry.container_path("leaf", false).unwrap(), "/outer/inner");
        assert_eq!(registry.container_path("leaf", true).unwrap(), "/Outer/Inner");
        assert_eq!(registry.container_path("outer", false).unwrap(), "");
        assert!(registry.container_path("nope", false).is_err());
    }

    #[tokio::test]
    async fn test_clear_reloads_from_disk() {
        let roots = roots();
        abc(&roots);
        let mut registry = open_registry(&roots, false);
        registry.load_all().await.unwrap();

        write_definition(&roots.common, &package("late", &[], &[]));
        registry.clear();
        assert_eq!(registry.state(), LoadState::Empty);
        assert_eq!(registry.file_refs.len(), 0);

        registry.load_all().await.unwrap();
        assert!(registry.try_get_package_info("late").unwrap().is_some());
        assert_eq!(registry.file_ref_count("texmf/tex/a.sty").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_load_database() {
        let roots = roots();
        abc(&roots);
        let mut registry = open_registry(&roots, false);

        registry
            .load_database(&roots.common.join("tpm/packages"))
            .await
            .unwrap();
        assert_eq!(registry.state(), LoadState::FullyLoaded);
        assert_eq!(registry.get_package_info("a").unwrap().required_by, vec!["b", "c"]);

        let mut registry = open_registry(&roots, false);
        assert!(
            registry
                .load_database(&roots.common.join("mpm-db-full.tar.lzma"))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_load_database_replaces_loaded_table() {
        let roots = roots();
        abc(&roots);
        let mut registry = open_registry(&roots, false);
        registry.load_all().await.unwrap();
        assert_eq!(
            registry.get_package_info(UNCATEGORIZED_CONTAINER).unwrap().required_packages,
            vec!["b"]
        );

        let database = roots.common.join("database");
        write_definition(&database, &package("d", &[], &["texmf/tex/d.sty"]));
        registry
            .load_database(&database.join("tpm/packages"))
            .await
            .unwrap();

        assert_eq!(registry.state(), LoadState::FullyLoaded);
        assert!(registry.try_get_package_info("b").unwrap().is_none());
        assert!(registry.try_get_package_info(OBSOLETE_CONTAINER).unwrap().is_none());
        assert_eq!(
            registry.get_package_info(UNCATEGORIZED_CONTAINER).unwrap().required_packages,
            vec!["d"]
        );
        assert_eq!(
            registry.get_package_info("d").unwrap().required_by,
            vec![UNCATEGORIZED_CONTAINER]
        );
    }

    #[tokio::test]
    async fn test_reload_after_extra_directory_rebuilds_containers() {
        let roots = roots();
        abc(&roots);
        let mut registry = open_registry(&roots, false);
        registry.load_all().await.unwrap();

        let extra = roots.common.join("extra");
        write_definition(&extra, &package("late", &[], &[]));
        registry
            .load_directory(&extra.join("tpm/packages"))
            .await
            .unwrap();
        assert_eq!(registry.state(), LoadState::PartiallyLoaded(Scope::Common));

        registry.load_all().await.unwrap();
        assert_eq!(registry.state(), LoadState::FullyLoaded);
        assert_eq!(
            registry.get_package_info(UNCATEGORIZED_CONTAINER).unwrap().required_packages,
            vec!["b", "late"]
        );
        for name in ["b", "late"] {
            assert_eq!(
                registry.get_package_info(name).unwrap().required_by,
                vec![UNCATEGORIZED_CONTAINER]
            );
        }
        assert_eq!(
            registry.get_package_info(OBSOLETE_CONTAINER).unwrap().required_packages,
            vec!["c"]
        );
    }

    #[tokio::test]
    async fn test_install_state_passthroughs_update_records() {
        let roots = roots();
        abc(&roots);
        let mut registry = open_registry(&roots, false);
        registry.load_all().await.unwrap();

        registry.set_time_installed("b", 300).unwrap();
        registry.set_release_state("b", ReleaseState::Next).unwrap();
        registry.declare_package_obsolete("b", true).unwrap();
        assert_eq!(registry.get_package_info("b").unwrap().time_installed, 300);
        assert!(registry.is_removable("b").unwrap());
        registry.increment_file_ref_counts("b").await.unwrap();
        assert_eq!(registry.file_ref_count("texmf/tex/b.sty").await.unwrap(), 1);
        registry.flush_install_state().unwrap();

        let text = std::fs::read_to_string(roots.user.join("config/packages.ini")).unwrap();
        assert!(text.contains("[b]"));
        assert!(text.contains("TimeInstalled=300"));
        assert!(text.contains("ReleaseState=next"));
        assert!(text.contains("Obsolete=1"));

        let mut reloaded = open_registry(&roots, false);
        reloaded.load_all().await.unwrap();
        let b = reloaded.get_package_info("b").unwrap();
        assert_eq!(b.time_installed, 300);
        assert_eq!(b.release_state, ReleaseState::Next);
        assert!(b.is_obsolete);
    }
}
