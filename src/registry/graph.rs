//! Dependency pass over a fully populated package table.
//!
//! The pass is computed into a fresh [`DependencyIndex`] from an immutable view
//! of the table and applied afterwards, so no record is mutated while another
//! one is being inspected.

use log::debug;
use std::collections::{BTreeMap, BTreeSet};

use crate::package::PackageInfo;

pub(crate) type PackageTable = BTreeMap<String, PackageInfo>;

#[derive(Debug, Default, PartialEq)]
pub(crate) struct DependencyIndex {
    /// Back edges: package name to the packages requiring it, in table order.
    pub(crate) required_by: BTreeMap<String, Vec<String>>,
    /// Install times raised by inheritance from dependencies.
    pub(crate) inherited_times: BTreeMap<String, i64>,
}

impl DependencyIndex {
    pub(crate) fn build(packages: &PackageTable) -> Self {
        let mut index = DependencyIndex::default();

        for (name, info) in packages {
            for required in &info.required_packages {
                if packages.contains_key(required) {
                    index
                        .required_by
                        .entry(required.clone())
                        .or_default()
                        .push(name.clone());
                } else {
                    debug!("dependency problem: {} is required by {}", required, name);
                }
            }
        }

        let mut memo = BTreeMap::new();
        let mut visiting = BTreeSet::new();
        for (name, info) in packages {
            let time = effective_time_installed(name, packages, &mut memo, &mut visiting);
            if time != info.time_installed {
                index.inherited_times.insert(name.clone(), time);
            }
        }

        index
    }

    /// Replace every record's back edges and apply inherited install times.
    pub(crate) fn apply(mut self, packages: &mut PackageTable) {
        for (name, info) in packages.iter_mut() {
            info.required_by = self.required_by.remove(name).unwrap_or_default();
            if let Some(time) = self.inherited_times.get(name) {
                info.time_installed = *time;
            }
        }
    }
}

/// Install time of `name` after inheriting from its dependencies.
///
/// A package whose resolvable dependencies are all installed takes the newest
/// dependency time if it is a pure container, or if it is installed itself but
/// older than that dependency. Dependencies are resolved first so nested
/// containers see their children's inherited times. On a dependency cycle the
/// back edge contributes the recorded time. A package none of whose
/// dependencies resolve keeps its recorded time, containers included.
fn effective_time_installed(
    name: &str,
    packages: &PackageTable,
    memo: &mut BTreeMap<String, i64>,
    visiting: &mut BTreeSet<String>,
) -> i64 {
    if let Some(time) = memo.get(name) {
        return *time;
    }
    let Some(info) = packages.get(name) else {
        return 0;
    };
    if !visiting.insert(name.to_string()) {
        return info.time_installed;
    }

    let mut oldest: Option<i64> = None;
    let mut newest = 0;
    for required in &info.required_packages {
        if !packages.contains_key(required) {
            continue;
        }
        let time = effective_time_installed(required, packages, memo, visiting);
        oldest = Some(oldest.map_or(time, |t| t.min(time)));
        newest = newest.max(time);
    }
    visiting.remove(name);

    let time = match oldest {
        Some(oldest)
            if oldest > 0
                && (info.is_container()
                    || (info.is_installed() && info.time_installed < newest)) =>
        {
            newest
        }
        _ => info.time_installed,
    };
    memo.insert(name.to_string(), time);
    time
}

#[cfg(test)]
mod tests {
    use super::*;

    fn package(name: &str, requires: &[&str], files: &[&str], time_installed: i64) -> PackageInfo {
        PackageInfo {
            deployment_name: name.into(),
            required_packages: requires.iter().map(|s| s.to_string()).collect(),
            run_files: files.iter().map(|s| s.to_string()).collect(),
            time_installed,
            ..Default::default()
        }
    }

    fn table(packages: Vec<PackageInfo>) -> PackageTable {
        packages
            .into_iter()
            .map(|p| (p.deployment_name.clone(), p))
            .collect()
    }

    #[test]
    fn test_back_edges_in_table_order() {
        let mut packages = table(vec![
            package("a", &[], &["texmf/a"], 0),
            package("c", &["a"], &["texmf/c"], 0),
            package("b", &["a", "missing"], &["texmf/b"], 0),
        ]);

        DependencyIndex::build(&packages).apply(&mut packages);

        assert_eq!(packages["a"].required_by, vec!["b", "c"]);
        assert!(packages["b"].required_by.is_empty());
    }

    #[test]
    fn test_container_inherits_newest_dependency_time() {
        let mut packages = table(vec![
            package("x", &[], &["texmf/x"], 100),
            package("y", &[], &["texmf/y"], 300),
            package("group", &["x", "y"], &[], 0),
        ]);

        DependencyIndex::build(&packages).apply(&mut packages);

        assert_eq!(packages["group"].time_installed, 300);
        assert_eq!(packages["x"].time_installed, 100);
    }

    #[test]
    fn test_container_with_uninstalled_dependency_is_untouched() {
        let mut packages = table(vec![
            package("x", &[], &["texmf/x"], 100),
            package("y", &[], &["texmf/y"], 0),
            package("group", &["x", "y"], &[], 0),
        ]);

        let index = DependencyIndex::build(&packages);
        assert!(index.inherited_times.is_empty());
        index.apply(&mut packages);
        assert_eq!(packages["group"].time_installed, 0);
    }

    #[test]
    fn test_container_without_resolvable_dependencies_keeps_its_time() {
        let mut packages = table(vec![package("group", &["gone", "lost"], &[], 400)]);

        let index = DependencyIndex::build(&packages);
        assert!(index.inherited_times.is_empty());
        index.apply(&mut packages);
        assert_eq!(packages["group"].time_installed, 400);
    }

    #[test]
    fn test_stale_installed_leaf_is_refreshed() {
        let mut packages = table(vec![
            package("dep", &[], &["texmf/dep"], 500),
            package("leaf", &["dep"], &["texmf/leaf"], 200),
            package("fresh", &["dep"], &["texmf/fresh"], 900),
            package("absent", &["dep"], &["texmf/absent"], 0),
        ]);

        DependencyIndex::build(&packages).apply(&mut packages);

        assert_eq!(packages["leaf"].time_installed, 500);
        assert_eq!(packages["fresh"].time_installed, 900);
        // Not installed and not a container: stays uninstalled
        assert_eq!(packages["absent"].time_installed, 0);
    }

    #[test]
    fn test_nested_containers_see_inherited_times() {
        // "outer" sorts before "inner", so inner must be resolved first
        let mut packages = table(vec![
            package("leaf", &[], &["texmf/leaf"], 700),
            package("inner", &["leaf"], &[], 0),
            package("a-outer", &["inner"], &[], 0),
        ]);

        DependencyIndex::build(&packages).apply(&mut packages);

        assert_eq!(packages["inner"].time_installed, 700);
        assert_eq!(packages["a-outer"].time_installed, 700);
    }

    #[test]
    fn test_dependency_cycle_terminates() {
        let mut packages = table(vec![
            package("p", &["q"], &[], 10),
            package("q", &["p"], &[], 20),
        ]);

        DependencyIndex::build(&packages).apply(&mut packages);

        assert_eq!(packages["p"].required_by, vec!["q"]);
        assert_eq!(packages["q"].required_by, vec!["p"]);
        assert!(packages["p"].time_installed >= 10);
    }

    #[test]
    fn test_apply_replaces_previous_back_edges() {
        let mut packages = table(vec![
            package("a", &[], &["texmf/a"], 0),
            package("b", &["a"], &["texmf/b"], 0),
        ]);
        packages.get_mut("a").unwrap().required_by = vec!["stale".into()];

        DependencyIndex::build(&packages).apply(&mut packages);
        assert_eq!(packages["a"].required_by, vec!["b"]);
    }
}
