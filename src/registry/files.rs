use log::debug;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::package::{PackageInfo, strip_texmf_prefix};

/// What the registry knows about one installed file.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct InstalledFileInfo {
    /// Number of installed file-list entries naming this file.
    pub ref_count: u32,
    /// Packages owning the file, in the order they were counted.
    pub packages: Vec<String>,
}

/// Reverse map from recorded file path to the installed packages that own it.
#[derive(Debug, Default)]
pub(crate) struct FileRefTable {
    entries: BTreeMap<String, InstalledFileInfo>,
}

impl FileRefTable {
    /// Count every `texmf/` file of `info`. Other files are not tracked.
    pub(crate) fn add_package(&mut self, info: &PackageInfo) {
        for file in info.all_files() {
            if strip_texmf_prefix(file).is_none() {
                continue;
            }
            let entry = self.entries.entry(file.clone()).or_default();
            entry.ref_count += 1;
            if !entry.packages.contains(&info.deployment_name) {
                entry.packages.push(info.deployment_name.clone());
            }
            if entry.ref_count == 2 {
                debug!("{}: ref count > 1", file);
            }
        }
    }

    pub(crate) fn get(&self, path: &str) -> Option<&InstalledFileInfo> {
        self.entries.get(path)
    }

    pub(crate) fn ref_count(&self, path: &str) -> u32 {
        self.get(path).map_or(0, |info| info.ref_count)
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn package(name: &str, run_files: &[&str]) -> PackageInfo {
        PackageInfo {
            deployment_name: name.into(),
            run_files: run_files.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_shared_files_are_counted_per_package() {
        let mut table = FileRefTable::default();
        table.add_package(&package("a", &["texmf/tex/a.sty", "texmf/tex/shared.cfg"]));
        table.add_package(&package("b", &["texmf/tex/shared.cfg"]));

        assert_eq!(table.ref_count("texmf/tex/a.sty"), 1);
        assert_eq!(table.ref_count("texmf/tex/shared.cfg"), 2);
        assert_eq!(
            table.get("texmf/tex/shared.cfg").unwrap().packages,
            vec!["a", "b"]
        );
        assert_eq!(table.ref_count("texmf/tex/unknown.sty"), 0);
    }

    #[test]
    fn test_files_outside_texmf_are_ignored() {
        let mut table = FileRefTable::default();
        table.add_package(&package("a", &["bin/tool", "texmf/tex/a.sty"]));

        assert_eq!(table.len(), 1);
        assert_eq!(table.ref_count("bin/tool"), 0);

        table.clear();
        assert_eq!(table.len(), 0);
    }
}
