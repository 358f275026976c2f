use serde::{Deserialize, Serialize};
use std::fmt;

use super::Md5Sum;

/// Release channel a package was installed from.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseState {
    #[default]
    Unknown,
    Stable,
    Next,
}

impl ReleaseState {
    /// Value stored in configuration files; `Unknown` is stored as an empty string.
    pub fn as_config_value(&self) -> &'static str {
        match self {
            ReleaseState::Unknown => "",
            ReleaseState::Stable => "stable",
            ReleaseState::Next => "next",
        }
    }

    /// Lenient parse of a configuration value: anything unrecognized is `Unknown`.
    pub fn from_config_value(value: &str) -> Self {
        match value {
            "stable" => ReleaseState::Stable,
            "next" => ReleaseState::Next,
            _ => ReleaseState::Unknown,
        }
    }
}

impl fmt::Display for ReleaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReleaseState::Unknown => write!(f, "unknown"),
            ReleaseState::Stable => write!(f, "stable"),
            ReleaseState::Next => write!(f, "next"),
        }
    }
}

/// A package as known to the registry.
///
/// Declared fields come from the package definition file; `required_by` is
/// derived by the registry and the install-state fields are stamped from the
/// install-state overlay when the record is defined.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct PackageInfo {
    pub deployment_name: String,
    pub display_name: String,
    pub title: String,
    pub version: String,
    pub target_system: String,
    pub description: String,
    pub run_files: Vec<String>,
    pub doc_files: Vec<String>,
    pub source_files: Vec<String>,
    pub size_run_files: u64,
    pub size_doc_files: u64,
    pub size_source_files: u64,
    pub required_packages: Vec<String>,
    #[serde(default)]
    pub required_by: Vec<String>,
    pub digest: Md5Sum,
    /// Seconds since the epoch; 0 if unknown.
    pub time_packaged: i64,
    /// Seconds since the epoch; 0 if not installed.
    pub time_installed: i64,
    pub is_removable: bool,
    pub is_obsolete: bool,
    pub release_state: ReleaseState,
}

impl PackageInfo {
    pub fn is_installed(&self) -> bool {
        self.time_installed > 0
    }

    /// A container groups other packages and owns no files of its own.
    pub fn is_container(&self) -> bool {
        !self.required_packages.is_empty()
            && self.run_files.is_empty()
            && self.doc_files.is_empty()
            && self.source_files.is_empty()
    }

    /// A contained package is required by at least one other package.
    pub fn is_contained(&self) -> bool {
        !self.required_by.is_empty()
    }

    /// All recorded files: run files, then doc files, then source files.
    pub fn all_files(&self) -> impl Iterator<Item = &String> {
        self.run_files
            .iter()
            .chain(self.doc_files.iter())
            .chain(self.source_files.iter())
    }

    pub fn total_size(&self) -> u64 {
        self.size_run_files + self.size_doc_files + self.size_source_files
    }
}
