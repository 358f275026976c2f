//! Package repository locations and network proxy settings.

mod config;
mod proxy;

use anyhow::Result;
use serde::Serialize;
use std::fmt;
use std::path::Path;

use crate::package::ReleaseState;
use crate::runtime::Runtime;
use crate::session::PACKAGE_DEFINITION_DIR;

pub use config::{FileConfigStore, MPM_SECTION, REPOSITORY_ENV, RepositorySettings};
pub use proxy::{DEFAULT_PROXY_PORT, ProxySettings};

/// Marker files of a local mirror of a remote repository.
pub const MPM_DB_LIGHT_FILE_NAME: &str = "mpm-db-light.tar.lzma";
pub const MPM_DB_FULL_FILE_NAME: &str = "mpm-db-full.tar.lzma";

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryType {
    #[default]
    Unknown,
    /// A URL.
    Remote,
    /// A local mirror directory.
    Local,
    /// A self-contained distribution root.
    Direct,
}

impl RepositoryType {
    /// Tag stored under the `RepositoryType` configuration key.
    pub fn as_config_value(&self) -> Option<&'static str> {
        match self {
            RepositoryType::Unknown => None,
            RepositoryType::Remote => Some("remote"),
            RepositoryType::Local => Some("local"),
            RepositoryType::Direct => Some("direct"),
        }
    }
}

impl fmt::Display for RepositoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_config_value().unwrap_or("unknown"))
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct RepositoryInfo {
    pub repository_type: RepositoryType,
    pub release_state: ReleaseState,
    /// URL or directory.
    pub url: String,
}

/// Check for `scheme://` with an alphabetic scheme.
pub fn is_url(s: &str) -> bool {
    match s.find("://") {
        Some(pos) if pos > 0 => s[..pos].chars().all(|c| c.is_ascii_alphabetic()),
        _ => false,
    }
}

/// Append a relative path to a base URL.
pub fn make_url(base: &str, rel: &str) -> Result<String> {
    if base.is_empty() {
        anyhow::bail!("Cannot build a URL from an empty base");
    }
    if rel.starts_with('/') {
        anyhow::bail!("Expected a relative URL path, got {:?}", rel);
    }
    let mut url = base.to_string();
    if !url.ends_with('/') {
        url.push('/');
    }
    url.push_str(rel);
    Ok(url)
}

/// A directory holding both package database archives.
pub fn is_local_repository<R: Runtime + ?Sized>(runtime: &R, path: &Path) -> bool {
    runtime.is_dir(path)
        && runtime.exists(&path.join(MPM_DB_LIGHT_FILE_NAME))
        && runtime.exists(&path.join(MPM_DB_FULL_FILE_NAME))
}

/// A directory laid out as a self-contained distribution.
pub fn is_direct_root<R: Runtime + ?Sized>(runtime: &R, path: &Path) -> bool {
    runtime.is_dir(&path.join("texmf").join(PACKAGE_DEFINITION_DIR))
}

pub fn determine_repository_type<R: Runtime + ?Sized>(runtime: &R, url_or_path: &str) -> RepositoryType {
    if is_url(url_or_path) {
        return RepositoryType::Remote;
    }
    let path = Path::new(url_or_path);
    if is_local_repository(runtime, path) {
        RepositoryType::Local
    } else if is_direct_root(runtime, path) {
        RepositoryType::Direct
    } else {
        RepositoryType::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RealRuntime;
    use tempfile::tempdir;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://mirror.example.org/tm/packages/"));
        assert!(is_url("ftp://host/x"));
        assert!(!is_url("/srv/mirror"));
        assert!(!is_url("C:\\mirror"));
        assert!(!is_url("://host"));
        assert!(!is_url("h1tp://host"));
    }

    #[test]
    fn test_make_url() {
        assert_eq!(make_url("http://h/base", "a.tar").unwrap(), "http://h/base/a.tar");
        assert_eq!(make_url("http://h/base/", "a.tar").unwrap(), "http://h/base/a.tar");
        assert!(make_url("", "a").is_err());
        assert!(make_url("http://h", "/a").is_err());
    }

    #[test]
    fn test_determine_repository_type() {
        let dir = tempdir().unwrap();
        let runtime = RealRuntime;

        let mirror = dir.path().join("mirror");
        std::fs::create_dir_all(&mirror).unwrap();
        std::fs::write(mirror.join(MPM_DB_LIGHT_FILE_NAME), "").unwrap();
        assert_eq!(
            determine_repository_type(&runtime, mirror.to_str().unwrap()),
            RepositoryType::Unknown
        );
        std::fs::write(mirror.join(MPM_DB_FULL_FILE_NAME), "").unwrap();
        assert_eq!(
            determine_repository_type(&runtime, mirror.to_str().unwrap()),
            RepositoryType::Local
        );

        let direct = dir.path().join("direct");
        std::fs::create_dir_all(direct.join("texmf/tpm/packages")).unwrap();
        assert_eq!(
            determine_repository_type(&runtime, direct.to_str().unwrap()),
            RepositoryType::Direct
        );

        assert_eq!(
            determine_repository_type(&runtime, "https://example.org/"),
            RepositoryType::Remote
        );
    }
}
