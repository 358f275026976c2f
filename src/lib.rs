pub mod commands;
pub mod error;
pub mod fndb;
pub mod package;
pub mod registry;
pub mod repository;
pub mod runtime;
pub mod session;
pub mod state;
pub mod verify;

/// Test utilities for cross-platform paths and package fixtures.
#[cfg(test)]
pub mod test_utils {
    use crate::package::{PackageInfo, tpm};
    use crate::runtime::{MockRuntime, RealRuntime};
    use crate::session::{PACKAGE_DEFINITION_DIR, PACKAGES_INI};
    use std::path::{Path, PathBuf};

    /// Returns a test home directory path based on the platform.
    /// - Unix: `/home/user`
    /// - Windows: `C:\Users\user`
    pub fn test_home() -> PathBuf {
        #[cfg(not(windows))]
        {
            PathBuf::from("/home/user")
        }
        #[cfg(windows)]
        {
            PathBuf::from(r"C:\Users\user")
        }
    }

    /// Returns a test machine-wide root based on the platform.
    /// - Unix: `/usr/local/share/texpm`
    /// - Windows: `C:\ProgramData\texpm`
    pub fn test_common_root() -> PathBuf {
        #[cfg(not(windows))]
        {
            PathBuf::from("/usr/local/share/texpm")
        }
        #[cfg(windows)]
        {
            PathBuf::from(r"C:\ProgramData\texpm")
        }
    }

    /// Configure a mock runtime with common defaults for tests.
    /// - home dir set to [`test_home`]
    /// - not privileged
    /// - canonicalize is a no-op passthrough
    pub fn configure_mock_runtime_basics(runtime: &mut MockRuntime) {
        runtime.expect_home_dir().returning(|| Some(test_home()));
        runtime.expect_is_privileged().returning(|| false);
        runtime
            .expect_canonicalize()
            .returning(|p| Ok(p.to_path_buf()));
    }

    /// A package owning `files` as run files and requiring `requires`.
    pub fn package(name: &str, requires: &[&str], files: &[&str]) -> PackageInfo {
        PackageInfo {
            deployment_name: name.to_string(),
            display_name: name.to_string(),
            title: format!("The {} package", name),
            version: "1.0".to_string(),
            required_packages: requires.iter().map(|s| s.to_string()).collect(),
            run_files: files.iter().map(|s| s.to_string()).collect(),
            time_packaged: 1_500_000_000,
            ..Default::default()
        }
    }

    /// Write `info` as `<root>/tpm/packages/<name>.tpm`.
    pub fn write_definition(root: &Path, info: &PackageInfo) {
        let path = root
            .join(PACKAGE_DEFINITION_DIR)
            .join(format!("{}.tpm", info.deployment_name));
        tpm::write(&RealRuntime, &path, info, info.time_packaged).unwrap();
    }

    /// Write `<root>/config/packages.ini` verbatim.
    pub fn write_install_state(root: &Path, content: &str) {
        let path = root.join(PACKAGES_INI);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }
}
