//! Package records and package definition files.
//!
//! This module provides the package record model, the content digest type,
//! the reader/writer for `.tpm` package definition files and the discovery of
//! definition files inside a scope.

mod digest;
mod discovery;
mod info;
pub mod tpm;

pub use digest::Md5Sum;
pub use discovery::{deployment_name_of, find_definition_files};
pub use info::{PackageInfo, ReleaseState};

/// File name suffix of package definition files.
pub const PACKAGE_DEFINITION_SUFFIX: &str = ".tpm";

/// Logical prefix of every installable file recorded in a package.
pub const TEXMF_PREFIX: &str = "texmf/";

/// Tag matched against a package's target-system list.
#[cfg(windows)]
pub const SYSTEM_TAG: &str = "windows";
#[cfg(not(windows))]
pub const SYSTEM_TAG: &str = "unix";

/// Strip the `texmf/` (or `./texmf/`) prefix from a recorded file name.
///
/// Returns `None` for files outside the prefix.
pub fn strip_texmf_prefix(file_name: &str) -> Option<&str> {
    file_name
        .strip_prefix(TEXMF_PREFIX)
        .or_else(|| file_name.strip_prefix("./texmf/"))
}

/// Check whether a package may be used on the running platform.
pub fn targets_this_system(info: &PackageInfo) -> bool {
    info.target_system.is_empty() || info.target_system.contains(SYSTEM_TAG)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_texmf_prefix() {
        assert_eq!(strip_texmf_prefix("texmf/tex/foo.sty"), Some("tex/foo.sty"));
        assert_eq!(strip_texmf_prefix("./texmf/tex/foo.sty"), Some("tex/foo.sty"));
        assert_eq!(strip_texmf_prefix("doc/readme.txt"), None);
        assert_eq!(strip_texmf_prefix("texmfx/foo"), None);
    }

    #[test]
    fn test_targets_this_system() {
        let mut info = PackageInfo::default();
        assert!(targets_this_system(&info));

        info.target_system = SYSTEM_TAG.to_string();
        assert!(targets_this_system(&info));

        info.target_system = format!("other {}", SYSTEM_TAG);
        assert!(targets_this_system(&info));

        info.target_system = "amiga".into();
        assert!(!targets_this_system(&info));
    }
}
