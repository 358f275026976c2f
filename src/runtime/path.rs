//! Lexical path helpers.

use std::path::{Component, Path, PathBuf};

/// Normalize a path by processing `.` and `..` components lexically.
/// This does not access the filesystem and does not follow symlinks.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let at_root = matches!(
                    result.components().next_back(),
                    Some(Component::RootDir | Component::Prefix(_))
                );
                if at_root {
                    // `/..` is `/`
                    continue;
                }
                let ends_with_parent =
                    matches!(result.components().next_back(), Some(Component::ParentDir));
                if ends_with_parent || !result.pop() {
                    result.push(component);
                }
            }
            _ => result.push(component),
        }
    }
    result
}

/// Convert every `/` into `\`.
///
/// Package digests are computed over backslash-separated paths on every
/// platform, so this conversion is unconditional.
pub fn to_dos_separators(path: &str) -> String {
    path.replace('/', "\\")
}
