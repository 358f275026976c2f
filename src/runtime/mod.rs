//! Runtime abstraction for system operations.
//!
//! This module provides a trait-based abstraction over system operations,
//! enabling dependency injection and testability.
//!
//! # Structure
//!
//! - `path` - Lexical path helpers (normalize, separator conversion)
//! - `env` - Environment variables, well-known directories and privileges
//! - `fs` - File system operations (read, write, directory, descriptor limits)

mod env;
mod fs;
pub mod path;

use anyhow::Result;
use std::env as std_env;
use std::path::{Path, PathBuf};

pub use path::{normalize_path, to_dos_separators};

#[cfg_attr(test, mockall::automock)]
pub trait Runtime: Send + Sync {
    // Environment
    fn env_var(&self, key: &str) -> Result<String, std_env::VarError>;

    // File System
    fn write(&self, path: &Path, contents: &[u8]) -> Result<()>;
    fn read_to_string(&self, path: &Path) -> Result<String>;
    fn create_dir_all(&self, path: &Path) -> Result<()>;
    fn exists(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;
    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>>;
    fn open(&self, path: &Path) -> Result<Box<dyn std::io::Read + Send>>;

    /// Canonicalize a path by resolving all symlinks and returning the canonical absolute path.
    fn canonicalize(&self, path: &Path) -> Result<PathBuf>;

    /// Raise the limit of simultaneously open files to `limit` if the platform allows it.
    /// Returns the limit that is in effect afterwards.
    fn set_max_open(&self, limit: u64) -> Result<u64>;

    // Directories
    fn home_dir(&self) -> Option<PathBuf>;

    // Privilege
    fn is_privileged(&self) -> bool;
}

pub struct RealRuntime;

impl Runtime for RealRuntime {
    fn env_var(&self, key: &str) -> Result<String, std_env::VarError> {
        self.env_var_impl(key)
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.write_impl(path, contents)
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        self.read_to_string_impl(path)
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        self.create_dir_all_impl(path)
    }

    fn exists(&self, path: &Path) -> bool {
        self.exists_impl(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.is_dir_impl(path)
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        self.read_dir_impl(path)
    }

    fn open(&self, path: &Path) -> Result<Box<dyn std::io::Read + Send>> {
        self.open_impl(path)
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        self.canonicalize_impl(path)
    }

    fn set_max_open(&self, limit: u64) -> Result<u64> {
        self.set_max_open_impl(limit)
    }

    fn home_dir(&self) -> Option<PathBuf> {
        self.home_dir_impl()
    }

    fn is_privileged(&self) -> bool {
        self.is_privileged_impl()
    }
}
