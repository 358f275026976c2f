//! Directory index handed to file name database writers.
//!
//! The index mirrors every `texmf/` file recorded by the known packages below
//! a single virtual root. Writers pull directory contents through
//! [`DirectoryReader`]; the index is dropped once the writer is done.

use anyhow::Result;
use log::info;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;

use crate::package::{PackageInfo, strip_texmf_prefix};
use crate::registry::PackageRegistry;
use crate::runtime::Runtime;

/// Contents of one directory node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryInfo {
    pub subdirectories: BTreeSet<String>,
    /// File names placed directly in the directory.
    pub file_names: Vec<String>,
    /// Owning package of each entry of `file_names`.
    pub package_names: Vec<String>,
}

/// Pull interface for database writers.
pub trait DirectoryReader {
    /// Path of the root directory node.
    fn root_path(&self) -> &str;

    /// Contents of the directory at `path`; unknown directories are empty.
    fn read_directory(&self, path: &str) -> DirectoryInfo;
}

/// Consumer of a [`DirectoryReader`], e.g. an on-disk fndb builder.
pub trait FndbWriter {
    fn write(&mut self, reader: &dyn DirectoryReader) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct DirectoryIndex {
    root: String,
    directories: BTreeMap<String, DirectoryInfo>,
}

impl DirectoryIndex {
    pub fn new(root: &str) -> Self {
        Self {
            root: root.to_string(),
            directories: BTreeMap::new(),
        }
    }

    /// Index every file of every package below `root`.
    pub fn from_packages<'a>(root: &str, packages: impl IntoIterator<Item = &'a PackageInfo>) -> Self {
        let mut index = Self::new(root);
        for info in packages {
            for file in info.all_files() {
                index.remember_file(file, &info.deployment_name);
            }
        }
        index
    }

    /// Register `texmf/`-prefixed `file_name` as owned by `package_name`.
    /// Other files are ignored.
    pub fn remember_file(&mut self, file_name: &str, package_name: &str) {
        let Some(relative) = strip_texmf_prefix(file_name) else {
            return;
        };
        let segments: Vec<&str> = relative
            .split(['/', '\\'])
            .filter(|s| !s.is_empty())
            .collect();
        let Some((name, parents)) = segments.split_last() else {
            return;
        };

        let mut path = self.root.clone();
        for segment in parents {
            self.directories
                .entry(path.clone())
                .or_default()
                .subdirectories
                .insert(segment.to_string());
            path.push('/');
            path.push_str(segment);
        }

        let directory = self.directories.entry(path).or_default();
        directory.file_names.push(name.to_string());
        directory.package_names.push(package_name.to_string());
    }

    pub fn directory(&self, path: &str) -> Option<&DirectoryInfo> {
        self.directories.get(path)
    }

    pub fn len(&self) -> usize {
        self.directories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directories.is_empty()
    }
}

impl DirectoryReader for DirectoryIndex {
    fn root_path(&self) -> &str {
        &self.root
    }

    fn read_directory(&self, path: &str) -> DirectoryInfo {
        self.directories.get(path).cloned().unwrap_or_default()
    }
}

/// Writes one `path<TAB>package` line per file, walking directories depth first.
pub struct ListingFndbWriter<W: Write> {
    out: W,
    files: usize,
}

impl<W: Write> ListingFndbWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out, files: 0 }
    }

    /// Number of files written so far.
    pub fn files(&self) -> usize {
        self.files
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn walk(&mut self, reader: &dyn DirectoryReader, path: &str) -> Result<()> {
        let directory = reader.read_directory(path);
        for (file, package) in directory.file_names.iter().zip(&directory.package_names) {
            writeln!(self.out, "{}/{}\t{}", path, file, package)?;
            self.files += 1;
        }
        for subdirectory in &directory.subdirectories {
            self.walk(reader, &format!("{}/{}", path, subdirectory))?;
        }
        Ok(())
    }
}

impl<W: Write> FndbWriter for ListingFndbWriter<W> {
    fn write(&mut self, reader: &dyn DirectoryReader) -> Result<()> {
        let root = reader.root_path().to_string();
        self.walk(reader, &root)?;
        self.out.flush()?;
        Ok(())
    }
}

impl<R: Runtime + 'static> PackageRegistry<R> {
    /// Build the directory index of all packages and hand it to `writer`.
    #[tracing::instrument(skip(self, writer))]
    pub async fn create_fndb(&mut self, writer: &mut dyn FndbWriter) -> Result<()> {
        self.load_all().await?;
        let index = DirectoryIndex::from_packages(self.session.mpm_root_path(), self.packages.values());
        info!("writing file name database: {} directories", index.len());
        writer.write(&index)
    }
}
