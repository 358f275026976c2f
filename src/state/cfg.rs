use anyhow::{Context, Result};
use ini::{EscapePolicy, Ini, ParseOption, WriteOption};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use crate::runtime::Runtime;

/// Generic section/key/value configuration store.
pub trait ConfigStore {
    fn try_get_value(&self, section: &str, key: &str) -> Option<String>;
    fn set_value(&mut self, section: &str, key: &str, value: &str) -> Result<()>;
}

/// In-memory INI document: `[section]` headers followed by `key=value` lines.
///
/// Sections and keys are kept sorted so that writing the same content twice
/// produces identical files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cfg {
    sections: BTreeMap<String, BTreeMap<String, String>>,
}

/// Values are stored verbatim; backslashes in Windows paths are not escapes.
fn parse_option() -> ParseOption {
    ParseOption {
        enabled_quote: false,
        enabled_escape: false,
        ..Default::default()
    }
}

impl Cfg {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse INI text. Comment lines (`;` or `#`) are skipped, as are values
    /// outside of any section.
    pub fn parse(text: &str) -> Result<Self> {
        let ini = Ini::load_from_str_opt(text, parse_option()).context("Malformed INI document")?;

        let mut cfg = Cfg::new();
        for (section, properties) in ini.iter() {
            let Some(section) = section else {
                continue;
            };
            let values = cfg.sections.entry(section.to_string()).or_default();
            for (key, value) in properties.iter() {
                values.insert(key.to_string(), value.to_string());
            }
        }
        Ok(cfg)
    }

    /// Read an INI file; a missing file yields an empty document.
    #[tracing::instrument(skip(runtime))]
    pub fn load<R: Runtime + ?Sized>(runtime: &R, path: &Path) -> Result<Self> {
        if !runtime.exists(path) {
            return Ok(Cfg::new());
        }
        let text = runtime
            .read_to_string(path)
            .with_context(|| format!("Failed to read {:?}", path))?;
        Cfg::parse(&text).with_context(|| format!("Failed to parse {:?}", path))
    }

    #[tracing::instrument(skip(self, runtime))]
    pub fn save<R: Runtime + ?Sized>(&self, runtime: &R, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            runtime.create_dir_all(parent)?;
        }
        runtime
            .write(path, self.to_string().as_bytes())
            .with_context(|| format!("Failed to write {:?}", path))
    }

    pub fn try_get_value(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(section)
            .and_then(|values| values.get(key))
            .map(|v| v.as_str())
    }

    pub fn put_value(&mut self, section: &str, key: &str, value: &str) {
        self.sections
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
    }

    /// Remove a whole section. Returns whether it existed.
    pub fn delete_section(&mut self, section: &str) -> bool {
        self.sections.remove(section).is_some()
    }

    pub fn has_section(&self, section: &str) -> bool {
        self.sections.contains_key(section)
    }

    pub fn sections(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(|s| s.as_str())
    }
}

impl fmt::Display for Cfg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ini = Ini::new();
        for (section, values) in &self.sections {
            let mut setter = ini.with_section(Some(section.as_str()));
            for (key, value) in values {
                setter.set(key.as_str(), value.as_str());
            }
        }

        let option = WriteOption {
            escape_policy: EscapePolicy::Nothing,
            ..Default::default()
        };
        let mut buffer = Vec::new();
        ini.write_to_opt(&mut buffer, option).map_err(|_| fmt::Error)?;
        f.write_str(&String::from_utf8_lossy(&buffer))
    }
}

impl ConfigStore for Cfg {
    fn try_get_value(&self, section: &str, key: &str) -> Option<String> {
        Cfg::try_get_value(self, section, key).map(|v| v.to_string())
    }

    fn set_value(&mut self, section: &str, key: &str, value: &str) -> Result<()> {
        self.put_value(section, key, value);
        Ok(())
    }
}
