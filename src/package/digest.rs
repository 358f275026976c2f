use anyhow::{Context, Result};
use md5::{Digest, Md5};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::runtime::Runtime;

/// 128-bit MD5 content digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Md5Sum([u8; 16]);

impl Md5Sum {
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn of(data: impl AsRef<[u8]>) -> Self {
        Self::from_hasher(Md5::new_with_prefix(data.as_ref()))
    }

    /// Finish a running MD5 computation.
    pub fn from_hasher(hasher: Md5) -> Self {
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&hasher.finalize());
        Self(bytes)
    }

    /// Digest of a file's contents, streamed through the runtime.
    pub fn of_file<R: Runtime>(runtime: &R, path: &Path) -> Result<Self> {
        let mut reader = runtime.open(path)?;
        let mut hasher = Md5::new();
        std::io::copy(&mut reader, &mut hasher)
            .with_context(|| format!("Failed to read {:?}", path))?;
        Ok(Self::from_hasher(hasher))
    }
}

impl fmt::Display for Md5Sum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for Md5Sum {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 16];
        hex::decode_to_slice(s.trim(), &mut bytes)
            .with_context(|| format!("Invalid MD5 digest: {:?}", s))?;
        Ok(Self(bytes))
    }
}

impl Serialize for Md5Sum {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Md5Sum {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RealRuntime;
    use tempfile::tempdir;

    #[test]
    fn test_known_digest() {
        // RFC 1321 test vector
        assert_eq!(Md5Sum::of("abc").to_string(), "900150983cd24fb0d6963f7d28e17f72");
        assert_eq!(Md5Sum::default().to_string(), "0".repeat(32));
    }

    #[test]
    fn test_parse() {
        let digest: Md5Sum = "900150983CD24FB0D6963F7D28E17F72".parse().unwrap();
        assert_eq!(digest, Md5Sum::of("abc"));

        assert!("xyz".parse::<Md5Sum>().is_err());
        assert!("900150983cd24fb0".parse::<Md5Sum>().is_err());
    }

    #[test]
    fn test_of_file_matches_in_memory_digest() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"some package content").unwrap();

        let digest = Md5Sum::of_file(&RealRuntime, &path).unwrap();
        assert_eq!(digest, Md5Sum::of(b"some package content"));
    }

    #[test]
    fn test_serde_as_hex_string() {
        let digest = Md5Sum::of("abc");
        let json = serde_json::to_string(&digest).unwrap();
        assert_eq!(json, "\"900150983cd24fb0d6963f7d28e17f72\"");
        let back: Md5Sum = serde_json::from_str(&json).unwrap();
        assert_eq!(back, digest);
    }
}
