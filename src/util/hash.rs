//! Content hashing for cache keys.
//!
//! Fingerprints are built from file *contents*, never modification times,
//! so a fresh checkout of identical sources hits the same cache entries.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

/// Compute SHA256 hash of a byte slice.
pub fn sha256_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Compute SHA256 hash of a string.
pub fn sha256_str(s: &str) -> String {
    sha256_bytes(s.as_bytes())
}

/// Compute SHA256 hash of a file's contents.
pub fn sha256_file(path: &Path) -> Result<String> {
    let file = File::open(path)
        .with_context(|| format!("failed to open file for hashing: {}", path.display()))?;

    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Incremental digest over the resolved inputs of one operation.
///
/// Every component is length-delimited so `["ab", "c"]` and `["a", "bc"]`
/// never collide.
#[derive(Clone, Default)]
pub struct Fingerprint {
    hasher: Sha256,
}

impl Fingerprint {
    pub fn new() -> Self {
        Fingerprint {
            hasher: Sha256::new(),
        }
    }

    pub fn update_str(&mut self, s: &str) -> &mut Self {
        self.hasher.update((s.len() as u64).to_le_bytes());
        self.hasher.update(s.as_bytes());
        self
    }

    pub fn update_strs<'a>(&mut self, items: impl IntoIterator<Item = &'a str>) -> &mut Self {
        let mut count = 0u64;
        for s in items {
            self.update_str(s);
            count += 1;
        }
        self.hasher.update(count.to_le_bytes());
        self
    }

    pub fn update_opt(&mut self, opt: Option<&str>) -> &mut Self {
        match opt {
            Some(s) => {
                self.hasher.update(b"\x01");
                self.update_str(s);
            }
            None => {
                self.hasher.update(b"\x00");
            }
        }
        self
    }

    pub fn update_bool(&mut self, b: bool) -> &mut Self {
        self.hasher.update([b as u8]);
        self
    }

    /// Mix in a path as text (its identity, not its contents).
    pub fn update_path(&mut self, path: &Path) -> &mut Self {
        self.update_str(&path.to_string_lossy())
    }

    /// Mix in a file's path and contents. A missing file contributes a
    /// distinct marker instead of failing, so "absent" is a stable input too.
    pub fn update_file(&mut self, path: &Path) -> Result<&mut Self> {
        self.update_path(path);
        if path.is_file() {
            let digest = sha256_file(path)?;
            self.update_str(&digest);
        } else {
            self.hasher.update(b"\xffmissing");
        }
        Ok(self)
    }

    /// Finalize and return the fingerprint as a hex string.
    pub fn finish(self) -> String {
        hex::encode(self.hasher.finalize())
    }

    /// Finalize and return a short fingerprint (first 16 chars).
    pub fn finish_short(self) -> String {
        self.finish()[..16].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sha256_str() {
        assert_eq!(
            sha256_str("hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_sha256_file_matches_bytes() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("test.txt");
        std::fs::write(&path, "hello").unwrap();

        assert_eq!(sha256_file(&path).unwrap(), sha256_bytes(b"hello"));
    }

    #[test]
    fn test_components_are_delimited() {
        let a = {
            let mut fp = Fingerprint::new();
            fp.update_strs(["ab", "c"]);
            fp.finish()
        };
        let b = {
            let mut fp = Fingerprint::new();
            fp.update_strs(["a", "bc"]);
            fp.finish()
        };
        assert_ne!(a, b);
    }

    #[test]
    fn test_file_contents_drive_fingerprint() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("judy.c");

        let digest = |fp_path: &Path| {
            let mut fp = Fingerprint::new();
            fp.update_file(fp_path).unwrap();
            fp.finish()
        };

        let missing = digest(&path);
        std::fs::write(&path, "int x;").unwrap();
        let first = digest(&path);
        let again = digest(&path);
        std::fs::write(&path, "int y;").unwrap();
        let changed = digest(&path);

        assert_ne!(missing, first);
        assert_eq!(first, again);
        assert_ne!(first, changed);
    }
}
