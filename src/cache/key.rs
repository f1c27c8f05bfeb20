//! Cache keys.

use std::fmt;
use std::path::Path;

use anyhow::Result;
use serde::Serialize;

use crate::util::hash::Fingerprint;

/// Identity of one cached computation: the operation name plus a digest of
/// every resolved input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    op: String,
    fingerprint: String,
}

impl CacheKey {
    pub fn builder(op: impl Into<String>) -> KeyBuilder {
        let op = op.into();
        let mut fp = Fingerprint::new();
        fp.update_str(&op);
        KeyBuilder { op, fp }
    }

    pub fn op(&self) -> &str {
        &self.op
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.op, self.fingerprint)
    }
}

/// Accumulates inputs for a [`CacheKey`].
#[derive(Clone)]
pub struct KeyBuilder {
    op: String,
    fp: Fingerprint,
}

impl KeyBuilder {
    pub fn str(mut self, s: &str) -> Self {
        self.fp.update_str(s);
        self
    }

    pub fn strs<S: AsRef<str>>(mut self, items: &[S]) -> Self {
        self.fp.update_strs(items.iter().map(|s| s.as_ref()));
        self
    }

    pub fn opt(mut self, s: Option<&str>) -> Self {
        self.fp.update_opt(s);
        self
    }

    pub fn flag(mut self, b: bool) -> Self {
        self.fp.update_bool(b);
        self
    }

    pub fn path(mut self, path: &Path) -> Self {
        self.fp.update_path(path);
        self
    }

    pub fn paths<P: AsRef<Path>>(mut self, paths: &[P]) -> Self {
        self.fp.update_str(&paths.len().to_string());
        for p in paths {
            self.fp.update_path(p.as_ref());
        }
        self
    }

    /// Mix in a file's contents.
    pub fn file(mut self, path: &Path) -> Result<Self> {
        self.fp.update_file(path)?;
        Ok(self)
    }

    pub fn files<P: AsRef<Path>>(mut self, paths: &[P]) -> Result<Self> {
        self.fp.update_str(&paths.len().to_string());
        for p in paths {
            self.fp.update_file(p.as_ref())?;
        }
        Ok(self)
    }

    /// Mix in any serializable value by its JSON form.
    pub fn value<T: Serialize>(mut self, value: &T) -> Result<Self> {
        let json = serde_json::to_string(value)?;
        self.fp.update_str(&json);
        Ok(self)
    }

    /// Mix in an already computed digest.
    pub fn digest(self, digest: &str) -> Self {
        self.str(digest)
    }

    pub fn finish(self) -> CacheKey {
        CacheKey {
            op: self.op,
            fingerprint: self.fp.finish(),
        }
    }
}
