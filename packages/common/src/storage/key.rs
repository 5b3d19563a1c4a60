use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::StorageError;

const MAX_KEY_LEN: usize = 1024;

/// A validated object key.
///
/// Keys are relative, `/`-separated paths made of ASCII alphanumerics and
/// `_ - .`. Empty segments and segments starting with `.` are rejected so a
/// key can be mapped onto a filesystem path without escaping the store root.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Parse and validate a key.
    pub fn parse(s: impl Into<String>) -> Result<Self, StorageError> {
        let s = s.into();

        if s.is_empty() {
            return Err(StorageError::InvalidKey("key must not be empty".into()));
        }
        if s.len() > MAX_KEY_LEN {
            return Err(StorageError::InvalidKey(format!(
                "key exceeds {MAX_KEY_LEN} bytes"
            )));
        }
        if let Some(c) = s
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '/' | '_' | '-' | '.')))
        {
            return Err(StorageError::InvalidKey(format!(
                "key contains forbidden character {c:?}"
            )));
        }
        if s
            .split('/')
            .any(|segment| segment.is_empty() || segment.starts_with('.'))
        {
            return Err(StorageError::InvalidKey(
                "key must not contain empty or dot-prefixed segments".into(),
            ));
        }

        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterate over the `/`-separated segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// The last segment of the key.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// The key of a sibling object in the same "directory".
    pub fn with_file_name(&self, name: &str) -> Result<Self, StorageError> {
        match self.0.rsplit_once('/') {
            Some((dir, _)) => Self::parse(format!("{dir}/{name}")),
            None => Self::parse(name),
        }
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectKey({})", self.0)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ObjectKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for ObjectKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ObjectKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(s).map_err(serde::de::Error::custom)
    }
}
