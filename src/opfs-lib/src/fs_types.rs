use crate::{FsError, FsResult};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

pub const ENTRY_ID_LEN: usize = 32;

/// Zero-based index into a directory listing.
pub type PageNumber = u32;
/// Running usage total; deltas may be negative.
pub type Usage = i64;
/// Names from one entry to another, one element per path component.
pub type EntryPath = Vec<String>;

/// Opaque identifier of a directory or file entry.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId([u8; ENTRY_ID_LEN]);

impl EntryId {
    pub fn from_bytes(bytes: [u8; ENTRY_ID_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> FsResult<Self> {
        let raw: [u8; ENTRY_ID_LEN] = bytes.try_into().map_err(|_| {
            FsError::InvalidParam(format!(
                "entry id must be {} bytes, got {}",
                ENTRY_ID_LEN,
                bytes.len()
            ))
        })?;
        Ok(Self(raw))
    }

    pub fn from_hex(s: &str) -> FsResult<Self> {
        let bytes = hex::decode(s)
            .map_err(|e| FsError::InvalidParam(format!("invalid entry id {}: {}", s, e)))?;
        Self::from_slice(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ENTRY_ID_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntryId({})", self.to_hex())
    }
}

impl Serialize for EntryId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for EntryId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        EntryId::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

impl ToSql for EntryId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Borrowed(ValueRef::Blob(&self.0)))
    }
}

impl FromSql for EntryId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let blob = value.as_blob()?;
        let raw: [u8; ENTRY_ID_LEN] = blob.try_into().map_err(|_| FromSqlError::InvalidBlobSize {
            expected_size: ENTRY_ID_LEN,
            blob_size: blob.len(),
        })?;
        Ok(EntryId(raw))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    Directory,
    File,
}

impl EntryKind {
    pub fn is_file(&self) -> bool {
        matches!(self, EntryKind::File)
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, EntryKind::Directory)
    }
}

/// Snapshot of an entry taken by the caller. Stale once the entry changes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSystemEntryMetadata {
    pub entry_id: EntryId,
    pub entry_name: String,
    pub is_directory: bool,
}

impl FileSystemEntryMetadata {
    pub fn new(entry_id: EntryId, entry_name: impl Into<String>, is_directory: bool) -> Self {
        Self {
            entry_id,
            entry_name: entry_name.into(),
            is_directory,
        }
    }
}

/// Lookup key of a child that has not been resolved to an id yet.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileSystemChildMetadata {
    pub parent_id: EntryId,
    pub child_name: String,
}

impl FileSystemChildMetadata {
    pub fn new(parent_id: EntryId, child_name: impl Into<String>) -> Self {
        Self {
            parent_id,
            child_name: child_name.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSystemEntryPair {
    pub parent_id: EntryId,
    pub child_id: EntryId,
}

impl FileSystemEntryPair {
    pub fn new(parent_id: EntryId, child_id: EntryId) -> Self {
        Self {
            parent_id,
            child_id,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSystemDirectoryListing {
    pub directories: Vec<FileSystemEntryMetadata>,
    pub files: Vec<FileSystemEntryMetadata>,
}

impl FileSystemDirectoryListing {
    pub fn is_empty(&self) -> bool {
        self.directories.is_empty() && self.files.is_empty()
    }
}

/// Rejects empty names, the dot entries and anything carrying a separator.
pub fn is_valid_name(name: &str) -> bool {
    if name.is_empty() || name == "." || name == ".." {
        return false;
    }
    !name.chars().any(|c| c == '/' || c == '\\' || c == '\0')
}

/// Usage contribution of one entry name, counted in UTF-16 code units.
pub fn name_usage(name: &str) -> Usage {
    name.encode_utf16().count() as Usage
}
