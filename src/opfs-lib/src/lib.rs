// Shared value types for the per-origin file system metadata store.
// opfs_meta builds the sqlite backed DatabaseManager on top of these.

mod entry_id;
mod fs_types;

pub use entry_id::*;
pub use fs_types::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FsError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    #[error("invalid modification: {0}")]
    InvalidModification(String),
    #[error("no modification allowed: {0}")]
    NoModificationAllowed(String),
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
    #[error("db error: {0}")]
    DbError(String),
    #[error("I/O error: {0}")]
    IoError(String),
    #[error("invalid param: {0}")]
    InvalidParam(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl FsError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, FsError::NotFound(_))
    }

    pub fn is_type_mismatch(&self) -> bool {
        matches!(self, FsError::TypeMismatch(_))
    }

    pub fn is_invalid_modification(&self) -> bool {
        matches!(self, FsError::InvalidModification(_))
    }

    pub fn is_no_modification_allowed(&self) -> bool {
        matches!(self, FsError::NoModificationAllowed(_))
    }

    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, FsError::ConstraintViolation(_))
    }
}

pub type FsResult<T> = std::result::Result<T, FsError>;

impl From<std::io::Error> for FsError {
    fn from(err: std::io::Error) -> Self {
        FsError::IoError(err.to_string())
    }
}

impl From<rusqlite::Error> for FsError {
    fn from(err: rusqlite::Error) -> Self {
        map_db_err(err)
    }
}

/// Referential integrity failures keep their own kind, everything else the
/// store reports is a generic db error.
pub fn map_db_err(err: rusqlite::Error) -> FsError {
    match &err {
        rusqlite::Error::SqliteFailure(code, _)
            if code.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            FsError::ConstraintViolation(err.to_string())
        }
        _ => FsError::DbError(err.to_string()),
    }
}
