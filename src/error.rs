// src/error.rs
// Error types for the tag store

use crate::db::{EntityKind, UserId};
use thiserror::Error;

/// Main error type for the tag store
#[derive(Error, Debug)]
pub enum TagError {
    #[error("{existing} named \"{name}\" already exists")]
    NameCollision { name: String, existing: EntityKind },

    #[error("{kind} \"{name}\" already exists")]
    DuplicateKey { name: String, kind: EntityKind },

    #[error("no tag or alias named \"{name}\"")]
    NotFound { name: String },

    #[error("cannot create alias: no tag named \"{target}\"")]
    AliasTargetMissing { target: String },

    #[error("name is {} characters too long (max {max})", .len - .max)]
    NameTooLong { len: usize, max: usize },

    #[error("content is {} characters too long (max {max})", .len - .max)]
    ContentTooLong { len: usize, max: usize },

    #[error("name must not be empty")]
    InvalidName,

    #[error("content must not be empty")]
    EmptyContent,

    #[error("invalid cursor: {0}")]
    InvalidCursor(String),

    #[error("you do not own \"{name}\"")]
    PermissionDenied { name: String },

    #[error("\"{name}\" is already owned by user {owner}")]
    AlreadyOwned { name: String, owner: UserId },

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("database error: {0}")]
    Db(rusqlite::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown error: {0}")]
    Other(String),
}

/// Convenience type alias for Result using TagError
pub type Result<T> = std::result::Result<T, TagError>;

impl TagError {
    /// Whether the caller may reasonably retry the same operation later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TagError::StorageUnavailable(_))
    }

    pub(crate) fn not_found(name: &str) -> Self {
        TagError::NotFound {
            name: name.to_string(),
        }
    }
}

/// SQLITE_BUSY / SQLITE_LOCKED and the I/O class of failures mean the store
/// could not be reached, not that the request was wrong.
pub(crate) fn is_unavailable(err: &rusqlite::Error) -> bool {
    use rusqlite::ffi::ErrorCode;
    match err {
        rusqlite::Error::SqliteFailure(e, _) => matches!(
            e.code,
            ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::CannotOpen
                | ErrorCode::SystemIoFailure
                | ErrorCode::DiskFull
                | ErrorCode::ReadOnly
        ),
        _ => false,
    }
}

impl From<rusqlite::Error> for TagError {
    fn from(err: rusqlite::Error) -> Self {
        if is_unavailable(&err) {
            TagError::StorageUnavailable(err.to_string())
        } else {
            TagError::Db(err)
        }
    }
}

impl From<deadpool_sqlite::PoolError> for TagError {
    fn from(err: deadpool_sqlite::PoolError) -> Self {
        TagError::StorageUnavailable(format!("failed to get connection: {err}"))
    }
}

impl From<deadpool_sqlite::InteractError> for TagError {
    fn from(err: deadpool_sqlite::InteractError) -> Self {
        TagError::StorageUnavailable(format!("connection task failed: {err}"))
    }
}

impl From<anyhow::Error> for TagError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<TagError>() {
            Ok(tag_err) => tag_err,
            Err(err) => match err.downcast::<rusqlite::Error>() {
                Ok(db_err) => db_err.into(),
                Err(err) => TagError::Other(format!("{err:#}")),
            },
        }
    }
}

impl From<TagError> for String {
    fn from(err: TagError) -> Self {
        err.to_string()
    }
}
