//! Storage error handling
//!
//! Provides typed errors for storage operations with descriptive messages
//! and recovery suggestions.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to create data directory
    #[error("Failed to create data directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Permission denied accessing path
    #[error("Permission denied: cannot access '{path}'. Check file permissions.")]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Disk is full or quota exceeded
    #[error(
        "Disk full or quota exceeded while writing to '{path}'. Free up disk space and try again."
    )]
    DiskFull {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Stored blob could not be decoded
    #[error("Stored value for '{key}' is corrupted: {details}")]
    CorruptBlob { key: String, details: String },

    /// Stored blob could not be decoded; the raw value was copied aside
    #[error("Stored value for '{key}' is corrupted: {details}. A backup has been kept under '{backup_key}'.")]
    CorruptBlobBackedUp {
        key: String,
        backup_key: String,
        details: String,
    },

    /// Value could not be encoded for storage
    #[error("Failed to encode value for '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// SQLite database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Write refused by the backing store
    #[error("Write to '{key}' failed: {details}")]
    WriteFailed { key: String, details: String },

    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl StorageError {
    /// Create an error from an I/O error with path context
    ///
    /// Classifies the error based on its kind (permission, disk full, etc.)
    pub fn from_io(error: io::Error, path: PathBuf) -> Self {
        match error.kind() {
            io::ErrorKind::PermissionDenied => StorageError::PermissionDenied {
                path,
                source: error,
            },
            // StorageFull is not stable everywhere, so also check the message
            _ if is_disk_full_error(&error) => StorageError::DiskFull {
                path,
                source: error,
            },
            _ => StorageError::CreateDirectory {
                path,
                source: error,
            },
        }
    }

    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            StorageError::DiskFull { .. }
                | StorageError::PermissionDenied { .. }
                | StorageError::CorruptBlob { .. }
                | StorageError::CorruptBlobBackedUp { .. }
        )
    }

    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            StorageError::DiskFull { .. } => Some("Free up disk space and try again."),
            StorageError::PermissionDenied { .. } => Some(
                "Check file and directory permissions. You may need to run with different permissions or change ownership.",
            ),
            StorageError::CorruptBlob { .. } => Some(
                "The damaged value was ignored and will be overwritten on the next successful sync.",
            ),
            StorageError::CorruptBlobBackedUp { .. } => Some(
                "Readable entries were kept. You can try to recover the rest from the backup manually.",
            ),
            StorageError::CreateDirectory { .. } => {
                Some("Check that the parent directory exists and you have write permissions.")
            }
            _ => None,
        }
    }
}

/// Check if an I/O error indicates disk full condition
fn is_disk_full_error(error: &io::Error) -> bool {
    let msg = error.to_string().to_lowercase();
    msg.contains("no space left")
        || msg.contains("disk full")
        || msg.contains("quota exceeded")
        || msg.contains("not enough space")
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_denied_classification() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let err = StorageError::from_io(io_err, PathBuf::from("/test/path"));

        assert!(matches!(err, StorageError::PermissionDenied { .. }));
        assert!(err.is_recoverable());
        assert!(err.recovery_suggestion().is_some());
    }

    #[test]
    fn test_disk_full_detection() {
        let io_err = io::Error::new(io::ErrorKind::Other, "No space left on device");
        let err = StorageError::from_io(io_err, PathBuf::from("/full/disk"));

        assert!(matches!(err, StorageError::DiskFull { .. }));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_other_io_is_directory_error() {
        let io_err = io::Error::new(io::ErrorKind::Other, "weird");
        let err = StorageError::from_io(io_err, PathBuf::from("/data"));

        assert!(matches!(err, StorageError::CreateDirectory { .. }));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_corrupt_blob_display() {
        let err = StorageError::CorruptBlob {
            key: "qa_offline_tasks".to_string(),
            details: "expected value at line 1".to_string(),
        };

        let msg = err.to_string();
        assert!(msg.contains("corrupted"));
        assert!(msg.contains("qa_offline_tasks"));
        assert!(err.recovery_suggestion().is_some());
    }

    #[test]
    fn test_corrupt_blob_backup_display() {
        let err = StorageError::CorruptBlobBackedUp {
            key: "qa_offline_tasks".to_string(),
            backup_key: "qa_offline_tasks.corrupt".to_string(),
            details: "unknown variant `Done`".to_string(),
        };

        let msg = err.to_string();
        assert!(msg.contains("qa_offline_tasks.corrupt"));
        assert!(err.is_recoverable());
        assert!(err.recovery_suggestion().is_some());
    }
}
