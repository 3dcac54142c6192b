use serde::{Deserialize, Serialize};
use std::fmt;

use crate::remote::RemoteError;

/// Structured error codes
/// Fatal codes abort the run; the others are collected into the run report
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// A source table could not be fetched or parsed
    SourceFetch,
    /// Override store exists but its top level is not an object
    InvalidOverrideStore,
    /// Operator-supplied identifier matches no alias
    UnknownIdentifier,
    /// Connection refused / timed out / authentication failed
    RemoteTransport,
    /// Remote directory with no catalog entry at all
    OrphanedRemoteAsset,
    /// Entry flagged for sync that is absent remotely
    MissingRequiredAsset,
    /// Download, extraction or upload failed for one asset
    Transfer,
    /// No download URL could be resolved for an asset
    MissingDownloadSource,
    /// Invalid command line or environment configuration
    Config,
    /// Local filesystem error
    Io,
    /// Internal error (unexpected condition)
    Internal,
}

impl ErrorCode {
    /// Whether an error with this code stops the whole run
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            ErrorCode::SourceFetch
                | ErrorCode::InvalidOverrideStore
                | ErrorCode::RemoteTransport
                | ErrorCode::Config
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::SourceFetch => write!(f, "source_fetch"),
            ErrorCode::InvalidOverrideStore => write!(f, "invalid_override_store"),
            ErrorCode::UnknownIdentifier => write!(f, "unknown_identifier"),
            ErrorCode::RemoteTransport => write!(f, "remote_transport"),
            ErrorCode::OrphanedRemoteAsset => write!(f, "orphaned_remote_asset"),
            ErrorCode::MissingRequiredAsset => write!(f, "missing_required_asset"),
            ErrorCode::Transfer => write!(f, "transfer"),
            ErrorCode::MissingDownloadSource => write!(f, "missing_download_source"),
            ErrorCode::Config => write!(f, "config"),
            ErrorCode::Io => write!(f, "io"),
            ErrorCode::Internal => write!(f, "internal"),
        }
    }
}

/// Structured error with code, message, and optional details
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncError {
    pub code: ErrorCode,
    pub message: String,
    /// Optional additional details (path, identifier, stderr)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl SyncError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(
        code: ErrorCode,
        message: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            details: Some(details.into()),
        }
    }

    pub fn source_fetch(table: &str, message: impl Into<String>) -> Self {
        Self::with_details(ErrorCode::SourceFetch, message, table)
    }

    pub fn invalid_override_store(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidOverrideStore, message)
    }

    pub fn unknown_identifier(identifier: &str) -> Self {
        Self::with_details(
            ErrorCode::UnknownIdentifier,
            format!("Identifier '{}' is not known", identifier),
            identifier,
        )
    }

    pub fn remote_transport(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::RemoteTransport, message)
    }

    pub fn orphaned(folder: &str) -> Self {
        Self::with_details(
            ErrorCode::OrphanedRemoteAsset,
            format!(
                "Remote folder '{}' has no mapping in the override store or source tables",
                folder
            ),
            folder,
        )
    }

    pub fn missing(relative_path: &str) -> Self {
        Self::with_details(
            ErrorCode::MissingRequiredAsset,
            format!(
                "Entry '{}' should be synced but is missing from the remote store",
                relative_path
            ),
            relative_path,
        )
    }

    pub fn transfer(relative_path: &str, message: impl Into<String>) -> Self {
        Self::with_details(ErrorCode::Transfer, message, relative_path)
    }

    pub fn missing_download_source(relative_path: &str) -> Self {
        Self::with_details(
            ErrorCode::MissingDownloadSource,
            format!("No download source for '{}'", relative_path),
            relative_path,
        )
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Config, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }

    pub fn is_fatal(&self) -> bool {
        self.code.is_fatal()
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

impl std::error::Error for SyncError {}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::new(ErrorCode::Io, err.to_string())
    }
}

impl From<RemoteError> for SyncError {
    fn from(err: RemoteError) -> Self {
        if err.is_connection_level() {
            SyncError::remote_transport(err.to_string())
        } else {
            SyncError::new(ErrorCode::Transfer, err.to_string())
        }
    }
}

/// Convert from anyhow::Error to SyncError
///
/// A `SyncError` somewhere in the chain is returned as is; otherwise the
/// message is classified by keyword.
impl From<anyhow::Error> for SyncError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(inner) = err.downcast_ref::<SyncError>() {
            return inner.clone();
        }
        if let Some(remote) = err.downcast_ref::<RemoteError>() {
            if remote.is_connection_level() {
                return SyncError::remote_transport(format!("{:#}", err));
            }
        }

        let message = format!("{:#}", err);
        let message_lower = message.to_lowercase();

        if message_lower.contains("connection refused")
            || message_lower.contains("authentication failed")
            || message_lower.contains("timed out")
        {
            return SyncError::remote_transport(message);
        }

        if message_lower.contains("download")
            || message_lower.contains("extract")
            || message_lower.contains("zip")
            || message_lower.contains("upload")
        {
            return SyncError::new(ErrorCode::Transfer, message);
        }

        if err.downcast_ref::<std::io::Error>().is_some() {
            return SyncError::new(ErrorCode::Io, message);
        }

        SyncError::internal(message)
    }
}

/// Result type alias for engine operations
pub type SyncResult<T> = std::result::Result<T, SyncError>;
