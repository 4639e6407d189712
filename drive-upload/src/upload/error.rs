use drive_core::{ApiErrorClass, DriveError};
use thiserror::Error;

use super::scheduler::CancelAware;
use super::transfer::TransferError;

/// Run-level failures. Any of these stops the run before a transfer starts
/// and leaves the stored session as it was.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("batch initiation failed: {0}")]
    Initiation(#[source] DriveError),
    #[error("server reserved {received} upload targets for {expected} files")]
    TargetCountMismatch { expected: usize, received: usize },
    #[error("there is no interrupted upload to resume")]
    NoResumableSession,
    #[error("invalid relative path: {0}")]
    InvalidPath(String),
    #[error("no destination folder was given")]
    MissingTargetFolder,
    #[error("{path} is not part of the interrupted batch \"{batch}\"")]
    SelectionMismatch { path: String, batch: String },
}

/// Why a single item did not settle successfully.
#[derive(Debug, Error)]
pub enum ItemError {
    #[error("transfer failed: {0}")]
    Transfer(#[from] TransferError),
    #[error("confirmation failed: {0}")]
    Confirm(#[from] DriveError),
    #[error("cancelled")]
    Cancelled,
    #[error("upload task panicked: {0}")]
    Panicked(#[from] tokio::task::JoinError),
}

impl ItemError {
    /// `None` for cancellation. Local read failures and panics are permanent:
    /// resuming would hit them again.
    pub fn class(&self) -> Option<ApiErrorClass> {
        match self {
            ItemError::Cancelled | ItemError::Transfer(TransferError::Cancelled) => None,
            ItemError::Transfer(TransferError::Request(err)) => Some(
                err.status()
                    .map_or(ApiErrorClass::Transient, ApiErrorClass::from_status),
            ),
            ItemError::Transfer(TransferError::Io(_)) | ItemError::Panicked(_) => {
                Some(ApiErrorClass::Permanent)
            }
            ItemError::Confirm(err) => Some(err.class()),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class().is_some_and(ApiErrorClass::is_retryable)
    }
}

impl CancelAware for ItemError {
    fn is_cancelled(&self) -> bool {
        matches!(
            self,
            ItemError::Cancelled | ItemError::Transfer(TransferError::Cancelled)
        )
    }
}
