use std::collections::HashSet;

use crate::storage::SessionStore;

use super::error::UploadError;
use super::selection::{SelectionItem, validate_relative_path};
use super::session::{UploadSession, batch_label_for};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadMode {
    /// Start a new batch into the caller's current folder, replacing any
    /// unresolved session.
    Fresh { current_folder_id: String },
    /// Continue the stored session. Its target folder wins over wherever the
    /// caller has navigated since.
    Resume,
}

/// The logical batch for one run: the session it advances and the items that
/// still need a transfer.
#[derive(Debug, Clone)]
pub struct BatchPlan {
    pub session: UploadSession,
    pub pending: Vec<SelectionItem>,
}

/// Validates the selection, drops repeated paths, and creates or loads the
/// session. A resumed selection must stay inside the stored batch.
pub async fn prepare_batch(
    store: &SessionStore,
    mut selection: Vec<SelectionItem>,
    mode: &UploadMode,
) -> Result<BatchPlan, UploadError> {
    if let Some(bad) = selection
        .iter()
        .find(|item| !validate_relative_path(item.path()))
    {
        return Err(UploadError::InvalidPath(bad.path().to_string()));
    }

    let before = selection.len();
    let mut seen = HashSet::new();
    selection.retain(|item| seen.insert(item.path().to_string()));
    if selection.len() != before {
        tracing::debug!(dropped = before - selection.len(), "ignoring repeated paths in selection");
    }

    let session = match mode {
        UploadMode::Fresh { current_folder_id } => {
            if current_folder_id.is_empty() {
                return Err(UploadError::MissingTargetFolder);
            }
            let label = batch_label_for(selection.first().and_then(|item| item.relative_path.as_deref()));
            let session = UploadSession::new(
                current_folder_id.clone(),
                selection.iter().map(|item| item.path().to_string()),
                label,
            );
            if let Ok(Some(previous)) = store.load().await {
                tracing::info!(
                    previous = %previous.id,
                    label = %previous.batch_label,
                    "replacing unresolved upload session"
                );
            }
            if let Err(err) = store.save(&session).await {
                tracing::warn!("failed to persist new upload session, continuing in memory: {err}");
            }
            session
        }
        UploadMode::Resume => {
            let session = match store.load().await {
                Ok(Some(session)) => session,
                Ok(None) => return Err(UploadError::NoResumableSession),
                Err(err) => {
                    tracing::warn!("failed to load upload session: {err}");
                    return Err(UploadError::NoResumableSession);
                }
            };
            if let Some(stranger) = selection.iter().find(|item| !session.contains(item.path())) {
                return Err(UploadError::SelectionMismatch {
                    path: stranger.path().to_string(),
                    batch: session.batch_label.clone(),
                });
            }
            session
        }
    };

    let pending = selection
        .into_iter()
        .filter(|item| !session.is_completed(item.path()))
        .collect();

    Ok(BatchPlan { session, pending })
}
