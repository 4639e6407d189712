use drive_core::{DriveClient, FileInitItem};

use super::error::UploadError;
use super::executor::TransferItem;
use super::selection::SelectionItem;
use super::tree::DeltaSink;

/// Reserves destinations for every pending item in a single request and
/// merges any server-side folder creation into the tree before a transfer
/// starts. Any failure here aborts the run without touching the session.
pub async fn reserve_targets(
    client: &DriveClient,
    tree: &dyn DeltaSink,
    target_folder_id: &str,
    pending: Vec<SelectionItem>,
) -> Result<Vec<TransferItem>, UploadError> {
    let files: Vec<FileInitItem> = pending.iter().map(SelectionItem::init_item).collect();
    let response = client
        .initiate_batch(target_folder_id, &files)
        .await
        .map_err(UploadError::Initiation)?;

    if response.files.len() != pending.len() {
        return Err(UploadError::TargetCountMismatch {
            expected: pending.len(),
            received: response.files.len(),
        });
    }

    if let Some(delta) = response.delta
        && !delta.is_empty()
    {
        tracing::debug!(
            added = delta.added.len(),
            updated = delta.updated.len(),
            "applying batch delta"
        );
        tree.apply_delta(delta);
    }

    Ok(pending
        .into_iter()
        .zip(response.files)
        .map(|(item, target)| TransferItem { item, target })
        .collect())
}
