use tokio_util::sync::CancellationToken;

use crate::storage::SessionStore;

/// Handle for stopping a run from outside the driver, e.g. a Ctrl-C handler.
#[derive(Clone)]
pub struct UploadController {
    token: CancellationToken,
    store: SessionStore,
}

impl UploadController {
    pub fn new(store: SessionStore) -> Self {
        Self {
            token: CancellationToken::new(),
            store,
        }
    }

    /// Fires the shared signal and drops the stored session. Items already
    /// confirmed stay on the server; nothing is rolled back.
    pub async fn cancel(&self) {
        if self.token.is_cancelled() {
            return;
        }
        self.token.cancel();
        tracing::info!("upload cancellation requested");
        if let Err(err) = self.store.clear().await {
            tracing::warn!("failed to clear upload session on cancel: {err}");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }
}
