use drive_core::{ConfirmUpload, DriveClient, DriveItem, UploadTarget};
use tokio_util::sync::CancellationToken;

use super::error::ItemError;
use super::selection::SelectionItem;
use super::throughput::ByteCounter;
use super::transfer::{TransferClient, TransferError};

/// A pending item paired with the destination reserved for it. The target is
/// never persisted; resumed runs ask for fresh ones.
#[derive(Debug, Clone)]
pub struct TransferItem {
    pub item: SelectionItem,
    pub target: UploadTarget,
}

impl TransferItem {
    pub fn path(&self) -> &str {
        self.item.path()
    }

    fn confirmation(&self) -> ConfirmUpload {
        ConfirmUpload {
            resource_id: self.target.resource_id.clone(),
            parent_id: self.target.actual_parent_id.clone(),
            name: self.item.name.clone(),
            size: self.item.size,
            s3_key: self.target.s3_key.clone(),
            relative_path: self.path().to_string(),
        }
    }
}

/// Performs one item's binary transfer followed by its confirmation call.
///
/// Executors hold no session or tree state: the driver records a successful
/// settlement, so all bookkeeping happens in one place.
#[derive(Clone)]
pub struct ItemExecutor {
    client: DriveClient,
    transfer: TransferClient,
    counter: ByteCounter,
    cancel: CancellationToken,
}

impl ItemExecutor {
    pub fn new(
        client: DriveClient,
        transfer: TransferClient,
        counter: ByteCounter,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            transfer,
            counter,
            cancel,
        }
    }

    pub async fn execute(self, item: TransferItem) -> Result<DriveItem, ItemError> {
        self.transfer
            .put_payload(
                &item.target.url,
                &item.item.source,
                item.item.mime(),
                &self.counter,
                &self.cancel,
            )
            .await
            .map_err(|err| match err {
                TransferError::Cancelled => ItemError::Cancelled,
                other => ItemError::Transfer(other),
            })?;

        let confirmation = item.confirmation();
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ItemError::Cancelled),
            created = self.client.confirm_upload(&confirmation) => Ok(created?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::scheduler::CancelAware;
    use serde_json::json;
    use url::Url;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transfer_item(server: &MockServer) -> TransferItem {
        TransferItem {
            item: SelectionItem::from_bytes("a.jpg", b"jpeg".to_vec())
                .with_relative_path("Photos/a.jpg"),
            target: UploadTarget {
                url: Url::parse(&format!("{}/put/a", server.uri())).unwrap(),
                resource_id: "r-a".into(),
                s3_key: "u/r-a/a.jpg".into(),
                actual_parent_id: "photos".into(),
            },
        }
    }

    fn executor(server: &MockServer, cancel: CancellationToken) -> ItemExecutor {
        ItemExecutor::new(
            DriveClient::with_base_url(&server.uri(), "test-token").unwrap(),
            TransferClient::new(),
            ByteCounter::default(),
            cancel,
        )
    }

    #[tokio::test]
    async fn transfers_then_confirms_with_item_metadata() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/put/a"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/upload/confirm"))
            .and(body_json(json!({
                "resource_id": "r-a",
                "parent_id": "photos",
                "name": "a.jpg",
                "size": 4,
                "s3_key": "u/r-a/a.jpg",
                "relative_path": "Photos/a.jpg"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "r-a",
                "name": "a.jpg",
                "type": "file",
                "parent_id": "photos",
                "size": 4
            })))
            .expect(1)
            .mount(&server)
            .await;

        let created = executor(&server, CancellationToken::new())
            .execute(transfer_item(&server))
            .await
            .unwrap();
        assert_eq!(created.id, "r-a");
    }

    #[tokio::test]
    async fn failed_transfer_skips_confirmation() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/upload/confirm"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = executor(&server, CancellationToken::new())
            .execute(transfer_item(&server))
            .await
            .unwrap_err();
        assert!(matches!(err, ItemError::Transfer(_)));
        assert!(!err.is_cancelled());
    }

    #[tokio::test]
    async fn rejected_confirmation_is_a_failure() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/upload/confirm"))
            .respond_with(ResponseTemplate::new(400).set_body_string("File verification failed"))
            .mount(&server)
            .await;

        let err = executor(&server, CancellationToken::new())
            .execute(transfer_item(&server))
            .await
            .unwrap_err();
        assert!(matches!(err, ItemError::Confirm(_)));
    }

    #[tokio::test]
    async fn cancelled_executor_reports_cancellation() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = executor(&server, cancel)
            .execute(transfer_item(&server))
            .await
            .unwrap_err();
        assert!(matches!(err, ItemError::Cancelled));
        assert!(err.is_cancelled());
    }
}
