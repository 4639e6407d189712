use std::sync::Arc;

use drive_core::{ApiErrorClass, DriveClient, DriveItem, TreeDelta};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::config::ConcurrencyConfig;
use crate::storage::SessionStore;

use super::aimd::AimdLimit;
use super::cancel::UploadController;
use super::descriptor::{BatchPlan, UploadMode, prepare_batch};
use super::error::{ItemError, UploadError};
use super::events::{EventSink, RunOutcome, RunReport, UploadEvent};
use super::executor::{ItemExecutor, TransferItem};
use super::initiation::reserve_targets;
use super::scheduler::{Scheduler, SettleKind, Settled};
use super::selection::SelectionItem;
use super::session::UploadSession;
use super::throughput::{ByteCounter, spawn_sampler};
use super::transfer::TransferClient;
use super::tree::DeltaSink;

#[derive(Debug, Default)]
struct Tally {
    uploaded: usize,
    failed: usize,
}

/// Entry point for upload runs against one backend, session store and tree.
pub struct Uploader {
    client: DriveClient,
    transfer: TransferClient,
    store: SessionStore,
    tree: Arc<dyn DeltaSink>,
    concurrency: ConcurrencyConfig,
    events: EventSink,
}

impl Uploader {
    pub fn new(client: DriveClient, store: SessionStore, tree: Arc<dyn DeltaSink>) -> Self {
        Self {
            client,
            transfer: TransferClient::new(),
            store,
            tree,
            concurrency: ConcurrencyConfig::default(),
            events: EventSink::default(),
        }
    }

    pub fn with_concurrency(mut self, concurrency: ConcurrencyConfig) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_transfer_client(mut self, transfer: TransferClient) -> Self {
        self.transfer = transfer;
        self
    }

    pub fn with_events(mut self, sender: UnboundedSender<UploadEvent>) -> Self {
        self.events = EventSink::new(Some(sender));
        self
    }

    /// A fresh controller bound to this uploader's session store. Use one per
    /// run.
    pub fn controller(&self) -> UploadController {
        UploadController::new(self.store.clone())
    }

    /// Runs one batch to quiescence.
    ///
    /// Precondition failures (invalid paths, missing session, rejected
    /// initiation) return `Err` before any transfer starts. Item failures and
    /// cancellation end in a [`RunReport`].
    pub async fn run(
        &self,
        selection: Vec<SelectionItem>,
        mode: UploadMode,
        controller: &UploadController,
    ) -> Result<RunReport, UploadError> {
        let cancel = controller.token().clone();
        let BatchPlan {
            mut session,
            pending,
        } = prepare_batch(&self.store, selection, &mode).await?;

        tracing::info!(
            session = %session.id,
            label = %session.batch_label,
            pending = pending.len(),
            total = session.total_count,
            "starting upload run"
        );
        self.events.emit(UploadEvent::Preparing {
            pending: pending.len(),
            total: session.total_count,
        });

        let limit = AimdLimit::new(
            self.concurrency.initial_limit,
            self.concurrency.max_limit,
        );
        if pending.is_empty() || cancel.is_cancelled() {
            let outcome = if cancel.is_cancelled() {
                RunOutcome::Cancelled
            } else {
                RunOutcome::Completed
            };
            self.release(&session).await;
            return Ok(self.finish(outcome, Tally::default(), limit.current(), session));
        }

        let items = match reserve_targets(
            &self.client,
            self.tree.as_ref(),
            &session.target_folder_id,
            pending,
        )
        .await
        {
            Ok(items) => items,
            Err(err) => {
                tracing::error!(session = %session.id, "upload run aborted: {err}");
                return Err(err);
            }
        };

        let counter = ByteCounter::default();
        let sampler_stop = CancellationToken::new();
        let speed_events = self.events.clone();
        let sampler = spawn_sampler(
            counter.clone(),
            self.concurrency.speed_sample_interval,
            sampler_stop.clone(),
            move |sample| {
                speed_events.emit(UploadEvent::Speed {
                    bytes_per_sec: sample.bytes_per_sec,
                    label: sample.label,
                })
            },
        );

        let executor = ItemExecutor::new(
            self.client.clone(),
            self.transfer.clone(),
            counter,
            cancel.clone(),
        );
        let mut scheduler: Scheduler<TransferItem, DriveItem, ItemError> =
            Scheduler::new(items, limit);
        let mut tally = Tally::default();

        loop {
            scheduler.pump(&cancel, |item| {
                let key = item.path().to_string();
                (key, executor.clone().execute(item))
            });
            let Some(settled) = scheduler.next_settled().await else {
                break;
            };
            self.record(&mut session, &mut tally, settled, &cancel).await;
            tracing::trace!(
                in_flight = scheduler.in_flight(),
                queued = scheduler.queued(),
                limit = scheduler.limit(),
                "scheduler state"
            );
        }

        sampler_stop.cancel();
        if let Err(err) = sampler.await {
            tracing::debug!("speed sampler ended abnormally: {err}");
        }

        let outcome = if cancel.is_cancelled() {
            let abandoned = scheduler.abandon_queued();
            tracing::info!(
                session = %session.id,
                abandoned = abandoned.len(),
                uploaded = tally.uploaded,
                "upload run cancelled"
            );
            self.release(&session).await;
            RunOutcome::Cancelled
        } else if tally.failed == 0 {
            self.release(&session).await;
            RunOutcome::Completed
        } else {
            tracing::info!(
                session = %session.id,
                failed = tally.failed,
                "upload run finished with failures, session kept for resume"
            );
            RunOutcome::CompletedWithFailures
        };
        debug_assert!(scheduler.is_quiescent());

        Ok(self.finish(outcome, tally, scheduler.limit(), session))
    }

    /// Applies one settlement. The only place the session and the tree are
    /// written during a run.
    async fn record(
        &self,
        session: &mut UploadSession,
        tally: &mut Tally,
        settled: Settled<DriveItem, ItemError>,
        cancel: &CancellationToken,
    ) {
        let kind = settled.kind();
        let Settled { key, outcome } = settled;
        match (kind, outcome) {
            (_, Ok(created)) => {
                self.tree.apply_delta(TreeDelta::added(created));
                if session.mark_completed(&key) {
                    tally.uploaded += 1;
                }
                if !cancel.is_cancelled()
                    && let Err(err) = self.store.save(session).await
                {
                    tracing::warn!(path = %key, "failed to persist upload progress: {err}");
                }
                tracing::debug!(path = %key, completed = session.completed_count(), "item uploaded");
                self.events.emit(UploadEvent::ItemCompleted {
                    path: key,
                    completed: session.completed_count(),
                    total: session.total_count,
                });
            }
            (SettleKind::Cancelled, Err(_)) => {
                tracing::debug!(path = %key, "item cancelled");
            }
            (_, Err(err)) => {
                tally.failed += 1;
                let retryable = err.is_retryable();
                if err.class() == Some(ApiErrorClass::Auth) {
                    tracing::error!(path = %key, "upload rejected, check the access token: {err}");
                } else {
                    tracing::warn!(path = %key, retryable, "item upload failed: {err}");
                }
                self.events.emit(UploadEvent::ItemFailed {
                    path: key,
                    error: err.to_string(),
                    retryable,
                });
            }
        }
    }

    async fn release(&self, session: &UploadSession) {
        match self.store.clear_if(&session.id).await {
            Ok(true) => tracing::debug!(session = %session.id, "upload session cleared"),
            Ok(false) => {}
            Err(err) => tracing::warn!(session = %session.id, "failed to clear upload session: {err}"),
        }
    }

    fn finish(
        &self,
        outcome: RunOutcome,
        tally: Tally,
        final_limit: usize,
        session: UploadSession,
    ) -> RunReport {
        tracing::info!(
            session = %session.id,
            ?outcome,
            uploaded = tally.uploaded,
            failed = tally.failed,
            final_limit,
            "upload run finished"
        );
        self.events.emit(UploadEvent::Finished(outcome));
        RunReport {
            outcome,
            uploaded: tally.uploaded,
            failed: tally.failed,
            final_limit,
            session,
        }
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
