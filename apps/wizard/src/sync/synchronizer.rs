//! Draft Synchronizer: keeps the remote draft consistent with local edits.
//!
//! Runs as its own task. The owner hands it every new document snapshot via
//! [`SyncHandle::schedule_save`]; saves are debounced, creation happens once,
//! and every request carries the revision of the snapshot it persists so that
//! late responses can never move the saved watermark backwards.
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::draft_client::{DraftPatch, DraftStore, PatchAck, PersistenceError};
use crate::models::document::{CvDocument, DraftId, Revision};
use crate::sync::debounce::Debouncer;
use crate::sync::retry::{with_retry, RetryPolicy};
use crate::sync::watermark::Watermark;

const COMMAND_BUFFER: usize = 64;

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub debounce: Duration,
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    Uncreated,
    Creating,
    Created,
}

/// Published on every state change.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub lifecycle: Lifecycle,
    pub draft_id: Option<DraftId>,
    pub watermark: Revision,
    pub latest: Revision,
    pub save_pending: bool,
    pub in_flight: usize,
    pub last_saved: Option<DateTime<Utc>>,
    /// Set when saves keep failing; editing is unaffected.
    pub warning: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveResult {
    /// `None` when there was nothing worth persisting yet.
    pub draft_id: Option<DraftId>,
    pub revision: Revision,
    pub last_saved: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    #[error("draft save failed: {0}")]
    Failed(String),

    #[error("draft synchronizer was discarded")]
    Discarded,
}

enum SyncCommand {
    Schedule(Arc<CvDocument>),
    Flush(oneshot::Sender<Result<SaveResult, SyncError>>),
    EnsureCreated(oneshot::Sender<Result<DraftId, SyncError>>),
    Discard,
}

enum Completion {
    Created {
        snapshot: Arc<CvDocument>,
        result: Result<DraftId, PersistenceError>,
    },
    Patched {
        snapshot: Arc<CvDocument>,
        result: Result<PatchAck, PersistenceError>,
    },
}

// ────────────────────────────────────────────────────────────────────────────
// Handle
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct SyncHandle {
    commands: mpsc::Sender<SyncCommand>,
    status: watch::Receiver<SyncStatus>,
}

impl SyncHandle {
    /// Fire-and-forget, debounced.
    pub async fn schedule_save(&self, document: Arc<CvDocument>) {
        if self.commands.send(SyncCommand::Schedule(document)).await.is_err() {
            debug!("Save scheduled on a stopped synchronizer, ignoring");
        }
    }

    /// Saves the latest scheduled snapshot now and waits until it is persisted.
    pub async fn flush(&self) -> Result<SaveResult, SyncError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(SyncCommand::Flush(reply))
            .await
            .map_err(|_| SyncError::Discarded)?;
        rx.await.map_err(|_| SyncError::Discarded)?
    }

    pub async fn ensure_created(&self) -> Result<DraftId, SyncError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(SyncCommand::EnsureCreated(reply))
            .await
            .map_err(|_| SyncError::Discarded)?;
        rx.await.map_err(|_| SyncError::Discarded)?
    }

    /// Cancels any pending save and stops the synchronizer. In-flight
    /// requests finish on their own; their results are dropped.
    pub async fn discard(&self) {
        let _ = self.commands.send(SyncCommand::Discard).await;
    }

    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status.clone()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Actor
// ────────────────────────────────────────────────────────────────────────────

pub struct DraftSynchronizer {
    store: Arc<dyn DraftStore>,
    config: SyncConfig,
    commands: mpsc::Receiver<SyncCommand>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions: mpsc::UnboundedReceiver<Completion>,
    status: watch::Sender<SyncStatus>,

    lifecycle: Lifecycle,
    draft_id: Option<DraftId>,
    /// Most recent snapshot handed in by the owner.
    latest: Arc<CvDocument>,
    /// Snapshot at the watermark; patches are diffed against it.
    acked: Arc<CvDocument>,
    watermark: Watermark,
    debouncer: Debouncer,
    /// Revisions of patch requests currently on the wire.
    in_flight: BTreeSet<Revision>,
    /// A save was requested while the draft was being created.
    queued_behind_create: bool,
    flush_waiters: Vec<(Revision, oneshot::Sender<Result<SaveResult, SyncError>>)>,
    create_waiters: Vec<oneshot::Sender<Result<DraftId, SyncError>>>,
    last_saved: Option<DateTime<Utc>>,
    warning: Option<String>,
}

impl DraftSynchronizer {
    /// Starts a synchronizer for `document`. A document that already carries
    /// an id is treated as a persisted draft at its current revision.
    pub fn spawn(
        store: Arc<dyn DraftStore>,
        config: SyncConfig,
        document: Arc<CvDocument>,
    ) -> SyncHandle {
        let (commands_tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let (completions_tx, completions) = mpsc::unbounded_channel();

        let lifecycle = if document.id.is_some() {
            Lifecycle::Created
        } else {
            Lifecycle::Uncreated
        };
        let mut actor = Self {
            store,
            debouncer: Debouncer::new(config.debounce),
            config,
            commands,
            completions_tx,
            completions,
            status: watch::channel(SyncStatus {
                lifecycle,
                draft_id: document.id.clone(),
                watermark: document.revision,
                latest: document.revision,
                save_pending: false,
                in_flight: 0,
                last_saved: None,
                warning: None,
            })
            .0,
            lifecycle,
            draft_id: document.id.clone(),
            watermark: Watermark::at(document.revision),
            latest: Arc::clone(&document),
            acked: document,
            in_flight: BTreeSet::new(),
            queued_behind_create: false,
            flush_waiters: Vec::new(),
            create_waiters: Vec::new(),
            last_saved: None,
            warning: None,
        };
        let status = actor.status.subscribe();
        tokio::spawn(async move { actor.run().await });

        SyncHandle {
            commands: commands_tx,
            status,
        }
    }

    async fn run(mut self) {
        loop {
            let deadline = self.debouncer.deadline();
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(SyncCommand::Schedule(document)) => self.schedule(document),
                    Some(SyncCommand::Flush(reply)) => self.flush(reply),
                    Some(SyncCommand::EnsureCreated(reply)) => self.ensure_created(reply),
                    Some(SyncCommand::Discard) | None => break,
                },
                Some(completion) = self.completions.recv() => match completion {
                    Completion::Created { snapshot, result } => self.on_created(snapshot, result),
                    Completion::Patched { snapshot, result } => self.on_patched(snapshot, result),
                },
                _ = sleep_until(deadline) => {
                    if self.debouncer.poll_due(Instant::now()) {
                        self.dispatch();
                    }
                }
            }
            self.publish();
        }
        self.teardown();
    }

    fn schedule(&mut self, document: Arc<CvDocument>) {
        if document.revision > self.latest.revision {
            self.latest = document;
        }
        self.debouncer.schedule(Instant::now());
    }

    fn flush(&mut self, reply: oneshot::Sender<Result<SaveResult, SyncError>>) {
        self.debouncer.flush();
        if self.lifecycle == Lifecycle::Uncreated && self.latest.is_untouched() {
            let _ = reply.send(Ok(self.save_result()));
            return;
        }
        let target = self.latest.revision;
        if self.watermark.covers(target) && self.lifecycle == Lifecycle::Created {
            let _ = reply.send(Ok(self.save_result()));
            return;
        }
        self.flush_waiters.push((target, reply));
        self.dispatch();
    }

    fn ensure_created(&mut self, reply: oneshot::Sender<Result<DraftId, SyncError>>) {
        if let (Lifecycle::Created, Some(id)) = (self.lifecycle, &self.draft_id) {
            let _ = reply.send(Ok(id.clone()));
            return;
        }
        self.create_waiters.push(reply);
        if self.lifecycle == Lifecycle::Uncreated {
            self.start_create(Arc::clone(&self.latest));
        }
    }

    /// Sends whatever the latest snapshot holds that the server has not acknowledged.
    fn dispatch(&mut self) {
        match self.lifecycle {
            Lifecycle::Uncreated => {
                if self.latest.is_untouched() {
                    debug!("Nothing entered yet, not creating a draft");
                    return;
                }
                self.start_create(Arc::clone(&self.latest));
            }
            Lifecycle::Creating => {
                debug!("Save for {} queued behind draft creation", self.latest.revision);
                self.queued_behind_create = true;
            }
            Lifecycle::Created => self.start_patch(),
        }
    }

    fn start_create(&mut self, snapshot: Arc<CvDocument>) {
        self.lifecycle = Lifecycle::Creating;
        info!("Creating draft at {}", snapshot.revision);

        let store = Arc::clone(&self.store);
        let policy = self.config.retry.clone();
        let done = self.completions_tx.clone();
        tokio::spawn(async move {
            let result = with_retry(&policy, "create draft", || {
                store.create_draft(snapshot.revision, &snapshot)
            })
            .await;
            let _ = done.send(Completion::Created { snapshot, result });
        });
    }

    fn start_patch(&mut self) {
        let snapshot = Arc::clone(&self.latest);
        let revision = snapshot.revision;
        if self.watermark.covers(revision) || self.in_flight.contains(&revision) {
            return;
        }
        let Some(id) = self.draft_id.clone() else {
            return;
        };

        let patch = DraftPatch::between(&self.acked, &snapshot);
        if patch.is_empty() {
            debug!("{revision} changes nothing persisted, marking saved");
            self.record_saved(snapshot, None);
            return;
        }

        debug!(
            "Saving {revision} to draft {id} ({} changed sections)",
            patch.sections.len()
        );
        self.in_flight.insert(revision);
        let store = Arc::clone(&self.store);
        let policy = self.config.retry.clone();
        let done = self.completions_tx.clone();
        tokio::spawn(async move {
            let result = with_retry(&policy, "save draft", || store.patch_draft(&id, &patch))
                .await
                .and_then(|ack| match ack.revision_ack {
                    Some(acked) if acked < patch.revision => {
                        Err(PersistenceError::NotAcknowledged(patch.revision))
                    }
                    _ if !ack.ok => Err(PersistenceError::NotAcknowledged(patch.revision)),
                    _ => Ok(ack),
                });
            let _ = done.send(Completion::Patched { snapshot, result });
        });
    }

    fn on_created(&mut self, snapshot: Arc<CvDocument>, result: Result<DraftId, PersistenceError>) {
        match result {
            Ok(id) => {
                info!("Draft {id} created at {}", snapshot.revision);
                self.lifecycle = Lifecycle::Created;
                self.draft_id = Some(id.clone());
                for waiter in self.create_waiters.drain(..) {
                    let _ = waiter.send(Ok(id.clone()));
                }
                self.record_saved(snapshot, None);

                let wanted = std::mem::take(&mut self.queued_behind_create)
                    || !self.flush_waiters.is_empty();
                if wanted && !self.watermark.covers(self.latest.revision) {
                    self.start_patch();
                }
            }
            Err(e) => {
                warn!("Draft creation failed: {e}");
                self.lifecycle = Lifecycle::Uncreated;
                self.queued_behind_create = false;
                self.warning = Some(e.to_string());
                let error = SyncError::Failed(e.to_string());
                for waiter in self.create_waiters.drain(..) {
                    let _ = waiter.send(Err(error.clone()));
                }
                for (_, waiter) in self.flush_waiters.drain(..) {
                    let _ = waiter.send(Err(error.clone()));
                }
            }
        }
    }

    fn on_patched(&mut self, snapshot: Arc<CvDocument>, result: Result<PatchAck, PersistenceError>) {
        let revision = snapshot.revision;
        self.in_flight.remove(&revision);
        match result {
            Ok(ack) => self.record_saved(snapshot, ack.last_saved),
            Err(e) => {
                warn!("Saving {revision} failed, edits stay local: {e}");
                self.warning = Some(e.to_string());
                let error = SyncError::Failed(e.to_string());
                let newest_in_flight = self.in_flight.last().copied();
                let (still_covered, failed): (Vec<_>, Vec<_>) =
                    std::mem::take(&mut self.flush_waiters)
                        .into_iter()
                        .partition(|(target, _)| newest_in_flight.is_some_and(|r| r >= *target));
                self.flush_waiters = still_covered;
                for (_, waiter) in failed {
                    let _ = waiter.send(Err(error.clone()));
                }
            }
        }
    }

    /// Moves the watermark to `snapshot` unless a newer save already landed.
    fn record_saved(&mut self, snapshot: Arc<CvDocument>, last_saved: Option<DateTime<Utc>>) {
        if let Err(stale) = self.watermark.advance(snapshot.revision) {
            debug!("Discarding save result: {stale}");
            return;
        }
        self.acked = snapshot;
        self.last_saved = Some(last_saved.unwrap_or_else(Utc::now));
        self.warning = None;

        let result = self.save_result();
        let watermark = self.watermark;
        let (done, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.flush_waiters)
            .into_iter()
            .partition(|(target, _)| watermark.covers(*target));
        self.flush_waiters = waiting;
        for (_, waiter) in done {
            let _ = waiter.send(Ok(result.clone()));
        }
    }

    fn save_result(&self) -> SaveResult {
        SaveResult {
            draft_id: self.draft_id.clone(),
            revision: self.watermark.current(),
            last_saved: self.last_saved,
        }
    }

    fn publish(&self) {
        let next = SyncStatus {
            lifecycle: self.lifecycle,
            draft_id: self.draft_id.clone(),
            watermark: self.watermark.current(),
            latest: self.latest.revision,
            save_pending: self.debouncer.is_pending(),
            in_flight: self.in_flight.len() + usize::from(self.lifecycle == Lifecycle::Creating),
            last_saved: self.last_saved,
            warning: self.warning.clone(),
        };
        self.status.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }

    fn teardown(&mut self) {
        if self.debouncer.cancel() {
            debug!("Dropped pending save at {}", self.latest.revision);
        }
        for (_, waiter) in self.flush_waiters.drain(..) {
            let _ = waiter.send(Err(SyncError::Discarded));
        }
        for waiter in self.create_waiters.drain(..) {
            let _ = waiter.send(Err(SyncError::Discarded));
        }
        info!(
            "Synchronizer stopped (watermark {}, {} requests still in flight)",
            self.watermark.current(),
            self.in_flight.len()
        );
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeDraftService;

    const DEBOUNCE: Duration = Duration::from_millis(750);

    fn config() -> SyncConfig {
        SyncConfig {
            debounce: DEBOUNCE,
            retry: RetryPolicy {
                max_attempts: 3,
                backoff_base: Duration::from_millis(500),
                attempt_timeout: Duration::from_secs(10),
            },
        }
    }

    fn doc(revision: u64, summary: &str) -> Arc<CvDocument> {
        Arc::new(CvDocument {
            summary: summary.to_string(),
            revision: Revision(revision),
            ..CvDocument::default()
        })
    }

    fn resumed(id: &str) -> Arc<CvDocument> {
        Arc::new(CvDocument {
            id: Some(DraftId(id.to_string())),
            ..CvDocument::default()
        })
    }

    async fn settle() {
        tokio::time::sleep(DEBOUNCE + Duration::from_millis(50)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_coalesces_rapid_edits() {
        let fake = Arc::new(FakeDraftService::default());
        let sync = DraftSynchronizer::spawn(fake.clone(), config(), Arc::new(CvDocument::default()));

        for revision in 1..=3 {
            sync.schedule_save(doc(revision, &format!("draft {revision}"))).await;
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(fake.created_revisions().is_empty());

        settle().await;
        assert_eq!(fake.created_revisions(), vec![Revision(3)]);
        assert!(fake.patched_revisions().is_empty());
        assert_eq!(sync.status().watermark, Revision(3));
        assert_eq!(sync.status().lifecycle, Lifecycle::Created);
    }

    #[tokio::test(start_paused = true)]
    async fn test_untouched_document_is_never_created() {
        let fake = Arc::new(FakeDraftService::default());
        let sync = DraftSynchronizer::spawn(fake.clone(), config(), Arc::new(CvDocument::default()));

        sync.schedule_save(Arc::new(CvDocument::default())).await;
        settle().await;
        let result = sync.flush().await.unwrap();

        assert!(fake.created_revisions().is_empty());
        assert_eq!(result.draft_id, None);
        assert_eq!(sync.status().lifecycle, Lifecycle::Uncreated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_saves_queue_behind_creation() {
        let fake = Arc::new(FakeDraftService::default());
        fake.set_create_delay(Duration::from_secs(2));
        let sync = DraftSynchronizer::spawn(fake.clone(), config(), Arc::new(CvDocument::default()));

        sync.schedule_save(doc(1, "first")).await;
        settle().await;
        assert_eq!(sync.status().lifecycle, Lifecycle::Creating);

        sync.schedule_save(doc(2, "second")).await;
        let saved = sync.flush().await.unwrap();

        assert_eq!(fake.created_revisions(), vec![Revision(1)]);
        assert_eq!(fake.patched_revisions(), vec![Revision(2)]);
        assert_eq!(saved.revision, Revision(2));
        assert!(saved.draft_id.is_some());
        assert_eq!(fake.stored(saved.draft_id.as_ref().unwrap()).unwrap().summary, "second");
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_response_for_older_revision_is_discarded() {
        let fake = Arc::new(FakeDraftService::default());
        let sync = DraftSynchronizer::spawn(fake.clone(), config(), resumed("41"));
        fake.seed_draft(resumed("41").as_ref());
        fake.set_patch_delay(Revision(3), Duration::from_secs(3));
        fake.set_patch_delay(Revision(5), Duration::from_millis(10));

        sync.schedule_save(doc(3, "older")).await;
        settle().await;
        assert_eq!(sync.status().in_flight, 1);

        sync.schedule_save(doc(5, "newer")).await;
        settle().await;
        assert_eq!(sync.status().watermark, Revision(5));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fake.patched_revisions(), vec![Revision(5), Revision(3)]);
        let status = sync.status();
        assert_eq!(status.watermark, Revision(5));
        assert_eq!(status.in_flight, 0);
        assert_eq!(status.warning, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_surface_warning_and_editing_continues() {
        let fake = Arc::new(FakeDraftService::default());
        let sync = DraftSynchronizer::spawn(fake.clone(), config(), resumed("7"));
        fake.seed_draft(resumed("7").as_ref());
        fake.fail_next_patches(5);

        sync.schedule_save(doc(1, "unsaved")).await;
        let err = sync.flush().await.unwrap_err();
        assert!(matches!(err, SyncError::Failed(_)));
        assert_eq!(fake.patch_attempts(), 3);
        let status = sync.status();
        assert!(status.warning.is_some());
        assert_eq!(status.watermark, Revision(0));

        fake.fail_next_patches(0);
        sync.schedule_save(doc(2, "recovered")).await;
        let saved = sync.flush().await.unwrap();
        assert_eq!(saved.revision, Revision(2));
        assert_eq!(sync.status().warning, None);
        let id = DraftId("7".to_string());
        assert_eq!(fake.stored(&id).unwrap().summary, "recovered");
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_is_retried() {
        let fake = Arc::new(FakeDraftService::default());
        let sync = DraftSynchronizer::spawn(fake.clone(), config(), resumed("7"));
        fake.seed_draft(resumed("7").as_ref());
        fake.fail_next_patches(2);

        sync.schedule_save(doc(4, "eventually")).await;
        let saved = sync.flush().await.unwrap();
        assert_eq!(saved.revision, Revision(4));
        assert_eq!(fake.patch_attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_discard_cancels_pending_save() {
        let fake = Arc::new(FakeDraftService::default());
        let sync = DraftSynchronizer::spawn(fake.clone(), config(), Arc::new(CvDocument::default()));

        sync.schedule_save(doc(1, "abandoned")).await;
        sync.discard().await;
        settle().await;

        assert!(fake.created_revisions().is_empty());
        assert_eq!(sync.flush().await.unwrap_err(), SyncError::Discarded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ensure_created_creates_once() {
        let fake = Arc::new(FakeDraftService::default());
        let sync = DraftSynchronizer::spawn(fake.clone(), config(), Arc::new(CvDocument::default()));

        let (a, b) = tokio::join!(sync.ensure_created(), sync.ensure_created());
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(fake.created_revisions().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_without_changes_returns_immediately() {
        let fake = Arc::new(FakeDraftService::default());
        let sync = DraftSynchronizer::spawn(fake.clone(), config(), resumed("3"));

        let saved = sync.flush().await.unwrap();
        assert_eq!(saved.draft_id, Some(DraftId("3".to_string())));
        assert_eq!(saved.revision, Revision(0));
        assert_eq!(fake.patch_attempts(), 0);
    }
}
