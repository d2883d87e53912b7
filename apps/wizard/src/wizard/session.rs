//! Wizard session actor.
//!
//! One task owns the `WizardController`; HTTP handlers reach it only through a
//! cloneable `WizardHandle`. Network work (remote validation, preview overlay,
//! export) runs in spawned tasks that post a `Completion` back to the actor,
//! so a slow collaborator never stalls editing.
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::document::SectionError;
use crate::draft_client::{
    DocumentExporter, DraftStore, PersistenceError, PreviewSource, ValidationDelegate,
};
use crate::models::document::{CvDocument, PersonalInfoPatch, Revision, TemplateRef};
use crate::models::sections::{EntryId, SectionEntries, SectionKind};
use crate::preview::{PreviewModel, PreviewOverlay};
use crate::sync::retry::bounded;
use crate::sync::{DraftSynchronizer, SaveResult, SyncConfig, SyncError, SyncHandle, SyncStatus};
use crate::validation::remote::{scoped_to_step, validate_remote};
use crate::validation::{ValidationMode, ValidationReport};
use crate::wizard::controller::{
    Applied, Artifact, Edit, StepOutcome, Verdict, WizardController, WizardView,
};
use crate::wizard::steps::WizardStep;

const COMMAND_BUFFER: usize = 64;

#[derive(Debug, Error)]
pub enum WizardError {
    #[error(transparent)]
    Section(#[from] SectionError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("wizard session is not running")]
    SessionClosed,
}

/// External collaborators the session talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn DraftStore>,
    pub validator: Arc<dyn ValidationDelegate>,
    pub previews: Arc<dyn PreviewSource>,
    pub exporter: Arc<dyn DocumentExporter>,
}

impl Collaborators {
    /// All four roles served by one client.
    pub fn shared<T>(service: Arc<T>) -> Self
    where
        T: DraftStore + ValidationDelegate + PreviewSource + DocumentExporter + 'static,
    {
        Self {
            store: service.clone(),
            validator: service.clone(),
            previews: service.clone(),
            exporter: service,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub mode: ValidationMode,
    pub sync: SyncConfig,
    /// Bound on single-shot calls (validation, preview, export).
    pub call_timeout: Duration,
}

enum WizardCommand {
    View(oneshot::Sender<WizardView>),
    Document(oneshot::Sender<Arc<CvDocument>>),
    ListEntries(SectionKind, oneshot::Sender<SectionEntries>),
    Edit(Edit, oneshot::Sender<Result<Applied, WizardError>>),
    Next(oneshot::Sender<Result<StepOutcome, WizardError>>),
    Prev(oneshot::Sender<WizardView>),
    Flush(oneshot::Sender<Result<SaveResult, WizardError>>),
    Discard(oneshot::Sender<WizardView>),
    Preview(oneshot::Sender<PreviewModel>),
    Artifact(oneshot::Sender<Option<Artifact>>),
}

enum Completion {
    Verdict {
        generation: u64,
        step: WizardStep,
        result: Result<ValidationReport, WizardError>,
        reply: oneshot::Sender<Result<StepOutcome, WizardError>>,
    },
    Exported {
        generation: u64,
        result: Result<Artifact, WizardError>,
        reply: oneshot::Sender<Result<StepOutcome, WizardError>>,
    },
    Overlay {
        generation: u64,
        revision: Revision,
        result: Result<PreviewOverlay, WizardError>,
    },
}

// ────────────────────────────────────────────────────────────────────────────
// Handle
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct WizardHandle {
    commands: mpsc::Sender<WizardCommand>,
}

impl WizardHandle {
    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> WizardCommand,
    ) -> Result<T, WizardError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| WizardError::SessionClosed)?;
        rx.await.map_err(|_| WizardError::SessionClosed)
    }

    pub async fn view(&self) -> Result<WizardView, WizardError> {
        self.request(WizardCommand::View).await
    }

    pub async fn get_document(&self) -> Result<Arc<CvDocument>, WizardError> {
        self.request(WizardCommand::Document).await
    }

    pub async fn list_entries(&self, kind: SectionKind) -> Result<SectionEntries, WizardError> {
        self.request(|reply| WizardCommand::ListEntries(kind, reply)).await
    }

    pub async fn edit(&self, edit: Edit) -> Result<Applied, WizardError> {
        self.request(|reply| WizardCommand::Edit(edit, reply)).await?
    }

    pub async fn apply_section_patch(
        &self,
        kind: SectionKind,
        entries: Vec<serde_json::Value>,
    ) -> Result<Applied, WizardError> {
        self.edit(Edit::SectionPatch { kind, entries }).await
    }

    pub async fn apply_personal_info_patch(
        &self,
        patch: PersonalInfoPatch,
    ) -> Result<Applied, WizardError> {
        self.edit(Edit::PersonalInfo(patch)).await
    }

    pub async fn set_summary(&self, summary: String) -> Result<Applied, WizardError> {
        self.edit(Edit::Summary(summary)).await
    }

    pub async fn set_template(&self, template: Option<TemplateRef>) -> Result<Applied, WizardError> {
        self.edit(Edit::Template(template)).await
    }

    pub async fn add_entry(
        &self,
        kind: SectionKind,
        template: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Applied, WizardError> {
        self.edit(Edit::AddEntry { kind, template }).await
    }

    pub async fn update_entry(
        &self,
        kind: SectionKind,
        entry_id: EntryId,
        field: String,
        value: serde_json::Value,
    ) -> Result<Applied, WizardError> {
        self.edit(Edit::UpdateEntry {
            kind,
            entry_id,
            field,
            value,
        })
        .await
    }

    pub async fn remove_entry(
        &self,
        kind: SectionKind,
        entry_id: EntryId,
    ) -> Result<Applied, WizardError> {
        self.edit(Edit::RemoveEntry { kind, entry_id }).await
    }

    pub async fn next(&self) -> Result<StepOutcome, WizardError> {
        self.request(WizardCommand::Next).await?
    }

    pub async fn prev(&self) -> Result<WizardView, WizardError> {
        self.request(WizardCommand::Prev).await
    }

    pub async fn flush(&self) -> Result<SaveResult, WizardError> {
        self.request(WizardCommand::Flush).await?
    }

    pub async fn discard(&self) -> Result<WizardView, WizardError> {
        self.request(WizardCommand::Discard).await
    }

    pub async fn preview(&self) -> Result<PreviewModel, WizardError> {
        self.request(WizardCommand::Preview).await
    }

    pub async fn artifact(&self) -> Result<Option<Artifact>, WizardError> {
        self.request(WizardCommand::Artifact).await
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Actor
// ────────────────────────────────────────────────────────────────────────────

pub struct WizardSession {
    controller: WizardController,
    collaborators: Collaborators,
    config: SessionConfig,
    sync: SyncHandle,
    sync_status: watch::Receiver<SyncStatus>,
    sync_alive: bool,
    commands: mpsc::Receiver<WizardCommand>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions: mpsc::UnboundedReceiver<Completion>,
    /// Bumped on discard; completions from an older generation are ignored.
    generation: u64,
}

impl WizardSession {
    pub fn spawn(
        controller: WizardController,
        collaborators: Collaborators,
        config: SessionConfig,
    ) -> WizardHandle {
        let (commands_tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let (completions_tx, completions) = mpsc::unbounded_channel();
        let sync = DraftSynchronizer::spawn(
            Arc::clone(&collaborators.store),
            config.sync.clone(),
            controller.document(),
        );
        let session = Self {
            controller,
            collaborators,
            config,
            sync_status: sync.subscribe(),
            sync,
            sync_alive: true,
            commands,
            completions_tx,
            completions,
            generation: 0,
        };
        tokio::spawn(session.run());
        WizardHandle {
            commands: commands_tx,
        }
    }

    async fn run(mut self) {
        info!("Wizard session started ({:?} validation)", self.config.mode);
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
                Some(completion) = self.completions.recv() => self.complete(completion).await,
                changed = self.sync_status.changed(), if self.sync_alive => match changed {
                    Ok(()) => self.on_sync_status().await,
                    Err(_) => self.sync_alive = false,
                },
            }
        }
        self.sync.discard().await;
        info!("Wizard session stopped");
    }

    async fn handle(&mut self, command: WizardCommand) {
        match command {
            WizardCommand::View(reply) => {
                let _ = reply.send(self.view());
            }
            WizardCommand::Document(reply) => {
                let _ = reply.send(self.controller.document());
            }
            WizardCommand::ListEntries(kind, reply) => {
                let _ = reply.send(self.controller.list_entries(kind));
            }
            WizardCommand::Edit(edit, reply) => {
                let result = self.controller.apply(edit);
                if let Ok(applied) = &result {
                    self.sync.schedule_save(Arc::clone(&applied.document)).await;
                }
                let _ = reply.send(result.map_err(WizardError::from));
            }
            WizardCommand::Next(reply) => self.next(reply).await,
            WizardCommand::Prev(reply) => {
                self.controller.prev();
                let _ = reply.send(self.view());
            }
            WizardCommand::Flush(reply) => {
                let sync = self.sync.clone();
                tokio::spawn(async move {
                    let _ = reply.send(sync.flush().await.map_err(WizardError::from));
                });
            }
            WizardCommand::Discard(reply) => {
                self.discard().await;
                let _ = reply.send(self.view());
            }
            WizardCommand::Preview(reply) => {
                let _ = reply.send(self.controller.preview());
            }
            WizardCommand::Artifact(reply) => {
                let _ = reply.send(self.controller.artifact().cloned());
            }
        }
    }

    async fn next(&mut self, reply: oneshot::Sender<Result<StepOutcome, WizardError>>) {
        let step = self.controller.step();
        match self.config.mode {
            ValidationMode::Local => {
                let report = self.controller.check_current();
                self.conclude(step, report, reply);
            }
            ValidationMode::Remote => {
                let sync = self.sync.clone();
                let validator = Arc::clone(&self.collaborators.validator);
                let limit = self.config.call_timeout;
                let done = self.completions_tx.clone();
                let generation = self.generation;
                tokio::spawn(async move {
                    let result = remote_verdict(&sync, validator.as_ref(), limit).await;
                    let _ = done.send(Completion::Verdict {
                        generation,
                        step,
                        result,
                        reply,
                    });
                });
            }
        }
    }

    fn conclude(
        &mut self,
        step: WizardStep,
        report: ValidationReport,
        reply: oneshot::Sender<Result<StepOutcome, WizardError>>,
    ) {
        let verdict = self.controller.conclude(step, report);
        match self.controller.outcome(&verdict) {
            Some(outcome) => {
                if let Verdict::Advanced(_) = verdict {
                    self.refresh_overlay();
                }
                let _ = reply.send(Ok(outcome));
            }
            None => self.start_export(reply),
        }
    }

    /// Flushes the draft, then fetches the server's preview overlay for it.
    fn refresh_overlay(&self) {
        let sync = self.sync.clone();
        let previews = Arc::clone(&self.collaborators.previews);
        let limit = self.config.call_timeout;
        let done = self.completions_tx.clone();
        let generation = self.generation;
        tokio::spawn(async move {
            let saved = match sync.flush().await {
                Ok(saved) => saved,
                Err(e) => {
                    warn!("Flush after step change failed: {e}");
                    return;
                }
            };
            let Some(id) = saved.draft_id else {
                return;
            };
            let result = bounded(limit, previews.fetch_preview(&id))
                .await
                .map_err(WizardError::from);
            let _ = done.send(Completion::Overlay {
                generation,
                revision: saved.revision,
                result,
            });
        });
    }

    fn start_export(&self, reply: oneshot::Sender<Result<StepOutcome, WizardError>>) {
        info!("Final step passed validation, exporting");
        let sync = self.sync.clone();
        let exporter = Arc::clone(&self.collaborators.exporter);
        let limit = self.config.call_timeout;
        let done = self.completions_tx.clone();
        let generation = self.generation;
        tokio::spawn(async move {
            let result = export(&sync, exporter.as_ref(), limit).await;
            let _ = done.send(Completion::Exported {
                generation,
                result,
                reply,
            });
        });
    }

    async fn complete(&mut self, completion: Completion) {
        match completion {
            Completion::Verdict {
                generation,
                step,
                result,
                reply,
            } => {
                if generation != self.generation {
                    let _ = reply.send(Ok(StepOutcome::Superseded {
                        step: self.controller.step().number(),
                    }));
                    return;
                }
                match result {
                    Ok(report) => self.conclude(step, scoped_to_step(report, step), reply),
                    Err(e) => {
                        warn!("Remote validation unavailable: {e}");
                        let _ = reply.send(Ok(StepOutcome::ValidationUnavailable {
                            step: step.number(),
                            message: e.to_string(),
                        }));
                    }
                }
            }
            Completion::Exported {
                generation,
                result,
                reply,
            } => {
                if generation != self.generation {
                    let _ = reply.send(Err(SyncError::Discarded.into()));
                    return;
                }
                let outcome = result.map(|artifact| {
                    let outcome = StepOutcome::Finalized {
                        draft_id: artifact.draft_id.clone(),
                        revision: artifact.revision,
                    };
                    self.controller.finalize(artifact);
                    outcome
                });
                if let Err(e) = &outcome {
                    warn!("Export failed: {e}");
                }
                let _ = reply.send(outcome);
            }
            Completion::Overlay {
                generation,
                revision,
                result,
            } => {
                if generation != self.generation {
                    return;
                }
                match result {
                    Ok(overlay) => {
                        if let Err(stale) = self.controller.record_overlay(revision, overlay) {
                            debug!("Discarding preview overlay: {stale}");
                        }
                    }
                    Err(e) => warn!("Preview overlay unavailable: {e}"),
                }
            }
        }
    }

    async fn on_sync_status(&mut self) {
        let draft_id = self.sync_status.borrow_and_update().draft_id.clone();
        if let Some(id) = draft_id {
            if let Some(document) = self.controller.assign_draft_id(id) {
                debug!("Document now bound to draft {:?}", document.id);
                self.sync.schedule_save(document).await;
            }
        }
    }

    async fn discard(&mut self) {
        info!("Discarding wizard session at {}", self.controller.document().revision);
        self.sync.discard().await;
        self.generation += 1;
        self.controller = WizardController::new();
        self.sync = DraftSynchronizer::spawn(
            Arc::clone(&self.collaborators.store),
            self.config.sync.clone(),
            self.controller.document(),
        );
        self.sync_status = self.sync.subscribe();
        self.sync_alive = true;
    }

    fn view(&self) -> WizardView {
        self.controller.view(self.sync.status())
    }
}

/// Makes sure the server holds the latest edits, returning its draft id.
async fn persisted_draft(sync: &SyncHandle) -> Result<SaveResult, WizardError> {
    let mut saved = sync.flush().await?;
    if saved.draft_id.is_none() {
        saved.draft_id = Some(sync.ensure_created().await?);
    }
    Ok(saved)
}

async fn remote_verdict(
    sync: &SyncHandle,
    validator: &dyn ValidationDelegate,
    limit: Duration,
) -> Result<ValidationReport, WizardError> {
    let saved = persisted_draft(sync).await?;
    let id = saved.draft_id.ok_or(SyncError::Discarded)?;
    Ok(bounded(limit, validate_remote(validator, &id)).await?)
}

async fn export(
    sync: &SyncHandle,
    exporter: &dyn DocumentExporter,
    limit: Duration,
) -> Result<Artifact, WizardError> {
    let saved = persisted_draft(sync).await?;
    let draft_id = saved.draft_id.ok_or(SyncError::Discarded)?;
    let bytes = bounded(limit, exporter.export_document(&draft_id)).await?;
    Ok(Artifact {
        draft_id,
        revision: saved.revision,
        bytes,
    })
}
