//! In-memory draft service used by the synchronizer, session and router tests.
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::draft_client::{
    DocumentExporter, DraftPatch, DraftStore, PatchAck, PersistenceError, PreviewSource,
    TemplateCatalog, ValidationDelegate,
};
use crate::models::document::{CvDocument, DraftId, Revision, TemplateRef};
use crate::preview::PreviewOverlay;
use crate::validation::ValidationReport;

#[derive(Default)]
struct FakeState {
    drafts: HashMap<DraftId, CvDocument>,
    next_id: u64,
    created: Vec<Revision>,
    patched: Vec<Revision>,
    patch_attempts: u32,
    failing_patches: u32,
    create_delay: Duration,
    patch_delays: HashMap<Revision, Duration>,
    remote_verdict: Option<ValidationReport>,
    validation_down: bool,
    overlay: PreviewOverlay,
    exported: Vec<DraftId>,
}

#[derive(Default)]
pub struct FakeDraftService {
    state: Mutex<FakeState>,
}

impl FakeDraftService {
    pub fn seed_draft(&self, document: &CvDocument) {
        if let Some(id) = &document.id {
            let mut state = self.state.lock().unwrap();
            state.drafts.insert(id.clone(), document.clone());
        }
    }

    pub fn set_create_delay(&self, delay: Duration) {
        self.state.lock().unwrap().create_delay = delay;
    }

    pub fn set_patch_delay(&self, revision: Revision, delay: Duration) {
        self.state.lock().unwrap().patch_delays.insert(revision, delay);
    }

    /// The next `count` patch calls answer 503.
    pub fn fail_next_patches(&self, count: u32) {
        self.state.lock().unwrap().failing_patches = count;
    }

    pub fn set_remote_verdict(&self, report: ValidationReport) {
        self.state.lock().unwrap().remote_verdict = Some(report);
    }

    pub fn set_validation_down(&self, down: bool) {
        self.state.lock().unwrap().validation_down = down;
    }

    pub fn set_overlay(&self, overlay: PreviewOverlay) {
        self.state.lock().unwrap().overlay = overlay;
    }

    pub fn created_revisions(&self) -> Vec<Revision> {
        self.state.lock().unwrap().created.clone()
    }

    /// Revisions of applied patches, in the order their responses were sent.
    pub fn patched_revisions(&self) -> Vec<Revision> {
        self.state.lock().unwrap().patched.clone()
    }

    pub fn patch_attempts(&self) -> u32 {
        self.state.lock().unwrap().patch_attempts
    }

    pub fn stored(&self, id: &DraftId) -> Option<CvDocument> {
        self.state.lock().unwrap().drafts.get(id).cloned()
    }

    pub fn exported(&self) -> Vec<DraftId> {
        self.state.lock().unwrap().exported.clone()
    }

    fn missing(id: &DraftId) -> PersistenceError {
        PersistenceError::Api {
            status: 404,
            message: format!("no draft {id}"),
        }
    }
}

#[async_trait]
impl DraftStore for FakeDraftService {
    async fn create_draft(
        &self,
        revision: Revision,
        initial: &CvDocument,
    ) -> Result<DraftId, PersistenceError> {
        let delay = self.state.lock().unwrap().create_delay;
        tokio::time::sleep(delay).await;

        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = DraftId(state.next_id.to_string());
        let mut stored = initial.clone();
        stored.id = Some(id.clone());
        state.drafts.insert(id.clone(), stored);
        state.created.push(revision);
        Ok(id)
    }

    async fn patch_draft(
        &self,
        id: &DraftId,
        patch: &DraftPatch,
    ) -> Result<PatchAck, PersistenceError> {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.patch_attempts += 1;
            if state.failing_patches > 0 {
                state.failing_patches -= 1;
                return Err(PersistenceError::Api {
                    status: 503,
                    message: "draft service unavailable".to_string(),
                });
            }
            state.patch_delays.get(&patch.revision).copied().unwrap_or_default()
        };
        tokio::time::sleep(delay).await;

        let mut state = self.state.lock().unwrap();
        let draft = state.drafts.get_mut(id).ok_or_else(|| Self::missing(id))?;
        if patch.revision >= draft.revision {
            if let Some(info) = &patch.personal_info {
                draft.personal_info = info.clone();
            }
            if let Some(summary) = &patch.summary {
                draft.summary = summary.clone();
            }
            for entries in patch.sections.values() {
                draft.sections.replace(entries.clone());
            }
            if let Some(template) = &patch.template {
                draft.template = template.clone();
            }
            draft.revision = patch.revision;
        }
        state.patched.push(patch.revision);
        Ok(PatchAck {
            ok: true,
            revision_ack: Some(patch.revision),
            last_saved: None,
        })
    }

    async fn fetch_draft(&self, id: &DraftId) -> Result<CvDocument, PersistenceError> {
        self.stored(id).ok_or_else(|| Self::missing(id))
    }
}

#[async_trait]
impl ValidationDelegate for FakeDraftService {
    async fn validate_draft(&self, id: &DraftId) -> Result<ValidationReport, PersistenceError> {
        let state = self.state.lock().unwrap();
        if state.validation_down {
            return Err(PersistenceError::Api {
                status: 502,
                message: "validator offline".to_string(),
            });
        }
        if !state.drafts.contains_key(id) {
            return Err(Self::missing(id));
        }
        Ok(state.remote_verdict.clone().unwrap_or(ValidationReport {
            valid: true,
            errors: Default::default(),
        }))
    }
}

#[async_trait]
impl TemplateCatalog for FakeDraftService {
    async fn list_templates(&self) -> Result<Vec<TemplateRef>, PersistenceError> {
        Ok(vec![
            TemplateRef {
                id: "classic".to_string(),
                name: "Classic".to_string(),
                style: Some("traditional".to_string()),
                preview_image: None,
            },
            TemplateRef {
                id: "modern".to_string(),
                name: "Modern".to_string(),
                style: Some("contemporary".to_string()),
                preview_image: Some("/static/modern.png".to_string()),
            },
        ])
    }
}

#[async_trait]
impl PreviewSource for FakeDraftService {
    async fn fetch_preview(&self, id: &DraftId) -> Result<PreviewOverlay, PersistenceError> {
        let state = self.state.lock().unwrap();
        if !state.drafts.contains_key(id) {
            return Err(Self::missing(id));
        }
        Ok(state.overlay.clone())
    }
}

#[async_trait]
impl DocumentExporter for FakeDraftService {
    async fn export_document(&self, id: &DraftId) -> Result<Bytes, PersistenceError> {
        let mut state = self.state.lock().unwrap();
        let draft = state.drafts.get(id).ok_or_else(|| Self::missing(id))?;
        let artifact = Bytes::from(format!("%PDF-1.4 {}", draft.personal_info.full_name));
        state.exported.push(id.clone());
        Ok(artifact)
    }
}
