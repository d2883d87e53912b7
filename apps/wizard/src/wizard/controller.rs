use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::document::{DocumentAssembler, SectionError};
use crate::models::document::{
    CvDocument, DocumentPatch, DraftId, PersonalInfoPatch, Revision, TemplateRef,
};
use crate::models::sections::{EntryId, SectionEntries, SectionKind};
use crate::preview::{project, PreviewModel, PreviewOverlay};
use crate::sync::{StaleResponse, SyncStatus};
use crate::validation::{validate, validate_all, ValidationReport};
use crate::wizard::steps::{WizardStep, TOTAL_STEPS};

/// A document mutation requested by a step view.
#[derive(Debug, Clone)]
pub enum Edit {
    SectionPatch {
        kind: SectionKind,
        entries: Vec<Value>,
    },
    PersonalInfo(PersonalInfoPatch),
    Summary(String),
    Template(Option<TemplateRef>),
    AddEntry {
        kind: SectionKind,
        template: Map<String, Value>,
    },
    UpdateEntry {
        kind: SectionKind,
        entry_id: EntryId,
        field: String,
        value: Value,
    },
    RemoveEntry {
        kind: SectionKind,
        entry_id: EntryId,
    },
}

#[derive(Debug, Clone)]
pub struct Applied {
    pub document: Arc<CvDocument>,
    /// Set for `AddEntry`.
    pub entry_id: Option<EntryId>,
}

/// What the controller decided after a step was validated.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Advanced(WizardStep),
    Blocked,
    ReadyToFinalize,
    /// The step changed while the verdict was being computed.
    Superseded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    Advanced {
        step: u8,
        title: &'static str,
    },
    Blocked {
        step: u8,
        errors: BTreeMap<String, String>,
    },
    Finalized {
        #[serde(rename = "draftId")]
        draft_id: DraftId,
        revision: Revision,
    },
    ValidationUnavailable {
        step: u8,
        message: String,
    },
    Superseded {
        step: u8,
    },
}

/// The exported document, kept for download.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub draft_id: DraftId,
    pub revision: Revision,
    pub bytes: Bytes,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WizardView {
    pub current_step: u8,
    pub step: WizardStep,
    pub title: &'static str,
    pub total_steps: u8,
    pub errors: BTreeMap<String, String>,
    pub finalized: bool,
    pub revision: Revision,
    pub sync: SyncStatus,
}

/// Step state machine plus the document it edits. Purely synchronous; the
/// session around it does all the waiting on the network.
pub struct WizardController {
    assembler: DocumentAssembler,
    step: WizardStep,
    errors: BTreeMap<String, String>,
    overlay: Option<(Revision, PreviewOverlay)>,
    artifact: Option<Artifact>,
}

impl Default for WizardController {
    fn default() -> Self {
        Self::new()
    }
}

impl WizardController {
    pub fn new() -> Self {
        Self {
            assembler: DocumentAssembler::new(),
            step: WizardStep::FIRST,
            errors: BTreeMap::new(),
            overlay: None,
            artifact: None,
        }
    }

    /// Continues editing a fetched draft. Local revisions carry on from the
    /// stored revision so every later save outranks what the server holds.
    pub fn resume(document: CvDocument) -> Self {
        Self {
            assembler: DocumentAssembler::from_document(document),
            ..Self::new()
        }
    }

    pub fn document(&self) -> Arc<CvDocument> {
        self.assembler.snapshot()
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn errors(&self) -> &BTreeMap<String, String> {
        &self.errors
    }

    pub fn apply(&mut self, edit: Edit) -> Result<Applied, SectionError> {
        let mut entry_id = None;
        let document = match edit {
            Edit::SectionPatch { kind, entries } => {
                let entries = SectionEntries::from_values(kind, entries)?;
                self.assembler.apply_patch(DocumentPatch {
                    sections: vec![entries],
                    ..DocumentPatch::default()
                })?
            }
            Edit::PersonalInfo(patch) => {
                let merged = self.assembler.snapshot().personal_info.merged(patch);
                self.assembler.apply_patch(DocumentPatch {
                    personal_info: Some(merged),
                    ..DocumentPatch::default()
                })?
            }
            Edit::Summary(summary) => self.assembler.apply_patch(DocumentPatch {
                summary: Some(summary),
                ..DocumentPatch::default()
            })?,
            Edit::Template(template) => self.assembler.apply_patch(DocumentPatch {
                template: Some(template),
                ..DocumentPatch::default()
            })?,
            Edit::AddEntry { kind, template } => {
                entry_id = Some(self.assembler.add_entry(kind, &template)?);
                self.assembler.snapshot()
            }
            Edit::UpdateEntry {
                kind,
                entry_id,
                field,
                value,
            } => self.assembler.update_entry(kind, entry_id, &field, value)?,
            Edit::RemoveEntry { kind, entry_id } => self.assembler.remove_entry(kind, entry_id)?,
        };
        Ok(Applied { document, entry_id })
    }

    pub fn list_entries(&self, kind: SectionKind) -> SectionEntries {
        self.assembler.list_entries(kind)
    }

    /// Local verdict for leaving the current step. The last step re-checks
    /// every step before anything is exported.
    pub fn check_current(&self) -> ValidationReport {
        let document = self.assembler.snapshot();
        if self.step.is_last() {
            validate_all(&document)
        } else {
            validate(&document, self.step)
        }
    }

    /// Applies a validation verdict that was computed for `step`.
    pub fn conclude(&mut self, step: WizardStep, report: ValidationReport) -> Verdict {
        if step != self.step {
            debug!("Dropping verdict for {step:?}, wizard is on {:?}", self.step);
            return Verdict::Superseded;
        }
        if !report.valid {
            debug!("{} blocked with {} errors", step.title(), report.errors.len());
            self.errors = report.errors;
            return Verdict::Blocked;
        }
        self.errors.clear();
        match step.next() {
            Some(next) => {
                info!("Advanced to step {} ({})", next.number(), next.title());
                self.step = next;
                Verdict::Advanced(next)
            }
            None => Verdict::ReadyToFinalize,
        }
    }

    /// Always succeeds; edits already applied stay applied.
    pub fn prev(&mut self) -> WizardStep {
        if let Some(prev) = self.step.prev() {
            self.step = prev;
        }
        self.errors.clear();
        self.step
    }

    pub fn outcome(&self, verdict: &Verdict) -> Option<StepOutcome> {
        let step = self.step.number();
        match verdict {
            Verdict::Advanced(next) => Some(StepOutcome::Advanced {
                step: next.number(),
                title: next.title(),
            }),
            Verdict::Blocked => Some(StepOutcome::Blocked {
                step,
                errors: self.errors.clone(),
            }),
            Verdict::Superseded => Some(StepOutcome::Superseded { step }),
            Verdict::ReadyToFinalize => None,
        }
    }

    /// Records the server id of the draft. Returns the new snapshot when the
    /// document did not carry it yet.
    pub fn assign_draft_id(&mut self, id: DraftId) -> Option<Arc<CvDocument>> {
        if self.assembler.snapshot().id.as_ref() == Some(&id) {
            return None;
        }
        Some(self.assembler.assign_draft_id(id))
    }

    /// Caches a server-side overlay computed for `revision`.
    pub fn record_overlay(
        &mut self,
        revision: Revision,
        overlay: PreviewOverlay,
    ) -> Result<(), StaleResponse> {
        if let Some((cached, _)) = &self.overlay {
            if revision < *cached {
                return Err(StaleResponse {
                    received: revision,
                    watermark: *cached,
                });
            }
        }
        self.overlay = Some((revision, overlay));
        Ok(())
    }

    pub fn preview(&self) -> PreviewModel {
        let document = self.assembler.snapshot();
        project(&document, self.overlay.as_ref().map(|(_, overlay)| overlay))
    }

    pub fn finalize(&mut self, artifact: Artifact) {
        info!(
            "Exported draft {} at {} ({} bytes)",
            artifact.draft_id,
            artifact.revision,
            artifact.bytes.len()
        );
        self.artifact = Some(artifact);
    }

    pub fn artifact(&self) -> Option<&Artifact> {
        self.artifact.as_ref()
    }

    pub fn view(&self, sync: SyncStatus) -> WizardView {
        WizardView {
            current_step: self.step.number(),
            step: self.step,
            title: self.step.title(),
            total_steps: TOTAL_STEPS,
            errors: self.errors.clone(),
            finalized: self.artifact.is_some(),
            revision: self.assembler.revision(),
            sync,
        }
    }
}
