//! Document Assembler: the only writer of the CV document.
//!
//! Every successful mutation publishes a fresh `Arc<CvDocument>` with the
//! revision bumped by exactly one. Snapshots handed out earlier are never
//! touched again.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::document::sections::{self, EntryIdAllocator, SectionError};
use crate::models::document::{CvDocument, DocumentPatch, DraftId, Revision};
use crate::models::sections::{EntryId, SectionEntries, SectionKind};

pub struct DocumentAssembler {
    current: Arc<CvDocument>,
    ids: EntryIdAllocator,
}

impl Default for DocumentAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentAssembler {
    pub fn new() -> Self {
        Self {
            current: Arc::new(CvDocument::default()),
            ids: EntryIdAllocator::default(),
        }
    }

    /// Seeds the assembler from a previously persisted document.
    pub fn from_document(document: CvDocument) -> Self {
        let ids = EntryIdAllocator::starting_after(document.sections.max_entry_id());
        Self {
            current: Arc::new(document),
            ids,
        }
    }

    pub fn snapshot(&self) -> Arc<CvDocument> {
        Arc::clone(&self.current)
    }

    pub fn revision(&self) -> Revision {
        self.current.revision
    }

    pub fn apply_patch(&mut self, patch: DocumentPatch) -> Result<Arc<CvDocument>, SectionError> {
        let mut ids = self.ids.clone();
        let mut normalized = Vec::with_capacity(patch.sections.len());
        for entries in patch.sections {
            normalized.push(sections::normalize_entries(entries, &mut ids)?);
        }

        let snapshot = self.commit(|doc| {
            if let Some(personal_info) = patch.personal_info {
                doc.personal_info = personal_info;
            }
            if let Some(summary) = patch.summary {
                doc.summary = summary;
            }
            for entries in normalized {
                doc.sections.replace(entries);
            }
            if let Some(template) = patch.template {
                doc.template = template;
            }
            Ok(())
        })?;
        self.ids = ids;
        Ok(snapshot)
    }

    pub fn add_entry(
        &mut self,
        kind: SectionKind,
        template: &Map<String, Value>,
    ) -> Result<EntryId, SectionError> {
        let entry_id = self.ids.allocate(kind)?;
        self.commit(|doc| sections::add_entry(&mut doc.sections, kind, entry_id, template))?;
        debug!("Added {kind} entry {entry_id} at {}", self.current.revision);
        Ok(entry_id)
    }

    pub fn update_entry(
        &mut self,
        kind: SectionKind,
        entry_id: EntryId,
        field: &str,
        value: Value,
    ) -> Result<Arc<CvDocument>, SectionError> {
        self.commit(|doc| sections::update_entry(&mut doc.sections, kind, entry_id, field, value))
            .inspect_err(|e| log_rejection("update", e))
    }

    pub fn remove_entry(
        &mut self,
        kind: SectionKind,
        entry_id: EntryId,
    ) -> Result<Arc<CvDocument>, SectionError> {
        self.commit(|doc| sections::remove_entry(&mut doc.sections, kind, entry_id))
            .inspect_err(|e| log_rejection("remove", e))
    }

    pub fn list_entries(&self, kind: SectionKind) -> SectionEntries {
        self.current.sections.entries(kind)
    }

    /// Records the server-assigned draft id. Counts as a mutation.
    pub fn assign_draft_id(&mut self, id: DraftId) -> Arc<CvDocument> {
        if self.current.id.as_ref() == Some(&id) {
            return self.snapshot();
        }
        let mut doc = (*self.current).clone();
        doc.id = Some(id);
        doc.revision = doc.revision.next();
        self.current = Arc::new(doc);
        self.snapshot()
    }

    fn commit(
        &mut self,
        mutate: impl FnOnce(&mut CvDocument) -> Result<(), SectionError>,
    ) -> Result<Arc<CvDocument>, SectionError> {
        let mut doc = (*self.current).clone();
        mutate(&mut doc)?;
        doc.revision = doc.revision.next();
        self.current = Arc::new(doc);
        Ok(self.snapshot())
    }
}

fn log_rejection(operation: &str, error: &SectionError) {
    match error {
        SectionError::NotFound { .. } => warn!("Ignored {operation}: {error}"),
        _ => debug!("Rejected {operation}: {error}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::document::{PersonalInfo, TemplateRef};
    use crate::models::sections::{EntryFields, ExperienceEntry, SkillEntry};
    use serde_json::json;

    fn template(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_every_successful_mutation_bumps_revision_by_one() {
        let mut asm = DocumentAssembler::new();
        let start = asm.revision();

        let id = asm.add_entry(SectionKind::Experience, &Map::new()).unwrap();
        asm.update_entry(SectionKind::Experience, id, "company", json!("Acme"))
            .unwrap();
        asm.apply_patch(DocumentPatch {
            summary: Some("Engineer".to_string()),
            ..DocumentPatch::default()
        })
        .unwrap();
        asm.remove_entry(SectionKind::Experience, id).unwrap();

        assert_eq!(asm.revision(), Revision(start.0 + 4));
    }

    #[test]
    fn test_failed_mutation_leaves_document_and_revision_unchanged() {
        let mut asm = DocumentAssembler::new();
        let id = asm.add_entry(SectionKind::Skills, &Map::new()).unwrap();
        let before = asm.snapshot();

        assert!(asm
            .update_entry(SectionKind::Skills, id, "company", json!("Acme"))
            .is_err());
        assert!(asm
            .update_entry(SectionKind::Skills, EntryId(99), "name", json!("Go"))
            .is_err());
        assert!(asm.remove_entry(SectionKind::Awards, id).is_err());

        assert_eq!(asm.snapshot(), before);
    }

    #[test]
    fn test_previous_snapshots_are_not_mutated() {
        let mut asm = DocumentAssembler::new();
        let first = asm.snapshot();
        asm.apply_patch(DocumentPatch {
            personal_info: Some(PersonalInfo {
                full_name: "Jane Doe".to_string(),
                ..PersonalInfo::default()
            }),
            ..DocumentPatch::default()
        })
        .unwrap();
        assert_eq!(first.personal_info.full_name, "");
        assert_eq!(asm.snapshot().personal_info.full_name, "Jane Doe");
    }

    #[test]
    fn test_section_patch_replaces_only_named_kind() {
        let mut asm = DocumentAssembler::new();
        asm.add_entry(SectionKind::Experience, &template(json!({"company": "Acme"})))
            .unwrap();
        let doc = asm
            .apply_patch(DocumentPatch {
                sections: vec![SectionEntries::Skills(vec![SkillEntry {
                    name: "Rust".to_string(),
                    ..SkillEntry::default()
                }])],
                ..DocumentPatch::default()
            })
            .unwrap();
        assert_eq!(doc.sections.experience.len(), 1);
        assert_eq!(doc.sections.skills.len(), 1);
        assert!(doc.sections.skills[0].entry_id.is_assigned());
    }

    #[test]
    fn test_patched_ids_are_never_reallocated() {
        let mut asm = DocumentAssembler::new();
        asm.apply_patch(DocumentPatch {
            sections: vec![SectionEntries::Experience(vec![ExperienceEntry {
                entry_id: EntryId(50),
                ..ExperienceEntry::default()
            }])],
            ..DocumentPatch::default()
        })
        .unwrap();
        let id = asm.add_entry(SectionKind::Experience, &Map::new()).unwrap();
        assert!(id > EntryId(50));
    }

    #[test]
    fn test_patch_with_highest_entry_id_is_rejected() {
        let mut asm = DocumentAssembler::new();
        let before = asm.snapshot();
        let result = asm.apply_patch(DocumentPatch {
            sections: vec![SectionEntries::Experience(vec![ExperienceEntry {
                entry_id: EntryId(u64::MAX),
                ..ExperienceEntry::default()
            }])],
            ..DocumentPatch::default()
        });
        assert!(matches!(
            result,
            Err(SectionError::EntryIdOutOfRange { .. })
        ));
        assert_eq!(asm.snapshot(), before);

        let id = asm.add_entry(SectionKind::Skills, &Map::new()).unwrap();
        assert_eq!(id, EntryId(1));
    }

    #[test]
    fn test_template_can_be_set_and_cleared() {
        let mut asm = DocumentAssembler::new();
        let chosen = TemplateRef {
            id: "modern".to_string(),
            name: "Modern".to_string(),
            style: None,
            preview_image: None,
        };
        asm.apply_patch(DocumentPatch {
            template: Some(Some(chosen.clone())),
            ..DocumentPatch::default()
        })
        .unwrap();
        assert_eq!(asm.snapshot().template, Some(chosen));
        asm.apply_patch(DocumentPatch {
            template: Some(None),
            ..DocumentPatch::default()
        })
        .unwrap();
        assert_eq!(asm.snapshot().template, None);
    }

    #[test]
    fn test_resumed_document_continues_id_sequence() {
        let mut doc = CvDocument::default();
        doc.sections.skills.push(SkillEntry::blank(EntryId(7)));
        let mut asm = DocumentAssembler::from_document(doc);
        assert_eq!(
            asm.add_entry(SectionKind::Skills, &Map::new()).unwrap(),
            EntryId(8)
        );
    }
}
