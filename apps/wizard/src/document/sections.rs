//! Section Store: per-entry CRUD over the seven section sequences.
//!
//! Entries are addressed only by `EntryId`, never by position. All functions
//! here are total: on error the sequences are left exactly as they were.

use std::collections::HashSet;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::sections::{EntryFields, EntryId, FieldError, SectionEntries, SectionKind, Sections};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SectionError {
    #[error("{kind} entry {entry_id} not found")]
    NotFound { kind: SectionKind, entry_id: EntryId },

    #[error("entry id {entry_id} appears more than once in {kind}")]
    DuplicateEntryId { kind: SectionKind, entry_id: EntryId },

    #[error("entry id {entry_id} in {kind} leaves no room for new entries")]
    EntryIdOutOfRange { kind: SectionKind, entry_id: EntryId },

    #[error(transparent)]
    Field(#[from] FieldError),
}

/// Monotonic id source for one wizard session. Ids are never handed out twice,
/// including ids that arrived from outside (patches, fetched drafts).
#[derive(Debug, Clone, Default)]
pub struct EntryIdAllocator {
    last: u64,
}

impl EntryIdAllocator {
    pub fn starting_after(id: EntryId) -> Self {
        Self { last: id.0 }
    }

    pub fn allocate(&mut self, kind: SectionKind) -> Result<EntryId, SectionError> {
        let next = self
            .last
            .checked_add(1)
            .ok_or(SectionError::EntryIdOutOfRange {
                kind,
                entry_id: EntryId(self.last),
            })?;
        self.last = next;
        Ok(EntryId(next))
    }

    /// Records an externally supplied id so it is never allocated again.
    pub fn observe(&mut self, id: EntryId) {
        self.last = self.last.max(id.0);
    }
}

pub fn add_entry(
    sections: &mut Sections,
    kind: SectionKind,
    entry_id: EntryId,
    template: &Map<String, Value>,
) -> Result<(), SectionError> {
    match kind {
        SectionKind::Experience => add(&mut sections.experience, entry_id, template),
        SectionKind::Education => add(&mut sections.education, entry_id, template),
        SectionKind::Projects => add(&mut sections.projects, entry_id, template),
        SectionKind::Skills => add(&mut sections.skills, entry_id, template),
        SectionKind::Certifications => add(&mut sections.certifications, entry_id, template),
        SectionKind::Languages => add(&mut sections.languages, entry_id, template),
        SectionKind::Awards => add(&mut sections.awards, entry_id, template),
    }
}

pub fn update_entry(
    sections: &mut Sections,
    kind: SectionKind,
    entry_id: EntryId,
    field: &str,
    value: Value,
) -> Result<(), SectionError> {
    match kind {
        SectionKind::Experience => update(&mut sections.experience, entry_id, field, value),
        SectionKind::Education => update(&mut sections.education, entry_id, field, value),
        SectionKind::Projects => update(&mut sections.projects, entry_id, field, value),
        SectionKind::Skills => update(&mut sections.skills, entry_id, field, value),
        SectionKind::Certifications => {
            update(&mut sections.certifications, entry_id, field, value)
        }
        SectionKind::Languages => update(&mut sections.languages, entry_id, field, value),
        SectionKind::Awards => update(&mut sections.awards, entry_id, field, value),
    }
}

pub fn remove_entry(
    sections: &mut Sections,
    kind: SectionKind,
    entry_id: EntryId,
) -> Result<(), SectionError> {
    match kind {
        SectionKind::Experience => remove(&mut sections.experience, entry_id),
        SectionKind::Education => remove(&mut sections.education, entry_id),
        SectionKind::Projects => remove(&mut sections.projects, entry_id),
        SectionKind::Skills => remove(&mut sections.skills, entry_id),
        SectionKind::Certifications => remove(&mut sections.certifications, entry_id),
        SectionKind::Languages => remove(&mut sections.languages, entry_id),
        SectionKind::Awards => remove(&mut sections.awards, entry_id),
    }
}

/// Prepares a wholesale replacement sequence: assigns ids to entries that
/// arrived without one, rejects duplicate ids and ids at the top of the range.
/// `ids` is only advanced when the whole sequence is accepted.
pub fn normalize_entries(
    entries: SectionEntries,
    ids: &mut EntryIdAllocator,
) -> Result<SectionEntries, SectionError> {
    Ok(match entries {
        SectionEntries::Experience(v) => SectionEntries::Experience(normalize(v, ids)?),
        SectionEntries::Education(v) => SectionEntries::Education(normalize(v, ids)?),
        SectionEntries::Projects(v) => SectionEntries::Projects(normalize(v, ids)?),
        SectionEntries::Skills(v) => SectionEntries::Skills(normalize(v, ids)?),
        SectionEntries::Certifications(v) => SectionEntries::Certifications(normalize(v, ids)?),
        SectionEntries::Languages(v) => SectionEntries::Languages(normalize(v, ids)?),
        SectionEntries::Awards(v) => SectionEntries::Awards(normalize(v, ids)?),
    })
}

fn add<T: EntryFields>(
    entries: &mut Vec<T>,
    entry_id: EntryId,
    template: &Map<String, Value>,
) -> Result<(), SectionError> {
    let entry = T::blank(entry_id).with_fields(template)?;
    entries.push(entry);
    Ok(())
}

fn update<T: EntryFields>(
    entries: &mut [T],
    entry_id: EntryId,
    field: &str,
    value: Value,
) -> Result<(), SectionError> {
    let slot = entries
        .iter_mut()
        .find(|e| e.entry_id() == entry_id)
        .ok_or(SectionError::NotFound {
            kind: T::KIND,
            entry_id,
        })?;
    *slot = slot.with_field(field, value)?;
    Ok(())
}

fn remove<T: EntryFields>(entries: &mut Vec<T>, entry_id: EntryId) -> Result<(), SectionError> {
    let position = entries
        .iter()
        .position(|e| e.entry_id() == entry_id)
        .ok_or(SectionError::NotFound {
            kind: T::KIND,
            entry_id,
        })?;
    entries.remove(position);
    Ok(())
}

fn normalize<T: EntryFields>(
    mut entries: Vec<T>,
    ids: &mut EntryIdAllocator,
) -> Result<Vec<T>, SectionError> {
    let mut next = ids.clone();
    let mut seen = HashSet::new();
    for entry in entries.iter().filter(|e| e.entry_id().is_assigned()) {
        let entry_id = entry.entry_id();
        if entry_id == EntryId::LAST {
            return Err(SectionError::EntryIdOutOfRange {
                kind: T::KIND,
                entry_id,
            });
        }
        if !seen.insert(entry_id) {
            return Err(SectionError::DuplicateEntryId {
                kind: T::KIND,
                entry_id,
            });
        }
        next.observe(entry_id);
    }
    for entry in entries.iter_mut().filter(|e| !e.entry_id().is_assigned()) {
        entry.set_entry_id(next.allocate(T::KIND)?);
    }
    *ids = next;
    Ok(entries)
}
