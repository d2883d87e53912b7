use std::fmt;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

// ────────────────────────────────────────────────────────────────────────────
// Section kinds and entry identity
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    Experience,
    Education,
    Projects,
    Skills,
    Certifications,
    Languages,
    Awards,
}

impl SectionKind {
    /// Canonical render order.
    pub const ALL: [SectionKind; 7] = [
        SectionKind::Experience,
        SectionKind::Education,
        SectionKind::Projects,
        SectionKind::Skills,
        SectionKind::Certifications,
        SectionKind::Languages,
        SectionKind::Awards,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SectionKind::Experience => "experience",
            SectionKind::Education => "education",
            SectionKind::Projects => "projects",
            SectionKind::Skills => "skills",
            SectionKind::Certifications => "certifications",
            SectionKind::Languages => "languages",
            SectionKind::Awards => "awards",
        }
    }

    pub fn heading(&self) -> &'static str {
        match self {
            SectionKind::Experience => "Work Experience",
            SectionKind::Education => "Education",
            SectionKind::Projects => "Projects",
            SectionKind::Skills => "Skills",
            SectionKind::Certifications => "Certifications",
            SectionKind::Languages => "Languages",
            SectionKind::Awards => "Awards & Honors",
        }
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session-unique identity of a section entry. `0` marks an entry submitted
/// by a step view before the store assigned it an id.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EntryId(pub u64);

impl EntryId {
    pub const UNASSIGNED: EntryId = EntryId(0);
    /// Highest id; never accepted from outside, so allocation cannot wrap.
    pub const LAST: EntryId = EntryId(u64::MAX);

    pub fn is_assigned(&self) -> bool {
        *self != Self::UNASSIGNED
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FieldError {
    #[error("unknown field '{0}'")]
    Unknown(String),

    #[error("field '{0}' cannot be changed")]
    Immutable(String),

    #[error("invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Start/end span of a dated entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tenure<'a> {
    pub start: &'a str,
    pub end: Option<&'a str>,
    pub current: bool,
}

impl<'a> Tenure<'a> {
    /// The end date that should be honoured: `current` always wins over a stored value.
    pub fn effective_end(&self) -> Option<&'a str> {
        if self.current {
            return None;
        }
        self.end.filter(|e| !e.trim().is_empty())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Per-kind schema behaviour
// ────────────────────────────────────────────────────────────────────────────

/// Schema behaviour shared by every section entry type.
pub trait EntryFields: Clone + fmt::Debug + PartialEq + Serialize + DeserializeOwned {
    const KIND: SectionKind;

    fn blank(entry_id: EntryId) -> Self;

    fn entry_id(&self) -> EntryId;

    fn set_entry_id(&mut self, entry_id: EntryId);

    /// Serialized names of required fields that are currently empty.
    fn missing_required(&self) -> Vec<&'static str>;

    fn tenure(&self) -> Option<Tenure<'_>> {
        None
    }

    /// Returns a copy with `field` replaced by `value`. Fields outside the
    /// kind's schema and values of the wrong shape are rejected.
    fn with_field(&self, field: &str, value: Value) -> Result<Self, FieldError> {
        if field == "entryId" {
            return Err(FieldError::Immutable(field.to_string()));
        }
        let mut object = match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => {
                return Err(FieldError::InvalidValue {
                    field: field.to_string(),
                    reason: "entry does not serialize to an object".to_string(),
                })
            }
        };
        if !object.contains_key(field) {
            return Err(FieldError::Unknown(field.to_string()));
        }
        object.insert(field.to_string(), value);
        serde_json::from_value(Value::Object(object)).map_err(|e| FieldError::InvalidValue {
            field: field.to_string(),
            reason: e.to_string(),
        })
    }

    /// Applies every key of `fields` in order; the first rejection aborts.
    fn with_fields(&self, fields: &Map<String, Value>) -> Result<Self, FieldError> {
        let mut entry = self.clone();
        for (field, value) in fields {
            entry = entry.with_field(field, value.clone())?;
        }
        Ok(entry)
    }
}

fn missing(fields: &[(&'static str, bool)]) -> Vec<&'static str> {
    fields
        .iter()
        .filter(|(_, is_missing)| *is_missing)
        .map(|(name, _)| *name)
        .collect()
}

fn blank(s: &str) -> bool {
    s.trim().is_empty()
}

// ────────────────────────────────────────────────────────────────────────────
// Entry types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct ExperienceEntry {
    pub entry_id: EntryId,
    pub company: String,
    pub position: String,
    pub location: Option<String>,
    pub start_date: String,
    pub end_date: Option<String>,
    pub current: bool,
    pub description: Option<String>,
    pub achievements: Option<String>,
}

impl EntryFields for ExperienceEntry {
    const KIND: SectionKind = SectionKind::Experience;

    fn blank(entry_id: EntryId) -> Self {
        Self {
            entry_id,
            ..Self::default()
        }
    }

    fn entry_id(&self) -> EntryId {
        self.entry_id
    }

    fn set_entry_id(&mut self, entry_id: EntryId) {
        self.entry_id = entry_id;
    }

    fn missing_required(&self) -> Vec<&'static str> {
        missing(&[
            ("company", blank(&self.company)),
            ("position", blank(&self.position)),
            ("startDate", blank(&self.start_date)),
        ])
    }

    fn tenure(&self) -> Option<Tenure<'_>> {
        Some(Tenure {
            start: &self.start_date,
            end: self.end_date.as_deref(),
            current: self.current,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct EducationEntry {
    pub entry_id: EntryId,
    pub institution: String,
    pub degree: String,
    pub field_of_study: String,
    pub start_date: String,
    pub end_date: Option<String>,
    pub current: bool,
    pub gpa: Option<String>,
    pub description: Option<String>,
}

impl EntryFields for EducationEntry {
    const KIND: SectionKind = SectionKind::Education;

    fn blank(entry_id: EntryId) -> Self {
        Self {
            entry_id,
            ..Self::default()
        }
    }

    fn entry_id(&self) -> EntryId {
        self.entry_id
    }

    fn set_entry_id(&mut self, entry_id: EntryId) {
        self.entry_id = entry_id;
    }

    fn missing_required(&self) -> Vec<&'static str> {
        missing(&[
            ("institution", blank(&self.institution)),
            ("degree", blank(&self.degree)),
            ("fieldOfStudy", blank(&self.field_of_study)),
            ("startDate", blank(&self.start_date)),
        ])
    }

    fn tenure(&self) -> Option<Tenure<'_>> {
        Some(Tenure {
            start: &self.start_date,
            end: self.end_date.as_deref(),
            current: self.current,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct ProjectEntry {
    pub entry_id: EntryId,
    pub name: String,
    pub role: String,
    pub description: String,
    pub technologies: Vec<String>,
    pub url: Option<String>,
    pub github: Option<String>,
    pub start_date: String,
    pub end_date: Option<String>,
    pub current: bool,
    pub achievements: Option<String>,
}

impl EntryFields for ProjectEntry {
    const KIND: SectionKind = SectionKind::Projects;

    fn blank(entry_id: EntryId) -> Self {
        Self {
            entry_id,
            ..Self::default()
        }
    }

    fn entry_id(&self) -> EntryId {
        self.entry_id
    }

    fn set_entry_id(&mut self, entry_id: EntryId) {
        self.entry_id = entry_id;
    }

    fn missing_required(&self) -> Vec<&'static str> {
        missing(&[
            ("name", blank(&self.name)),
            ("role", blank(&self.role)),
            ("startDate", blank(&self.start_date)),
            ("description", blank(&self.description)),
        ])
    }

    fn tenure(&self) -> Option<Tenure<'_>> {
        Some(Tenure {
            start: &self.start_date,
            end: self.end_date.as_deref(),
            current: self.current,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillCategory {
    #[default]
    Technical,
    Soft,
    Languages,
    Tools,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct SkillEntry {
    pub entry_id: EntryId,
    pub name: String,
    pub category: SkillCategory,
    pub level: Option<String>,
}

impl EntryFields for SkillEntry {
    const KIND: SectionKind = SectionKind::Skills;

    fn blank(entry_id: EntryId) -> Self {
        Self {
            entry_id,
            level: Some("Intermediate".to_string()),
            ..Self::default()
        }
    }

    fn entry_id(&self) -> EntryId {
        self.entry_id
    }

    fn set_entry_id(&mut self, entry_id: EntryId) {
        self.entry_id = entry_id;
    }

    fn missing_required(&self) -> Vec<&'static str> {
        missing(&[("name", blank(&self.name))])
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct CertificationEntry {
    pub entry_id: EntryId,
    pub name: String,
    pub issuer: String,
    pub issue_date: String,
    pub expiry_date: Option<String>,
    pub credential_id: Option<String>,
    pub credential_url: Option<String>,
    pub description: Option<String>,
    pub skills: Vec<String>,
}

impl EntryFields for CertificationEntry {
    const KIND: SectionKind = SectionKind::Certifications;

    fn blank(entry_id: EntryId) -> Self {
        Self {
            entry_id,
            ..Self::default()
        }
    }

    fn entry_id(&self) -> EntryId {
        self.entry_id
    }

    fn set_entry_id(&mut self, entry_id: EntryId) {
        self.entry_id = entry_id;
    }

    fn missing_required(&self) -> Vec<&'static str> {
        missing(&[
            ("name", blank(&self.name)),
            ("issuer", blank(&self.issuer)),
            ("issueDate", blank(&self.issue_date)),
        ])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LanguageProficiency {
    Native,
    Fluent,
    Advanced,
    Intermediate,
    Basic,
}

impl LanguageProficiency {
    pub fn label(&self) -> &'static str {
        match self {
            LanguageProficiency::Native => "Native",
            LanguageProficiency::Fluent => "Fluent",
            LanguageProficiency::Advanced => "Advanced",
            LanguageProficiency::Intermediate => "Intermediate",
            LanguageProficiency::Basic => "Basic",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct LanguageEntry {
    pub entry_id: EntryId,
    pub name: String,
    pub proficiency: Option<LanguageProficiency>,
    pub is_native: bool,
    pub certification: Option<String>,
    pub certification_level: Option<String>,
    pub years_of_experience: u32,
}

impl EntryFields for LanguageEntry {
    const KIND: SectionKind = SectionKind::Languages;

    fn blank(entry_id: EntryId) -> Self {
        Self {
            entry_id,
            proficiency: Some(LanguageProficiency::Basic),
            ..Self::default()
        }
    }

    fn entry_id(&self) -> EntryId {
        self.entry_id
    }

    fn set_entry_id(&mut self, entry_id: EntryId) {
        self.entry_id = entry_id;
    }

    fn missing_required(&self) -> Vec<&'static str> {
        missing(&[
            ("name", blank(&self.name)),
            ("proficiency", self.proficiency.is_none()),
        ])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AwardType {
    Academic,
    Professional,
    Leadership,
    Innovation,
    Community,
    Sports,
    Arts,
    Other,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct AwardEntry {
    pub entry_id: EntryId,
    pub title: String,
    pub issuer: String,
    pub date: String,
    pub award_type: Option<AwardType>,
    pub description: Option<String>,
    pub significance: Option<String>,
    pub url: Option<String>,
}

impl EntryFields for AwardEntry {
    const KIND: SectionKind = SectionKind::Awards;

    fn blank(entry_id: EntryId) -> Self {
        Self {
            entry_id,
            award_type: Some(AwardType::Academic),
            ..Self::default()
        }
    }

    fn entry_id(&self) -> EntryId {
        self.entry_id
    }

    fn set_entry_id(&mut self, entry_id: EntryId) {
        self.entry_id = entry_id;
    }

    fn missing_required(&self) -> Vec<&'static str> {
        missing(&[
            ("title", blank(&self.title)),
            ("issuer", blank(&self.issuer)),
            ("date", blank(&self.date)),
            ("awardType", self.award_type.is_none()),
        ])
    }
}

// ────────────────────────────────────────────────────────────────────────────
// The seven-section aggregate
// ────────────────────────────────────────────────────────────────────────────

/// All seven sections. Every kind is a field, so no kind can ever be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Sections {
    pub experience: Vec<ExperienceEntry>,
    pub education: Vec<EducationEntry>,
    pub projects: Vec<ProjectEntry>,
    pub skills: Vec<SkillEntry>,
    pub certifications: Vec<CertificationEntry>,
    pub languages: Vec<LanguageEntry>,
    pub awards: Vec<AwardEntry>,
}

impl Sections {
    pub fn len(&self, kind: SectionKind) -> usize {
        match kind {
            SectionKind::Experience => self.experience.len(),
            SectionKind::Education => self.education.len(),
            SectionKind::Projects => self.projects.len(),
            SectionKind::Skills => self.skills.len(),
            SectionKind::Certifications => self.certifications.len(),
            SectionKind::Languages => self.languages.len(),
            SectionKind::Awards => self.awards.len(),
        }
    }

    pub fn entries(&self, kind: SectionKind) -> SectionEntries {
        match kind {
            SectionKind::Experience => SectionEntries::Experience(self.experience.clone()),
            SectionKind::Education => SectionEntries::Education(self.education.clone()),
            SectionKind::Projects => SectionEntries::Projects(self.projects.clone()),
            SectionKind::Skills => SectionEntries::Skills(self.skills.clone()),
            SectionKind::Certifications => {
                SectionEntries::Certifications(self.certifications.clone())
            }
            SectionKind::Languages => SectionEntries::Languages(self.languages.clone()),
            SectionKind::Awards => SectionEntries::Awards(self.awards.clone()),
        }
    }

    /// Replaces one kind's sequence wholesale.
    pub fn replace(&mut self, entries: SectionEntries) {
        match entries {
            SectionEntries::Experience(v) => self.experience = v,
            SectionEntries::Education(v) => self.education = v,
            SectionEntries::Projects(v) => self.projects = v,
            SectionEntries::Skills(v) => self.skills = v,
            SectionEntries::Certifications(v) => self.certifications = v,
            SectionEntries::Languages(v) => self.languages = v,
            SectionEntries::Awards(v) => self.awards = v,
        }
    }

    pub fn entry_ids(&self, kind: SectionKind) -> Vec<EntryId> {
        fn ids<T: EntryFields>(entries: &[T]) -> Vec<EntryId> {
            entries.iter().map(EntryFields::entry_id).collect()
        }
        match kind {
            SectionKind::Experience => ids(&self.experience),
            SectionKind::Education => ids(&self.education),
            SectionKind::Projects => ids(&self.projects),
            SectionKind::Skills => ids(&self.skills),
            SectionKind::Certifications => ids(&self.certifications),
            SectionKind::Languages => ids(&self.languages),
            SectionKind::Awards => ids(&self.awards),
        }
    }

    /// Highest id held by any entry, across all kinds.
    pub fn max_entry_id(&self) -> EntryId {
        SectionKind::ALL
            .iter()
            .flat_map(|kind| self.entry_ids(*kind))
            .max()
            .unwrap_or_default()
    }
}

/// One kind's ordered entries, typed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SectionEntries {
    Experience(Vec<ExperienceEntry>),
    Education(Vec<EducationEntry>),
    Projects(Vec<ProjectEntry>),
    Skills(Vec<SkillEntry>),
    Certifications(Vec<CertificationEntry>),
    Languages(Vec<LanguageEntry>),
    Awards(Vec<AwardEntry>),
}

impl SectionEntries {
    /// Decodes a step view's submission for `kind` against that kind's schema.
    pub fn from_values(kind: SectionKind, values: Vec<Value>) -> Result<Self, FieldError> {
        fn decode<T: EntryFields>(values: Vec<Value>) -> Result<Vec<T>, FieldError> {
            values
                .into_iter()
                .enumerate()
                .map(|(index, value)| {
                    serde_json::from_value(value).map_err(|e| FieldError::InvalidValue {
                        field: format!("{}[{index}]", T::KIND),
                        reason: e.to_string(),
                    })
                })
                .collect()
        }
        Ok(match kind {
            SectionKind::Experience => SectionEntries::Experience(decode(values)?),
            SectionKind::Education => SectionEntries::Education(decode(values)?),
            SectionKind::Projects => SectionEntries::Projects(decode(values)?),
            SectionKind::Skills => SectionEntries::Skills(decode(values)?),
            SectionKind::Certifications => SectionEntries::Certifications(decode(values)?),
            SectionKind::Languages => SectionEntries::Languages(decode(values)?),
            SectionKind::Awards => SectionEntries::Awards(decode(values)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_with_field_sets_known_field() {
        let entry = ExperienceEntry::blank(EntryId(1))
            .with_field("company", json!("Acme"))
            .unwrap();
        assert_eq!(entry.company, "Acme");
        assert_eq!(entry.entry_id, EntryId(1));
    }

    #[test]
    fn test_with_field_rejects_unknown_field() {
        let err = ExperienceEntry::blank(EntryId(1))
            .with_field("salary", json!("1M"))
            .unwrap_err();
        assert_eq!(err, FieldError::Unknown("salary".to_string()));
    }

    #[test]
    fn test_with_field_rejects_entry_id() {
        let err = SkillEntry::blank(EntryId(4))
            .with_field("entryId", json!(9))
            .unwrap_err();
        assert!(matches!(err, FieldError::Immutable(_)));
    }

    #[test]
    fn test_with_field_rejects_wrong_type() {
        let err = ExperienceEntry::blank(EntryId(1))
            .with_field("current", json!("yes"))
            .unwrap_err();
        assert!(matches!(err, FieldError::InvalidValue { .. }));
    }

    #[test]
    fn test_current_overrides_end_date() {
        let entry = ExperienceEntry {
            end_date: Some("2020-01".to_string()),
            current: true,
            ..ExperienceEntry::blank(EntryId(1))
        };
        assert_eq!(entry.tenure().unwrap().effective_end(), None);
    }

    #[test]
    fn test_missing_required_reports_serialized_names() {
        let entry = EducationEntry {
            institution: "MIT".to_string(),
            ..EducationEntry::blank(EntryId(2))
        };
        assert_eq!(
            entry.missing_required(),
            vec!["degree", "fieldOfStudy", "startDate"]
        );
    }

    #[test]
    fn test_from_values_rejects_foreign_keys() {
        let result = SectionEntries::from_values(
            SectionKind::Skills,
            vec![json!({"entryId": 1, "name": "Rust", "company": "Acme"})],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_sections_serialize_all_seven_keys() {
        let value = serde_json::to_value(Sections::default()).unwrap();
        let keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys.len(), 7);
        for kind in SectionKind::ALL {
            assert!(keys.contains(&kind.as_str().to_string()));
        }
    }
}
