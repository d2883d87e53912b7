use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::models::sections::{SectionEntries, Sections};

/// Maximum summary length, in characters.
pub const SUMMARY_MAX_CHARS: usize = 500;

/// Local, strictly increasing version counter of the document.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Revision(pub u64);

impl Revision {
    pub fn next(self) -> Self {
        Revision(self.0 + 1)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Server-assigned draft identifier. Opaque to the client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DraftId(pub String);

impl fmt::Display for DraftId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct PersonalInfo {
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub title: Option<String>,
    pub linkedin: Option<String>,
    pub website: Option<String>,
}

impl PersonalInfo {
    /// Merges only the fields present in `patch`.
    pub fn merged(&self, patch: PersonalInfoPatch) -> Self {
        Self {
            full_name: patch.full_name.unwrap_or_else(|| self.full_name.clone()),
            email: patch.email.unwrap_or_else(|| self.email.clone()),
            phone: patch.phone.unwrap_or_else(|| self.phone.clone()),
            location: patch.location.unwrap_or_else(|| self.location.clone()),
            title: patch.title.unwrap_or_else(|| self.title.clone()),
            linkedin: patch.linkedin.unwrap_or_else(|| self.linkedin.clone()),
            website: patch.website.unwrap_or_else(|| self.website.clone()),
        }
    }
}

/// Field-level personal info update. For optional fields, an explicit
/// `null` clears the value and an absent key leaves it alone.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PersonalInfoPatch {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub phone: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub location: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub title: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub linkedin: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub website: Option<Option<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateRef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub preview_image: Option<String>,
}

/// The canonical CV aggregate. Snapshots are immutable once published.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CvDocument {
    #[serde(default)]
    pub id: Option<DraftId>,
    #[serde(default)]
    pub personal_info: PersonalInfo,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub sections: Sections,
    #[serde(default)]
    pub template: Option<TemplateRef>,
    #[serde(default)]
    pub revision: Revision,
}

impl CvDocument {
    /// True while the user has not filled in anything at all.
    pub fn is_untouched(&self) -> bool {
        self.personal_info == PersonalInfo::default()
            && self.summary.is_empty()
            && self.sections == Sections::default()
            && self.template.is_none()
    }
}

/// Top-level shallow patch. Each present key replaces the document's value
/// for that key; section kinds are replaced one whole sequence at a time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentPatch {
    pub personal_info: Option<PersonalInfo>,
    pub summary: Option<String>,
    pub sections: Vec<SectionEntries>,
    pub template: Option<Option<TemplateRef>>,
}

/// Distinguishes an explicit `null` from an absent key.
pub fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
