//! Preview Projector: read-only projection of the document for live preview.
//!
//! `project` is pure and total: blank optional fields are dropped, empty
//! sections produce no block at all, and `current = true` always renders the
//! end marker as "Present".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::document::{CvDocument, Revision};
use crate::models::sections::{
    AwardEntry, CertificationEntry, EducationEntry, EntryFields, EntryId, ExperienceEntry,
    LanguageEntry, ProjectEntry, SectionKind, SkillEntry, Tenure,
};

pub const PRESENT: &str = "Present";
pub const DEFAULT_TEMPLATE_NAME: &str = "Default";

/// Server-computed fields merged into the preview.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewOverlay {
    #[serde(default, alias = "completion_percentage")]
    pub completion_percentage: Option<u8>,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default, alias = "last_saved")]
    pub last_saved: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewModel {
    pub revision: Revision,
    pub header: PreviewHeader,
    pub summary: Option<String>,
    pub sections: Vec<PreviewSection>,
    pub template_name: String,
    pub completion_percentage: Option<u8>,
    pub last_saved: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewHeader {
    pub full_name: Option<String>,
    pub title: Option<String>,
    pub contact: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewSection {
    pub kind: SectionKind,
    pub heading: String,
    pub items: Vec<PreviewItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewItem {
    pub entry_id: EntryId,
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub dates: Option<String>,
    pub details: Vec<String>,
}

pub fn project(document: &CvDocument, overlay: Option<&PreviewOverlay>) -> PreviewModel {
    let info = &document.personal_info;
    let contact = [
        Some(info.email.as_str()),
        info.phone.as_deref(),
        info.location.as_deref(),
        info.linkedin.as_deref(),
        info.website.as_deref(),
    ]
    .into_iter()
    .filter_map(text)
    .collect();

    let sections = SectionKind::ALL
        .iter()
        .filter_map(|kind| project_section(document, *kind))
        .collect();

    let template_name = document
        .template
        .as_ref()
        .and_then(|t| text(Some(t.name.as_str())))
        .or_else(|| overlay.and_then(|o| text(o.template.as_deref())))
        .unwrap_or_else(|| DEFAULT_TEMPLATE_NAME.to_string());

    PreviewModel {
        revision: document.revision,
        header: PreviewHeader {
            full_name: text(Some(info.full_name.as_str())),
            title: text(info.title.as_deref()),
            contact,
        },
        summary: text(Some(document.summary.as_str())),
        sections,
        template_name,
        completion_percentage: overlay.and_then(|o| o.completion_percentage),
        last_saved: overlay.and_then(|o| o.last_saved),
    }
}

fn project_section(document: &CvDocument, kind: SectionKind) -> Option<PreviewSection> {
    let s = &document.sections;
    let items: Vec<PreviewItem> = match kind {
        SectionKind::Experience => s.experience.iter().map(experience_item).collect(),
        SectionKind::Education => s.education.iter().map(education_item).collect(),
        SectionKind::Projects => s.projects.iter().map(project_item).collect(),
        SectionKind::Skills => s.skills.iter().map(skill_item).collect(),
        SectionKind::Certifications => s.certifications.iter().map(certification_item).collect(),
        SectionKind::Languages => s.languages.iter().map(language_item).collect(),
        SectionKind::Awards => s.awards.iter().map(award_item).collect(),
    };
    if items.is_empty() {
        return None;
    }
    Some(PreviewSection {
        kind,
        heading: kind.heading().to_string(),
        items,
    })
}

fn experience_item(e: &ExperienceEntry) -> PreviewItem {
    PreviewItem {
        entry_id: e.entry_id,
        title: text(Some(e.position.as_str())),
        subtitle: joined(&[Some(e.company.as_str()), e.location.as_deref()], ", "),
        dates: e.tenure().and_then(date_range),
        details: details(&[e.description.as_deref(), e.achievements.as_deref()]),
    }
}

fn education_item(e: &EducationEntry) -> PreviewItem {
    let degree = joined(&[Some(e.degree.as_str()), Some(e.field_of_study.as_str())], " in ");
    let gpa = text(e.gpa.as_deref()).map(|g| format!("GPA: {g}"));
    PreviewItem {
        entry_id: e.entry_id,
        title: degree,
        subtitle: text(Some(e.institution.as_str())),
        dates: e.tenure().and_then(date_range),
        details: details(&[gpa.as_deref(), e.description.as_deref()]),
    }
}

fn project_item(p: &ProjectEntry) -> PreviewItem {
    let technologies = (!p.technologies.is_empty()).then(|| p.technologies.join(", "));
    PreviewItem {
        entry_id: p.entry_id,
        title: text(Some(p.name.as_str())),
        subtitle: joined(&[Some(p.role.as_str()), p.url.as_deref(), p.github.as_deref()], " · "),
        dates: p.tenure().and_then(date_range),
        details: details(&[
            Some(p.description.as_str()),
            technologies.as_deref(),
            p.achievements.as_deref(),
        ]),
    }
}

fn skill_item(s: &SkillEntry) -> PreviewItem {
    PreviewItem {
        entry_id: s.entry_id,
        title: text(Some(s.name.as_str())),
        subtitle: text(s.level.as_deref()),
        dates: None,
        details: Vec::new(),
    }
}

fn certification_item(c: &CertificationEntry) -> PreviewItem {
    let expiry = text(c.expiry_date.as_deref()).map(|d| format!("Expires {d}"));
    let credential = text(c.credential_id.as_deref()).map(|id| format!("Credential ID: {id}"));
    PreviewItem {
        entry_id: c.entry_id,
        title: text(Some(c.name.as_str())),
        subtitle: text(Some(c.issuer.as_str())),
        dates: text(Some(c.issue_date.as_str())),
        details: details(&[
            expiry.as_deref(),
            credential.as_deref(),
            c.credential_url.as_deref(),
            c.description.as_deref(),
        ]),
    }
}

fn language_item(l: &LanguageEntry) -> PreviewItem {
    let proficiency = if l.is_native {
        Some("Native".to_string())
    } else {
        l.proficiency.map(|p| p.label().to_string())
    };
    let certification = joined(
        &[l.certification.as_deref(), l.certification_level.as_deref()],
        " ",
    );
    PreviewItem {
        entry_id: l.entry_id,
        title: text(Some(l.name.as_str())),
        subtitle: proficiency,
        dates: None,
        details: details(&[certification.as_deref()]),
    }
}

fn award_item(a: &AwardEntry) -> PreviewItem {
    PreviewItem {
        entry_id: a.entry_id,
        title: text(Some(a.title.as_str())),
        subtitle: text(Some(a.issuer.as_str())),
        dates: text(Some(a.date.as_str())),
        details: details(&[
            a.description.as_deref(),
            a.significance.as_deref(),
            a.url.as_deref(),
        ]),
    }
}

/// "start - end", with "Present" for current entries. Missing halves are dropped.
pub fn date_range(tenure: Tenure<'_>) -> Option<String> {
    let start = text(Some(tenure.start));
    let end = if tenure.current {
        Some(PRESENT.to_string())
    } else {
        text(tenure.effective_end())
    };
    match (start, end) {
        (Some(s), Some(e)) => Some(format!("{s} - {e}")),
        (Some(s), None) => Some(s),
        (None, Some(e)) => Some(e),
        (None, None) => None,
    }
}

fn text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

fn joined(parts: &[Option<&str>], separator: &str) -> Option<String> {
    let present: Vec<String> = parts.iter().filter_map(|p| text(*p)).collect();
    (!present.is_empty()).then(|| present.join(separator))
}

fn details(parts: &[Option<&str>]) -> Vec<String> {
    parts.iter().filter_map(|p| text(*p)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::document::{PersonalInfo, TemplateRef};

    fn one_experience(current: bool) -> CvDocument {
        let mut doc = CvDocument::default();
        doc.sections.experience.push(ExperienceEntry {
            company: "Acme".to_string(),
            position: "Engineer".to_string(),
            start_date: "2021-03".to_string(),
            end_date: Some("2022-08".to_string()),
            current,
            ..ExperienceEntry::blank(EntryId(1))
        });
        doc
    }

    #[test]
    fn test_single_experience_projects_single_block() {
        let preview = project(&one_experience(false), None);
        assert_eq!(preview.sections.len(), 1);
        assert_eq!(preview.sections[0].kind, SectionKind::Experience);
        assert_eq!(preview.sections[0].heading, "Work Experience");
        assert_eq!(preview.sections[0].items.len(), 1);
        assert_eq!(
            preview.sections[0].items[0].dates.as_deref(),
            Some("2021-03 - 2022-08")
        );
    }

    #[test]
    fn test_current_entry_shows_present_not_stored_end() {
        let preview = project(&one_experience(true), None);
        let dates = preview.sections[0].items[0].dates.clone().unwrap();
        assert_eq!(dates, "2021-03 - Present");
        assert!(!dates.contains("2022-08"));
    }

    #[test]
    fn test_empty_document_projects_without_sections() {
        let preview = project(&CvDocument::default(), None);
        assert!(preview.sections.is_empty());
        assert_eq!(preview.summary, None);
        assert_eq!(preview.header.full_name, None);
        assert!(preview.header.contact.is_empty());
        assert_eq!(preview.template_name, DEFAULT_TEMPLATE_NAME);
    }

    #[test]
    fn test_blank_optional_fields_are_absent() {
        let mut doc = CvDocument::default();
        doc.personal_info = PersonalInfo {
            full_name: "Jane Doe".to_string(),
            email: "jane@example.com".to_string(),
            phone: Some("   ".to_string()),
            ..PersonalInfo::default()
        };
        doc.sections.skills.push(SkillEntry {
            level: Some(String::new()),
            ..SkillEntry::blank(EntryId(3))
        });
        let preview = project(&doc, None);
        assert_eq!(preview.header.contact, vec!["jane@example.com".to_string()]);
        let skill = &preview.sections[0].items[0];
        assert_eq!(skill.title, None);
        assert_eq!(skill.subtitle, None);
    }

    #[test]
    fn test_overlay_fields_are_merged() {
        let overlay = PreviewOverlay {
            completion_percentage: Some(60),
            template: Some("Executive".to_string()),
            last_saved: None,
        };
        let preview = project(&CvDocument::default(), Some(&overlay));
        assert_eq!(preview.completion_percentage, Some(60));
        assert_eq!(preview.template_name, "Executive");
    }

    #[test]
    fn test_local_template_wins_over_overlay() {
        let mut doc = CvDocument::default();
        doc.template = Some(TemplateRef {
            id: "m".to_string(),
            name: "Modern".to_string(),
            style: None,
            preview_image: None,
        });
        let overlay = PreviewOverlay {
            template: Some("Executive".to_string()),
            ..PreviewOverlay::default()
        };
        assert_eq!(project(&doc, Some(&overlay)).template_name, "Modern");
    }

    #[test]
    fn test_projection_preserves_entry_order() {
        let mut doc = CvDocument::default();
        for (id, name) in [(5, "Rust"), (2, "Go"), (9, "SQL")] {
            doc.sections.skills.push(SkillEntry {
                name: name.to_string(),
                ..SkillEntry::blank(EntryId(id))
            });
        }
        let preview = project(&doc, None);
        let ids: Vec<_> = preview.sections[0].items.iter().map(|i| i.entry_id).collect();
        assert_eq!(ids, vec![EntryId(5), EntryId(2), EntryId(9)]);
    }

    #[test]
    fn test_date_range_halves() {
        let only_start = Tenure {
            start: "2020",
            end: None,
            current: false,
        };
        assert_eq!(date_range(only_start).as_deref(), Some("2020"));
        let nothing = Tenure {
            start: "",
            end: Some(""),
            current: false,
        };
        assert_eq!(date_range(nothing), None);
    }
}
