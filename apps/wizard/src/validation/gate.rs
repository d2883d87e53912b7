use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::document::{CvDocument, SUMMARY_MAX_CHARS};
use crate::models::sections::{EntryFields, SectionKind, Sections};
use crate::wizard::steps::WizardStep;

/// Outcome of gating one step. `errors` is keyed by document field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: BTreeMap<String, String>,
}

impl ValidationReport {
    fn from_errors(errors: BTreeMap<String, String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

const REQUIRED: &str = "This field is required";

/// Validates `document` for the rules of `step`. Pure: same input, same report.
///
/// Rules:
/// - Personal Info: non-empty `fullName`, syntactically valid `email`
/// - Summary: non-empty, at most `SUMMARY_MAX_CHARS` characters
/// - Experience / Education / Projects: at least one entry
/// - Every section step: each present entry has its kind's required fields,
///   and a non-current end date is not before the start date
/// - Template: a template is chosen
pub fn validate(document: &CvDocument, step: WizardStep) -> ValidationReport {
    let mut errors = BTreeMap::new();
    check_step(document, step, &mut errors);
    ValidationReport::from_errors(errors)
}

/// Validates every step at once; used before handing the document to export.
pub fn validate_all(document: &CvDocument) -> ValidationReport {
    let mut errors = BTreeMap::new();
    for step in WizardStep::ALL {
        check_step(document, step, &mut errors);
    }
    ValidationReport::from_errors(errors)
}

fn check_step(document: &CvDocument, step: WizardStep, errors: &mut BTreeMap<String, String>) {
    match step {
        WizardStep::PersonalInfo => check_personal_info(document, errors),
        WizardStep::Summary => check_summary(&document.summary, errors),
        WizardStep::Template => {
            if document.template.is_none() {
                errors.insert("template".to_string(), "Please choose a template".to_string());
            }
        }
        _ => {
            if let Some(kind) = step.section() {
                check_section(&document.sections, kind, errors);
            }
        }
    }
}

fn check_personal_info(document: &CvDocument, errors: &mut BTreeMap<String, String>) {
    let info = &document.personal_info;
    if info.full_name.trim().is_empty() {
        errors.insert("fullName".to_string(), "Full name is required".to_string());
    }
    if info.email.trim().is_empty() {
        errors.insert("email".to_string(), "Email is required".to_string());
    } else if !is_valid_email(&info.email) {
        errors.insert(
            "email".to_string(),
            "Please enter a valid email address".to_string(),
        );
    }
}

fn check_summary(summary: &str, errors: &mut BTreeMap<String, String>) {
    if summary.trim().is_empty() {
        errors.insert(
            "summary".to_string(),
            "Professional summary is required".to_string(),
        );
    } else if summary.chars().count() > SUMMARY_MAX_CHARS {
        errors.insert(
            "summary".to_string(),
            format!("Summary must be at most {SUMMARY_MAX_CHARS} characters"),
        );
    }
}

fn check_section(sections: &Sections, kind: SectionKind, errors: &mut BTreeMap<String, String>) {
    let at_least_one = match kind {
        SectionKind::Experience => Some("At least one work experience is required"),
        SectionKind::Education => Some("At least one education entry is required"),
        SectionKind::Projects => Some("At least one project is required"),
        _ => None,
    };
    if let Some(message) = at_least_one {
        if sections.len(kind) == 0 {
            errors.insert(kind.as_str().to_string(), message.to_string());
        }
    }

    match kind {
        SectionKind::Experience => check_entries(&sections.experience, errors),
        SectionKind::Education => check_entries(&sections.education, errors),
        SectionKind::Projects => check_entries(&sections.projects, errors),
        SectionKind::Skills => check_entries(&sections.skills, errors),
        SectionKind::Certifications => check_entries(&sections.certifications, errors),
        SectionKind::Languages => check_entries(&sections.languages, errors),
        SectionKind::Awards => check_entries(&sections.awards, errors),
    }
}

fn check_entries<T: EntryFields>(entries: &[T], errors: &mut BTreeMap<String, String>) {
    for entry in entries {
        let prefix = format!("{}.{}", T::KIND, entry.entry_id());
        for field in entry.missing_required() {
            errors.insert(format!("{prefix}.{field}"), REQUIRED.to_string());
        }
        if let Some(tenure) = entry.tenure() {
            if let Some(end) = tenure.effective_end() {
                if !tenure.start.trim().is_empty() && end < tenure.start {
                    errors.insert(
                        format!("{prefix}.endDate"),
                        "End date cannot be before start date".to_string(),
                    );
                }
            }
        }
    }
}

/// Minimal syntax check: one `@`, non-empty local part, and a domain made of
/// non-empty dot-separated labels. No whitespace anywhere.
pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && domain.split('.').all(|label| !label.is_empty())
        }
        None => false,
    }
}
