use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::debug;

use crate::draft_client::{PersistenceError, ValidationDelegate};
use crate::models::document::DraftId;
use crate::validation::gate::ValidationReport;
use crate::wizard::steps::WizardStep;

/// Body of the draft service's `validate_data` endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteValidation {
    #[serde(alias = "is_valid")]
    pub is_valid: bool,
    #[serde(default)]
    pub errors: RemoteErrors,
}

/// The service answers either with a field-keyed object or a flat message list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RemoteErrors {
    Keyed(BTreeMap<String, String>),
    Messages(Vec<String>),
}

impl Default for RemoteErrors {
    fn default() -> Self {
        RemoteErrors::Keyed(BTreeMap::new())
    }
}

/// Key under which messages that name no field are reported.
pub const DOCUMENT_KEY: &str = "document";

/// Wording the draft service uses for each document field, first match wins.
const MESSAGE_KEYS: [(&str, &str); 11] = [
    ("full name", "fullName"),
    ("email", "email"),
    ("summary", "summary"),
    ("experience", "experience"),
    ("education", "education"),
    ("project", "projects"),
    ("skill", "skills"),
    ("certification", "certifications"),
    ("language", "languages"),
    ("award", "awards"),
    ("template", "template"),
];

fn key_for_message(message: &str) -> &'static str {
    let lower = message.to_lowercase();
    MESSAGE_KEYS
        .iter()
        .find(|(wording, _)| lower.contains(wording))
        .map(|(_, key)| *key)
        .unwrap_or(DOCUMENT_KEY)
}

impl From<RemoteValidation> for ValidationReport {
    fn from(remote: RemoteValidation) -> Self {
        let errors = match remote.errors {
            RemoteErrors::Keyed(map) => map,
            RemoteErrors::Messages(messages) => {
                let mut errors: BTreeMap<String, String> = BTreeMap::new();
                for message in messages {
                    errors
                        .entry(key_for_message(&message).to_string())
                        .and_modify(|joined| {
                            joined.push_str("; ");
                            joined.push_str(&message);
                        })
                        .or_insert(message);
                }
                errors
            }
        };
        ValidationReport {
            valid: remote.is_valid && errors.is_empty(),
            errors,
        }
    }
}

/// The step whose view shows the field `key`; `None` for document-wide messages.
pub fn step_for_key(key: &str) -> Option<WizardStep> {
    let head = key.split('.').next().unwrap_or(key);
    match head {
        "fullName" | "email" | "phone" | "location" | "title" | "linkedin" | "website" => {
            Some(WizardStep::PersonalInfo)
        }
        "summary" => Some(WizardStep::Summary),
        "template" => Some(WizardStep::Template),
        other => WizardStep::ALL
            .into_iter()
            .find(|step| step.section().is_some_and(|kind| kind.as_str() == other)),
    }
}

/// Narrows a whole-draft verdict to the errors that gate `step`. The last
/// step keeps every error, document-wide ones included.
pub fn scoped_to_step(report: ValidationReport, step: WizardStep) -> ValidationReport {
    if step.is_last() {
        return report;
    }
    let errors: BTreeMap<String, String> = report
        .errors
        .into_iter()
        .filter(|(key, _)| step_for_key(key) == Some(step))
        .collect();
    ValidationReport {
        valid: errors.is_empty(),
        errors,
    }
}

/// Asks the draft service to validate the persisted draft.
pub async fn validate_remote(
    delegate: &dyn ValidationDelegate,
    id: &DraftId,
) -> Result<ValidationReport, PersistenceError> {
    let report = delegate.validate_draft(id).await?;
    debug!(
        "Remote validation of draft {id}: valid={}, {} errors",
        report.valid,
        report.errors.len()
    );
    Ok(report)
}
