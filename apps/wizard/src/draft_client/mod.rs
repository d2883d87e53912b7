//! Draft Client: the single point of entry for all calls to the draft service.
//!
//! ARCHITECTURAL RULE: No other module may talk to the draft service over HTTP.
//! Everything else depends on the collaborator traits below, so the
//! synchronizer and the wizard can run against an in-memory service in tests.
//!
//! Each method here makes exactly one attempt. Retry and backoff belong to the
//! caller (see `sync::retry`), which knows whether a retry is still useful.
use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::models::document::{CvDocument, DraftId, PersonalInfo, Revision, TemplateRef};
use crate::models::sections::{SectionEntries, SectionKind};
use crate::preview::PreviewOverlay;
use crate::validation::remote::RemoteValidation;
use crate::validation::ValidationReport;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("draft service did not acknowledge {0}")]
    NotAcknowledged(Revision),

    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

impl PersistenceError {
    /// Connection failures, timeouts, 429 and 5xx are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            PersistenceError::Http(e) => !e.is_decode(),
            PersistenceError::Timeout(_) => true,
            PersistenceError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Wire types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct CreateDraftRequest<'a> {
    revision: Revision,
    document: &'a CvDocument,
}

#[derive(Debug, Deserialize)]
struct CreateDraftResponse {
    id: DraftIdValue,
}

/// Draft ids arrive as numbers from some deployments and strings from others.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DraftIdValue {
    Number(u64),
    Text(String),
}

impl From<DraftIdValue> for DraftId {
    fn from(value: DraftIdValue) -> Self {
        match value {
            DraftIdValue::Number(n) => DraftId(n.to_string()),
            DraftIdValue::Text(s) => DraftId(s),
        }
    }
}

/// Partial update: only top-level keys (and section kinds) that changed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftPatch {
    pub revision: Revision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub personal_info: Option<PersonalInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub sections: BTreeMap<SectionKind, SectionEntries>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<Option<TemplateRef>>,
}

impl DraftPatch {
    /// Everything in `next` that differs from `base`, tagged with `next`'s revision.
    pub fn between(base: &CvDocument, next: &CvDocument) -> Self {
        let sections = SectionKind::ALL
            .iter()
            .map(|kind| (*kind, next.sections.entries(*kind)))
            .filter(|(kind, entries)| base.sections.entries(*kind) != *entries)
            .collect();
        Self {
            revision: next.revision,
            personal_info: (base.personal_info != next.personal_info)
                .then(|| next.personal_info.clone()),
            summary: (base.summary != next.summary).then(|| next.summary.clone()),
            sections,
            template: (base.template != next.template).then(|| next.template.clone()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.personal_info.is_none()
            && self.summary.is_none()
            && self.sections.is_empty()
            && self.template.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchAck {
    #[serde(default = "default_ok")]
    pub ok: bool,
    #[serde(default)]
    pub revision_ack: Option<Revision>,
    #[serde(default, alias = "last_saved")]
    pub last_saved: Option<DateTime<Utc>>,
}

fn default_ok() -> bool {
    true
}

// ────────────────────────────────────────────────────────────────────────────
// Collaborator contracts
// ────────────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait DraftStore: Send + Sync {
    async fn create_draft(
        &self,
        revision: Revision,
        initial: &CvDocument,
    ) -> Result<DraftId, PersistenceError>;

    /// Must be idempotent for repeated calls with the same revision.
    async fn patch_draft(
        &self,
        id: &DraftId,
        patch: &DraftPatch,
    ) -> Result<PatchAck, PersistenceError>;

    async fn fetch_draft(&self, id: &DraftId) -> Result<CvDocument, PersistenceError>;
}

#[async_trait]
pub trait ValidationDelegate: Send + Sync {
    async fn validate_draft(&self, id: &DraftId) -> Result<ValidationReport, PersistenceError>;
}

#[async_trait]
pub trait TemplateCatalog: Send + Sync {
    async fn list_templates(&self) -> Result<Vec<TemplateRef>, PersistenceError>;
}

#[async_trait]
pub trait PreviewSource: Send + Sync {
    async fn fetch_preview(&self, id: &DraftId) -> Result<PreviewOverlay, PersistenceError>;
}

#[async_trait]
pub trait DocumentExporter: Send + Sync {
    async fn export_document(&self, id: &DraftId) -> Result<Bytes, PersistenceError>;
}

// ────────────────────────────────────────────────────────────────────────────
// HTTP implementation
// ────────────────────────────────────────────────────────────────────────────

/// reqwest-backed client for the draft service REST API.
#[derive(Clone)]
pub struct DraftApiClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl DraftApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, PersistenceError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/{}", self.base_url, path))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, PersistenceError> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                PersistenceError::Timeout(self.timeout)
            } else {
                PersistenceError::Http(e)
            }
        })?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(PersistenceError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, PersistenceError> {
        let response = self.send(request.header("accept", "application/json")).await?;
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl DraftStore for DraftApiClient {
    async fn create_draft(
        &self,
        revision: Revision,
        initial: &CvDocument,
    ) -> Result<DraftId, PersistenceError> {
        let body = CreateDraftRequest {
            revision,
            document: initial,
        };
        let created: CreateDraftResponse = self
            .send_json(
                self.request(Method::POST, "enhanced-cvs/create_draft/")
                    .json(&body),
            )
            .await?;
        let id = DraftId::from(created.id);
        debug!("Draft service created draft {id} at {revision}");
        Ok(id)
    }

    async fn patch_draft(
        &self,
        id: &DraftId,
        patch: &DraftPatch,
    ) -> Result<PatchAck, PersistenceError> {
        self.send_json(
            self.request(Method::PATCH, &format!("enhanced-cvs/{id}/auto_save/"))
                .json(patch),
        )
        .await
    }

    async fn fetch_draft(&self, id: &DraftId) -> Result<CvDocument, PersistenceError> {
        self.send_json(self.request(Method::GET, &format!("enhanced-cvs/{id}/")))
            .await
    }
}

#[async_trait]
impl ValidationDelegate for DraftApiClient {
    async fn validate_draft(&self, id: &DraftId) -> Result<ValidationReport, PersistenceError> {
        let remote: RemoteValidation = self
            .send_json(self.request(Method::POST, &format!("enhanced-cvs/{id}/validate_data/")))
            .await?;
        Ok(remote.into())
    }
}

#[async_trait]
impl TemplateCatalog for DraftApiClient {
    async fn list_templates(&self) -> Result<Vec<TemplateRef>, PersistenceError> {
        self.send_json(self.request(Method::GET, "enhanced-templates/"))
            .await
    }
}

#[async_trait]
impl PreviewSource for DraftApiClient {
    async fn fetch_preview(&self, id: &DraftId) -> Result<PreviewOverlay, PersistenceError> {
        self.send_json(self.request(Method::GET, &format!("enhanced-cvs/{id}/preview/")))
            .await
    }
}

#[async_trait]
impl DocumentExporter for DraftApiClient {
    async fn export_document(&self, id: &DraftId) -> Result<Bytes, PersistenceError> {
        let response = self
            .send(
                self.request(Method::GET, &format!("enhanced-cvs/{id}/export_pdf/"))
                    .header("accept", "application/pdf"),
            )
            .await?;
        Ok(response.bytes().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::sections::{EntryFields, EntryId, SkillEntry};
    use serde_json::json;

    #[test]
    fn test_patch_between_identical_documents_is_empty() {
        let doc = CvDocument::default();
        let patch = DraftPatch::between(&doc, &doc);
        assert!(patch.is_empty());
    }

    #[test]
    fn test_patch_carries_only_changed_keys_and_kinds() {
        let base = CvDocument::default();
        let mut next = base.clone();
        next.summary = "Builder of things".to_string();
        next.sections.skills.push(SkillEntry::blank(EntryId(1)));
        next.revision = Revision(4);

        let patch = DraftPatch::between(&base, &next);
        assert_eq!(patch.revision, Revision(4));
        assert_eq!(patch.summary.as_deref(), Some("Builder of things"));
        assert!(patch.personal_info.is_none());
        assert_eq!(patch.sections.len(), 1);
        assert!(patch.sections.contains_key(&SectionKind::Skills));

        let wire = serde_json::to_value(&patch).unwrap();
        assert_eq!(wire["revision"], json!(4));
        assert!(wire.get("personalInfo").is_none());
        assert!(wire["sections"].get("skills").is_some());
    }

    #[test]
    fn test_patch_serializes_cleared_template_as_null() {
        let mut base = CvDocument::default();
        base.template = Some(TemplateRef {
            id: "t1".to_string(),
            name: "Modern".to_string(),
            style: None,
            preview_image: None,
        });
        let next = CvDocument::default();
        let wire = serde_json::to_value(DraftPatch::between(&base, &next)).unwrap();
        assert_eq!(wire["template"], serde_json::Value::Null);
    }

    #[test]
    fn test_retryable_classification() {
        let server = PersistenceError::Api {
            status: 503,
            message: String::new(),
        };
        let throttled = PersistenceError::Api {
            status: 429,
            message: String::new(),
        };
        let rejected = PersistenceError::Api {
            status: 400,
            message: String::new(),
        };
        assert!(server.is_retryable());
        assert!(throttled.is_retryable());
        assert!(!rejected.is_retryable());
        assert!(PersistenceError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(!PersistenceError::NotAcknowledged(Revision(1)).is_retryable());
    }

    #[test]
    fn test_draft_id_accepts_numbers_and_strings() {
        let numeric: CreateDraftResponse = serde_json::from_value(json!({"id": 17})).unwrap();
        let text: CreateDraftResponse = serde_json::from_value(json!({"id": "abc"})).unwrap();
        assert_eq!(DraftId::from(numeric.id), DraftId("17".to_string()));
        assert_eq!(DraftId::from(text.id), DraftId("abc".to_string()));
    }
}
