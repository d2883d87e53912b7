//! Axum route handlers for the wizard API consumed by step views.

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::AppError;
use crate::models::document::{CvDocument, PersonalInfoPatch, Revision, TemplateRef};
use crate::models::sections::{EntryId, SectionEntries, SectionKind};
use crate::preview::render_markdown;
use crate::state::AppState;
use crate::sync::retry::bounded;
use crate::sync::SaveResult;
use crate::wizard::controller::{Applied, StepOutcome, WizardView};

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SummaryRequest {
    pub summary: String,
}

#[derive(Debug, Deserialize)]
pub struct TemplateRequest {
    pub template: Option<TemplateRef>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateEntryRequest {
    pub field: String,
    pub value: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddEntryResponse {
    pub entry_id: EntryId,
    pub revision: Revision,
    pub document: CvDocument,
}

#[derive(Debug, Default, Deserialize)]
pub struct PreviewQuery {
    /// `markdown` renders the preview as text; anything else returns JSON.
    pub format: Option<String>,
}

fn parse_kind(raw: &str) -> Result<SectionKind, AppError> {
    SectionKind::ALL
        .into_iter()
        .find(|kind| kind.as_str() == raw)
        .ok_or_else(|| AppError::NotFound(format!("Unknown section kind '{raw}'")))
}

fn document_of(applied: Applied) -> Json<CvDocument> {
    Json(applied.document.as_ref().clone())
}

// ────────────────────────────────────────────────────────────────────────────
// Wizard state
// ────────────────────────────────────────────────────────────────────────────

/// GET /api/v1/wizard
///
/// Current step, its title, the error map and the save indicator.
pub async fn handle_get_wizard(State(state): State<AppState>) -> Result<Json<WizardView>, AppError> {
    Ok(Json(state.wizard.view().await?))
}

/// GET /api/v1/wizard/document
pub async fn handle_get_document(
    State(state): State<AppState>,
) -> Result<Json<CvDocument>, AppError> {
    let document = state.wizard.get_document().await?;
    Ok(Json(document.as_ref().clone()))
}

/// POST /api/v1/wizard/next
///
/// Validates the current step. A blocked step is a normal outcome carrying the
/// error map; only an unreachable remote validator is an HTTP error.
pub async fn handle_next(State(state): State<AppState>) -> Result<Json<StepOutcome>, AppError> {
    match state.wizard.next().await? {
        StepOutcome::ValidationUnavailable { step, message } => Err(
            AppError::ValidationUnavailable(format!("step {step}: {message}")),
        ),
        outcome => Ok(Json(outcome)),
    }
}

/// POST /api/v1/wizard/prev
pub async fn handle_prev(State(state): State<AppState>) -> Result<Json<WizardView>, AppError> {
    Ok(Json(state.wizard.prev().await?))
}

/// POST /api/v1/wizard/flush
///
/// Saves pending edits now instead of waiting out the debounce.
pub async fn handle_flush(State(state): State<AppState>) -> Result<Json<SaveResult>, AppError> {
    Ok(Json(state.wizard.flush().await?))
}

/// POST /api/v1/wizard/discard
pub async fn handle_discard(State(state): State<AppState>) -> Result<Json<WizardView>, AppError> {
    Ok(Json(state.wizard.discard().await?))
}

// ────────────────────────────────────────────────────────────────────────────
// Document edits
// ────────────────────────────────────────────────────────────────────────────

/// PATCH /api/v1/wizard/personal-info
///
/// Keys absent from the body are left untouched; `null` clears an optional field.
pub async fn handle_patch_personal_info(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<CvDocument>, AppError> {
    let patch: PersonalInfoPatch = serde_json::from_value(body)
        .map_err(|e| AppError::UnprocessableEntity(format!("personalInfo: {e}")))?;
    let applied = state.wizard.apply_personal_info_patch(patch).await?;
    Ok(document_of(applied))
}

/// PUT /api/v1/wizard/summary
pub async fn handle_put_summary(
    State(state): State<AppState>,
    Json(request): Json<SummaryRequest>,
) -> Result<Json<CvDocument>, AppError> {
    let applied = state.wizard.set_summary(request.summary).await?;
    Ok(document_of(applied))
}

/// PUT /api/v1/wizard/template
pub async fn handle_put_template(
    State(state): State<AppState>,
    Json(request): Json<TemplateRequest>,
) -> Result<Json<CvDocument>, AppError> {
    let applied = state.wizard.set_template(request.template).await?;
    Ok(document_of(applied))
}

/// GET /api/v1/wizard/sections/:kind
pub async fn handle_list_entries(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> Result<Json<SectionEntries>, AppError> {
    let kind = parse_kind(&kind)?;
    Ok(Json(state.wizard.list_entries(kind).await?))
}

/// PUT /api/v1/wizard/sections/:kind
///
/// Replaces the whole section with the submitted array, in order.
pub async fn handle_put_section(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Json(entries): Json<Vec<Value>>,
) -> Result<Json<CvDocument>, AppError> {
    let kind = parse_kind(&kind)?;
    let applied = state.wizard.apply_section_patch(kind, entries).await?;
    Ok(document_of(applied))
}

/// POST /api/v1/wizard/sections/:kind/entries
pub async fn handle_add_entry(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Json(template): Json<Map<String, Value>>,
) -> Result<Json<AddEntryResponse>, AppError> {
    let kind = parse_kind(&kind)?;
    let applied = state.wizard.add_entry(kind, template).await?;
    let entry_id = applied
        .entry_id
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("entry added without an id")))?;

    Ok(Json(AddEntryResponse {
        entry_id,
        revision: applied.document.revision,
        document: applied.document.as_ref().clone(),
    }))
}

/// PATCH /api/v1/wizard/sections/:kind/entries/:entry_id
pub async fn handle_update_entry(
    State(state): State<AppState>,
    Path((kind, entry_id)): Path<(String, u64)>,
    Json(request): Json<UpdateEntryRequest>,
) -> Result<Json<CvDocument>, AppError> {
    let kind = parse_kind(&kind)?;
    let applied = state
        .wizard
        .update_entry(kind, EntryId(entry_id), request.field, request.value)
        .await?;
    Ok(document_of(applied))
}

/// DELETE /api/v1/wizard/sections/:kind/entries/:entry_id
pub async fn handle_remove_entry(
    State(state): State<AppState>,
    Path((kind, entry_id)): Path<(String, u64)>,
) -> Result<Json<CvDocument>, AppError> {
    let kind = parse_kind(&kind)?;
    let applied = state.wizard.remove_entry(kind, EntryId(entry_id)).await?;
    Ok(document_of(applied))
}

// ────────────────────────────────────────────────────────────────────────────
// Preview, export and templates
// ────────────────────────────────────────────────────────────────────────────

/// GET /api/v1/wizard/preview?format=markdown
pub async fn handle_preview(
    State(state): State<AppState>,
    Query(query): Query<PreviewQuery>,
) -> Result<Response, AppError> {
    let preview = state.wizard.preview().await?;
    if query.format.as_deref() == Some("markdown") {
        return Ok(render_markdown(&preview).into_response());
    }
    Ok(Json(preview).into_response())
}

/// GET /api/v1/wizard/artifact
///
/// The exported PDF, available once the wizard has been finalized.
pub async fn handle_artifact(State(state): State<AppState>) -> Result<Response, AppError> {
    let artifact = state
        .wizard
        .artifact()
        .await?
        .ok_or_else(|| AppError::NotFound("The CV has not been finalized yet".to_string()))?;

    let disposition = format!("attachment; filename=\"cv-{}.pdf\"", artifact.draft_id.0);
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        artifact.bytes,
    )
        .into_response())
}

/// GET /api/v1/templates
pub async fn handle_list_templates(
    State(state): State<AppState>,
) -> Result<Json<Vec<TemplateRef>>, AppError> {
    let templates = bounded(state.config.request_timeout, state.catalog.list_templates()).await?;
    Ok(Json(templates))
}
