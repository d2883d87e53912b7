pub mod health;

use axum::{
    routing::{get, patch, post, put},
    Router,
};

use crate::state::AppState;
use crate::wizard::handlers;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Wizard state machine
        .route("/api/v1/wizard", get(handlers::handle_get_wizard))
        .route("/api/v1/wizard/next", post(handlers::handle_next))
        .route("/api/v1/wizard/prev", post(handlers::handle_prev))
        .route("/api/v1/wizard/flush", post(handlers::handle_flush))
        .route("/api/v1/wizard/discard", post(handlers::handle_discard))
        // Document edits
        .route("/api/v1/wizard/document", get(handlers::handle_get_document))
        .route(
            "/api/v1/wizard/personal-info",
            patch(handlers::handle_patch_personal_info),
        )
        .route("/api/v1/wizard/summary", put(handlers::handle_put_summary))
        .route("/api/v1/wizard/template", put(handlers::handle_put_template))
        .route(
            "/api/v1/wizard/sections/:kind",
            get(handlers::handle_list_entries).put(handlers::handle_put_section),
        )
        .route(
            "/api/v1/wizard/sections/:kind/entries",
            post(handlers::handle_add_entry),
        )
        .route(
            "/api/v1/wizard/sections/:kind/entries/:entry_id",
            patch(handlers::handle_update_entry).delete(handlers::handle_remove_entry),
        )
        // Preview and export
        .route("/api/v1/wizard/preview", get(handlers::handle_preview))
        .route("/api/v1/wizard/artifact", get(handlers::handle_artifact))
        .route("/api/v1/templates", get(handlers::handle_list_templates))
        .with_state(state)
}
