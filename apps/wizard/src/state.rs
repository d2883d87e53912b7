use std::sync::Arc;

use crate::config::Config;
use crate::draft_client::TemplateCatalog;
use crate::wizard::WizardHandle;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Handle to the single wizard session actor.
    pub wizard: WizardHandle,
    pub catalog: Arc<dyn TemplateCatalog>,
    pub config: Config,
}
