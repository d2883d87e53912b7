// Wizard Controller: step state machine, the session actor that owns it,
// and the HTTP handlers step views talk to.

pub mod controller;
pub mod handlers;
pub mod session;
pub mod steps;

pub use controller::WizardController;
pub use session::{Collaborators, WizardHandle, WizardSession};
