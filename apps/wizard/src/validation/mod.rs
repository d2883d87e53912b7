// Validation Gate: decides whether the wizard may leave a step.
// Local rules are pure; remote mode defers to the draft service's validator.

pub mod gate;
pub mod remote;

use std::str::FromStr;

use serde::Serialize;

pub use gate::{validate, validate_all, ValidationReport};

/// Where step validation runs. One mode per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    Local,
    Remote,
}

impl FromStr for ValidationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(ValidationMode::Local),
            "remote" => Ok(ValidationMode::Remote),
            other => Err(format!("unknown validation mode '{other}' (expected local|remote)")),
        }
    }
}
