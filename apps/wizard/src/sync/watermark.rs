use thiserror::Error;

use crate::models::document::Revision;

/// An async result that arrived for a revision already superseded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("response for {received} is stale (watermark at {watermark})")]
pub struct StaleResponse {
    pub received: Revision,
    pub watermark: Revision,
}

/// Highest revision known to be persisted. Only ever moves forward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Watermark(Revision);

impl Watermark {
    pub fn at(revision: Revision) -> Self {
        Self(revision)
    }

    pub fn current(&self) -> Revision {
        self.0
    }

    pub fn covers(&self, revision: Revision) -> bool {
        revision <= self.0
    }

    /// Records `revision` as saved. A repeated acknowledgement of the current
    /// revision is accepted and changes nothing.
    pub fn advance(&mut self, revision: Revision) -> Result<(), StaleResponse> {
        if revision < self.0 {
            return Err(StaleResponse {
                received: revision,
                watermark: self.0,
            });
        }
        self.0 = revision;
        Ok(())
    }
}
