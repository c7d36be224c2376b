//! Spool file lifecycle.
//!
//! ```text
//!             Opened             Ingested
//!  Pending ───────────▶ Processing ─────────▶ Archived
//!                          │  │    Rejected
//!                          │  └──────────────▶ Failed
//!                          │       Empty
//!                          └─────────────────▶ Deleted
//! ```
//!
//! Transitions are pure; [`crate::spool::SpoolDirs::apply`] performs the
//! filesystem side effect of a terminal state.

use crate::error::TransitionError;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SpoolState {
    /// Visible in the spool root, untouched
    #[default]
    Pending,
    /// Opened and going through the pipeline
    Processing,
    /// Moved into `archive/`
    Archived,
    /// Moved into `failed/`
    Failed,
    /// Zero-byte file, removed
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpoolEvent {
    Opened,
    Empty,
    Ingested,
    Rejected,
}

impl SpoolState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpoolState::Pending => "pending",
            SpoolState::Processing => "processing",
            SpoolState::Archived => "archived",
            SpoolState::Failed => "failed",
            SpoolState::Deleted => "deleted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SpoolState::Archived | SpoolState::Failed | SpoolState::Deleted
        )
    }

    pub fn transition(self, event: SpoolEvent) -> Result<SpoolState, TransitionError> {
        match (self, event) {
            (SpoolState::Pending, SpoolEvent::Opened) => Ok(SpoolState::Processing),
            (SpoolState::Processing, SpoolEvent::Empty) => Ok(SpoolState::Deleted),
            (SpoolState::Processing, SpoolEvent::Ingested) => Ok(SpoolState::Archived),
            (SpoolState::Processing, SpoolEvent::Rejected) => Ok(SpoolState::Failed),
            (state, event) => Err(TransitionError { state, event }),
        }
    }
}

impl fmt::Display for SpoolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
