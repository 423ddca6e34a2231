//! Error kinds for the harvesting core.
//!
//! Each variant corresponds to a distinct failure class with its own blast
//! radius:
//!
//! | Variant | Aborts | Logged at |
//! |---------|--------|-----------|
//! | `Config` | startup | error |
//! | `Network` | the current page | warn |
//! | `Protocol` | the current prefix | error |
//! | `Content` | the current record | warn |
//! | `Pipeline` | the current batch | error |
//! | `Persistence` | the worker (endpoint stays attempted-only) | error |

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarvestError {
    /// Malformed configuration or overview file. Fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// Connect/read timeout or 5xx. Transient; the page is retried on the
    /// next cycle, not within this one.
    #[error("network error: {0}")]
    Network(String),

    /// Malformed OAI response, OAI error code, or missing mandatory element.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// An envelope without records, or a record without an identifier.
    #[error("content error: {0}")]
    Content(String),

    /// An action failed: stylesheet runtime error, filesystem error.
    #[error("pipeline error: {0}")]
    Pipeline(String),

    /// Overview flush failure. The worker unwinds; in-memory state keeps
    /// the attempt so an in-process retry still observes progress.
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl HarvestError {
    /// True for errors that abort a single page but leave the rest of the
    /// scenario running.
    pub fn is_transient(&self) -> bool {
        matches!(self, HarvestError::Network(_))
    }
}
