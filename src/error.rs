// Error taxonomy for the catalog session
// Provider failures, broken folder markers, and callbacks that raced an unload

use thiserror::Error;

use crate::playlist::HierarchyError;
use crate::provider::{HandleId, ProviderError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The provider refused to construct a session (bad key, unusable path).
    #[error("provider rejected the session: {0}")]
    ProviderRejected(#[source] ProviderError),

    /// A container's flat record list had unbalanced folder markers.
    #[error("malformed playlist hierarchy: {0}")]
    MalformedHierarchy(#[from] HierarchyError),

    /// A completion arrived for an entity that has since been unloaded or rebound.
    #[error("callback for {handle} arrived after its entity was unbound")]
    StaleHandle { handle: HandleId },

    /// The provider refused a player request (load, prefetch).
    #[error("playback request failed: {0}")]
    Playback(#[source] ProviderError),

    #[error("session has been shut down")]
    Disconnected,
}

impl Error {
    /// Stale completions are absorbed silently; everything else is worth surfacing.
    pub fn is_benign(&self) -> bool {
        matches!(self, Error::StaleHandle { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
