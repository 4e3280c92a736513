//! Orchestrator state machine
//!
//! ```text
//! LoggedOut -> Authenticating -> Authenticated
//! Authenticated -> Downloading -> CollectionLoaded
//! CollectionLoaded -> Mutating -> CollectionDirty (-> Mutating)* -> Uploading -> CollectionLoaded
//! ```
//!
//! Any state may return to `LoggedOut` through logout or reset. A failed
//! step falls back to the last stable state: `CollectionLoaded` when a
//! deck cache is held, `Authenticated` otherwise.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use rememberit_core::domain::DomainError;
use tracing::debug;

/// Where the orchestrator is in the sync cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SyncState {
    #[default]
    LoggedOut,
    Authenticating,
    /// A session key is held but no collection has been read
    Authenticated,
    Downloading,
    /// The deck cache mirrors the remote collection
    CollectionLoaded,
    Mutating,
    /// Local changes not yet uploaded
    CollectionDirty,
    Uploading,
}

impl SyncState {
    pub fn name(&self) -> &'static str {
        match self {
            SyncState::LoggedOut => "logged_out",
            SyncState::Authenticating => "authenticating",
            SyncState::Authenticated => "authenticated",
            SyncState::Downloading => "downloading",
            SyncState::CollectionLoaded => "collection_loaded",
            SyncState::Mutating => "mutating",
            SyncState::CollectionDirty => "collection_dirty",
            SyncState::Uploading => "uploading",
        }
    }

    /// Whether a session key is held in this state
    pub fn has_session(&self) -> bool {
        !matches!(self, SyncState::LoggedOut | SyncState::Authenticating)
    }

    /// Whether a network or database step is in flight
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            SyncState::Authenticating
                | SyncState::Downloading
                | SyncState::Mutating
                | SyncState::CollectionDirty
                | SyncState::Uploading
        )
    }

    /// Valid transitions:
    /// - any -> LoggedOut
    /// - LoggedOut -> Authenticating
    /// - Authenticating -> Authenticated, LoggedOut
    /// - Authenticated -> Downloading, Authenticating
    /// - Downloading -> CollectionLoaded, Authenticated
    /// - CollectionLoaded -> Downloading, Mutating, Authenticating
    /// - Mutating -> CollectionDirty, CollectionLoaded
    /// - CollectionDirty -> Mutating, Uploading, CollectionLoaded
    /// - Uploading -> CollectionLoaded, Authenticated
    pub fn can_transition_to(&self, target: SyncState) -> bool {
        use SyncState::*;

        if target == LoggedOut {
            return true;
        }

        matches!(
            (self, target),
            (LoggedOut, Authenticating)
                | (Authenticating, Authenticated)
                | (Authenticated, Downloading)
                | (Authenticated, Authenticating)
                | (Downloading, CollectionLoaded)
                | (Downloading, Authenticated)
                | (CollectionLoaded, Downloading)
                | (CollectionLoaded, Mutating)
                | (CollectionLoaded, Authenticating)
                | (Mutating, CollectionDirty)
                | (Mutating, CollectionLoaded)
                | (CollectionDirty, Mutating)
                | (CollectionDirty, Uploading)
                | (CollectionDirty, CollectionLoaded)
                | (Uploading, CollectionLoaded)
                | (Uploading, Authenticated)
        )
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Shared handle on the current [`SyncState`]
///
/// Strategies advance it as they move through a round trip; the
/// orchestrator settles it after failures.
#[derive(Debug, Clone, Default)]
pub struct StateTracker {
    state: Arc<Mutex<SyncState>>,
}

impl StateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> SyncState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move to `target`
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidState` if the transition is not allowed.
    pub fn advance(&self, target: SyncState) -> Result<(), DomainError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.can_transition_to(target) {
            return Err(DomainError::InvalidState {
                from: state.name().to_string(),
                to: target.name().to_string(),
            });
        }
        debug!(from = %*state, to = %target, "Sync state transition");
        *state = target;
        Ok(())
    }

    /// Return to the last stable state after a failed step
    pub fn settle(&self, has_session: bool, has_cache: bool) {
        let target = match (has_session, has_cache) {
            (false, _) => SyncState::LoggedOut,
            (true, false) => SyncState::Authenticated,
            (true, true) => SyncState::CollectionLoaded,
        };
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != target {
            debug!(from = %*state, to = %target, "Sync state settled");
            *state = target;
        }
    }

    /// Back to `LoggedOut`
    pub fn reset(&self) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = SyncState::LoggedOut;
    }
}
