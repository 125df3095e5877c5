// ============================================================================
// digest-scope - Errors
// Structural failures surfaced to the caller of digest/apply
// ============================================================================

use thiserror::Error;

use super::context::Phase;

/// Failures of the digest machinery itself.
///
/// Errors raised by user callbacks are never reported through this type;
/// those are isolated and handed to the tree's `ExceptionHandler`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ScopeError {
    /// `digest` or `apply` was started while another phase was running.
    #[error("{phase} already in progress")]
    PhaseInProgress { phase: Phase },

    /// The watcher graph kept changing past the sweep ceiling.
    #[error("{ttl} digest iterations reached without the scope tree stabilizing")]
    DigestLimitExceeded { ttl: u32 },
}
