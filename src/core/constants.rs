// ============================================================================
// digest-scope - Constants
// Fixed limits and well-known names used by the digest engine
// ============================================================================

// =============================================================================
// DIGEST LIMITS
// =============================================================================

/// Number of extra sweeps a digest may perform after the first one before it
/// gives up with `ScopeError::DigestLimitExceeded`.
///
/// A digest that is still dirty (or still has queued async work) after
/// `DIGEST_TTL + 1` sweeps is considered non-terminating.
pub const DIGEST_TTL: u32 = 10;

// =============================================================================
// EVENT NAMES
// =============================================================================

/// Event broadcast to a scope and its whole subtree by `Scope::destroy`.
pub const DESTROY_EVENT: &str = "$destroy";

// =============================================================================
// PHASE NAMES
// =============================================================================

/// Display name of the digest phase.
pub const DIGEST_PHASE: &str = "$digest";

/// Display name of the apply phase.
pub const APPLY_PHASE: &str = "$apply";

// =============================================================================
// TESTS
// =============================================================================
