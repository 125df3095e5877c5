// ============================================================================
// digest-scope - Reactivity Module
// Digest loop, equality policies and scheduling primitives
// ============================================================================

pub mod digest;
pub mod equality;
pub mod scheduling;

// Re-export equality policies
pub use equality::{are_equal, deep_equals, identical, safe_equals_f64, safe_not_equal_f64};

// Re-export the host timer hook
pub use scheduling::{ManualScheduler, Scheduler, TimerId};
