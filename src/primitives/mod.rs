// ============================================================================
// digest-scope - Primitives Module
// Scope tree, watchers, events and composite watches
// ============================================================================

pub mod events;
pub mod scope;
pub mod watch;
pub mod watch_collection;
pub mod watch_group;

// Re-export for convenience
pub use events::{Event, EventDirection, EventListenerFn, ListenerHandle};
pub use scope::Scope;
pub use watch::{listener_fn, watch_fn, ListenerFn, WatchFn, WatchHandle, WatchId};
pub use watch_group::GroupListenerFn;
