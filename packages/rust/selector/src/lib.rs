//! Entity selection and cursor-paginated remote search.
//!
//! Two pieces feed every bulk operation:
//! - [`Selection`] — the set of entities chosen for a pending action
//! - [`SearchProvider`] — debounced, cancellation-safe search over the
//!   remote API, whose candidates become selectable
//!
//! Each provider/selection pair belongs to one picker instance; nothing
//! here is shared mutable state across instances.

pub mod provider;
pub mod selection;

pub use provider::{PageState, ProviderOptions, SearchProvider};
pub use selection::Selection;
