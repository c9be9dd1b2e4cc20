//! Versioned copy-on-write state: layered views for speculative execution and the
//! canonical store they are committed to.

pub mod store;
pub mod view;

pub use store::{StateStore, DEFAULT_MAX_LAYER_DEPTH};
pub use view::{Checkpoint, View};
