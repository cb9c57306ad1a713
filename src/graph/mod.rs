//! The document core: node/link model, the store that owns it, undo history,
//! layouts and the import/export format.

pub mod document;
mod error;
pub mod history;
pub mod layout;
pub mod reconcile;
mod store;
mod types;

pub use error::{GraphError, ImportError};
pub use history::History;
pub use layout::{LayoutKind, LayoutParams};
pub use reconcile::{EntityKey, Field, PendingOps};
pub use store::{GraphSnapshot, GraphStore, Mutation, NodePatch, Outgoing, new_id};
pub use types::*;
