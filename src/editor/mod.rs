//! Interactive editing on top of the graph core: per-session canvas state,
//! the input controller and the open-document workspace.

pub mod controller;
mod session;
mod workspace;

pub use session::{CanvasTransform, Gesture, Mode, SessionState, TextEdit};
pub use workspace::Workspace;
