//! Assistant integration: instruction shapes, image resolution and merging
//! into the open document.

pub mod image;
pub mod instruction;
mod merge;

pub use image::{ImageError, ImageService, ResolvedImages, StoredImage, resolve_images};
pub use instruction::{AiInstruction, MoveChange, ProposedLink, ProposedNode, StyleChange, TextChange};
pub use merge::{MergeReport, apply_instruction, run};
