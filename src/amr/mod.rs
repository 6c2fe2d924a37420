pub mod hierarchy;
pub mod interp;
pub mod patch;
pub mod rect;

pub use hierarchy::{Hierarchy, Level};
pub use patch::PatchArray;
pub use rect::Rect3i;
