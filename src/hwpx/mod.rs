pub mod package;
pub mod rebuild;
pub mod reflow;
pub mod substitute;
pub mod xml;

pub use package::HwpxPackage;
pub use rebuild::{rebuild_archive, RebuildContext};
