//! Core MOBI/PalmDOC reader module.

pub mod codec;
pub mod format;
pub mod source;
pub mod types;

mod reader;

pub use reader::MobiBook;
pub use source::ByteSource;
pub use types::error::{MobiError, Result};
pub use types::models::{Compression, ContainerKind, Image, TrailerFlags};
