//! Block model + markup codec.
//!
//! A "block" is one semantically typed unit of document content:
//! - paragraph
//! - header (levels 1-3)
//! - list (ordered / unordered)
//! - quote (with caption)
//! - code
//!
//! Engines speak `RawBlock` (kind + JSON data), hosts speak markup, and the
//! session converts between the two through the typed `Block`.

pub mod links;
pub mod markup;
pub mod model;

pub use links::{LinkRewrite, DEFAULT_SUBJECT_TEMPLATE};
pub use markup::{recover_paragraphs, to_blocks, to_markup};
pub use model::{Block, Document, ListStyle, RawBlock};
