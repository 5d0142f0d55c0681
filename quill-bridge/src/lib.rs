//! Quill Bridge library target.
//!
//! The binary entry point is in `main.rs`; the parsing and formatting logic
//! lives here so `tests/*.rs` can reach it.

pub mod commands;
pub mod report;
pub mod util;
