//! mlang_core: Core utilities for the mlang formula-language toolkit.
//!
//! Provides the position and range types shared by the lexer, the syntax
//! tree, and the inspection layers.

pub mod text;

// Re-export commonly used types
pub use text::{TokenIndex, TokenPosition, TokenRange};
