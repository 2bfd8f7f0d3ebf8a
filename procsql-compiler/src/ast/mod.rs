//! Syntax tree consumed by semantic analysis.
//!
//! Nodes derive serde, so trees can be produced by any front end or loaded
//! from YAML/JSON.

pub mod ast_fold;
mod procedural;
mod sql;
mod types;

pub use self::procedural::*;
pub use self::sql::*;
pub use self::types::*;
