//! Semantic analysis for a restricted SQL dialect and for the procedural
//! language that stored procedures are written in.
//!
//! Front ends hand over a syntax tree ([ast]) and a [Schema]. SQL statements
//! go through [analyze_sql], which resolves every column, computes the
//! relation the statement produces and can qualify column references.
//! Procedure bodies go through [check_procedure], which normalizes names and
//! type checks statements, including the SQL embedded in them.
//!
//! User errors never abort analysis: they are collected into
//! [error::Diagnostics] and the offending value is treated as `unknown`.

pub mod ast;
pub mod error;
pub mod functions;
pub mod schema;
pub mod semantic;

pub use error::{Diagnostic, Diagnostics, ErrorKind};
pub use schema::Schema;
pub use semantic::{
    analyze_sql, check_procedure, AnalyzeOptions, Attribute, CheckedProcedure, QualifiedAttribute,
    QualifiedRelation, Relation,
};
