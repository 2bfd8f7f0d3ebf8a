//! Semantic analysis of SQL statements and procedure bodies.

mod clean;
mod context;
mod deferred;
mod name_resolver;
mod procedure;
mod relation;
mod scope;
mod statements;
mod type_resolver;

use std::collections::HashMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::ast::{DataType, SqlStatement, Stmt};
use crate::error::{Diagnostics, ErrorKind};
use crate::schema::{NamedType, Procedure, Schema};

pub use self::clean::{session_variable, PARAM_PREFIX, SESSION_PREFIX};
pub use self::relation::{Attribute, QualifiedAttribute, QualifiedRelation, Relation};

/// Knobs of a single SQL analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzeOptions {
    /// Types of the bind parameters the statement may use.
    pub bind_params: HashMap<String, DataType>,
    /// Write the resolved relation into unqualified column references.
    pub qualify: bool,
    /// Report calls that cannot be used as values: procedures returning
    /// tables, nothing or several values.
    pub verify_procedures: bool,
    /// Accept undeclared bind parameters, typed as `unknown`.
    pub arbitrary_binds: bool,
}

/// Result of checking a procedure body.
#[derive(Debug)]
pub struct CheckedProcedure {
    /// Body with cleaned identifiers and qualified SQL.
    pub body: Vec<Stmt>,
    pub parameters: Vec<NamedType>,
    /// Session variables the body reads, by cleaned name.
    pub session_variables: HashMap<String, DataType>,
    /// Types of values discarded into `_` receivers, in order.
    pub anonymous_receiver_types: Vec<DataType>,
}

/// Analyzes a SQL statement and returns the (possibly qualified) statement
/// and the relation it produces.
///
/// User errors are pushed into `diagnostics`. An `Err` means an internal
/// invariant was broken.
pub fn analyze_sql(
    stmt: SqlStatement,
    schema: &Schema,
    options: &AnalyzeOptions,
    diagnostics: &mut Diagnostics,
) -> Result<(SqlStatement, Relation)> {
    if let Err(err) = schema.validate() {
        diagnostics.report(ErrorKind::Semantic, err, None);
        return Ok((stmt, Relation::new()));
    }
    analyze_validated(stmt, schema, options, diagnostics)
}

/// Analysis of a statement against a schema that is known to be valid.
fn analyze_validated(
    stmt: SqlStatement,
    schema: &Schema,
    options: &AnalyzeOptions,
    diagnostics: &mut Diagnostics,
) -> Result<(SqlStatement, Relation)> {
    let stmt = name_resolver::assign_ids(stmt)?;
    let (relation, resolutions) = type_resolver::resolve_types(&stmt, schema, options, diagnostics)?;
    log::debug!("statement produces {relation}");

    let stmt = if options.qualify {
        name_resolver::qualify(stmt, &resolutions)?
    } else {
        stmt
    };
    Ok((stmt, relation))
}

/// Cleans and type checks the body of `procedure`.
///
/// Type checking is skipped when cleaning reported anything, since it would
/// mostly repeat the same problems.
pub fn check_procedure(
    body: Vec<Stmt>,
    procedure: &Procedure,
    schema: &Schema,
    diagnostics: &mut Diagnostics,
) -> Result<CheckedProcedure> {
    let mut checked = CheckedProcedure {
        body,
        parameters: Vec::new(),
        session_variables: HashMap::new(),
        anonymous_receiver_types: Vec::new(),
    };
    if let Err(err) = schema.validate() {
        diagnostics.report(ErrorKind::Semantic, err, None);
        return Ok(checked);
    }

    log::debug!("checking procedure `{}`", procedure.name);
    let reported = diagnostics.len();
    let cleaned = clean::clean_procedure(checked.body, procedure, schema, diagnostics)?;

    checked.body = cleaned.body;
    checked.parameters = cleaned.parameters;
    checked.session_variables = cleaned.session_variables;

    if diagnostics.len() > reported {
        log::debug!("cleaning `{}` failed, skipping type checks", procedure.name);
        return Ok(checked);
    }

    checked.anonymous_receiver_types = procedure::check_body(
        &checked.body,
        &checked.parameters,
        &checked.session_variables,
        procedure,
        schema,
        diagnostics,
    )?;
    Ok(checked)
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    const SCHEMA: &str = r#"
tables:
  - name: users
    columns:
      - name: id
        type: int
      - name: name
        type: text
  - name: posts
    columns:
      - name: id
        type: int
      - name: title
        type: text
      - name: content
        type: text
      - name: author_id
        type: int
procedures:
  - name: create_user
    public: true
    parameters:
      - name: $id
        type: int
      - name: $name
        type: text
  - name: get_user
    public: true
    view: true
    parameters:
      - name: $id
        type: int
    returns:
      fields:
        - name: name
          type: text
  - name: get_posts
    public: true
    view: true
    parameters:
      - name: $author
        type: int
    returns:
      is_table: true
      fields:
        - name: id
          type: int
        - name: title
          type: text
  - name: count_posts
    view: true
    parameters:
      - name: $id
        type: int
    returns:
      fields:
        - name: total
          type: int
foreign_procedures:
  - name: fetch_balance
    parameters: [text]
    returns:
      fields:
        - name: balance
          type: int
"#;

    pub(crate) fn test_schema() -> Schema {
        Schema::from_yaml(SCHEMA).unwrap()
    }

    pub(crate) fn test_options() -> AnalyzeOptions {
        AnalyzeOptions {
            bind_params: [("$id".to_string(), DataType::INT), ("$name".to_string(), DataType::TEXT)].into(),
            ..AnalyzeOptions::default()
        }
    }

    pub(crate) fn render(diagnostics: Diagnostics) -> Vec<String> {
        diagnostics.into_iter().map(|d| d.to_string()).collect()
    }
}
