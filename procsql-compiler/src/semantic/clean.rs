//! Normalization of a procedure body before type checking.
//!
//! Variables are renamed so that they cannot collide with column names once
//! the body is compiled to the target database: `$x` becomes `_param_x` and
//! `@x` becomes `_ctx_x`. Columns always start with a letter.
//!
//! Embedded SQL is lower-cased, qualified and type checked in a lenient mode,
//! with bind parameters of unknown type.

use std::collections::HashMap;

use anyhow::{bail, Result};

use super::{analyze_validated, AnalyzeOptions};
use crate::ast::ast_fold::*;
use crate::ast::*;
use crate::error::{Diagnostics, Error, ErrorKind, Reason, Span, WithErrorInfo};
use crate::functions::Builtin;
use crate::schema::{NamedType, Procedure, Schema};

pub const PARAM_PREFIX: &str = "_param_";
pub const SESSION_PREFIX: &str = "_ctx_";

const MAX_NAME_LEN: usize = 32;

/// Variables that the runtime provides to every procedure.
const SESSION_VARIABLES: &[(&str, DataType)] = &[
    ("caller", DataType::TEXT),
    ("txid", DataType::TEXT),
    ("height", DataType::INT),
    ("foreign_caller", DataType::TEXT),
    ("block_timestamp", DataType::INT),
    ("authenticator", DataType::TEXT),
];

pub fn session_variable(name: &str) -> Option<&'static DataType> {
    SESSION_VARIABLES
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, ty)| ty)
}

#[derive(Debug)]
pub struct CleanedProcedure {
    pub body: Vec<Stmt>,
    pub parameters: Vec<NamedType>,
    /// Used session variables, by cleaned name.
    pub session_variables: HashMap<String, DataType>,
}

pub fn clean_procedure(
    body: Vec<Stmt>,
    procedure: &Procedure,
    schema: &Schema,
    diagnostics: &mut Diagnostics,
) -> Result<CleanedProcedure> {
    let mut cleaner = Cleaner {
        procedure,
        schema,
        diagnostics,
        session_variables: HashMap::new(),
        span: None,
    };

    let mut parameters = Vec::with_capacity(procedure.parameters.len());
    for param in &procedure.parameters {
        let name = cleaner.clean_variable(&param.name)?;
        parameters.push(NamedType::new(name, param.ty.clone()));
    }

    let body = cleaner.fold_stmts(body)?;

    Ok(CleanedProcedure {
        body,
        parameters,
        session_variables: cleaner.session_variables,
    })
}

struct Cleaner<'a> {
    procedure: &'a Procedure,
    schema: &'a Schema,
    diagnostics: &'a mut Diagnostics,

    session_variables: HashMap<String, DataType>,

    /// Span of the statement being cleaned.
    span: Option<Span>,
}

impl<'a> Cleaner<'a> {
    fn report<E: Into<Error>>(&mut self, error: E, span: Option<Span>) {
        self.diagnostics.report(ErrorKind::Semantic, error, span.or(self.span));
    }

    fn clean_variable(&mut self, name: &str) -> Result<String> {
        let lower = name.to_lowercase();

        let (prefix, bare) = match lower.chars().next() {
            Some('$') => (PARAM_PREFIX, &lower[1..]),
            Some('@') => (SESSION_PREFIX, &lower[1..]),
            _ => bail!(Error::internal(format!("variable `{name}` has no `$` or `@` sigil"))),
        };

        if bare.is_empty() || bare.len() > MAX_NAME_LEN {
            let err = Error::simple(format!("invalid variable name `{name}`"))
                .with_help(format!("names must be between 1 and {MAX_NAME_LEN} characters"));
            self.report(err, None);
        }

        let cleaned = format!("{prefix}{bare}");
        if prefix == SESSION_PREFIX {
            match session_variable(bare) {
                Some(ty) => {
                    self.session_variables.insert(cleaned.clone(), ty.clone());
                }
                None => {
                    let reason = Reason::NotFound {
                        name: lower.clone(),
                        namespace: "session variable".to_string(),
                    };
                    self.report(reason, None);
                }
            }
        }
        Ok(cleaned)
    }

    fn clean_sql(&mut self, sql: SqlStatement) -> Result<SqlStatement> {
        let offset = self.span.map(|s| s.start).unwrap_or_default();
        let mut child = self.diagnostics.child("sql-clean", offset);

        let sql = IdentCleaner {
            diagnostics: &mut child,
        }
        .fold_sql_statement(sql)?;

        let options = AnalyzeOptions {
            arbitrary_binds: true,
            qualify: true,
            ..AnalyzeOptions::default()
        };
        let (sql, _) = analyze_validated(sql, self.schema, &options, &mut child)?;

        let failed = child.has_errors();
        self.diagnostics.absorb(child);
        if failed {
            return Ok(sql);
        }

        if self.procedure.view && sql.is_mutating() {
            let reason = Reason::ReadOnly(format!("`{}` cannot modify data", self.procedure.name));
            self.report(reason, None);
        }

        BindRenamer { cleaner: self }.fold_sql_statement(sql)
    }

    fn check_call(&mut self, call: &CallExpr, span: Option<Span>) {
        match call {
            CallExpr::Local { name, .. } => {
                if Builtin::lookup(name).is_some() || self.schema.find_foreign_procedure(name).is_some() {
                    return;
                }

                let callee = match self.schema.find_procedure(name) {
                    Some(callee) => callee,
                    None => {
                        let reason = Reason::NotFound {
                            name: name.clone(),
                            namespace: "function or procedure".to_string(),
                        };
                        return self.report(reason, span);
                    }
                };

                if self.procedure.view && !callee.view {
                    let reason = Reason::ReadOnly(format!(
                        "`{}` cannot call procedure `{}`, which is not a view",
                        self.procedure.name, callee.name
                    ));
                    self.report(reason, span);
                }
            }

            CallExpr::Foreign {
                name,
                context_args,
                args,
            } => {
                if context_args.len() != 2 {
                    let reason = Reason::Expected {
                        who: Some(format!("foreign call to `{name}`")),
                        expected: "2 context arguments".to_string(),
                        found: context_args.len().to_string(),
                    };
                    self.report(reason, span);
                }

                match self.schema.find_foreign_procedure(name) {
                    Some(foreign) if foreign.parameters.len() != args.len() => {
                        let reason = Reason::Expected {
                            who: Some(format!("foreign procedure `{name}`")),
                            expected: format!("{} arguments", foreign.parameters.len()),
                            found: args.len().to_string(),
                        };
                        self.report(reason, span);
                    }
                    Some(_) => {}
                    None => {
                        let reason = Reason::NotFound {
                            name: name.clone(),
                            namespace: "foreign procedure".to_string(),
                        };
                        self.report(reason, span);
                    }
                }
            }
        }
    }
}

impl<'a> ProcFold for Cleaner<'a> {
    fn fold_stmt(&mut self, mut stmt: Stmt) -> Result<Stmt> {
        let outer = std::mem::replace(&mut self.span, stmt.span);
        stmt.kind = self.fold_stmt_kind(stmt.kind)?;
        self.span = outer;
        Ok(stmt)
    }

    fn fold_stmt_kind(&mut self, kind: StmtKind) -> Result<StmtKind> {
        match &kind {
            StmtKind::Return { sql: Some(sql), .. } if !sql.is_returnable() => {
                self.report(Error::simple("RETURN must return a SELECT or have a RETURNING clause"), None);
            }
            StmtKind::For {
                target: LoopTarget::Sql(sql),
                ..
            } if !sql.is_returnable() => {
                self.report(Error::simple("loop target must be a SELECT or have a RETURNING clause"), None);
            }
            _ => {}
        }
        fold_stmt_kind(self, kind)
    }

    fn fold_pexpr(&mut self, mut expr: PExpr) -> Result<PExpr> {
        if let PExprKind::MakeArray(items) = &expr.kind {
            if items.is_empty() {
                self.report(Error::simple("ARRAY must have at least one element"), expr.span);
            }
        }
        expr.kind = self.fold_pexpr_kind(expr.kind)?;
        Ok(expr)
    }

    fn fold_call(&mut self, call: CallExpr) -> Result<CallExpr> {
        let call = match call {
            CallExpr::Local { name, args } => CallExpr::Local {
                name: name.to_lowercase(),
                args,
            },
            CallExpr::Foreign {
                name,
                context_args,
                args,
            } => CallExpr::Foreign {
                name: name.to_lowercase(),
                context_args,
                args,
            },
        };
        self.check_call(&call, None);
        fold_call(self, call)
    }

    fn fold_sql(&mut self, sql: SqlStatement) -> Result<SqlStatement> {
        self.clean_sql(sql)
    }

    fn fold_variable(&mut self, name: String) -> Result<String> {
        self.clean_variable(&name)
    }

    fn fold_type(&mut self, ty: DataType) -> Result<DataType> {
        if !ty.is_declarable() {
            self.report(Error::simple(format!("cannot declare a variable of type `{ty}`")), None);
        }
        Ok(ty)
    }
}

/// Lower-cases and validates identifiers of embedded SQL.
struct IdentCleaner<'d> {
    diagnostics: &'d mut Diagnostics,
}

impl<'d> SqlFold for IdentCleaner<'d> {
    fn fold_ident(&mut self, ident: String) -> Result<String> {
        let ident = ident.to_lowercase();
        if !is_valid_ident(&ident) {
            let err = Error::simple(format!("invalid identifier `{ident}`")).with_help(format!(
                "identifiers start with a letter, contain only letters, digits and underscores, and have at most {MAX_NAME_LEN} characters"
            ));
            self.diagnostics.report(ErrorKind::Semantic, err, None);
        }
        Ok(ident)
    }

    fn fold_function_call(&mut self, call: FunctionCall) -> Result<FunctionCall> {
        Ok(FunctionCall {
            name: call.name.to_lowercase(),
            args: self.fold_exprs(call.args)?,
            ..call
        })
    }
}

fn is_valid_ident(ident: &str) -> bool {
    let mut chars = ident.chars();
    let starts_with_letter = matches!(chars.next(), Some('a'..='z'));

    starts_with_letter
        && ident.len() <= MAX_NAME_LEN
        && chars.all(|c| matches!(c, 'a'..='z' | '0'..='9' | '_'))
}

struct BindRenamer<'c, 'a> {
    cleaner: &'c mut Cleaner<'a>,
}

impl<'c, 'a> SqlFold for BindRenamer<'c, 'a> {
    fn fold_bind_parameter(&mut self, name: String) -> Result<String> {
        self.cleaner.clean_variable(&name)
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;
    use itertools::Itertools;
    use serde_yaml::from_str;

    use super::*;
    use crate::semantic::test::{render, test_schema};

    fn clean(procedure: &str, body: &str) -> (CleanedProcedure, String) {
        let schema = test_schema();
        let procedure = schema.find_procedure(procedure).unwrap();
        let body: Vec<Stmt> = from_str(body).unwrap();
        let mut diagnostics = Diagnostics::new();

        let cleaned = clean_procedure(body, procedure, &schema, &mut diagnostics).unwrap();
        (cleaned, render(diagnostics).iter().join("\n"))
    }

    #[test]
    fn test_variables_are_renamed() {
        let (cleaned, errors) = clean(
            "create_user",
            r#"
            - AssignDeclare:
                name: $Greeting
                ty: text
                value:
                  Variable: "@caller"
            - Sql:
                Insert:
                  table: Users
                  values:
                    - - BindParameter: $id
                      - BindParameter: $Greeting
            "#,
        );
        assert_eq!(errors, "");

        let params = cleaned.parameters.iter().map(|p| &p.name).join(", ");
        assert_snapshot!(params, @"_param_id, _param_name");
        assert_eq!(cleaned.session_variables["_ctx_caller"], DataType::TEXT);

        let stmt = &cleaned.body[0].kind;
        assert!(matches!(stmt, StmtKind::AssignDeclare { name, .. } if name == "_param_greeting"));

        let insert = cleaned.body[1].kind.as_sql().unwrap().as_insert().unwrap();
        assert_eq!(insert.table, "users");
        let binds = insert.values[0].iter().map(|v| v.kind.as_bind_parameter().unwrap()).join(", ");
        assert_snapshot!(binds, @"_param_id, _param_greeting");
    }

    #[test]
    fn test_unknown_session_variable() {
        let (_, errors) = clean(
            "create_user",
            r#"
            - Assign:
                name: $name
                value:
                  Variable: "@nonsense"
            "#,
        );
        assert_snapshot!(errors, @"semantic error: session variable `@nonsense` not found");
    }

    #[test]
    fn test_view_cannot_modify_data() {
        let (_, errors) = clean(
            "get_user",
            r#"
            - Sql:
                Delete:
                  table:
                    name: users
            - Call:
                call:
                  Local:
                    name: CREATE_USER
                    args:
                      - Literal:
                          Integer: 1
                      - Literal:
                          Text: x
            "#,
        );
        assert_snapshot!(errors, @r###"
        semantic error: read-only procedure `get_user` cannot modify data
        semantic error: read-only procedure `get_user` cannot call procedure `create_user`, which is not a view
        "###);
    }

    #[test]
    fn test_sql_errors_stop_structural_checks() {
        let (_, errors) = clean(
            "get_user",
            r#"
            - Sql:
                Delete:
                  table:
                    name: missing
            "#,
        );
        assert_snapshot!(errors, @"semantic error: table `missing` not found");
    }

    #[test]
    fn test_return_and_loop_sql_must_be_returnable() {
        let (_, errors) = clean(
            "create_user",
            r#"
            - For:
                variable: $row
                target:
                  Sql:
                    Delete:
                      table:
                        name: posts
                body: []
            - Return:
                sql:
                  Update:
                    table:
                      name: users
                    set:
                      - columns: [name]
                        expr:
                          Literal:
                            Text: x
            "#,
        );
        assert_snapshot!(errors, @r###"
        semantic error: loop target must be a SELECT or have a RETURNING clause
        semantic error: RETURN must return a SELECT or have a RETURNING clause
        "###);
    }

    #[test]
    fn test_expression_checks() {
        let (_, errors) = clean(
            "create_user",
            r#"
            - Declare:
                name: $values
                ty: "null"
            - Assign:
                name: $values
                value:
                  MakeArray: []
            - Call:
                call:
                  Foreign:
                    name: Fetch_Balance
                    context_args:
                      - Literal:
                          Text: dbid
                    args: []
            - Call:
                call:
                  Local:
                    name: nowhere
            "#,
        );
        assert_snapshot!(errors, @r###"
        semantic error: cannot declare a variable of type `null`
        semantic error: ARRAY must have at least one element
        semantic error: foreign call to `fetch_balance` expected 2 context arguments, but found 1
        semantic error: foreign procedure `fetch_balance` expected 1 arguments, but found 0
        semantic error: function or procedure `nowhere` not found
        "###);
    }

    #[test]
    fn test_invalid_identifier() {
        let (_, errors) = clean(
            "get_user",
            r#"
            - Sql:
                Select:
                  selects:
                    - columns: [Star]
                      from:
                        relation:
                          Table:
                            name: users
                            alias: _u
            "#,
        );
        assert_snapshot!(errors, @"semantic error: invalid identifier `_u` (identifiers start with a letter, contain only letters, digits and underscores, and have at most 32 characters)");
    }
}
