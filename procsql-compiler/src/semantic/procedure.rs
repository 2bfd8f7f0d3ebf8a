//! Type checking of cleaned procedure bodies.

use std::collections::HashMap;

use anyhow::{bail, Result};

use super::clean::{PARAM_PREFIX, SESSION_PREFIX};
use super::relation::Relation;
use super::scope::Scope;
use super::type_resolver::{literal_type, type_mismatch};
use super::{analyze_validated, AnalyzeOptions};
use crate::ast::*;
use crate::error::{Diagnostics, Error, ErrorKind, Reason, Span, WithErrorInfo};
use crate::functions::{check_arguments, resolve_call, CallResult};
use crate::schema::{NamedType, Procedure, ProcedureReturn, Schema};

/// Checks a cleaned procedure body. Returns the types of values that calls
/// discarded into `_` receivers, in order of appearance.
pub fn check_body(
    body: &[Stmt],
    parameters: &[NamedType],
    session_variables: &HashMap<String, DataType>,
    procedure: &Procedure,
    schema: &Schema,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<DataType>> {
    let mut scope = Scope::default();
    let seeded = parameters.iter().map(|p| (&p.name, &p.ty)).chain(session_variables);
    for (name, ty) in seeded {
        if scope.declare(name, ty.clone()).is_err() {
            bail!(Error::internal(format!("variable `{name}` collides with another parameter")));
        }
    }

    let mut checker = ProcedureChecker {
        procedure,
        schema,
        diagnostics,
        scope,
        anonymous_receivers: Vec::new(),
        span: None,
    };
    checker.check_stmts(body)?;

    log::debug!(
        "checked procedure `{}`, anonymous receivers: {:?}",
        procedure.name,
        checker.anonymous_receivers
    );
    Ok(checker.anonymous_receivers)
}

/// Name of a cleaned variable as it was written.
fn display_name(name: &str) -> String {
    if let Some(bare) = name.strip_prefix(PARAM_PREFIX) {
        format!("${bare}")
    } else if let Some(bare) = name.strip_prefix(SESSION_PREFIX) {
        format!("@{bare}")
    } else {
        name.to_string()
    }
}

fn undeclared(name: &str) -> Reason {
    Reason::NotFound {
        name: display_name(name),
        namespace: "variable".to_string(),
    }
}

fn duplicate(name: &str) -> Reason {
    Reason::Duplicate {
        name: display_name(name),
        namespace: "variable".to_string(),
    }
}

struct ProcedureChecker<'a> {
    procedure: &'a Procedure,
    schema: &'a Schema,
    diagnostics: &'a mut Diagnostics,

    scope: Scope,
    anonymous_receivers: Vec<DataType>,

    /// Span of the statement being checked.
    span: Option<Span>,
}

impl<'a> ProcedureChecker<'a> {
    fn report<E: Into<Error>>(&mut self, kind: ErrorKind, error: E, span: Option<Span>) {
        self.diagnostics.report(kind, error, span.or(self.span));
    }

    /// Reports a type error unless `found` is assignable where `expected` is
    /// needed. Null is assignable to anything.
    fn check_assignable(&mut self, who: &str, expected: &DataType, found: &DataType, span: Option<Span>) -> bool {
        if found.is_null() || expected.matches(found) {
            return true;
        }
        self.report(ErrorKind::Type, type_mismatch(who, expected, found), span);
        false
    }

    fn check_stmts(&mut self, stmts: &[Stmt]) -> Result<()> {
        for stmt in stmts {
            let outer = std::mem::replace(&mut self.span, stmt.span);
            self.check_stmt(&stmt.kind)?;
            self.span = outer;
        }
        Ok(())
    }

    fn check_stmt(&mut self, stmt: &StmtKind) -> Result<()> {
        match stmt {
            StmtKind::Declare { name, ty } => self.declare(name, ty.clone()),

            StmtKind::Assign { name, value } => {
                let found = self.expr_type(value)?;
                match self.scope.variable(name).cloned() {
                    Some(expected) => {
                        let who = format!("variable `{}`", display_name(name));
                        self.check_assignable(&who, &expected, &found, value.span);
                    }
                    None => self.report(ErrorKind::Semantic, undeclared(name), None),
                }
            }

            StmtKind::AssignDeclare { name, ty, value } => {
                let found = self.expr_type(value)?;
                let who = format!("variable `{}`", display_name(name));
                self.check_assignable(&who, ty, &found, value.span);
                self.declare(name, ty.clone());
            }

            StmtKind::Call { receivers, call } => self.check_call_stmt(receivers, call)?,

            StmtKind::For {
                variable,
                target,
                body,
            } => self.check_loop(variable, target, body)?,

            StmtKind::If {
                branches,
                otherwise,
            } => {
                for branch in branches {
                    let condition = self.expr_type(&branch.condition)?;
                    let span = branch.condition.span;
                    if !DataType::BOOL.matches(&condition) {
                        let reason = type_mismatch("IF condition", &DataType::BOOL, &condition);
                        self.report(ErrorKind::Type, reason, span);
                    }
                    self.check_stmts(&branch.body)?;
                }
                if let Some(otherwise) = otherwise {
                    self.check_stmts(otherwise)?;
                }
            }

            StmtKind::Sql(sql) => {
                self.analyze_sql(sql)?;
            }

            StmtKind::Return { values, sql } => self.check_return(values, sql.as_ref())?,

            StmtKind::ReturnNext { values } => self.check_return_next(values)?,

            StmtKind::Break => {
                if !self.scope.in_loop() {
                    let err = Error::simple("BREAK used outside of a loop");
                    self.report(ErrorKind::Semantic, err, None);
                }
            }
        }
        Ok(())
    }

    fn check_call_stmt(&mut self, receivers: &[Option<String>], call: &CallExpr) -> Result<()> {
        let result = match self.call_result(call, None)? {
            Some(result) => result,
            None => return Ok(()),
        };
        if receivers.is_empty() {
            return Ok(());
        }

        if result.is_table {
            let err = Error::simple(format!(
                "procedure `{}` returns a table, which cannot be assigned to variables",
                call.name()
            ));
            self.report(ErrorKind::Type, err, None);
            return Ok(());
        }
        if result.fields.len() != receivers.len() {
            let reason = Reason::Expected {
                who: Some(format!("call to `{}`", call.name())),
                expected: format!("{} receivers", result.fields.len()),
                found: receivers.len().to_string(),
            };
            self.report(ErrorKind::Type, reason, None);
            return Ok(());
        }

        for (receiver, field) in receivers.iter().zip(result.fields) {
            let name = match receiver {
                Some(name) => name,
                None => {
                    self.anonymous_receivers.push(field.ty);
                    continue;
                }
            };

            match self.scope.variable(name).cloned() {
                Some(expected) => {
                    let who = format!("variable `{}`", display_name(name));
                    self.check_assignable(&who, &expected, &field.ty, None);
                }
                None => self.report(ErrorKind::Type, undeclared(name), None),
            }
        }
        Ok(())
    }

    fn check_loop(&mut self, variable: &str, target: &LoopTarget, body: &[Stmt]) -> Result<()> {
        if self.scope.is_declared(variable) {
            self.report(ErrorKind::Semantic, duplicate(variable), None);
            return Ok(());
        }

        match target {
            LoopTarget::Range { start, end } => {
                for bound in [start, end] {
                    let ty = self.expr_type(bound)?;
                    if !DataType::INT.matches(&ty) {
                        let reason = type_mismatch("range bound", &DataType::INT, &ty);
                        self.report(ErrorKind::Type, reason, bound.span);
                    }
                }
                self.bind(variable, DataType::INT)?;
            }

            LoopTarget::Variable(name) => {
                let element = match self.scope.variable(name).cloned() {
                    Some(ty) if ty.is_array => ty.element(),
                    Some(ty) if ty.is_unknown() => ty,
                    Some(ty) => {
                        let err = Error::simple(format!("cannot loop over type `{ty}`"))
                            .with_help("loops over variables require an array");
                        self.report(ErrorKind::Type, err, None);
                        DataType::UNKNOWN
                    }
                    None => {
                        self.report(ErrorKind::Semantic, undeclared(name), None);
                        DataType::UNKNOWN
                    }
                };
                self.bind(variable, element)?;
            }

            LoopTarget::Call(call) => match self.call_result(call, None)? {
                Some(result) if result.is_table => {
                    let columns = result.fields.into_iter().map(|f| (f.name, f.ty));
                    match Relation::from_columns(columns) {
                        Ok(row) => self.bind_row(variable, row)?,
                        Err(err) => {
                            self.report(ErrorKind::Semantic, err, None);
                            self.bind(variable, DataType::UNKNOWN)?;
                        }
                    }
                }
                Some(_) => {
                    let err = Error::simple("loops over procedures require a procedure returning a table");
                    self.report(ErrorKind::Type, err, None);
                    self.bind(variable, DataType::UNKNOWN)?;
                }
                None => self.bind(variable, DataType::UNKNOWN)?,
            },

            LoopTarget::Sql(sql) => {
                let row = self.analyze_sql(sql)?;
                self.bind_row(variable, row)?;
            }
        }

        let outer = self.scope.enter_loop();
        self.check_stmts(body)?;
        self.scope.exit_loop(outer);

        self.scope.remove(variable);
        Ok(())
    }

    fn declare(&mut self, name: &str, ty: DataType) {
        if self.scope.declare(name, ty).is_err() {
            self.report(ErrorKind::Semantic, duplicate(name), None);
        }
    }

    fn bind(&mut self, variable: &str, ty: DataType) -> Result<()> {
        if self.scope.declare(variable, ty).is_err() {
            bail!(Error::internal(format!("loop variable `{variable}` already bound")));
        }
        Ok(())
    }

    fn bind_row(&mut self, variable: &str, row: Relation) -> Result<()> {
        if self.scope.declare_row(variable, row).is_err() {
            bail!(Error::internal(format!("loop variable `{variable}` already bound")));
        }
        Ok(())
    }

    fn returns(&mut self) -> Option<&'a ProcedureReturn> {
        let procedure = self.procedure;
        let returns = procedure.returns.as_ref();
        if returns.is_none() {
            let err = Error::simple(format!("procedure `{}` does not return anything", procedure.name));
            self.report(ErrorKind::Semantic, err, None);
        }
        returns
    }

    fn check_return(&mut self, values: &[PExpr], sql: Option<&SqlStatement>) -> Result<()> {
        if values.is_empty() && sql.is_none() && self.procedure.returns.is_none() {
            return Ok(());
        }
        let returns = match self.returns() {
            Some(returns) => returns,
            None => return Ok(()),
        };

        if returns.is_table {
            let sql = match sql {
                Some(sql) => sql,
                None => {
                    let err = Error::simple("a procedure returning a table must return a SQL statement");
                    self.report(ErrorKind::Semantic, err, None);
                    return Ok(());
                }
            };

            let relation = self.analyze_sql(sql)?;
            for field in &returns.fields {
                match relation.attribute(&field.name) {
                    Some(attribute) => {
                        let who = format!("returned column `{}`", field.name);
                        self.check_assignable(&who, &field.ty, &attribute.ty, None);
                    }
                    None => {
                        let reason = Reason::NotFound {
                            name: field.name.clone(),
                            namespace: "returned column".to_string(),
                        };
                        self.report(ErrorKind::Semantic, reason, None);
                    }
                }
            }
            return Ok(());
        }

        if let Some(sql) = sql {
            self.analyze_sql(sql)?;
            let err = Error::simple("a procedure that does not return a table must return values");
            self.report(ErrorKind::Semantic, err, None);
            return Ok(());
        }
        self.check_returned_values(values, &returns.fields)
    }

    fn check_return_next(&mut self, values: &[PExpr]) -> Result<()> {
        if !self.scope.in_loop() {
            let err = Error::simple("RETURN NEXT used outside of a loop");
            self.report(ErrorKind::Semantic, err, None);
            return Ok(());
        }
        let returns = match self.returns() {
            Some(returns) => returns,
            None => return Ok(()),
        };
        if !returns.is_table {
            let err = Error::simple("RETURN NEXT can only be used in procedures returning a table");
            self.report(ErrorKind::Semantic, err, None);
            return Ok(());
        }
        self.check_returned_values(values, &returns.fields)
    }

    fn check_returned_values(&mut self, values: &[PExpr], fields: &[NamedType]) -> Result<()> {
        if values.len() != fields.len() {
            let reason = Reason::Expected {
                who: Some(format!("procedure `{}`", self.procedure.name)),
                expected: format!("{} returned values", fields.len()),
                found: values.len().to_string(),
            };
            self.report(ErrorKind::Type, reason, None);
            return Ok(());
        }

        for (value, field) in values.iter().zip(fields) {
            let found = self.expr_type(value)?;
            let who = format!("returned value `{}`", field.name);
            self.check_assignable(&who, &field.ty, &found, value.span);
        }
        Ok(())
    }

    /// Type checks embedded SQL with the scalar variables in scope as bind
    /// parameters.
    fn analyze_sql(&mut self, sql: &SqlStatement) -> Result<Relation> {
        let offset = self.span.map(|s| s.start).unwrap_or_default();
        let mut child = self.diagnostics.child("sql-types", offset);

        let options = AnalyzeOptions {
            bind_params: self.scope.variables().clone(),
            verify_procedures: true,
            ..AnalyzeOptions::default()
        };
        let (_, relation) = analyze_validated(sql.clone(), self.schema, &options, &mut child)?;

        self.diagnostics.absorb(child);
        Ok(relation)
    }

    /// Resolves a call and checks its arguments. Returns `None` after
    /// reporting a failure.
    fn call_result(&mut self, call: &CallExpr, span: Option<Span>) -> Result<Option<CallResult>> {
        let schema = self.schema;
        let mut args = Vec::with_capacity(call.args().len());
        for arg in call.args() {
            args.push(self.expr_type(arg)?);
        }

        match call {
            CallExpr::Local { name, .. } => match resolve_call(schema, name, &args, false) {
                Ok(result) => Ok(Some(result)),
                Err(reason) => {
                    let kind = match reason {
                        Reason::NotFound { .. } => ErrorKind::Semantic,
                        _ => ErrorKind::Type,
                    };
                    self.report(kind, reason, span);
                    Ok(None)
                }
            },

            CallExpr::Foreign {
                name, context_args, ..
            } => {
                let foreign = match schema.find_foreign_procedure(name) {
                    Some(foreign) => foreign,
                    None => {
                        let reason = Reason::NotFound {
                            name: name.clone(),
                            namespace: "foreign procedure".to_string(),
                        };
                        self.report(ErrorKind::Semantic, reason, span);
                        return Ok(None);
                    }
                };

                if context_args.len() != 2 {
                    let err = Error::simple("foreign calls take exactly two context arguments");
                    self.report(ErrorKind::Type, err, span);
                }
                for arg in context_args {
                    let ty = self.expr_type(arg)?;
                    if !DataType::TEXT.matches(&ty) {
                        let reason = type_mismatch("context argument", &DataType::TEXT, &ty);
                        self.report(ErrorKind::Type, reason, arg.span.or(span));
                    }
                }

                if let Err(reason) = check_arguments(&foreign.name, &foreign.parameters, &args) {
                    self.report(ErrorKind::Type, reason, span);
                    return Ok(None);
                }

                Ok(Some(match &foreign.returns {
                    Some(returns) => CallResult {
                        fields: returns.fields.clone(),
                        is_table: returns.is_table,
                    },
                    None => CallResult {
                        fields: Vec::new(),
                        is_table: false,
                    },
                }))
            }
        }
    }

    fn expr_type(&mut self, expr: &PExpr) -> Result<DataType> {
        let ty = self.expr_kind_type(&expr.kind, expr.span)?;
        Ok(expr.cast.clone().unwrap_or(ty))
    }

    fn expr_kind_type(&mut self, kind: &PExprKind, span: Option<Span>) -> Result<DataType> {
        Ok(match kind {
            PExprKind::Literal(literal) => literal_type(literal),

            PExprKind::MakeArray(items) => {
                let mut element: Option<DataType> = None;
                let mut ok = true;
                for item in items {
                    let ty = self.expr_type(item)?;
                    if ty.is_array {
                        let err = Error::simple("arrays cannot contain arrays");
                        self.report(ErrorKind::Type, err, item.span);
                        ok = false;
                        continue;
                    }
                    match &element {
                        None => element = Some(ty),
                        Some(expected) if expected.matches(&ty) => {}
                        Some(expected) => {
                            let reason = type_mismatch("array element", expected, &ty);
                            self.report(ErrorKind::Type, reason, item.span);
                            ok = false;
                        }
                    }
                }
                match (ok, element) {
                    (true, Some(element)) => DataType::array(element.name),
                    _ => DataType::UNKNOWN,
                }
            }

            PExprKind::Call(call) => match self.call_result(call, span)? {
                Some(result) => self.single_value(call.name(), result, span),
                None => DataType::UNKNOWN,
            },

            PExprKind::Variable(name) => {
                if let Some(ty) = self.scope.variable(name) {
                    ty.clone()
                } else if self.scope.row(name).is_some() {
                    let err = Error::simple(format!("row `{}` cannot be used as a value", display_name(name)))
                        .with_help("access one of its fields");
                    self.report(ErrorKind::Type, err, span);
                    DataType::UNKNOWN
                } else {
                    self.report(ErrorKind::Type, undeclared(name), span);
                    DataType::UNKNOWN
                }
            }

            PExprKind::ArrayAccess { target, index } => {
                let index_ty = self.expr_type(index)?;
                if !DataType::INT.matches(&index_ty) {
                    let reason = type_mismatch("array index", &DataType::INT, &index_ty);
                    self.report(ErrorKind::Type, reason, index.span);
                }

                let target_ty = self.expr_type(target)?;
                if target_ty.is_array {
                    target_ty.element()
                } else if target_ty.is_unknown() {
                    DataType::UNKNOWN
                } else {
                    let reason = Reason::Expected {
                        who: Some("array access".to_string()),
                        expected: "an array".to_string(),
                        found: format!("type `{target_ty}`"),
                    };
                    self.report(ErrorKind::Type, reason, target.span);
                    DataType::UNKNOWN
                }
            }

            PExprKind::FieldAccess { target, field } => self.field_type(target, field, span),

            PExprKind::Paren(inner) => self.expr_type(inner)?,

            PExprKind::Comparison { left, op, right } => {
                let left = self.expr_type(left)?;
                let right = self.expr_type(right)?;
                if left.is_null() || right.is_null() || left.matches(&right) {
                    DataType::BOOL
                } else {
                    let reason = type_mismatch(&format!("operator `{op}`"), &left, &right);
                    self.report(ErrorKind::Type, reason, span);
                    DataType::UNKNOWN
                }
            }

            PExprKind::Arithmetic { left, op, right } => {
                let left = self.expr_type(left)?;
                let right = self.expr_type(right)?;
                let who = format!("operator `{op}`");
                if !left.matches(&right) {
                    self.report(ErrorKind::Type, type_mismatch(&who, &left, &right), span);
                    DataType::UNKNOWN
                } else if !DataType::INT.matches(&left) {
                    self.report(ErrorKind::Type, type_mismatch(&who, &DataType::INT, &left), span);
                    DataType::UNKNOWN
                } else {
                    DataType::INT
                }
            }
        })
    }

    fn field_type(&mut self, target: &PExpr, field: &str, span: Option<Span>) -> DataType {
        let name = match &target.kind {
            PExprKind::Variable(name) => name,
            _ => {
                let err = Error::simple("fields can only be accessed on row variables");
                self.report(ErrorKind::Type, err, span);
                return DataType::UNKNOWN;
            }
        };

        if let Some(row) = self.scope.row(name) {
            return match row.attribute(field) {
                Some(attribute) => attribute.ty.clone(),
                None => {
                    let reason = Reason::NotFound {
                        name: format!("{}.{field}", display_name(name)),
                        namespace: "field".to_string(),
                    };
                    self.report(ErrorKind::Type, reason, span);
                    DataType::UNKNOWN
                }
            };
        }

        match self.scope.variable(name) {
            // a loop variable whose target failed to check
            Some(ty) if ty.is_unknown() => {}
            Some(_) => {
                let err = Error::simple(format!("`{}` is not a row", display_name(name)))
                    .with_help("fields can only be accessed on row variables");
                self.report(ErrorKind::Type, err, span);
            }
            None => self.report(ErrorKind::Type, undeclared(name), span),
        }
        DataType::UNKNOWN
    }

    /// Type of a call used as a value. The call must return exactly one
    /// value.
    fn single_value(&mut self, name: &str, result: CallResult, span: Option<Span>) -> DataType {
        if let Some(ty) = result.single_value() {
            return ty.clone();
        }

        let problem = if result.is_table {
            "returns a table"
        } else if result.fields.is_empty() {
            "does not return anything"
        } else {
            "returns more than one value"
        };
        let err = Error::simple(format!("procedure `{name}` {problem}"))
            .with_help("only procedures returning exactly one value can be used in expressions");
        self.report(ErrorKind::Type, err, span);
        DataType::UNKNOWN
    }
}
