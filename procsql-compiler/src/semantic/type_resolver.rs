use std::collections::{HashMap, HashSet};

use anyhow::{bail, Result};

use super::context::{EvaluationContext, ANONYMOUS};
use super::deferred::*;
use super::relation::{Attribute, QualifiedAttribute, Relation};
use super::AnalyzeOptions;
use crate::ast::*;
use crate::error::{Diagnostics, Error, ErrorKind, Reason, Span, WithErrorInfo};
use crate::functions::resolve_call;
use crate::schema::Schema;

/// Runs type analysis on a statement.
///
/// Returns the relation the statement produces and, for every column
/// reference with an id, the name of the relation it resolved to.
pub fn resolve_types(
    stmt: &SqlStatement,
    schema: &Schema,
    options: &AnalyzeOptions,
    diagnostics: &mut Diagnostics,
) -> Result<(Relation, HashMap<usize, String>)> {
    let producer = stmt.analyze()?.into_relation()?;

    let mut resolver = TypeResolver::new(schema, options, diagnostics)?;
    let relation = producer.eval(&mut resolver, &mut EvaluationContext::new())?;

    Ok((relation, resolver.resolutions))
}

/// AST nodes that compile into a deferred computation.
pub trait Analyze {
    fn analyze(&self) -> Result<Deferred<'_>>;
}

pub(super) fn attribute(expr: &Expr) -> Result<AttributeProducer<'_>> {
    expr.analyze()?.into_attribute()
}

pub(super) fn mutator<N: Analyze + ?Sized>(node: &N) -> Result<ContextMutator<'_>> {
    node.analyze()?.into_mutator()
}

pub(super) fn relation<N: Analyze + ?Sized>(node: &N) -> Result<RelationProducer<'_>> {
    node.analyze()?.into_relation()
}

pub(super) fn result_builder<N: Analyze + ?Sized>(node: &N) -> Result<ResultBuilder<'_>> {
    node.analyze()?.into_result()
}

/// Evaluates an expression and checks that it has the expected type.
pub(super) fn expect_clause<'e>(
    expr: &'e Expr,
    who: &'static str,
    expected: DataType,
) -> Result<ContextMutator<'e>> {
    let producer = attribute(expr)?;
    let span = expr.span;
    Ok(ContextMutator::new(move |r, ctx| {
        let found = producer.eval(r, ctx)?;
        r.check_type(who, &expected, found.ty(), span);
        Ok(())
    }))
}

/// State shared by all deferred computations of one statement.
pub struct TypeResolver<'a> {
    pub schema: &'a Schema,
    pub options: &'a AnalyzeOptions,
    pub diagnostics: &'a mut Diagnostics,

    /// Schema tables and common table expressions. They share a namespace.
    common_tables: HashMap<String, Relation>,

    /// Names in `common_tables` that are common table expressions.
    ctes: HashSet<String>,

    /// Column reference id to the name of the relation it resolved to.
    resolutions: HashMap<usize, String>,
}

impl<'a> TypeResolver<'a> {
    pub fn new(
        schema: &'a Schema,
        options: &'a AnalyzeOptions,
        diagnostics: &'a mut Diagnostics,
    ) -> Result<Self> {
        let mut common_tables = HashMap::new();
        for table in &schema.tables {
            let mut relation = Relation::new();
            for column in &table.columns {
                let attribute = Attribute::new(column.ty.clone());
                if let Err(err) = relation.add_attribute(column.name.to_lowercase(), attribute) {
                    bail!(Error::internal(format!("unvalidated schema, table `{}`: {err}", table.name)));
                }
            }
            common_tables.insert(table.name.to_lowercase(), relation);
        }

        Ok(TypeResolver {
            schema,
            options,
            diagnostics,
            common_tables,
            ctes: HashSet::new(),
            resolutions: HashMap::new(),
        })
    }

    pub fn report<E: Into<Error>>(&mut self, kind: ErrorKind, error: E, span: Option<Span>) {
        self.diagnostics.report(kind, error, span);
    }

    /// Reports a type error unless `found` matches `expected`.
    pub fn check_type(&mut self, who: &str, expected: &DataType, found: &DataType, span: Option<Span>) -> bool {
        if expected.matches(found) {
            return true;
        }
        self.report(ErrorKind::Type, type_mismatch(who, expected, found), span);
        false
    }

    pub fn common_table(&self, name: &str) -> Option<&Relation> {
        self.common_tables.get(&name.to_lowercase())
    }

    pub fn is_cte(&self, name: &str) -> bool {
        self.ctes.contains(&name.to_lowercase())
    }

    pub fn add_cte(&mut self, name: &str, relation: Relation) -> Result<(), Error> {
        let key = name.to_lowercase();
        if self.common_tables.contains_key(&key) {
            return Err(Error::new(Reason::Duplicate {
                name: name.to_string(),
                namespace: "table".to_string(),
            })
            .with_help("common table expressions cannot shadow tables"));
        }

        log::trace!("common table expression `{name}`: {relation}");
        self.common_tables.insert(key.clone(), relation);
        self.ctes.insert(key);
        Ok(())
    }

    /// Looks up the table a mutating statement writes to.
    pub fn target_table(&mut self, name: &str, verb: &str, span: Option<Span>) -> Option<Relation> {
        if self.is_cte(name) {
            let err = Error::simple(format!("cannot {verb} common table expression `{name}`"));
            self.report(ErrorKind::Semantic, err, span);
            return None;
        }

        let table = self.common_table(name).cloned();
        if table.is_none() {
            let reason = Reason::NotFound {
                name: name.to_string(),
                namespace: "table".to_string(),
            };
            self.report(ErrorKind::Semantic, reason, span);
        }
        table
    }

    fn resolve_column(&mut self, ctx: &EvaluationContext, column: &ColumnRef, span: Option<Span>) -> QualifiedAttribute {
        match ctx.find_column(column.table.as_deref(), &column.column) {
            Ok(origin) => {
                if let Some(id) = column.id {
                    if origin.table != ANONYMOUS {
                        self.resolutions.insert(id, origin.table);
                    }
                }
                QualifiedAttribute {
                    name: column.column.clone(),
                    attribute: origin.attribute,
                }
            }
            Err(err) => {
                self.report(ErrorKind::Semantic, err, span);
                QualifiedAttribute::new(column.column.clone(), DataType::UNKNOWN)
            }
        }
    }

    fn bind_parameter(&mut self, name: &str, span: Option<Span>) -> DataType {
        if let Some(ty) = self.options.bind_params.get(name) {
            return ty.clone();
        }
        if !self.options.arbitrary_binds {
            let reason = Reason::NotFound {
                name: name.to_string(),
                namespace: "bind parameter".to_string(),
            };
            self.report(ErrorKind::Semantic, reason, span);
        }
        DataType::UNKNOWN
    }

    fn binary_type(&mut self, op: BinOp, left: &DataType, right: &DataType, span: Option<Span>) -> DataType {
        let who = format!("operator `{op}`");
        let operands = |r: &mut Self, expected: DataType| {
            let left_ok = r.check_type(&who, &expected, left, span);
            let right_ok = r.check_type(&who, &expected, right, span);
            if left_ok && right_ok {
                expected
            } else {
                DataType::UNKNOWN
            }
        };

        if op.is_arithmetic() {
            return operands(self, DataType::INT);
        }
        match op {
            BinOp::Concat => operands(self, DataType::TEXT),
            BinOp::And | BinOp::Or => operands(self, DataType::BOOL),
            _ => {
                if left.is_null() || right.is_null() || self.check_type(&who, left, right, span) {
                    DataType::BOOL
                } else {
                    DataType::UNKNOWN
                }
            }
        }
    }

    /// Type of a function or procedure call used as a value.
    fn call_type(&mut self, call: &FunctionCall, args: &[DataType], span: Option<Span>) -> DataType {
        let result = match resolve_call(self.schema, &call.name, args, call.star) {
            Ok(result) => result,
            Err(reason) => {
                let kind = match reason {
                    Reason::NotFound { .. } => ErrorKind::Semantic,
                    _ => ErrorKind::Type,
                };
                self.report(kind, reason, span);
                return DataType::UNKNOWN;
            }
        };

        if let Some(ty) = result.single_value() {
            return ty.clone();
        }

        let returns_nothing_or_table = result.is_table || result.fields.is_empty();
        if returns_nothing_or_table && !self.options.verify_procedures {
            return DataType::NULL;
        }

        let problem = if result.is_table {
            "returns a table"
        } else if result.fields.is_empty() {
            "does not return anything"
        } else {
            "returns more than one value"
        };
        let err = Error::simple(format!("procedure `{}` {problem}", call.name))
            .with_help("only procedures returning exactly one value can be used in expressions");
        self.report(ErrorKind::Type, err, span);
        DataType::UNKNOWN
    }

    /// Procedure used as a relation in FROM.
    pub fn table_function(&mut self, call: &FunctionCall, args: &[DataType], span: Option<Span>) -> Option<Relation> {
        let result = match resolve_call(self.schema, &call.name, args, call.star) {
            Ok(result) => result,
            Err(reason) => {
                self.report(ErrorKind::Semantic, reason, span);
                return None;
            }
        };

        if !result.is_table {
            let err = Error::simple(format!("procedure `{}` does not return a table", call.name));
            self.report(ErrorKind::Type, err, span);
            return None;
        }

        let columns = result.fields.into_iter().map(|f| (f.name, f.ty));
        match Relation::from_columns(columns) {
            Ok(relation) => Some(relation),
            Err(err) => {
                self.report(ErrorKind::Semantic, err, span);
                None
            }
        }
    }
}

pub(super) fn type_mismatch(who: &str, expected: &DataType, found: &DataType) -> Reason {
    Reason::Expected {
        who: Some(who.to_string()),
        expected: format!("type `{expected}`"),
        found: format!("type `{found}`"),
    }
}

pub(super) fn literal_type(literal: &Literal) -> DataType {
    match literal {
        Literal::Null => DataType::NULL,
        Literal::Integer(_) => DataType::INT,
        Literal::Text(_) => DataType::TEXT,
        Literal::Boolean(_) => DataType::BOOL,
        Literal::Blob(_) => DataType::BLOB,
    }
}

impl Analyze for Expr {
    fn analyze(&self) -> Result<Deferred<'_>> {
        let inner = analyze_expr_kind(&self.kind, self.span)?;

        let producer = match &self.cast {
            None => inner,
            Some(cast) => AttributeProducer::new(move |r, ctx| {
                let found = inner.eval(r, ctx)?;
                Ok(QualifiedAttribute::new(found.name, cast.clone()))
            }),
        };
        Ok(producer.into())
    }
}

fn analyze_expr_kind(kind: &ExprKind, span: Option<Span>) -> Result<AttributeProducer<'_>> {
    Ok(match kind {
        ExprKind::Literal(literal) => {
            let ty = literal_type(literal);
            AttributeProducer::new(move |_, _| Ok(QualifiedAttribute::anonymous(ty)))
        }

        ExprKind::BindParameter(name) => AttributeProducer::new(move |r, _| {
            Ok(QualifiedAttribute::anonymous(r.bind_parameter(name, span)))
        }),

        ExprKind::Column(column) => {
            AttributeProducer::new(move |r, ctx| Ok(r.resolve_column(ctx, column, span)))
        }

        ExprKind::Unary { op, expr } => {
            let (op, inner) = (*op, attribute(expr)?);
            AttributeProducer::new(move |r, ctx| {
                let found = inner.eval(r, ctx)?;
                let expected = match op {
                    UnaryOp::Not => DataType::BOOL,
                    UnaryOp::Neg | UnaryOp::Pos => DataType::INT,
                };
                let who = format!("operator `{op}`");
                let ty = if r.check_type(&who, &expected, found.ty(), span) {
                    expected
                } else {
                    DataType::UNKNOWN
                };
                Ok(QualifiedAttribute::anonymous(ty))
            })
        }

        ExprKind::Binary { left, op, right } => {
            let (left, op, right) = (attribute(left)?, *op, attribute(right)?);
            AttributeProducer::new(move |r, ctx| {
                let left = left.eval(r, ctx)?;
                let right = right.eval(r, ctx)?;
                let ty = r.binary_type(op, left.ty(), right.ty(), span);
                Ok(QualifiedAttribute::anonymous(ty))
            })
        }

        ExprKind::StringCompare {
            left,
            op,
            right,
            escape,
        } => {
            let op = *op;
            let (left, right) = (attribute(left)?, attribute(right)?);
            let escape = escape.as_deref().map(attribute).transpose()?;
            AttributeProducer::new(move |r, ctx| {
                let left = left.eval(r, ctx)?;
                let right = right.eval(r, ctx)?;
                let mut ok = r.check_type(&format!("operator `{op}`"), left.ty(), right.ty(), span);
                if let Some(escape) = escape {
                    let escape = escape.eval(r, ctx)?;
                    ok &= r.check_type("ESCAPE", &DataType::TEXT, escape.ty(), span);
                }
                Ok(QualifiedAttribute::anonymous(bool_or_unknown(ok)))
            })
        }

        ExprKind::Is { left, right, .. } => {
            let (left, right) = (attribute(left)?, attribute(right)?);
            AttributeProducer::new(move |r, ctx| {
                let left = left.eval(r, ctx)?;
                let right = right.eval(r, ctx)?;
                let ok = left.ty().is_null()
                    || right.ty().is_null()
                    || r.check_type("operator `IS`", left.ty(), right.ty(), span);
                Ok(QualifiedAttribute::anonymous(bool_or_unknown(ok)))
            })
        }

        ExprKind::Between { expr, low, high, .. } => {
            let expr_producer = attribute(expr)?;
            let (low, high) = (attribute(low)?, attribute(high)?);
            AttributeProducer::new(move |r, ctx| {
                let subject = expr_producer.eval(r, ctx)?;
                let low = low.eval(r, ctx)?;
                let high = high.eval(r, ctx)?;
                let check_bound = |r: &mut TypeResolver, who: &str, bound: &DataType| {
                    subject.ty().is_null() || bound.is_null() || r.check_type(who, subject.ty(), bound, span)
                };
                let low_ok = check_bound(r, "lower bound of BETWEEN", low.ty());
                let high_ok = check_bound(r, "upper bound of BETWEEN", high.ty());
                Ok(QualifiedAttribute::anonymous(bool_or_unknown(low_ok && high_ok)))
            })
        }

        ExprKind::Case {
            subject,
            when_then,
            otherwise,
        } => {
            let subject = subject.as_deref().map(attribute).transpose()?;
            let arms: Vec<_> = when_then
                .iter()
                .map(|wt| Ok((attribute(&wt.when)?, attribute(&wt.then)?)))
                .collect::<Result<_>>()?;
            let otherwise = otherwise.as_deref().map(attribute).transpose()?;

            AttributeProducer::new(move |r, ctx| {
                let subject = match subject {
                    Some(s) => Some(s.eval(r, ctx)?.attribute.ty),
                    None => None,
                };

                let mut ok = true;
                let mut result: Option<DataType> = None;
                let mut check_result = |r: &mut TypeResolver, found: &DataType| {
                    if found.is_null() {
                        return true;
                    }
                    if let Some(expected) = result.clone() {
                        return r.check_type("CASE result", &expected, found, span);
                    }
                    result = Some(found.clone());
                    true
                };

                for (when, then) in arms {
                    let when = when.eval(r, ctx)?;
                    ok &= match &subject {
                        Some(subject) => r.check_type("WHEN of CASE", subject, when.ty(), span),
                        None => r.check_type("WHEN of CASE", &DataType::BOOL, when.ty(), span),
                    };

                    let then = then.eval(r, ctx)?;
                    ok &= check_result(r, then.ty());
                }
                if let Some(otherwise) = otherwise {
                    let otherwise = otherwise.eval(r, ctx)?;
                    ok &= check_result(r, otherwise.ty());
                }

                let ty = match (ok, result) {
                    (false, _) => DataType::UNKNOWN,
                    (true, Some(ty)) => ty,
                    (true, None) => DataType::NULL,
                };
                Ok(QualifiedAttribute::anonymous(ty))
            })
        }

        ExprKind::Collate { expr, .. } => attribute(expr)?,

        ExprKind::Function(call) => {
            let args: Vec<_> = call.args.iter().map(attribute).collect::<Result<_>>()?;
            AttributeProducer::new(move |r, ctx| {
                let mut types = Vec::with_capacity(args.len());
                for arg in args {
                    types.push(arg.eval(r, ctx)?.attribute.ty);
                }
                let ty = r.call_type(call, &types, span);
                Ok(QualifiedAttribute::anonymous(ty))
            })
        }

        ExprKind::Subquery {
            select,
            exists,
            not,
        } => {
            let (exists, not) = (*exists, *not);
            let select = relation(&**select)?;
            AttributeProducer::new(move |r, ctx| {
                if not && !exists {
                    let err = Error::simple("NOT can only be applied to EXISTS subqueries");
                    r.report(ErrorKind::Semantic, err, span);
                }

                let relation = select.eval(r, ctx)?;
                if exists {
                    return Ok(QualifiedAttribute::anonymous(DataType::BOOL));
                }

                let ty = match relation.shape().as_slice() {
                    [ty] => ty.clone(),
                    shape => {
                        let reason = Reason::Expected {
                            who: Some("subquery".to_string()),
                            expected: "exactly one column".to_string(),
                            found: format!("{} columns", shape.len()),
                        };
                        r.report(ErrorKind::Type, reason, span);
                        DataType::UNKNOWN
                    }
                };
                Ok(QualifiedAttribute::anonymous(ty))
            })
        }

        ExprKind::List(items) => {
            let items: Vec<_> = items.iter().map(attribute).collect::<Result<_>>()?;
            AttributeProducer::new(move |r, ctx| {
                let mut ok = true;
                let mut first: Option<DataType> = None;
                for item in items {
                    let item = item.eval(r, ctx)?;
                    match &first {
                        None => first = Some(item.attribute.ty),
                        Some(expected) => {
                            ok &= item.ty().is_null() || r.check_type("list element", expected, item.ty(), span)
                        }
                    }
                }

                let ty = match (ok, first) {
                    (true, Some(ty)) => ty,
                    _ => DataType::UNKNOWN,
                };
                Ok(QualifiedAttribute::anonymous(ty))
            })
        }
    })
}

fn bool_or_unknown(ok: bool) -> DataType {
    if ok {
        DataType::BOOL
    } else {
        DataType::UNKNOWN
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;
    use itertools::Itertools;
    use serde_yaml::from_str;

    use super::*;
    use crate::semantic::test::{render, test_options, test_schema};

    fn resolve(yaml: &str) -> (Relation, Vec<String>) {
        let stmt: SqlStatement = from_str(yaml).unwrap();
        let schema = test_schema();
        let options = test_options();
        let mut diagnostics = Diagnostics::new();

        let (relation, _) = resolve_types(&stmt, &schema, &options, &mut diagnostics).unwrap();
        (relation, render(diagnostics))
    }

    #[test]
    fn test_literals_and_casts() {
        let (relation, errors) = resolve(
            r#"
            Select:
              selects:
                - columns:
                    - Expr:
                        expr:
                          Literal:
                            Integer: 1
                        alias: one
                    - Expr:
                        expr:
                          Literal:
                            Text: a
                          cast: int
                        alias: casted
                    - Expr:
                        expr:
                          BindParameter: $id
                        alias: param
            "#,
        );
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(relation.to_string(), "[one: int, casted: int, param: int]");
    }

    #[test]
    fn test_arithmetic_type_error() {
        let (relation, errors) = resolve(
            r#"
            Select:
              selects:
                - columns:
                    - Expr:
                        expr:
                          Binary:
                            left:
                              Column:
                                column: name
                            op: Add
                            right:
                              Literal:
                                Integer: 1
                        alias: x
                  from:
                    relation:
                      Table:
                        name: users
            "#,
        );
        assert_snapshot!(errors.iter().join("\n"), @"type error: operator `+` expected type `int`, but found type `text`");
        assert_eq!(relation.to_string(), "[x: unknown]");
    }

    #[test]
    fn test_unknown_bind_parameter() {
        let (_, errors) = resolve(
            r#"
            Select:
              selects:
                - columns:
                    - Expr:
                        expr:
                          BindParameter: $missing
                        alias: x
            "#,
        );
        assert_snapshot!(errors.iter().join("\n"), @"semantic error: bind parameter `$missing` not found");
    }

    #[test]
    fn test_case_and_function_types() {
        let (relation, errors) = resolve(
            r#"
            Select:
              selects:
                - columns:
                    - Expr:
                        expr:
                          Case:
                            when_then:
                              - when:
                                  Binary:
                                    left:
                                      Column:
                                        column: id
                                    op: Gt
                                    right:
                                      Literal:
                                        Integer: 10
                                then:
                                  Function:
                                    name: upper
                                    args:
                                      - Column:
                                          column: name
                            else:
                              Literal: Null
                        alias: label
                    - Expr:
                        expr:
                          Function:
                            name: count
                            star: true
                        alias: total
                  from:
                    relation:
                      Table:
                        name: users
                  group_by:
                    exprs:
                      - Column:
                          column: id
            "#,
        );
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(relation.to_string(), "[label: text, total: int]");
    }

    #[test]
    fn test_subquery_must_return_one_column() {
        let (_, errors) = resolve(
            r#"
            Select:
              selects:
                - columns:
                    - Expr:
                        expr:
                          Subquery:
                            select:
                              selects:
                                - columns: [Star]
                                  from:
                                    relation:
                                      Table:
                                        name: users
                        alias: x
                    - Expr:
                        expr:
                          Subquery:
                            not: true
                            select:
                              selects:
                                - columns:
                                    - Expr:
                                        expr:
                                          Column:
                                            column: id
                                  from:
                                    relation:
                                      Table:
                                        name: users
                        alias: y
            "#,
        );
        assert_snapshot!(errors.iter().join("\n"), @r###"
        type error: subquery expected exactly one column, but found 2 columns
        semantic error: NOT can only be applied to EXISTS subqueries
        "###);
    }

    #[test]
    fn test_unaliased_expression_needs_name() {
        let (relation, errors) = resolve(
            r#"
            Select:
              selects:
                - columns:
                    - Expr:
                        expr:
                          Literal:
                            Integer: 1
            "#,
        );
        assert_snapshot!(errors.iter().join("\n"), @"semantic error: result column has no name (give the expression a name with `AS`)");
        assert!(relation.is_empty());
    }

    #[test]
    fn test_null_comparisons() {
        let (relation, errors) = resolve(
            r#"
            Select:
              selects:
                - columns:
                    - Expr:
                        expr:
                          Between:
                            expr:
                              Column:
                                column: id
                            low:
                              Literal: Null
                            high:
                              Literal:
                                Integer: 5
                        alias: between
                    - Expr:
                        expr:
                          Is:
                            left:
                              Column:
                                column: name
                            right:
                              Literal: Null
                        alias: is_null
                    - Expr:
                        expr:
                          Is:
                            left:
                              Column:
                                column: name
                            right:
                              Literal: Null
                            not: true
                            distinct: true
                        alias: is_distinct
                    - Expr:
                        expr:
                          Is:
                            left:
                              Column:
                                column: id
                            right:
                              Column:
                                column: name
                        alias: mismatch
                  from:
                    relation:
                      Table:
                        name: users
                  where:
                    Between:
                      expr:
                        Column:
                          column: id
                      low:
                        Literal: Null
                      high:
                        Literal:
                          Integer: 5
            "#,
        );
        assert_snapshot!(errors.iter().join("\n"), @"type error: operator `IS` expected type `int`, but found type `text`");
        assert_eq!(
            relation.to_string(),
            "[between: bool, is_null: bool, is_distinct: bool, mismatch: unknown]"
        );
    }

    #[test]
    fn test_like_escape_must_be_text() {
        let (relation, errors) = resolve(
            r#"
            Select:
              selects:
                - columns:
                    - Expr:
                        expr:
                          StringCompare:
                            left:
                              Column:
                                column: name
                            op: Like
                            right:
                              Literal:
                                Text: "a!%%"
                            escape:
                              Literal:
                                Text: "!"
                        alias: escaped
                    - Expr:
                        expr:
                          StringCompare:
                            left:
                              Column:
                                column: name
                            op: Like
                            right:
                              Literal:
                                Text: "a%"
                            escape:
                              Literal:
                                Integer: 1
                        alias: bad_escape
                  from:
                    relation:
                      Table:
                        name: users
            "#,
        );
        assert_snapshot!(errors.iter().join("\n"), @"type error: ESCAPE expected type `text`, but found type `int`");
        assert_eq!(relation.to_string(), "[escaped: bool, bad_escape: unknown]");
    }

    #[test]
    fn test_exists_is_bool_for_any_shape() {
        let (relation, errors) = resolve(
            r#"
            Select:
              selects:
                - columns:
                    - Expr:
                        expr:
                          Subquery:
                            exists: true
                            select:
                              selects:
                                - columns: [Star]
                                  from:
                                    relation:
                                      Table:
                                        name: posts
                        alias: has_posts
            "#,
        );
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(relation.to_string(), "[has_posts: bool]");
    }

    #[test]
    fn test_unvalidated_schema_is_internal_error() {
        let column = crate::schema::Column {
            name: "id".to_string(),
            ty: DataType::INT,
        };
        let schema = Schema {
            tables: vec![crate::schema::Table {
                name: "twice".to_string(),
                columns: vec![column.clone(), column],
            }],
            ..Schema::default()
        };
        let options = AnalyzeOptions::default();
        let mut diagnostics = Diagnostics::new();

        let err = TypeResolver::new(&schema, &options, &mut diagnostics).err().unwrap();
        assert!(err.downcast_ref::<Error>().unwrap().is_internal());
        assert!(diagnostics.is_empty());
    }
}
