//! Analysis of statements and clauses.
//!
//! Expressions are handled in [super::type_resolver]. Everything here decides
//! in which context each part of a statement is evaluated.

use anyhow::{bail, Result};

use super::context::EvaluationContext;
use super::deferred::*;
use super::relation::{QualifiedRelation, Relation};
use super::type_resolver::*;
use crate::ast::*;
use crate::error::{Error, ErrorKind, Reason, Span};

impl Analyze for SqlStatement {
    fn analyze(&self) -> Result<Deferred<'_>> {
        Ok(match self {
            SqlStatement::Select(select) => relation(select)?,
            SqlStatement::Insert(insert) => relation(insert)?,
            SqlStatement::Update(update) => relation(update)?,
            SqlStatement::Delete(delete) => relation(delete)?,
        }
        .into())
    }
}

fn ctes(ctes: &[Cte]) -> Result<Vec<ContextMutator<'_>>> {
    ctes.iter().map(mutator).collect()
}

fn eval_all(mutators: Vec<ContextMutator>, r: &mut TypeResolver, ctx: &mut EvaluationContext) -> Result<()> {
    for mutator in mutators {
        mutator.eval(r, ctx)?;
    }
    Ok(())
}

fn eval_optional(mutator: Option<ContextMutator>, r: &mut TypeResolver, ctx: &mut EvaluationContext) -> Result<()> {
    match mutator {
        Some(mutator) => mutator.eval(r, ctx),
        None => Ok(()),
    }
}

/// Joins a relation, reporting a failed join instead of aborting.
fn join_or_report(r: &mut TypeResolver, ctx: &mut EvaluationContext, relation: QualifiedRelation, span: Option<Span>) {
    if let Err(err) = ctx.join(relation) {
        r.report(ErrorKind::Semantic, err, span);
    }
}

impl Analyze for SelectStmt {
    fn analyze(&self) -> Result<Deferred<'_>> {
        let ctes = ctes(&self.ctes)?;
        let core = relation(&self.core)?;

        Ok(RelationProducer::new(move |r, ctx| {
            eval_all(ctes, r, ctx)?;
            core.eval(r, ctx)
        })
        .into())
    }
}

impl Analyze for SelectCore {
    fn analyze(&self) -> Result<Deferred<'_>> {
        if self.selects.is_empty() {
            bail!(Error::internal("select without any simple select"));
        }

        let mut arms = Vec::with_capacity(self.selects.len());
        for (index, select) in self.selects.iter().enumerate() {
            let operator = match (index, select.compound) {
                (0, _) => None,
                (_, Some(operator)) => Some(operator),
                (_, None) => bail!(Error::internal("compound select without an operator")),
            };
            arms.push((operator, relation(select)?));
        }
        let order_by = self.order_by.as_ref().map(mutator).transpose()?;
        let limit = self.limit.as_ref().map(mutator).transpose()?;

        Ok(RelationProducer::new(move |r, ctx| {
            let mut arms = arms.into_iter();
            let first = match arms.next() {
                Some((_, first)) => first,
                None => bail!(Error::internal("select without any simple select")),
            };

            let mut first_ctx = ctx.scope();
            let result = first.eval(r, &mut first_ctx)?;

            let mut is_compound = false;
            for (operator, arm) in arms {
                is_compound = true;

                let relation = arm.eval(r, &mut ctx.scope())?;
                if !shapes_match(&result, &relation) {
                    let operator = operator.map(|o| o.to_string()).unwrap_or_default();
                    let reason = Reason::CompoundShape(format!(
                        "{operator} combines {result} with {relation}"
                    ));
                    r.report(ErrorKind::Semantic, reason, None);
                }
            }

            if is_compound {
                // terms of a compound select can only refer to its result
                let mut tail_ctx = ctx.copy();
                join_or_report(r, &mut tail_ctx, QualifiedRelation::anonymous(result.clone()), None);
                eval_optional(order_by, r, &mut tail_ctx)?;
                eval_optional(limit, r, &mut tail_ctx)?;
            } else {
                eval_optional(order_by, r, &mut first_ctx)?;
                eval_optional(limit, r, &mut first_ctx)?;
            }

            Ok(result)
        })
        .into())
    }
}

fn shapes_match(a: &Relation, b: &Relation) -> bool {
    let (a, b) = (a.shape(), b.shape());
    a.len() == b.len() && a.iter().zip(&b).all(|(a, b)| a.matches(b))
}

impl Analyze for SimpleSelect {
    fn analyze(&self) -> Result<Deferred<'_>> {
        let from = self.from.as_ref().map(mutator).transpose()?;
        let filter = (self.filter.as_ref())
            .map(|f| expect_clause(f, "WHERE clause", DataType::BOOL))
            .transpose()?;
        let columns = result_builder(&self.columns)?;
        let group_by = self.group_by.as_ref().map(mutator).transpose()?;
        let group_span = (self.group_by.as_ref())
            .and_then(|g| g.exprs.first())
            .and_then(|e| e.span);

        Ok(RelationProducer::new(move |r, ctx| {
            eval_optional(from, r, ctx)?;
            eval_optional(filter, r, ctx)?;

            let mut result = Relation::new();
            columns.eval(r, ctx, &mut result)?;

            if let Some(group_by) = group_by {
                let mut grouped = ctx.copy();
                if let Err(err) = grouped.merge_anonymous_safe(&result) {
                    r.report(ErrorKind::Semantic, err, group_span);
                }
                group_by.eval(r, &mut grouped)?;
            }

            Ok(result)
        })
        .into())
    }
}

impl Analyze for FromClause {
    fn analyze(&self) -> Result<Deferred<'_>> {
        let relation = mutator(&self.relation)?;
        let joins: Vec<_> = self.joins.iter().map(mutator).collect::<Result<_>>()?;

        Ok(ContextMutator::new(move |r, ctx| {
            relation.eval(r, ctx)?;
            eval_all(joins, r, ctx)
        })
        .into())
    }
}

impl Analyze for TableOrSubquery {
    fn analyze(&self) -> Result<Deferred<'_>> {
        Ok(match self {
            TableOrSubquery::Table { name, alias } => ContextMutator::new(move |r, ctx| {
                let relation = match r.common_table(name) {
                    Some(relation) => relation.clone(),
                    None => {
                        let reason = Reason::NotFound {
                            name: name.clone(),
                            namespace: "table".to_string(),
                        };
                        r.report(ErrorKind::Semantic, reason, None);
                        return Ok(());
                    }
                };

                let joined_as = alias.as_ref().unwrap_or(name);
                join_or_report(r, ctx, QualifiedRelation::new(joined_as, relation), None);
                Ok(())
            }),

            TableOrSubquery::Subquery { select, alias } => {
                let select = relation(&**select)?;
                ContextMutator::new(move |r, ctx| {
                    let relation = select.eval(r, ctx)?;
                    let relation = match alias {
                        Some(alias) => QualifiedRelation::new(alias, relation),
                        None => QualifiedRelation::anonymous(relation),
                    };
                    join_or_report(r, ctx, relation, None);
                    Ok(())
                })
            }

            TableOrSubquery::Function { call, alias } => {
                let args: Vec<_> = call.args.iter().map(attribute).collect::<Result<_>>()?;
                let span = call.args.first().and_then(|a| a.span);
                ContextMutator::new(move |r, ctx| {
                    let mut types = Vec::with_capacity(args.len());
                    for arg in args {
                        types.push(arg.eval(r, ctx)?.attribute.ty);
                    }

                    if let Some(relation) = r.table_function(call, &types, span) {
                        let joined_as = alias.as_ref().unwrap_or(&call.name);
                        join_or_report(r, ctx, QualifiedRelation::new(joined_as, relation), span);
                    }
                    Ok(())
                })
            }
        }
        .into())
    }
}

impl Analyze for JoinPredicate {
    fn analyze(&self) -> Result<Deferred<'_>> {
        let table = mutator(&self.table)?;
        let constraint = (self.constraint.as_ref())
            .map(|c| expect_clause(c, "ON clause", DataType::BOOL))
            .transpose()?;

        Ok(ContextMutator::new(move |r, ctx| {
            table.eval(r, ctx)?;
            eval_optional(constraint, r, ctx)
        })
        .into())
    }
}

impl Analyze for OrderBy {
    fn analyze(&self) -> Result<Deferred<'_>> {
        let terms: Vec<_> = self.terms.iter().map(|t| attribute(&t.expr)).collect::<Result<_>>()?;

        Ok(ContextMutator::new(move |r, ctx| {
            for term in terms {
                term.eval(r, ctx)?;
            }
            Ok(())
        })
        .into())
    }
}

impl Analyze for Limit {
    fn analyze(&self) -> Result<Deferred<'_>> {
        let limit = expect_clause(&self.limit, "LIMIT", DataType::INT)?;
        let offset = (self.offset.as_ref())
            .map(|o| expect_clause(o, "OFFSET", DataType::INT))
            .transpose()?;

        Ok(ContextMutator::new(move |r, ctx| {
            limit.eval(r, ctx)?;
            eval_optional(offset, r, ctx)
        })
        .into())
    }
}

impl Analyze for GroupBy {
    fn analyze(&self) -> Result<Deferred<'_>> {
        let exprs: Vec<_> = self.exprs.iter().map(attribute).collect::<Result<_>>()?;
        let having = (self.having.as_ref())
            .map(|h| expect_clause(h, "HAVING clause", DataType::BOOL))
            .transpose()?;

        Ok(ContextMutator::new(move |r, ctx| {
            for expr in exprs {
                expr.eval(r, ctx)?;
            }
            eval_optional(having, r, ctx)
        })
        .into())
    }
}

impl Analyze for Cte {
    fn analyze(&self) -> Result<Deferred<'_>> {
        let select = relation(&self.select)?;

        Ok(ContextMutator::new(move |r, ctx| {
            let relation = select.eval(r, &mut ctx.scope())?;

            let relation = if self.columns.is_empty() {
                relation
            } else if self.columns.len() != relation.len() {
                let reason = Reason::Expected {
                    who: Some(format!("common table expression `{}`", self.table)),
                    expected: format!("{} columns", self.columns.len()),
                    found: relation.len().to_string(),
                };
                r.report(ErrorKind::Semantic, reason, None);
                return Ok(());
            } else {
                let renamed = self.columns.iter().cloned().zip(relation.shape());
                match Relation::from_columns(renamed) {
                    Ok(relation) => relation,
                    Err(err) => {
                        r.report(ErrorKind::Semantic, err, None);
                        return Ok(());
                    }
                }
            };

            if let Err(err) = r.add_cte(&self.table, relation) {
                r.report(ErrorKind::Semantic, err, None);
            }
            Ok(())
        })
        .into())
    }
}

impl Analyze for ResultColumn {
    fn analyze(&self) -> Result<Deferred<'_>> {
        Ok(match self {
            ResultColumn::Star => ResultBuilder::new(|r, ctx, result| {
                if ctx.joined_relations().next().is_none() {
                    let err = Error::simple("`*` used without any table to select from");
                    r.report(ErrorKind::Semantic, err, None);
                }
                for (_, relation) in ctx.joined_relations() {
                    if let Err(err) = result.merge(relation) {
                        r.report(ErrorKind::Semantic, err, None);
                    }
                }
                Ok(())
            }),

            ResultColumn::Table(table) => ResultBuilder::new(move |r, ctx, result| {
                let merged = match ctx.joined_relation(table) {
                    Some(relation) => result.merge(relation),
                    None => Err(Error::new(Reason::NotFound {
                        name: table.clone(),
                        namespace: "table".to_string(),
                    })),
                };
                if let Err(err) = merged {
                    r.report(ErrorKind::Semantic, err, None);
                }
                Ok(())
            }),

            ResultColumn::Expr { expr, alias } => {
                let producer = attribute(expr)?;
                let span = expr.span;
                ResultBuilder::new(move |r, ctx, result| {
                    let reported = r.diagnostics.len();
                    let value = producer.eval(r, ctx)?;

                    let name = alias.clone().unwrap_or(value.name);
                    if let Err(err) = result.add_attribute(name, value.attribute) {
                        // a broken expression has already been reported
                        if r.diagnostics.len() == reported {
                            r.report(ErrorKind::Semantic, err, span);
                        }
                    }
                    Ok(())
                })
            }
        }
        .into())
    }
}

/// The RETURNING clause, or the projection of a simple select.
impl Analyze for Vec<ResultColumn> {
    fn analyze(&self) -> Result<Deferred<'_>> {
        let columns: Vec<_> = self.iter().map(result_builder).collect::<Result<_>>()?;

        Ok(ResultBuilder::new(move |r, ctx, result| {
            for column in columns {
                column.eval(r, ctx, result)?;
            }
            Ok(())
        })
        .into())
    }
}

fn returning(
    clause: Option<ResultBuilder>,
    r: &mut TypeResolver,
    ctx: &mut EvaluationContext,
) -> Result<Relation> {
    let mut result = Relation::new();
    if let Some(clause) = clause {
        clause.eval(r, ctx, &mut result)?;
    }
    Ok(result)
}

impl Analyze for InsertStmt {
    fn analyze(&self) -> Result<Deferred<'_>> {
        let ctes = ctes(&self.ctes)?;
        let mut rows = Vec::with_capacity(self.values.len());
        for row in &self.values {
            let row: Vec<_> = (row.iter())
                .map(|value| Ok((attribute(value)?, value.span)))
                .collect::<Result<_>>()?;
            rows.push(row);
        }
        let upsert = self.upsert.as_ref().map(mutator).transpose()?;
        let returning_clause = self.returning.as_ref().map(result_builder).transpose()?;

        Ok(RelationProducer::new(move |r, ctx| {
            eval_all(ctes, r, ctx)?;

            let table = match r.target_table(&self.table, "insert into", None) {
                Some(table) => table,
                None => return Ok(Relation::new()),
            };

            let mut columns = Vec::new();
            if self.columns.is_empty() {
                columns.extend(table.iter().map(|(name, a)| (name.to_string(), a.ty.clone())));
            }
            for name in &self.columns {
                let ty = match table.attribute(name) {
                    Some(attribute) => attribute.ty.clone(),
                    None => {
                        let reason = Reason::NotFound {
                            name: format!("{}.{name}", self.table),
                            namespace: "column".to_string(),
                        };
                        r.report(ErrorKind::Semantic, reason, None);
                        DataType::UNKNOWN
                    }
                };
                columns.push((name.clone(), ty));
            }

            // the alias is only visible in the conflict clause and RETURNING
            for (index, row) in rows.into_iter().enumerate() {
                if row.len() != columns.len() {
                    let reason = Reason::Expected {
                        who: Some(format!("row {} of VALUES", index + 1)),
                        expected: format!("{} values", columns.len()),
                        found: row.len().to_string(),
                    };
                    r.report(ErrorKind::Semantic, reason, row.first().and_then(|v| v.1));
                }

                for (position, (value, span)) in row.into_iter().enumerate() {
                    let value = value.eval(r, ctx)?;
                    if let Some((name, ty)) = columns.get(position) {
                        if !value.ty().is_null() {
                            r.check_type(&format!("column `{name}`"), ty, value.ty(), span);
                        }
                    }
                }
            }

            if upsert.is_none() && returning_clause.is_none() {
                return Ok(Relation::new());
            }

            let mut target_ctx = ctx.scope();
            let target_name = self.alias.as_ref().unwrap_or(&self.table);
            join_or_report(r, &mut target_ctx, QualifiedRelation::new(target_name, table), None);

            eval_optional(upsert, r, &mut target_ctx)?;
            returning(returning_clause, r, &mut target_ctx)
        })
        .into())
    }
}

impl Analyze for Upsert {
    fn analyze(&self) -> Result<Deferred<'_>> {
        let target = self.target.as_ref().map(mutator).transpose()?;
        let set: Vec<_> = self.set.iter().map(mutator).collect::<Result<_>>()?;
        let filter = (self.filter.as_ref())
            .map(|f| expect_clause(f, "WHERE clause of DO UPDATE", DataType::BOOL))
            .transpose()?;

        Ok(ContextMutator::new(move |r, ctx| {
            eval_optional(target, r, ctx)?;
            eval_all(set, r, ctx)?;
            eval_optional(filter, r, ctx)
        })
        .into())
    }
}

impl Analyze for ConflictTarget {
    fn analyze(&self) -> Result<Deferred<'_>> {
        let filter = (self.filter.as_ref())
            .map(|f| expect_clause(f, "WHERE clause of ON CONFLICT", DataType::BOOL))
            .transpose()?;

        Ok(ContextMutator::new(move |r, ctx| {
            check_target_columns(r, ctx, &self.columns)?;
            eval_optional(filter, r, ctx)
        })
        .into())
    }
}

/// Checks that columns exist on the first joined relation, which is the
/// target of the statement. Returns their types, `unknown` for missing ones.
fn check_target_columns(
    r: &mut TypeResolver,
    ctx: &EvaluationContext,
    columns: &[String],
) -> Result<Vec<DataType>> {
    let (table, relation) = match ctx.first_joined() {
        Some(target) => target,
        None => bail!(Error::internal("no target table joined before SET or ON CONFLICT")),
    };

    let mut types = Vec::with_capacity(columns.len());
    for column in columns {
        match relation.attribute(column) {
            Some(attribute) => types.push(attribute.ty.clone()),
            None => {
                let reason = Reason::NotFound {
                    name: format!("{table}.{column}"),
                    namespace: "column".to_string(),
                };
                r.report(ErrorKind::Semantic, reason, None);
                types.push(DataType::UNKNOWN);
            }
        }
    }
    Ok(types)
}

impl Analyze for UpdateSetClause {
    fn analyze(&self) -> Result<Deferred<'_>> {
        let value = attribute(&self.expr)?;
        let span = self.expr.span;

        Ok(ContextMutator::new(move |r, ctx| {
            let types = check_target_columns(r, ctx, &self.columns)?;
            let value = value.eval(r, ctx)?;

            if let ([column], [ty]) = (self.columns.as_slice(), types.as_slice()) {
                if !value.ty().is_null() {
                    r.check_type(&format!("column `{column}`"), ty, value.ty(), span);
                }
            }
            Ok(())
        })
        .into())
    }
}

impl Analyze for UpdateStmt {
    fn analyze(&self) -> Result<Deferred<'_>> {
        let ctes = ctes(&self.ctes)?;
        let from = self.from.as_ref().map(mutator).transpose()?;
        let set: Vec<_> = self.set.iter().map(mutator).collect::<Result<_>>()?;
        let filter = (self.filter.as_ref())
            .map(|f| expect_clause(f, "WHERE clause", DataType::BOOL))
            .transpose()?;
        let returning_clause = self.returning.as_ref().map(result_builder).transpose()?;

        Ok(RelationProducer::new(move |r, ctx| {
            eval_all(ctes, r, ctx)?;

            let table = match r.target_table(&self.table.name, "update", None) {
                Some(table) => table,
                None => return Ok(Relation::new()),
            };

            let mut target_ctx = ctx.scope();
            let target = QualifiedRelation::new(self.table.visible_name(), table);
            join_or_report(r, &mut target_ctx, target, None);

            eval_optional(from, r, &mut target_ctx)?;
            eval_all(set, r, &mut target_ctx)?;
            eval_optional(filter, r, &mut target_ctx)?;
            returning(returning_clause, r, &mut target_ctx)
        })
        .into())
    }
}

impl Analyze for DeleteStmt {
    fn analyze(&self) -> Result<Deferred<'_>> {
        let ctes = ctes(&self.ctes)?;
        let filter = (self.filter.as_ref())
            .map(|f| expect_clause(f, "WHERE clause", DataType::BOOL))
            .transpose()?;
        let returning_clause = self.returning.as_ref().map(result_builder).transpose()?;

        Ok(RelationProducer::new(move |r, ctx| {
            eval_all(ctes, r, ctx)?;

            let table = match r.target_table(&self.table.name, "delete from", None) {
                Some(table) => table,
                None => return Ok(Relation::new()),
            };

            let mut target_ctx = ctx.scope();
            let target = QualifiedRelation::new(self.table.visible_name(), table);
            join_or_report(r, &mut target_ctx, target, None);

            eval_optional(filter, r, &mut target_ctx)?;
            returning(returning_clause, r, &mut target_ctx)
        })
        .into())
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;
    use itertools::Itertools;
    use serde_yaml::from_str;

    use super::*;
    use crate::error::Diagnostics;
    use crate::semantic::test::{render, test_options, test_schema};
    use crate::semantic::{analyze_sql, AnalyzeOptions};

    fn resolve(yaml: &str) -> (String, String) {
        let stmt: SqlStatement = from_str(yaml).unwrap();
        let schema = test_schema();
        let options = test_options();
        let mut diagnostics = Diagnostics::new();

        let (relation, _) = resolve_types(&stmt, &schema, &options, &mut diagnostics).unwrap();
        (relation.to_string(), render(diagnostics).iter().join("\n"))
    }

    #[test]
    fn test_join_and_star() {
        let (relation, errors) = resolve(
            r#"
            Select:
              selects:
                - columns:
                    - Table: u
                    - Expr:
                        expr:
                          Column:
                            table: p
                            column: title
                  from:
                    relation:
                      Table:
                        name: users
                        alias: u
                    joins:
                      - table:
                          Table:
                            name: posts
                            alias: p
                        constraint:
                          Binary:
                            left:
                              Column:
                                table: u
                                column: id
                            op: Eq
                            right:
                              Column:
                                column: author_id
            "#,
        );
        assert_eq!(errors, "");
        assert_snapshot!(relation, @"[id: int, name: text, title: text]");
    }

    #[test]
    fn test_ambiguous_column_is_reported_once() {
        let (relation, errors) = resolve(
            r#"
            Select:
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
                    joins:
                      - table:
                          Table:
                            name: posts
            "#,
        );
        assert_snapshot!(errors, @"semantic error: ambiguous column `id`. Could be from either of `users`, `posts`");
        assert_snapshot!(relation, @"[id: unknown]");
    }

    #[test]
    fn test_where_must_be_bool() {
        let (_, errors) = resolve(
            r#"
            Select:
              selects:
                - columns: [Star]
                  from:
                    relation:
                      Table:
                        name: users
                  where:
                    Column:
                      column: id
            "#,
        );
        assert_snapshot!(errors, @"type error: WHERE clause expected type `bool`, but found type `int`");
    }

    #[test]
    fn test_compound_shape() {
        let (relation, errors) = resolve(
            r#"
            Select:
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
                - compound: union
                  columns:
                    - Expr:
                        expr:
                          Column:
                            column: title
                  from:
                    relation:
                      Table:
                        name: posts
              order_by:
                terms:
                  - expr:
                      Column:
                        column: id
            "#,
        );
        assert_snapshot!(errors, @"semantic error: compound select shape mismatch: UNION combines [id: int] with [title: text]");
        assert_snapshot!(relation, @"[id: int]");
    }

    #[test]
    fn test_compound_order_by_sees_only_result() {
        let (_, errors) = resolve(
            r#"
            Select:
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
                - compound: union_all
                  columns:
                    - Expr:
                        expr:
                          Column:
                            column: author_id
                  from:
                    relation:
                      Table:
                        name: posts
              order_by:
                terms:
                  - expr:
                      Column:
                        column: name
            "#,
        );
        assert_snapshot!(errors, @"semantic error: column `name` not found");
    }

    #[test]
    fn test_correlated_subquery_needs_qualification() {
        let (_, errors) = resolve(
            r#"
            Select:
              selects:
                - columns:
                    - Expr:
                        expr:
                          Column:
                            column: name
                  from:
                    relation:
                      Table:
                        name: users
                  where:
                    Subquery:
                      exists: true
                      select:
                        selects:
                          - columns: [Star]
                            from:
                              relation:
                                Table:
                                  name: posts
                            where:
                              Binary:
                                left:
                                  Column:
                                    column: author_id
                                op: Eq
                                right:
                                  Column:
                                    column: name
            "#,
        );
        // `name` of the outer users table is only reachable as `users.name`
        assert_snapshot!(errors, @"semantic error: column `name` not found");
    }

    #[test]
    fn test_correlated_subquery_sees_outer_table() {
        let stmt: SqlStatement = from_str(
            r#"
            Select:
              selects:
                - columns:
                    - Expr:
                        expr:
                          Column:
                            column: name
                  from:
                    relation:
                      Table:
                        name: users
                  where:
                    Subquery:
                      exists: true
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
                                  name: posts
                            where:
                              Binary:
                                left:
                                  Column:
                                    column: author_id
                                op: Eq
                                right:
                                  Column:
                                    table: users
                                    column: id
            "#,
        )
        .unwrap();
        let options = AnalyzeOptions {
            qualify: true,
            ..test_options()
        };
        let mut diagnostics = Diagnostics::new();

        let (stmt, relation) = analyze_sql(stmt, &test_schema(), &options, &mut diagnostics).unwrap();
        assert!(diagnostics.is_empty(), "{:?}", render(diagnostics));
        assert_snapshot!(relation.to_string(), @"[name: text]");

        let expected: SqlStatement = from_str(
            r#"
            Select:
              selects:
                - columns:
                    - Expr:
                        expr:
                          Column:
                            table: users
                            column: name
                  from:
                    relation:
                      Table:
                        name: users
                  where:
                    Subquery:
                      exists: true
                      select:
                        selects:
                          - columns:
                              - Expr:
                                  expr:
                                    Column:
                                      table: posts
                                      column: id
                            from:
                              relation:
                                Table:
                                  name: posts
                            where:
                              Binary:
                                left:
                                  Column:
                                    table: posts
                                    column: author_id
                                op: Eq
                                right:
                                  Column:
                                    table: users
                                    column: id
            "#,
        )
        .unwrap();
        assert_eq!(stmt, expected);
    }

    #[test]
    fn test_group_by_untyped_projection() {
        let stmt: SqlStatement = from_str(
            r#"
            Select:
              selects:
                - columns:
                    - Expr:
                        expr:
                          BindParameter: $nick
                        alias: name
                    - Expr:
                        expr:
                          Literal: Null
                        alias: id
                  from:
                    relation:
                      Table:
                        name: users
                  group_by:
                    exprs:
                      - Column:
                          column: name
                      - Column:
                          column: id
            "#,
        )
        .unwrap();
        let options = AnalyzeOptions {
            arbitrary_binds: true,
            ..test_options()
        };
        let mut diagnostics = Diagnostics::new();

        let (relation, _) = resolve_types(&stmt, &test_schema(), &options, &mut diagnostics).unwrap();
        assert!(diagnostics.is_empty(), "{:?}", render(diagnostics));
        assert_snapshot!(relation.to_string(), @"[name: unknown, id: null]");
    }

    #[test]
    fn test_cte_and_group_by() {
        let (relation, errors) = resolve(
            r#"
            Select:
              ctes:
                - table: counts
                  columns: [author, total]
                  select:
                    selects:
                      - columns:
                          - Expr:
                              expr:
                                Column:
                                  column: author_id
                          - Expr:
                              expr:
                                Function:
                                  name: count
                                  star: true
                              alias: n
                        from:
                          relation:
                            Table:
                              name: posts
                        group_by:
                          exprs:
                            - Column:
                                column: author_id
                          having:
                            Binary:
                              left:
                                Column:
                                  column: n
                              op: Gt
                              right:
                                Literal:
                                  Integer: 1
              selects:
                - columns: [Star]
                  from:
                    relation:
                      Table:
                        name: counts
            "#,
        );
        assert_eq!(errors, "");
        assert_snapshot!(relation, @"[author: int, total: int]");
    }

    #[test]
    fn test_cte_cannot_shadow_table() {
        let (_, errors) = resolve(
            r#"
            Select:
              ctes:
                - table: users
                  select:
                    selects:
                      - columns:
                          - Expr:
                              expr:
                                Literal:
                                  Integer: 1
                              alias: one
              selects:
                - columns: [Star]
                  from:
                    relation:
                      Table:
                        name: users
            "#,
        );
        assert_snapshot!(errors, @"semantic error: table `users` is already declared (common table expressions cannot shadow tables)");
    }

    #[test]
    fn test_insert_values_and_returning() {
        let (relation, errors) = resolve(
            r#"
            Insert:
              table: users
              alias: u
              values:
                - - Literal:
                      Integer: 1
                  - Literal:
                      Integer: 2
                - - Literal:
                      Integer: 3
              returning:
                - Expr:
                    expr:
                      Column:
                        table: u
                        column: id
            "#,
        );
        assert_snapshot!(errors, @r###"
        type error: column `name` expected type `text`, but found type `int`
        semantic error: row 2 of VALUES expected 2 values, but found 1
        "###);
        assert_snapshot!(relation, @"[id: int]");
    }

    #[test]
    fn test_upsert() {
        let (relation, errors) = resolve(
            r#"
            Insert:
              table: users
              columns: [id, name]
              values:
                - - BindParameter: $id
                  - BindParameter: $name
              upsert:
                target:
                  columns: [id, email]
                set:
                  - columns: [name]
                    expr:
                      Column:
                        table: users
                        column: id
            "#,
        );
        assert_snapshot!(errors, @r###"
        semantic error: column `users.email` not found
        type error: column `name` expected type `text`, but found type `int`
        "###);
        assert_snapshot!(relation, @"[]");
    }

    #[test]
    fn test_update_with_from() {
        let (relation, errors) = resolve(
            r#"
            Update:
              table:
                name: posts
              set:
                - columns: [title]
                  expr:
                    Column:
                      table: users
                      column: name
              from:
                relation:
                  Table:
                    name: users
              where:
                Binary:
                  left:
                    Column:
                      table: users
                      column: id
                  op: Eq
                  right:
                    Column:
                      column: author_id
              returning:
                - Table: posts
            "#,
        );
        assert_eq!(errors, "");
        assert_snapshot!(relation, @"[id: int, title: text, content: text, author_id: int]");
    }

    #[test]
    fn test_cannot_delete_from_cte() {
        let (_, errors) = resolve(
            r#"
            Delete:
              ctes:
                - table: recent
                  select:
                    selects:
                      - columns: [Star]
                        from:
                          relation:
                            Table:
                              name: posts
              table:
                name: recent
            "#,
        );
        assert_snapshot!(errors, @"semantic error: cannot delete from common table expression `recent`");
    }

    #[test]
    fn test_table_function() {
        let (relation, errors) = resolve(
            r#"
            Select:
              selects:
                - columns: [Star]
                  from:
                    relation:
                      Function:
                        call:
                          name: get_posts
                          args:
                            - Literal:
                                Integer: 1
                        alias: gp
            "#,
        );
        assert_eq!(errors, "");
        assert_snapshot!(relation, @"[id: int, title: text]");
    }
}
