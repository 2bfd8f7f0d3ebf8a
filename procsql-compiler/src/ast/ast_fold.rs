//! Traits for rewriting the AST.
//!
//! Implementors override the methods for the nodes they care about; default
//! implementations recurse into children through the free `fold_*` functions.
use anyhow::Result;
use itertools::Itertools;

use super::*;

// For some functions, we want to call a default impl, because copying &
// pasting everything apart from a specific match is lots of repetition. So
// we define a function outside the trait, by default call it, and let
// implementors override the default while calling the function directly for
// some cases. Ref https://stackoverflow.com/a/66077767/3064736
pub trait SqlFold {
    fn fold_sql_statement(&mut self, stmt: SqlStatement) -> Result<SqlStatement> {
        fold_sql_statement(self, stmt)
    }
    fn fold_select(&mut self, select: SelectStmt) -> Result<SelectStmt> {
        fold_select(self, select)
    }
    fn fold_simple_select(&mut self, select: SimpleSelect) -> Result<SimpleSelect> {
        fold_simple_select(self, select)
    }
    fn fold_cte(&mut self, cte: Cte) -> Result<Cte> {
        Ok(Cte {
            table: self.fold_ident(cte.table)?,
            columns: self.fold_idents(cte.columns)?,
            select: self.fold_select(cte.select)?,
        })
    }
    fn fold_table_or_subquery(&mut self, table: TableOrSubquery) -> Result<TableOrSubquery> {
        fold_table_or_subquery(self, table)
    }
    fn fold_result_column(&mut self, column: ResultColumn) -> Result<ResultColumn> {
        fold_result_column(self, column)
    }
    fn fold_expr(&mut self, mut expr: Expr) -> Result<Expr> {
        expr.kind = self.fold_expr_kind(expr.kind)?;
        Ok(expr)
    }
    fn fold_expr_kind(&mut self, kind: ExprKind) -> Result<ExprKind> {
        fold_expr_kind(self, kind)
    }
    fn fold_exprs(&mut self, exprs: Vec<Expr>) -> Result<Vec<Expr>> {
        exprs.into_iter().map(|e| self.fold_expr(e)).try_collect()
    }
    fn fold_column_ref(&mut self, column: ColumnRef) -> Result<ColumnRef> {
        Ok(ColumnRef {
            table: column.table.map(|t| self.fold_ident(t)).transpose()?,
            column: self.fold_ident(column.column)?,
            id: column.id,
        })
    }
    fn fold_function_call(&mut self, call: FunctionCall) -> Result<FunctionCall> {
        Ok(FunctionCall {
            args: self.fold_exprs(call.args)?,
            ..call
        })
    }
    fn fold_bind_parameter(&mut self, name: String) -> Result<String> {
        Ok(name)
    }
    /// Table, column, alias and CTE names.
    fn fold_ident(&mut self, ident: String) -> Result<String> {
        Ok(ident)
    }
    fn fold_idents(&mut self, idents: Vec<String>) -> Result<Vec<String>> {
        idents.into_iter().map(|i| self.fold_ident(i)).try_collect()
    }
}

fn fold_optional_expr<F: ?Sized + SqlFold>(fold: &mut F, expr: Option<Expr>) -> Result<Option<Expr>> {
    expr.map(|e| fold.fold_expr(e)).transpose()
}

fn fold_boxed_expr<F: ?Sized + SqlFold>(fold: &mut F, expr: Box<Expr>) -> Result<Box<Expr>> {
    Ok(Box::new(fold.fold_expr(*expr)?))
}

fn fold_ctes<F: ?Sized + SqlFold>(fold: &mut F, ctes: Vec<Cte>) -> Result<Vec<Cte>> {
    ctes.into_iter().map(|c| fold.fold_cte(c)).try_collect()
}

fn fold_returning<F: ?Sized + SqlFold>(
    fold: &mut F,
    returning: Option<Vec<ResultColumn>>,
) -> Result<Option<Vec<ResultColumn>>> {
    returning
        .map(|cols| cols.into_iter().map(|c| fold.fold_result_column(c)).try_collect())
        .transpose()
}

fn fold_set_clauses<F: ?Sized + SqlFold>(
    fold: &mut F,
    set: Vec<UpdateSetClause>,
) -> Result<Vec<UpdateSetClause>> {
    set.into_iter()
        .map(|clause| {
            Ok(UpdateSetClause {
                columns: fold.fold_idents(clause.columns)?,
                expr: fold.fold_expr(clause.expr)?,
            })
        })
        .try_collect()
}

fn fold_alias<F: ?Sized + SqlFold>(fold: &mut F, alias: Option<String>) -> Result<Option<String>> {
    alias.map(|a| fold.fold_ident(a)).transpose()
}

fn fold_from<F: ?Sized + SqlFold>(fold: &mut F, from: FromClause) -> Result<FromClause> {
    Ok(FromClause {
        relation: fold.fold_table_or_subquery(from.relation)?,
        joins: from
            .joins
            .into_iter()
            .map(|join| -> Result<_> {
                Ok(JoinPredicate {
                    operator: join.operator,
                    table: fold.fold_table_or_subquery(join.table)?,
                    constraint: fold_optional_expr(fold, join.constraint)?,
                })
            })
            .try_collect()?,
    })
}

fn fold_qualified_table<F: ?Sized + SqlFold>(
    fold: &mut F,
    table: QualifiedTableName,
) -> Result<QualifiedTableName> {
    Ok(QualifiedTableName {
        name: fold.fold_ident(table.name)?,
        alias: fold_alias(fold, table.alias)?,
    })
}

pub fn fold_sql_statement<F: ?Sized + SqlFold>(fold: &mut F, stmt: SqlStatement) -> Result<SqlStatement> {
    Ok(match stmt {
        SqlStatement::Select(select) => SqlStatement::Select(fold.fold_select(select)?),
        SqlStatement::Insert(insert) => SqlStatement::Insert(InsertStmt {
            ctes: fold_ctes(fold, insert.ctes)?,
            table: fold.fold_ident(insert.table)?,
            alias: fold_alias(fold, insert.alias)?,
            columns: fold.fold_idents(insert.columns)?,
            values: insert
                .values
                .into_iter()
                .map(|row| fold.fold_exprs(row))
                .try_collect()?,
            upsert: insert
                .upsert
                .map(|upsert| -> Result<_> {
                    Ok(Upsert {
                        target: upsert
                            .target
                            .map(|target| -> Result<_> {
                                Ok(ConflictTarget {
                                    columns: fold.fold_idents(target.columns)?,
                                    filter: fold_optional_expr(fold, target.filter)?,
                                })
                            })
                            .transpose()?,
                        set: fold_set_clauses(fold, upsert.set)?,
                        filter: fold_optional_expr(fold, upsert.filter)?,
                    })
                })
                .transpose()?,
            returning: fold_returning(fold, insert.returning)?,
        }),
        SqlStatement::Update(update) => SqlStatement::Update(UpdateStmt {
            ctes: fold_ctes(fold, update.ctes)?,
            table: fold_qualified_table(fold, update.table)?,
            set: fold_set_clauses(fold, update.set)?,
            from: update.from.map(|f| fold_from(fold, f)).transpose()?,
            filter: fold_optional_expr(fold, update.filter)?,
            returning: fold_returning(fold, update.returning)?,
        }),
        SqlStatement::Delete(delete) => SqlStatement::Delete(DeleteStmt {
            ctes: fold_ctes(fold, delete.ctes)?,
            table: fold_qualified_table(fold, delete.table)?,
            filter: fold_optional_expr(fold, delete.filter)?,
            returning: fold_returning(fold, delete.returning)?,
        }),
    })
}

pub fn fold_select<F: ?Sized + SqlFold>(fold: &mut F, select: SelectStmt) -> Result<SelectStmt> {
    let core = select.core;
    Ok(SelectStmt {
        ctes: fold_ctes(fold, select.ctes)?,
        core: SelectCore {
            selects: core
                .selects
                .into_iter()
                .map(|s| fold.fold_simple_select(s))
                .try_collect()?,
            order_by: core
                .order_by
                .map(|order_by| -> Result<_> {
                    Ok(OrderBy {
                        terms: order_by
                            .terms
                            .into_iter()
                            .map(|term| -> Result<_> {
                                Ok(OrderingTerm {
                                    expr: fold.fold_expr(term.expr)?,
                                    ..term
                                })
                            })
                            .try_collect()?,
                    })
                })
                .transpose()?,
            limit: core
                .limit
                .map(|limit| -> Result<_> {
                    Ok(Limit {
                        limit: fold.fold_expr(limit.limit)?,
                        offset: fold_optional_expr(fold, limit.offset)?,
                    })
                })
                .transpose()?,
        },
    })
}

pub fn fold_simple_select<F: ?Sized + SqlFold>(
    fold: &mut F,
    select: SimpleSelect,
) -> Result<SimpleSelect> {
    Ok(SimpleSelect {
        compound: select.compound,
        distinct: select.distinct,
        columns: select
            .columns
            .into_iter()
            .map(|c| fold.fold_result_column(c))
            .try_collect()?,
        from: select.from.map(|f| fold_from(fold, f)).transpose()?,
        filter: fold_optional_expr(fold, select.filter)?,
        group_by: select
            .group_by
            .map(|group_by| -> Result<_> {
                Ok(GroupBy {
                    exprs: fold.fold_exprs(group_by.exprs)?,
                    having: fold_optional_expr(fold, group_by.having)?,
                })
            })
            .transpose()?,
    })
}

pub fn fold_table_or_subquery<F: ?Sized + SqlFold>(
    fold: &mut F,
    table: TableOrSubquery,
) -> Result<TableOrSubquery> {
    Ok(match table {
        TableOrSubquery::Table { name, alias } => TableOrSubquery::Table {
            name: fold.fold_ident(name)?,
            alias: fold_alias(fold, alias)?,
        },
        TableOrSubquery::Subquery { select, alias } => TableOrSubquery::Subquery {
            select: Box::new(fold.fold_select(*select)?),
            alias: fold_alias(fold, alias)?,
        },
        TableOrSubquery::Function { call, alias } => TableOrSubquery::Function {
            call: fold.fold_function_call(call)?,
            alias: fold_alias(fold, alias)?,
        },
    })
}

pub fn fold_result_column<F: ?Sized + SqlFold>(
    fold: &mut F,
    column: ResultColumn,
) -> Result<ResultColumn> {
    Ok(match column {
        ResultColumn::Star => ResultColumn::Star,
        ResultColumn::Table(name) => ResultColumn::Table(fold.fold_ident(name)?),
        ResultColumn::Expr { expr, alias } => ResultColumn::Expr {
            expr: fold.fold_expr(expr)?,
            alias: fold_alias(fold, alias)?,
        },
    })
}

pub fn fold_expr_kind<F: ?Sized + SqlFold>(fold: &mut F, kind: ExprKind) -> Result<ExprKind> {
    use ExprKind::*;
    Ok(match kind {
        Literal(_) => kind,
        BindParameter(name) => BindParameter(fold.fold_bind_parameter(name)?),
        Column(column) => Column(fold.fold_column_ref(column)?),
        Unary { op, expr } => Unary {
            op,
            expr: fold_boxed_expr(fold, expr)?,
        },
        Binary { left, op, right } => Binary {
            left: fold_boxed_expr(fold, left)?,
            op,
            right: fold_boxed_expr(fold, right)?,
        },
        StringCompare {
            left,
            op,
            right,
            escape,
        } => StringCompare {
            left: fold_boxed_expr(fold, left)?,
            op,
            right: fold_boxed_expr(fold, right)?,
            escape: escape.map(|e| fold_boxed_expr(fold, e)).transpose()?,
        },
        Is {
            left,
            right,
            not,
            distinct,
        } => Is {
            left: fold_boxed_expr(fold, left)?,
            right: fold_boxed_expr(fold, right)?,
            not,
            distinct,
        },
        Between {
            expr,
            low,
            high,
            not,
        } => Between {
            expr: fold_boxed_expr(fold, expr)?,
            low: fold_boxed_expr(fold, low)?,
            high: fold_boxed_expr(fold, high)?,
            not,
        },
        Case {
            subject,
            when_then,
            otherwise,
        } => Case {
            subject: subject.map(|e| fold_boxed_expr(fold, e)).transpose()?,
            when_then: when_then
                .into_iter()
                .map(|wt| -> Result<_> {
                    Ok(WhenThen {
                        when: fold.fold_expr(wt.when)?,
                        then: fold.fold_expr(wt.then)?,
                    })
                })
                .try_collect()?,
            otherwise: otherwise.map(|e| fold_boxed_expr(fold, e)).transpose()?,
        },
        Collate { expr, collation } => Collate {
            expr: fold_boxed_expr(fold, expr)?,
            collation,
        },
        Function(call) => Function(fold.fold_function_call(call)?),
        Subquery {
            select,
            exists,
            not,
        } => Subquery {
            select: Box::new(fold.fold_select(*select)?),
            exists,
            not,
        },
        List(items) => List(fold.fold_exprs(items)?),
    })
}

/// Rewrites procedure bodies. SQL statements embedded in a body are handed
/// over whole through [ProcFold::fold_sql].
pub trait ProcFold {
    fn fold_stmts(&mut self, stmts: Vec<Stmt>) -> Result<Vec<Stmt>> {
        stmts.into_iter().map(|s| self.fold_stmt(s)).try_collect()
    }
    fn fold_stmt(&mut self, mut stmt: Stmt) -> Result<Stmt> {
        stmt.kind = self.fold_stmt_kind(stmt.kind)?;
        Ok(stmt)
    }
    fn fold_stmt_kind(&mut self, kind: StmtKind) -> Result<StmtKind> {
        fold_stmt_kind(self, kind)
    }
    fn fold_pexpr(&mut self, mut expr: PExpr) -> Result<PExpr> {
        expr.kind = self.fold_pexpr_kind(expr.kind)?;
        Ok(expr)
    }
    fn fold_pexpr_kind(&mut self, kind: PExprKind) -> Result<PExprKind> {
        fold_pexpr_kind(self, kind)
    }
    fn fold_pexprs(&mut self, exprs: Vec<PExpr>) -> Result<Vec<PExpr>> {
        exprs.into_iter().map(|e| self.fold_pexpr(e)).try_collect()
    }
    fn fold_call(&mut self, call: CallExpr) -> Result<CallExpr> {
        fold_call(self, call)
    }
    fn fold_loop_target(&mut self, target: LoopTarget) -> Result<LoopTarget> {
        fold_loop_target(self, target)
    }
    fn fold_sql(&mut self, sql: SqlStatement) -> Result<SqlStatement> {
        Ok(sql)
    }
    /// Every variable name, in declarations, receivers and expressions.
    fn fold_variable(&mut self, name: String) -> Result<String> {
        Ok(name)
    }
    fn fold_type(&mut self, ty: DataType) -> Result<DataType> {
        Ok(ty)
    }
}

pub fn fold_stmt_kind<F: ?Sized + ProcFold>(fold: &mut F, kind: StmtKind) -> Result<StmtKind> {
    use StmtKind::*;
    Ok(match kind {
        Declare { name, ty } => Declare {
            name: fold.fold_variable(name)?,
            ty: fold.fold_type(ty)?,
        },
        Assign { name, value } => Assign {
            name: fold.fold_variable(name)?,
            value: fold.fold_pexpr(value)?,
        },
        AssignDeclare { name, ty, value } => AssignDeclare {
            name: fold.fold_variable(name)?,
            ty: fold.fold_type(ty)?,
            value: fold.fold_pexpr(value)?,
        },
        Call { receivers, call } => Call {
            receivers: receivers
                .into_iter()
                .map(|r| r.map(|name| fold.fold_variable(name)).transpose())
                .try_collect()?,
            call: fold.fold_call(call)?,
        },
        For {
            variable,
            target,
            body,
        } => For {
            variable: fold.fold_variable(variable)?,
            target: fold.fold_loop_target(target)?,
            body: fold.fold_stmts(body)?,
        },
        If {
            branches,
            otherwise,
        } => If {
            branches: branches
                .into_iter()
                .map(|branch| -> Result<_> {
                    Ok(IfBranch {
                        condition: fold.fold_pexpr(branch.condition)?,
                        body: fold.fold_stmts(branch.body)?,
                    })
                })
                .try_collect()?,
            otherwise: otherwise.map(|body| fold.fold_stmts(body)).transpose()?,
        },
        Sql(sql) => Sql(fold.fold_sql(sql)?),
        Return { values, sql } => Return {
            values: fold.fold_pexprs(values)?,
            sql: sql.map(|s| fold.fold_sql(s)).transpose()?,
        },
        ReturnNext { values } => ReturnNext {
            values: fold.fold_pexprs(values)?,
        },
        Break => Break,
    })
}

pub fn fold_loop_target<F: ?Sized + ProcFold>(fold: &mut F, target: LoopTarget) -> Result<LoopTarget> {
    Ok(match target {
        LoopTarget::Range { start, end } => LoopTarget::Range {
            start: fold.fold_pexpr(start)?,
            end: fold.fold_pexpr(end)?,
        },
        LoopTarget::Call(call) => LoopTarget::Call(fold.fold_call(call)?),
        LoopTarget::Variable(name) => LoopTarget::Variable(fold.fold_variable(name)?),
        LoopTarget::Sql(sql) => LoopTarget::Sql(fold.fold_sql(sql)?),
    })
}

pub fn fold_call<F: ?Sized + ProcFold>(fold: &mut F, call: CallExpr) -> Result<CallExpr> {
    Ok(match call {
        CallExpr::Local { name, args } => CallExpr::Local {
            name,
            args: fold.fold_pexprs(args)?,
        },
        CallExpr::Foreign {
            name,
            context_args,
            args,
        } => CallExpr::Foreign {
            name,
            context_args: fold.fold_pexprs(context_args)?,
            args: fold.fold_pexprs(args)?,
        },
    })
}

pub fn fold_pexpr_kind<F: ?Sized + ProcFold>(fold: &mut F, kind: PExprKind) -> Result<PExprKind> {
    use PExprKind::*;
    Ok(match kind {
        Literal(_) => kind,
        MakeArray(items) => MakeArray(fold.fold_pexprs(items)?),
        Call(call) => Call(fold.fold_call(call)?),
        Variable(name) => Variable(fold.fold_variable(name)?),
        ArrayAccess { target, index } => ArrayAccess {
            target: Box::new(fold.fold_pexpr(*target)?),
            index: Box::new(fold.fold_pexpr(*index)?),
        },
        FieldAccess { target, field } => FieldAccess {
            target: Box::new(fold.fold_pexpr(*target)?),
            field,
        },
        Paren(inner) => Paren(Box::new(fold.fold_pexpr(*inner)?)),
        Comparison { left, op, right } => Comparison {
            left: Box::new(fold.fold_pexpr(*left)?),
            op,
            right: Box::new(fold.fold_pexpr(*right)?),
        },
        Arithmetic { left, op, right } => Arithmetic {
            left: Box::new(fold.fold_pexpr(*left)?),
            op,
            right: Box::new(fold.fold_pexpr(*right)?),
        },
    })
}
