//! Abstract syntax tree of the embedded SQL dialect.
//!
//! The tree is produced by the parser (or, in tests, deserialized from YAML)
//! and is walked by [crate::semantic]. Every expression carries an optional
//! span and type cast.

use enum_as_inner::EnumAsInner;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

use super::DataType;
use crate::error::Span;

#[derive(Debug, EnumAsInner, PartialEq, Clone, Serialize, Deserialize)]
pub enum SqlStatement {
    Select(SelectStmt),
    Insert(InsertStmt),
    Update(UpdateStmt),
    Delete(DeleteStmt),
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Cte {
    pub table: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<String>,
    pub select: SelectStmt,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct SelectStmt {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ctes: Vec<Cte>,
    #[serde(flatten)]
    pub core: SelectCore,
}

/// One or more simple selects combined with compound operators, followed by
/// ordering and limit that apply to the combined result.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct SelectCore {
    pub selects: Vec<SimpleSelect>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_by: Option<OrderBy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<Limit>,
}

#[derive(Debug, PartialEq, Clone, Default, Serialize, Deserialize)]
pub struct SimpleSelect {
    /// Operator that combines this select with the previous one. Always
    /// `None` for the first select of a core.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compound: Option<CompoundOperator>,
    #[serde(default)]
    pub distinct: bool,
    pub columns: Vec<ResultColumn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<FromClause>,
    #[serde(default, rename = "where", skip_serializing_if = "Option::is_none")]
    pub filter: Option<Expr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by: Option<GroupBy>,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompoundOperator {
    #[strum(to_string = "UNION")]
    Union,
    #[strum(to_string = "UNION ALL")]
    UnionAll,
    #[strum(to_string = "INTERSECT")]
    Intersect,
    #[strum(to_string = "EXCEPT")]
    Except,
}

#[derive(Debug, EnumAsInner, PartialEq, Clone, Serialize, Deserialize)]
pub enum ResultColumn {
    Star,
    Table(String),
    Expr {
        expr: Expr,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alias: Option<String>,
    },
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct FromClause {
    pub relation: TableOrSubquery,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub joins: Vec<JoinPredicate>,
}

#[derive(Debug, EnumAsInner, PartialEq, Clone, Serialize, Deserialize)]
pub enum TableOrSubquery {
    Table {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alias: Option<String>,
    },
    Subquery {
        select: Box<SelectStmt>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alias: Option<String>,
    },
    Function {
        call: FunctionCall,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alias: Option<String>,
    },
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct JoinPredicate {
    #[serde(default)]
    pub operator: JoinOperator,
    pub table: TableOrSubquery,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraint: Option<Expr>,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinOperator {
    #[strum(to_string = "JOIN")]
    Inner,
    #[strum(to_string = "LEFT JOIN")]
    Left,
    #[strum(to_string = "RIGHT JOIN")]
    Right,
    #[strum(to_string = "FULL JOIN")]
    Full,
}

impl Default for JoinOperator {
    fn default() -> Self {
        JoinOperator::Inner
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct GroupBy {
    pub exprs: Vec<Expr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub having: Option<Expr>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct OrderBy {
    pub terms: Vec<OrderingTerm>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct OrderingTerm {
    pub expr: Expr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<SortOrder>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nulls: Option<NullOrder>,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullOrder {
    First,
    Last,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Limit {
    pub limit: Expr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<Expr>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct InsertStmt {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ctes: Vec<Cte>,
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Target columns. Empty means all columns of the table, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<String>,
    pub values: Vec<Vec<Expr>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upsert: Option<Upsert>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returning: Option<Vec<ResultColumn>>,
}

/// `ON CONFLICT` clause of an insert.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Upsert {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<ConflictTarget>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub set: Vec<UpdateSetClause>,
    #[serde(default, rename = "where", skip_serializing_if = "Option::is_none")]
    pub filter: Option<Expr>,
}

impl Upsert {
    /// `DO NOTHING` is an upsert without set clauses.
    pub fn is_do_nothing(&self) -> bool {
        self.set.is_empty()
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ConflictTarget {
    pub columns: Vec<String>,
    #[serde(default, rename = "where", skip_serializing_if = "Option::is_none")]
    pub filter: Option<Expr>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct UpdateSetClause {
    pub columns: Vec<String>,
    pub expr: Expr,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct QualifiedTableName {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl QualifiedTableName {
    /// Name the table is visible under.
    pub fn visible_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct UpdateStmt {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ctes: Vec<Cte>,
    pub table: QualifiedTableName,
    pub set: Vec<UpdateSetClause>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<FromClause>,
    #[serde(default, rename = "where", skip_serializing_if = "Option::is_none")]
    pub filter: Option<Expr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returning: Option<Vec<ResultColumn>>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct DeleteStmt {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ctes: Vec<Cte>,
    pub table: QualifiedTableName,
    #[serde(default, rename = "where", skip_serializing_if = "Option::is_none")]
    pub filter: Option<Expr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returning: Option<Vec<ResultColumn>>,
}

impl SqlStatement {
    /// Whether executing the statement writes data.
    pub fn is_mutating(&self) -> bool {
        !matches!(self, SqlStatement::Select(_))
    }

    /// Whether the statement always yields rows: a select, or a mutation
    /// with a RETURNING clause.
    pub fn is_returnable(&self) -> bool {
        match self {
            SqlStatement::Select(_) => true,
            SqlStatement::Insert(insert) => insert.returning.is_some(),
            SqlStatement::Update(update) => update.returning.is_some(),
            SqlStatement::Delete(delete) => delete.returning.is_some(),
        }
    }

    pub fn ctes(&self) -> &[Cte] {
        match self {
            SqlStatement::Select(s) => &s.ctes,
            SqlStatement::Insert(s) => &s.ctes,
            SqlStatement::Update(s) => &s.ctes,
            SqlStatement::Delete(s) => &s.ctes,
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Expr {
    #[serde(flatten)]
    pub kind: ExprKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cast: Option<DataType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
}

#[derive(Debug, EnumAsInner, PartialEq, Clone, Serialize, Deserialize)]
pub enum ExprKind {
    Literal(Literal),
    /// `$name` (procedure parameter) or `@name` (session variable).
    BindParameter(String),
    Column(ColumnRef),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
    },
    StringCompare {
        left: Box<Expr>,
        op: StringOp,
        right: Box<Expr>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        escape: Option<Box<Expr>>,
    },
    Is {
        left: Box<Expr>,
        right: Box<Expr>,
        #[serde(default)]
        not: bool,
        #[serde(default)]
        distinct: bool,
    },
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        #[serde(default)]
        not: bool,
    },
    Case {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subject: Option<Box<Expr>>,
        when_then: Vec<WhenThen>,
        #[serde(default, rename = "else", skip_serializing_if = "Option::is_none")]
        otherwise: Option<Box<Expr>>,
    },
    Collate {
        expr: Box<Expr>,
        collation: String,
    },
    Function(FunctionCall),
    Subquery {
        select: Box<SelectStmt>,
        #[serde(default)]
        exists: bool,
        #[serde(default)]
        not: bool,
    },
    List(Vec<Expr>),
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct WhenThen {
    pub when: Expr,
    pub then: Expr,
}

#[derive(Debug, EnumAsInner, PartialEq, Clone, Serialize, Deserialize)]
pub enum Literal {
    Null,
    Integer(i64),
    Text(String),
    Boolean(bool),
    /// Hex encoded.
    Blob(String),
}

/// Reference to a column, optionally qualified with a table name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    pub column: String,
    /// Assigned before analysis, so that analysis can record which table a
    /// reference resolved to.
    #[serde(skip)]
    pub id: Option<usize>,
}

// ids are bookkeeping of a single analysis run
impl PartialEq for ColumnRef {
    fn eq(&self, other: &Self) -> bool {
        self.table == other.table && self.column == other.column
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Expr>,
    #[serde(default)]
    pub distinct: bool,
    /// `count(*)`
    #[serde(default)]
    pub star: bool,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Display, AsRefStr, Serialize, Deserialize)]
pub enum UnaryOp {
    #[strum(to_string = "-")]
    Neg,
    #[strum(to_string = "+")]
    Pos,
    #[strum(to_string = "NOT")]
    Not,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Display, Serialize, Deserialize)]
pub enum BinOp {
    #[strum(to_string = "+")]
    Add,
    #[strum(to_string = "-")]
    Sub,
    #[strum(to_string = "*")]
    Mul,
    #[strum(to_string = "/")]
    Div,
    #[strum(to_string = "%")]
    Mod,
    #[strum(to_string = "||")]
    Concat,
    #[strum(to_string = "=")]
    Eq,
    #[strum(to_string = "!=")]
    Ne,
    #[strum(to_string = "<")]
    Lt,
    #[strum(to_string = "<=")]
    Lte,
    #[strum(to_string = ">")]
    Gt,
    #[strum(to_string = ">=")]
    Gte,
    #[strum(to_string = "IN")]
    In,
    #[strum(to_string = "NOT IN")]
    NotIn,
    #[strum(to_string = "AND")]
    And,
    #[strum(to_string = "OR")]
    Or,
}

impl BinOp {
    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinOp::And | BinOp::Or)
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Display, Serialize, Deserialize)]
pub enum StringOp {
    #[strum(to_string = "LIKE")]
    Like,
    #[strum(to_string = "NOT LIKE")]
    NotLike,
    #[strum(to_string = "ILIKE")]
    ILike,
    #[strum(to_string = "NOT ILIKE")]
    NotILike,
}

impl From<ExprKind> for Expr {
    fn from(kind: ExprKind) -> Self {
        Expr {
            kind,
            cast: None,
            span: None,
        }
    }
}

impl Expr {
    pub fn column(table: Option<&str>, column: &str) -> Expr {
        ExprKind::Column(ColumnRef {
            table: table.map(str::to_string),
            column: column.to_string(),
            id: None,
        })
        .into()
    }

    pub fn with_cast(mut self, cast: DataType) -> Expr {
        self.cast = Some(cast);
        self
    }
}
