//! Statements and expressions of the procedural language that procedure
//! bodies are written in.

use enum_as_inner::EnumAsInner;
use serde::{Deserialize, Serialize};
use strum::Display;

use super::{DataType, Literal, SqlStatement};
use crate::error::Span;

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Stmt {
    #[serde(flatten)]
    pub kind: StmtKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
}

#[derive(Debug, EnumAsInner, PartialEq, Clone, Serialize, Deserialize)]
pub enum StmtKind {
    Declare {
        name: String,
        ty: DataType,
    },
    Assign {
        name: String,
        value: PExpr,
    },
    /// `$x int := value`
    AssignDeclare {
        name: String,
        ty: DataType,
        value: PExpr,
    },
    /// Procedure call with its results assigned to receivers. A `None`
    /// receiver discards the value (`_`).
    Call {
        #[serde(default)]
        receivers: Vec<Option<String>>,
        call: CallExpr,
    },
    For {
        variable: String,
        target: LoopTarget,
        body: Vec<Stmt>,
    },
    If {
        branches: Vec<IfBranch>,
        #[serde(default, rename = "else", skip_serializing_if = "Option::is_none")]
        otherwise: Option<Vec<Stmt>>,
    },
    Sql(SqlStatement),
    Return {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        values: Vec<PExpr>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sql: Option<SqlStatement>,
    },
    ReturnNext {
        values: Vec<PExpr>,
    },
    Break,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct IfBranch {
    pub condition: PExpr,
    pub body: Vec<Stmt>,
}

#[derive(Debug, EnumAsInner, PartialEq, Clone, Serialize, Deserialize)]
pub enum LoopTarget {
    Range { start: PExpr, end: PExpr },
    Call(CallExpr),
    Variable(String),
    Sql(SqlStatement),
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct PExpr {
    #[serde(flatten)]
    pub kind: PExprKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cast: Option<DataType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
}

#[derive(Debug, EnumAsInner, PartialEq, Clone, Serialize, Deserialize)]
pub enum PExprKind {
    Literal(Literal),
    MakeArray(Vec<PExpr>),
    Call(CallExpr),
    /// `$name` or `@name`.
    Variable(String),
    ArrayAccess {
        target: Box<PExpr>,
        index: Box<PExpr>,
    },
    FieldAccess {
        target: Box<PExpr>,
        field: String,
    },
    Paren(Box<PExpr>),
    Comparison {
        left: Box<PExpr>,
        op: ComparisonOp,
        right: Box<PExpr>,
    },
    Arithmetic {
        left: Box<PExpr>,
        op: ArithmeticOp,
        right: Box<PExpr>,
    },
}

#[derive(Debug, EnumAsInner, PartialEq, Clone, Serialize, Deserialize)]
pub enum CallExpr {
    Local {
        name: String,
        #[serde(default)]
        args: Vec<PExpr>,
    },
    /// `name[dbid, procedure](args)`. The two context arguments select the
    /// target dataset and procedure.
    Foreign {
        name: String,
        context_args: Vec<PExpr>,
        #[serde(default)]
        args: Vec<PExpr>,
    },
}

impl CallExpr {
    pub fn name(&self) -> &str {
        match self {
            CallExpr::Local { name, .. } | CallExpr::Foreign { name, .. } => name,
        }
    }

    pub fn args(&self) -> &[PExpr] {
        match self {
            CallExpr::Local { args, .. } | CallExpr::Foreign { args, .. } => args,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Display, Serialize, Deserialize)]
pub enum ComparisonOp {
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
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Display, Serialize, Deserialize)]
pub enum ArithmeticOp {
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
}

impl From<PExprKind> for PExpr {
    fn from(kind: PExprKind) -> Self {
        PExpr {
            kind,
            cast: None,
            span: None,
        }
    }
}

impl From<StmtKind> for Stmt {
    fn from(kind: StmtKind) -> Self {
        Stmt { kind, span: None }
    }
}
