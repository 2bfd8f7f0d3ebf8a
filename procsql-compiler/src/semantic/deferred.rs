//! Deferred computations that analysis of a SQL node produces.
//!
//! A statement is visited once, producing a tree of these. The enclosing
//! node then decides in which [EvaluationContext] and in which order each of
//! them is evaluated.

use anyhow::{bail, Result};

use super::context::EvaluationContext;
use super::relation::{QualifiedAttribute, Relation};
use super::type_resolver::TypeResolver;
use crate::error::Error;

type Eval<'n, T> = Box<dyn FnOnce(&mut TypeResolver<'_>, &mut EvaluationContext) -> Result<T> + 'n>;

type Build<'n> =
    Box<dyn FnOnce(&mut TypeResolver<'_>, &mut EvaluationContext, &mut Relation) -> Result<()> + 'n>;

/// Modifies the context: joins relations, declares common tables or just
/// checks clauses that produce no value.
pub struct ContextMutator<'n>(Eval<'n, ()>);

/// Computes the type of an expression.
pub struct AttributeProducer<'n>(Eval<'n, QualifiedAttribute>);

/// Computes the relation a statement returns.
pub struct RelationProducer<'n>(Eval<'n, Relation>);

/// Adds result columns to a relation under construction.
pub struct ResultBuilder<'n>(Build<'n>);

pub enum Deferred<'n> {
    Mutate(ContextMutator<'n>),
    Attribute(AttributeProducer<'n>),
    Relation(RelationProducer<'n>),
    Result(ResultBuilder<'n>),
}

impl<'n> Deferred<'n> {
    fn kind(&self) -> &'static str {
        match self {
            Deferred::Mutate(_) => "context mutator",
            Deferred::Attribute(_) => "attribute producer",
            Deferred::Relation(_) => "relation producer",
            Deferred::Result(_) => "result builder",
        }
    }

    pub fn into_mutator(self) -> Result<ContextMutator<'n>> {
        match self {
            Deferred::Mutate(m) => Ok(m),
            other => bail!(mismatch("context mutator", &other)),
        }
    }

    pub fn into_attribute(self) -> Result<AttributeProducer<'n>> {
        match self {
            Deferred::Attribute(a) => Ok(a),
            other => bail!(mismatch("attribute producer", &other)),
        }
    }

    pub fn into_relation(self) -> Result<RelationProducer<'n>> {
        match self {
            Deferred::Relation(r) => Ok(r),
            other => bail!(mismatch("relation producer", &other)),
        }
    }

    pub fn into_result(self) -> Result<ResultBuilder<'n>> {
        match self {
            Deferred::Result(r) => Ok(r),
            other => bail!(mismatch("result builder", &other)),
        }
    }
}

fn mismatch(expected: &str, found: &Deferred) -> Error {
    Error::internal(format!("expected {expected}, found {}", found.kind()))
}

impl<'n> ContextMutator<'n> {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(&mut TypeResolver<'_>, &mut EvaluationContext) -> Result<()> + 'n,
    {
        ContextMutator(Box::new(f))
    }

    pub fn eval(self, resolver: &mut TypeResolver, ctx: &mut EvaluationContext) -> Result<()> {
        (self.0)(resolver, ctx)
    }
}

impl<'n> AttributeProducer<'n> {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(&mut TypeResolver<'_>, &mut EvaluationContext) -> Result<QualifiedAttribute> + 'n,
    {
        AttributeProducer(Box::new(f))
    }

    pub fn eval(
        self,
        resolver: &mut TypeResolver,
        ctx: &mut EvaluationContext,
    ) -> Result<QualifiedAttribute> {
        (self.0)(resolver, ctx)
    }
}

impl<'n> RelationProducer<'n> {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(&mut TypeResolver<'_>, &mut EvaluationContext) -> Result<Relation> + 'n,
    {
        RelationProducer(Box::new(f))
    }

    pub fn eval(self, resolver: &mut TypeResolver, ctx: &mut EvaluationContext) -> Result<Relation> {
        (self.0)(resolver, ctx)
    }
}

impl<'n> ResultBuilder<'n> {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(&mut TypeResolver<'_>, &mut EvaluationContext, &mut Relation) -> Result<()> + 'n,
    {
        ResultBuilder(Box::new(f))
    }

    pub fn eval(
        self,
        resolver: &mut TypeResolver,
        ctx: &mut EvaluationContext,
        result: &mut Relation,
    ) -> Result<()> {
        (self.0)(resolver, ctx, result)
    }
}

impl<'n> From<ContextMutator<'n>> for Deferred<'n> {
    fn from(m: ContextMutator<'n>) -> Self {
        Deferred::Mutate(m)
    }
}

impl<'n> From<AttributeProducer<'n>> for Deferred<'n> {
    fn from(a: AttributeProducer<'n>) -> Self {
        Deferred::Attribute(a)
    }
}

impl<'n> From<RelationProducer<'n>> for Deferred<'n> {
    fn from(r: RelationProducer<'n>) -> Self {
        Deferred::Relation(r)
    }
}

impl<'n> From<ResultBuilder<'n>> for Deferred<'n> {
    fn from(r: ResultBuilder<'n>) -> Self {
        Deferred::Result(r)
    }
}
