use std::collections::HashMap;
use std::fmt::Debug;
use std::rc::Rc;

use itertools::Itertools;

use super::relation::{Attribute, QualifiedRelation, Relation};
use crate::ast::DataType;
use crate::error::{Error, Reason};

/// Name of the bucket that unnamed relations (unaliased subqueries, the
/// result of a compound select) are joined into.
pub const ANONYMOUS: &str = "";

/// Relations visible at one point of a statement.
///
/// Cloning is cheap: relations are shared and copied on write, so sibling
/// branches of a statement can diverge without observing each other.
#[derive(Default, Clone)]
pub struct EvaluationContext {
    /// Relations joined in the current statement.
    joined: HashMap<String, Rc<Relation>>,

    /// Names of joined relations, in join order. Used for `*` expansion and
    /// as the search order for unqualified columns.
    join_order: Vec<String>,

    /// Relations of enclosing statements. Reachable with qualified column
    /// references, but never joined again.
    outer: HashMap<String, Rc<Relation>>,
}

/// Where a column reference was resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnOrigin {
    /// Name the resolving relation is joined under.
    pub table: String,
    pub attribute: Attribute,
}

impl EvaluationContext {
    pub fn new() -> Self {
        EvaluationContext::default()
    }

    /// Context for a nested statement: everything reachable here becomes
    /// outer, and nothing is joined yet.
    pub fn scope(&self) -> EvaluationContext {
        let mut outer = self.outer.clone();
        for (name, relation) in &self.joined {
            outer.insert(name.clone(), Rc::clone(relation));
        }

        log::trace!("new scope with outer relations [{}]", outer.keys().sorted().join(", "));
        EvaluationContext {
            joined: HashMap::new(),
            join_order: Vec::new(),
            outer,
        }
    }

    /// Independent copy of this context.
    pub fn copy(&self) -> EvaluationContext {
        self.clone()
    }

    /// Joins a relation. Anonymous relations are merged into the anonymous
    /// bucket; named ones must not collide with any visible name.
    pub fn join(&mut self, relation: QualifiedRelation) -> Result<(), Error> {
        log::trace!("joining `{}`: {}", relation.name, relation.relation);

        if relation.name == ANONYMOUS {
            return self.merge_anonymous(&relation.relation);
        }

        if self.joined.contains_key(&relation.name) || self.outer.contains_key(&relation.name) {
            return Err(Error::new(Reason::Duplicate {
                name: relation.name,
                namespace: "table".to_string(),
            }));
        }

        self.join_order.push(relation.name.clone());
        self.joined.insert(relation.name, Rc::new(relation.relation));
        Ok(())
    }

    fn merge_anonymous(&mut self, relation: &Relation) -> Result<(), Error> {
        match self.joined.get_mut(ANONYMOUS) {
            Some(bucket) => Rc::make_mut(bucket).merge(relation),
            None => {
                self.join_order.push(ANONYMOUS.to_string());
                self.joined.insert(ANONYMOUS.to_string(), Rc::new(relation.clone()));
                Ok(())
            }
        }
    }

    /// Resolves a column reference.
    ///
    /// A qualified reference looks at joined relations, then at outer ones.
    /// An unqualified one only considers joined relations and must match
    /// exactly one of them.
    pub fn find_column(&self, table: Option<&str>, column: &str) -> Result<ColumnOrigin, Error> {
        if let Some(table) = table {
            let relation = (self.joined.get(table))
                .or_else(|| self.outer.get(table))
                .ok_or_else(|| {
                    Error::new(Reason::NotFound {
                        name: table.to_string(),
                        namespace: "table".to_string(),
                    })
                })?;

            let attribute = relation.attribute(column).ok_or_else(|| {
                Error::new(Reason::NotFound {
                    name: format!("{table}.{column}"),
                    namespace: "column".to_string(),
                })
            })?;

            return Ok(ColumnOrigin {
                table: table.to_string(),
                attribute: attribute.clone(),
            });
        }

        let mut found = self.joined_relations().filter_map(|(name, relation)| {
            relation.attribute(column).map(|attribute| ColumnOrigin {
                table: name.to_string(),
                attribute: attribute.clone(),
            })
        });

        let first = found.next().ok_or_else(|| {
            Error::new(Reason::NotFound {
                name: column.to_string(),
                namespace: "column".to_string(),
            })
        })?;

        let others: Vec<_> = found.map(|o| o.table).collect();
        if !others.is_empty() {
            let mut candidates = vec![first.table];
            candidates.extend(others);
            return Err(Error::new(Reason::Ambiguous {
                name: column.to_string(),
                candidates,
            }));
        }

        Ok(first)
    }

    /// Makes the columns of `relation` visible without qualification, where
    /// that does not break existing references.
    ///
    /// A column that already resolves must have a matching type, or be null.
    /// Ambiguous names are left alone. Unknown names go to the anonymous
    /// bucket.
    pub fn merge_anonymous_safe(&mut self, relation: &Relation) -> Result<(), Error> {
        let mut missing = Relation::new();

        relation.try_for_each(|name, attribute| match self.find_column(None, name) {
            Ok(origin) if compatible(&origin.attribute.ty, &attribute.ty) => Ok(()),
            Ok(origin) => Err(Error::new(Reason::Expected {
                who: Some(format!("column `{name}`")),
                expected: format!("type `{}`", origin.attribute.ty),
                found: format!("type `{}`", attribute.ty),
            })),
            Err(e) => match e.reason {
                Reason::Ambiguous { .. } => Ok(()),
                _ => missing.add_attribute(name, attribute.clone()),
            },
        })?;

        if !missing.is_empty() {
            self.merge_anonymous(&missing)?;
        }
        Ok(())
    }

    /// Joined relations in join order.
    pub fn joined_relations(&self) -> impl Iterator<Item = (&str, &Relation)> {
        (self.join_order.iter()).map(move |name| (name.as_str(), self.joined[name].as_ref()))
    }

    pub fn joined_relation(&self, name: &str) -> Option<&Relation> {
        self.joined.get(name).map(|r| r.as_ref())
    }

    /// The relation joined first, which is the target of UPDATE and of the
    /// conflict clause of an INSERT.
    pub fn first_joined(&self) -> Option<(&str, &Relation)> {
        self.joined_relations().next()
    }

    pub fn is_joined(&self, name: &str) -> bool {
        self.joined.contains_key(name)
    }

    pub fn is_outer(&self, name: &str) -> bool {
        self.outer.contains_key(name)
    }
}

fn compatible(visible: &DataType, projected: &DataType) -> bool {
    visible.is_null() || projected.is_null() || visible.matches(projected)
}

impl Debug for EvaluationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (name, relation) in self.joined_relations() {
            writeln!(f, "{name:>12}: {relation}")?;
        }
        for (name, relation) in self.outer.iter().sorted_by_key(|r| r.0) {
            writeln!(f, "{:>12}: {relation} (outer)", name)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;

    use super::*;

    fn users() -> Relation {
        Relation::from_columns([("id", DataType::INT), ("name", DataType::TEXT)]).unwrap()
    }

    fn posts() -> Relation {
        Relation::from_columns([
            ("id", DataType::INT),
            ("title", DataType::TEXT),
            ("author_id", DataType::INT),
        ])
        .unwrap()
    }

    #[test]
    fn test_find_unqualified_column() {
        let mut ctx = EvaluationContext::new();
        ctx.join(QualifiedRelation::new("users", users())).unwrap();
        ctx.join(QualifiedRelation::new("posts", posts())).unwrap();

        let origin = ctx.find_column(None, "title").unwrap();
        assert_eq!(origin.table, "posts");
        assert_eq!(origin.attribute.ty, DataType::TEXT);

        let err = ctx.find_column(None, "id").unwrap_err();
        assert_snapshot!(err.to_string(), @"ambiguous column `id`. Could be from either of `users`, `posts`");

        let err = ctx.find_column(None, "email").unwrap_err();
        assert_snapshot!(err.to_string(), @"column `email` not found");

        let origin = ctx.find_column(Some("users"), "id").unwrap();
        assert_eq!(origin.table, "users");
    }

    #[test]
    fn test_ambiguity_is_symmetric() {
        for order in [["users", "posts"], ["posts", "users"]] {
            let mut ctx = EvaluationContext::new();
            for name in order {
                let relation = if name == "users" { users() } else { posts() };
                ctx.join(QualifiedRelation::new(name, relation)).unwrap();
            }

            let err = ctx.find_column(None, "id").unwrap_err();
            assert!(matches!(err.reason, Reason::Ambiguous { .. }));
        }
    }

    #[test]
    fn test_scope_isolation() {
        let mut parent = EvaluationContext::new();
        parent.join(QualifiedRelation::new("users", users())).unwrap();

        let mut child = parent.scope();
        child.join(QualifiedRelation::new("posts", posts())).unwrap();

        // outer relations are reachable only when qualified
        assert!(child.find_column(Some("users"), "name").is_ok());
        assert!(child.find_column(None, "name").is_err());

        // and cannot be joined again
        assert!(child.join(QualifiedRelation::new("users", users())).is_err());

        assert!(!parent.is_joined("posts"));
        assert!(parent.find_column(Some("posts"), "title").is_err());
        assert!(child.is_outer("users"));
    }

    #[test]
    fn test_copies_diverge() {
        let mut ctx = EvaluationContext::new();
        ctx.join(QualifiedRelation::anonymous(users())).unwrap();

        let mut copy = ctx.copy();
        let extra = Relation::from_columns([("email", DataType::TEXT)]).unwrap();
        copy.join(QualifiedRelation::anonymous(extra)).unwrap();

        assert!(copy.find_column(None, "email").is_ok());
        assert!(ctx.find_column(None, "email").is_err());
        assert_eq!(ctx.joined_relation(ANONYMOUS).unwrap().len(), 2);
    }

    #[test]
    fn test_anonymous_join_is_strict() {
        let mut ctx = EvaluationContext::new();
        ctx.join(QualifiedRelation::anonymous(users())).unwrap();
        assert!(ctx.join(QualifiedRelation::anonymous(users())).is_err());
        assert_eq!(ctx.joined_relations().count(), 1);
    }

    #[test]
    fn test_merge_anonymous_safe() {
        let mut ctx = EvaluationContext::new();
        ctx.join(QualifiedRelation::new("users", users())).unwrap();
        ctx.join(QualifiedRelation::new("posts", posts())).unwrap();

        let projected = Relation::from_columns([
            ("name", DataType::TEXT),
            ("id", DataType::TEXT),
            ("total", DataType::INT),
        ])
        .unwrap();
        ctx.merge_anonymous_safe(&projected).unwrap();

        assert_eq!(ctx.find_column(None, "total").unwrap().table, ANONYMOUS);
        assert_eq!(ctx.find_column(None, "name").unwrap().table, "users");

        let conflicting = Relation::from_columns([("title", DataType::INT)]).unwrap();
        let err = ctx.merge_anonymous_safe(&conflicting).unwrap_err();
        assert_snapshot!(err.to_string(), @"column `title` expected type `text`, but found type `int`");
    }

    #[test]
    fn test_merge_anonymous_safe_accepts_unknown_and_null() {
        let mut ctx = EvaluationContext::new();
        ctx.join(QualifiedRelation::new("users", users())).unwrap();

        let projected = Relation::from_columns([("name", DataType::UNKNOWN), ("id", DataType::NULL)]).unwrap();
        ctx.merge_anonymous_safe(&projected).unwrap();

        assert_eq!(ctx.find_column(None, "name").unwrap().table, "users");
        assert_eq!(ctx.find_column(None, "id").unwrap().attribute.ty, DataType::INT);
        assert!(!ctx.is_joined(ANONYMOUS));
    }
}
