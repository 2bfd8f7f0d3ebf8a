use std::collections::HashMap;
use std::fmt::{self, Debug, Display};

use itertools::Itertools;

use crate::ast::DataType;
use crate::error::{Error, Reason, WithErrorInfo};

/// Type of a single value in a relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub ty: DataType,
}

impl Attribute {
    pub fn new(ty: DataType) -> Self {
        Attribute { ty }
    }
}

/// An attribute paired with the name of the column it came from. Empty name
/// for values that are not columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedAttribute {
    pub name: String,
    pub attribute: Attribute,
}

impl QualifiedAttribute {
    pub fn new<S: Into<String>>(name: S, ty: DataType) -> Self {
        QualifiedAttribute {
            name: name.into(),
            attribute: Attribute::new(ty),
        }
    }

    pub fn anonymous(ty: DataType) -> Self {
        QualifiedAttribute::new("", ty)
    }

    pub fn ty(&self) -> &DataType {
        &self.attribute.ty
    }
}

/// Ordered set of uniquely named attributes: the columns of a table or the
/// rows produced by a statement.
#[derive(Default, Clone, PartialEq)]
pub struct Relation {
    attributes: HashMap<String, Attribute>,
    order: Vec<String>,
}

/// A relation and the name it is joined under. Empty name is the anonymous
/// bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct QualifiedRelation {
    pub name: String,
    pub relation: Relation,
}

impl QualifiedRelation {
    pub fn new<S: Into<String>>(name: S, relation: Relation) -> Self {
        QualifiedRelation {
            name: name.into(),
            relation,
        }
    }

    pub fn anonymous(relation: Relation) -> Self {
        QualifiedRelation::new("", relation)
    }
}

impl Relation {
    pub fn new() -> Self {
        Relation::default()
    }

    /// Builds a relation from `(name, type)` pairs, failing on the first
    /// duplicated or empty name.
    pub fn from_columns<I, S>(columns: I) -> Result<Relation, Error>
    where
        I: IntoIterator<Item = (S, DataType)>,
        S: Into<String>,
    {
        let mut relation = Relation::new();
        for (name, ty) in columns {
            relation.add_attribute(name, Attribute::new(ty))?;
        }
        Ok(relation)
    }

    /// Appends an attribute. Fails, leaving the relation untouched, if the
    /// name is empty or already present.
    pub fn add_attribute<S: Into<String>>(&mut self, name: S, attribute: Attribute) -> Result<(), Error> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::simple("result column has no name")
                .with_help("give the expression a name with `AS`"));
        }
        if self.attributes.contains_key(&name) {
            return Err(Error::new(Reason::Duplicate {
                name,
                namespace: "column".to_string(),
            }));
        }

        self.attributes.insert(name.clone(), attribute);
        self.order.push(name);
        Ok(())
    }

    /// Appends all attributes of `other`. Fails without modifying the
    /// relation if any name is already present.
    pub fn merge(&mut self, other: &Relation) -> Result<(), Error> {
        if let Some(name) = other.order.iter().find(|n| self.attributes.contains_key(*n)) {
            return Err(Error::new(Reason::Duplicate {
                name: name.clone(),
                namespace: "column".to_string(),
            }));
        }

        for (name, attribute) in other.iter() {
            self.attributes.insert(name.to_string(), attribute.clone());
            self.order.push(name.to_string());
        }
        Ok(())
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    /// Types of the attributes, in order.
    pub fn shape(&self) -> Vec<DataType> {
        self.iter().map(|(_, a)| a.ty.clone()).collect()
    }

    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Attribute)> {
        self.order
            .iter()
            .map(move |name| (name.as_str(), &self.attributes[name]))
    }

    /// Calls `f` for every attribute in order, stopping at the first error.
    pub fn try_for_each<E, F>(&self, mut f: F) -> Result<(), E>
    where
        F: FnMut(&str, &Attribute) -> Result<(), E>,
    {
        for (name, attribute) in self.iter() {
            f(name, attribute)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let columns = self.iter().map(|(name, a)| format!("{name}: {}", a.ty)).join(", ");
        write!(f, "[{columns}]")
    }
}

impl Debug for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}
