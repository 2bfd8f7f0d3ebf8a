//! Catalog of tables, procedures and foreign procedures that statements are
//! checked against.

use std::collections::HashSet;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::ast::DataType;
use crate::error::{Error, Reason};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub tables: Vec<Table>,
    #[serde(default)]
    pub procedures: Vec<Procedure>,
    #[serde(default)]
    pub foreign_procedures: Vec<ForeignProcedure>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: DataType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedType {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: DataType,
}

impl NamedType {
    pub fn new<S: Into<String>>(name: S, ty: DataType) -> Self {
        NamedType {
            name: name.into(),
            ty,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Procedure {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<NamedType>,
    #[serde(default)]
    pub public: bool,
    /// View procedures are read-only.
    #[serde(default)]
    pub view: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returns: Option<ProcedureReturn>,
}

/// Shape of the values a procedure returns: either one row of fields or a
/// table with those columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcedureReturn {
    #[serde(default)]
    pub is_table: bool,
    pub fields: Vec<NamedType>,
}

/// Procedure of another dataset, called through a contextual
/// `name[dataset, procedure](args)` form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignProcedure {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<DataType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returns: Option<ProcedureReturn>,
}

/// Either kind of procedure, as seen by a call site.
#[derive(Debug, Clone, Copy)]
pub enum Callable<'a> {
    Procedure(&'a Procedure),
    Foreign(&'a ForeignProcedure),
}

impl<'a> Callable<'a> {
    pub fn name(&self) -> &'a str {
        match self {
            Callable::Procedure(p) => &p.name,
            Callable::Foreign(p) => &p.name,
        }
    }

    pub fn parameter_types(&self) -> Vec<DataType> {
        match self {
            Callable::Procedure(p) => p.parameters.iter().map(|p| p.ty.clone()).collect(),
            Callable::Foreign(p) => p.parameters.clone(),
        }
    }

    pub fn returns(&self) -> Option<&'a ProcedureReturn> {
        match self {
            Callable::Procedure(p) => p.returns.as_ref(),
            Callable::Foreign(p) => p.returns.as_ref(),
        }
    }
}

impl Schema {
    pub fn from_yaml(source: &str) -> Result<Schema> {
        Ok(serde_yaml::from_str(source)?)
    }

    pub fn from_json(source: &str) -> Result<Schema> {
        Ok(serde_json::from_str(source)?)
    }

    pub fn find_table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn find_procedure(&self, name: &str) -> Option<&Procedure> {
        (self.procedures.iter()).find(|p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn find_foreign_procedure(&self, name: &str) -> Option<&ForeignProcedure> {
        (self.foreign_procedures.iter()).find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Looks up a procedure, falling back to foreign procedures.
    pub fn find_callable(&self, name: &str) -> Option<Callable> {
        self.find_procedure(name)
            .map(Callable::Procedure)
            .or_else(|| self.find_foreign_procedure(name).map(Callable::Foreign))
    }

    /// Checks that names are unique within each namespace. Names are
    /// compared case-insensitively.
    pub fn validate(&self) -> Result<(), Error> {
        ensure_unique(self.tables.iter().map(|t| t.name.as_str()), "table")?;
        for table in &self.tables {
            let namespace = format!("column of table `{}`", table.name);
            ensure_unique(table.columns.iter().map(|c| c.name.as_str()), &namespace)?;
        }

        ensure_unique(self.procedures.iter().map(|p| p.name.as_str()), "procedure")?;
        for procedure in &self.procedures {
            let namespace = format!("parameter of procedure `{}`", procedure.name);
            ensure_unique(procedure.parameters.iter().map(|p| p.name.as_str()), &namespace)?;
        }

        let foreign = self.foreign_procedures.iter().map(|p| p.name.as_str());
        ensure_unique(foreign, "foreign procedure")?;

        Ok(())
    }
}

impl Table {
    pub fn find_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

fn ensure_unique<'a, I>(names: I, namespace: &str) -> Result<(), Error>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name.to_lowercase()) {
            return Err(Error::new(Reason::Duplicate {
                name: name.to_string(),
                namespace: namespace.to_string(),
            }));
        }
    }
    Ok(())
}
