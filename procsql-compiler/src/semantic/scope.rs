use std::collections::HashMap;
use std::fmt::Debug;

use itertools::Itertools;

use super::relation::Relation;
use crate::ast::DataType;
use crate::error::{Error, Reason};

/// Variables visible while checking a procedure body.
///
/// Names are already cleaned (`_param_x`, `_ctx_x`). Scalar variables and
/// row variables (bound by loops over tables) share one namespace.
#[derive(Default, Clone)]
pub struct Scope {
    variables: HashMap<String, DataType>,
    rows: HashMap<String, Relation>,
    in_loop: bool,
}

impl Scope {
    pub fn declare(&mut self, name: &str, ty: DataType) -> Result<(), Error> {
        self.ensure_undeclared(name)?;
        self.variables.insert(name.to_string(), ty);
        Ok(())
    }

    pub fn declare_row(&mut self, name: &str, row: Relation) -> Result<(), Error> {
        self.ensure_undeclared(name)?;
        self.rows.insert(name.to_string(), row);
        Ok(())
    }

    fn ensure_undeclared(&self, name: &str) -> Result<(), Error> {
        if self.is_declared(name) {
            return Err(Error::new(Reason::Duplicate {
                name: name.to_string(),
                namespace: "variable".to_string(),
            }));
        }
        Ok(())
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.variables.contains_key(name) || self.rows.contains_key(name)
    }

    pub fn variable(&self, name: &str) -> Option<&DataType> {
        self.variables.get(name)
    }

    pub fn row(&self, name: &str) -> Option<&Relation> {
        self.rows.get(name)
    }

    /// Scalar variables, which embedded SQL can use as bind parameters.
    pub fn variables(&self) -> &HashMap<String, DataType> {
        &self.variables
    }

    pub fn remove(&mut self, name: &str) {
        self.variables.remove(name);
        self.rows.remove(name);
    }

    /// Marks the start of a loop body. Returns the previous marker, to be
    /// passed to [Scope::exit_loop].
    pub fn enter_loop(&mut self) -> bool {
        std::mem::replace(&mut self.in_loop, true)
    }

    pub fn exit_loop(&mut self, previous: bool) {
        self.in_loop = previous;
    }

    pub fn in_loop(&self) -> bool {
        self.in_loop
    }
}

impl Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (name, ty) in self.variables.iter().sorted_by_key(|v| v.0) {
            writeln!(f, "{name:>20}: {ty}")?;
        }
        for (name, row) in self.rows.iter().sorted_by_key(|v| v.0) {
            writeln!(f, "{name:>20}: {row}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalars_and_rows_share_names() {
        let mut scope = Scope::default();
        scope.declare("_param_id", DataType::INT).unwrap();

        let row = Relation::from_columns([("id", DataType::INT)]).unwrap();
        let err = scope.declare_row("_param_id", row.clone()).unwrap_err();
        assert_eq!(err.to_string(), "variable `_param_id` is already declared");

        scope.declare_row("_param_r", row).unwrap();
        assert!(scope.variable("_param_r").is_none());
        assert!(scope.row("_param_r").is_some());

        scope.remove("_param_r");
        assert!(!scope.is_declared("_param_r"));
    }

    #[test]
    fn test_loop_marker_nests() {
        let mut scope = Scope::default();
        assert!(!scope.in_loop());

        let outer = scope.enter_loop();
        let inner = scope.enter_loop();
        scope.exit_loop(inner);
        assert!(scope.in_loop());

        scope.exit_loop(outer);
        assert!(!scope.in_loop());
    }
}
