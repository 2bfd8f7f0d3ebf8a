use std::collections::HashMap;

use anyhow::Result;

use crate::ast::ast_fold::*;
use crate::ast::*;

/// Gives every column reference a fresh id, so that type analysis can record
/// which relation each of them resolved to.
pub fn assign_ids(stmt: SqlStatement) -> Result<SqlStatement> {
    let mut assigner = IdAssigner { next_id: 0 };
    let stmt = assigner.fold_sql_statement(stmt)?;

    log::trace!("assigned {} column ids", assigner.next_id);
    Ok(stmt)
}

/// Writes the resolved relation into every unqualified column reference.
///
/// References that resolved to the anonymous bucket have no entry in
/// `resolutions` and stay unqualified.
pub fn qualify(stmt: SqlStatement, resolutions: &HashMap<usize, String>) -> Result<SqlStatement> {
    Qualifier { resolutions }.fold_sql_statement(stmt)
}

struct IdAssigner {
    next_id: usize,
}

impl SqlFold for IdAssigner {
    fn fold_column_ref(&mut self, mut column: ColumnRef) -> Result<ColumnRef> {
        column.id = Some(self.next_id);
        self.next_id += 1;
        Ok(column)
    }
}

struct Qualifier<'a> {
    resolutions: &'a HashMap<usize, String>,
}

impl<'a> SqlFold for Qualifier<'a> {
    fn fold_column_ref(&mut self, mut column: ColumnRef) -> Result<ColumnRef> {
        if column.table.is_none() {
            let resolved = column.id.and_then(|id| self.resolutions.get(&id));
            column.table = resolved.cloned();
        }
        Ok(column)
    }
}

#[cfg(test)]
mod tests {
    use serde_yaml::from_str;

    use super::*;

    fn column_refs(stmt: &SqlStatement) -> Vec<ColumnRef> {
        struct Collector(Vec<ColumnRef>);
        impl SqlFold for Collector {
            fn fold_column_ref(&mut self, column: ColumnRef) -> Result<ColumnRef> {
                self.0.push(column.clone());
                Ok(column)
            }
        }

        let mut collector = Collector(Vec::new());
        collector.fold_sql_statement(stmt.clone()).unwrap();
        collector.0
    }

    fn statement() -> SqlStatement {
        from_str(
            r#"
            Select:
              selects:
                - columns:
                    - Expr:
                        expr:
                          Column:
                            column: name
                    - Expr:
                        expr:
                          Column:
                            table: p
                            column: title
                  from:
                    relation:
                      Table:
                        name: users
                    joins:
                      - table:
                          Table:
                            name: posts
                            alias: p
                  where:
                    Binary:
                      left:
                        Column:
                          column: id
                      op: Eq
                      right:
                        Literal:
                          Integer: 1
            "#,
        )
        .unwrap()
    }

    #[test]
    fn test_assign_ids() {
        let stmt = assign_ids(statement()).unwrap();
        let ids: Vec<_> = column_refs(&stmt).into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![Some(0), Some(1), Some(2)]);
    }

    #[test]
    fn test_qualify_leaves_unresolved_refs_alone() {
        let stmt = assign_ids(statement()).unwrap();
        let resolutions: HashMap<_, _> = [(0, "users".to_string()), (1, "x".to_string())].into();

        let stmt = qualify(stmt, &resolutions).unwrap();
        let tables: Vec<_> = column_refs(&stmt).into_iter().map(|c| c.table).collect();
        assert_eq!(
            tables,
            vec![Some("users".to_string()), Some("p".to_string()), None]
        );
    }

    #[test]
    fn test_ids_do_not_affect_equality() {
        let stmt = assign_ids(statement()).unwrap();
        assert_eq!(stmt, statement());
    }
}
