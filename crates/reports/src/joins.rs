//! Join-path resolution between the tables a caller added.

use tracing::debug;

use crate::error::ValidationError;
use crate::schema::{edge_between, Entity, JoinEdge};

/// One `LEFT JOIN` of a caller-added table onto the tables before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinStep {
    pub table: Entity,
    pub edge: &'static JoinEdge,
    /// Parent to child: the joined table contributes many rows per existing row.
    pub fan_out: bool,
}

impl JoinStep {
    pub fn to_sql(&self) -> String {
        format!(
            "LEFT JOIN {} ON {}",
            self.table,
            self.edge
                .on_clause(self.edge.child.table_name(), self.edge.parent.table_name())
        )
    }
}

/// Order the joins needed to connect every added table to the anchor.
///
/// Starting at the anchor, the earliest-added table with a direct edge to an
/// already joined table is joined next. Only added tables are traversed.
/// A plan may carry at most one one-to-many collection: either the anchor is
/// itself a child table, or one parent to child step widens it.
pub fn resolve(tables: &[Entity]) -> Result<Vec<JoinStep>, ValidationError> {
    let Some((&anchor, rest)) = tables.split_first() else {
        return Err(ValidationError::NoTableSelected);
    };

    let mut joined = vec![anchor];
    let mut pending: Vec<Entity> = rest.to_vec();
    let mut steps = Vec::with_capacity(pending.len());
    let mut collections = usize::from(is_child(anchor));

    while !pending.is_empty() {
        let next = pending.iter().enumerate().find_map(|(i, &table)| {
            joined.iter().find_map(|&existing| {
                edge_between(existing, table).map(|edge| (i, table, edge))
            })
        });

        let Some((index, table, edge)) = next else {
            return Err(ValidationError::UnreachableJoin {
                from: anchor,
                to: pending[0],
            });
        };

        let fan_out = edge.child == table;
        if fan_out {
            collections += 1;
            if collections > 1 {
                return Err(ValidationError::FanOutJoin { table });
            }
        }

        debug!(table = %table, via = edge.foreign_key, fan_out, "join resolved");
        steps.push(JoinStep {
            table,
            edge,
            fan_out,
        });
        joined.push(table);
        pending.remove(index);
    }

    Ok(steps)
}

fn is_child(entity: Entity) -> bool {
    entity.relations().next().is_some()
}
