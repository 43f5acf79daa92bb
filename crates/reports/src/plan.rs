//! Projection and aggregation compilation.

use serde::Serialize;
use tracing::debug;

use crate::error::ValidationError;
use crate::execute::ReportQuery;
use crate::filters::Predicate;
use crate::joins::{self, JoinStep};
use crate::schema::{Entity, FieldType, JoinEdge};
use crate::spec::{AggregateFunction, QuerySpec};
use crate::sql::{quote_ident, SqlWriter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanShape {
    /// One output row per matching joined row.
    Rows,
    /// One output row per distinct combination of the selected fields.
    Grouped,
    /// Aggregates over the whole filtered set; always exactly one row.
    BareAggregate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputColumn {
    pub alias: String,
    #[serde(rename = "type")]
    pub ty: FieldType,
}

struct Projection {
    expr: String,
    column: OutputColumn,
}

impl QuerySpec {
    /// Compile the specification into a single parameterized query.
    ///
    /// Performs no I/O. Calling it again on an unmodified specification
    /// yields an equal [`ReportQuery`].
    pub fn build(&self) -> Result<ReportQuery, ValidationError> {
        let anchor = self.anchor().ok_or(ValidationError::NoTableSelected)?;
        let steps = joins::resolve(&self.tables)?;
        self.check_tables_selected()?;

        let shape = match (self.fields.is_empty(), self.aggregations.is_empty()) {
            (_, true) => PlanShape::Rows,
            (true, false) => PlanShape::BareAggregate,
            (false, false) => PlanShape::Grouped,
        };

        let mut projections = self.field_projections(&steps);
        projections.extend(self.aggregate_projections());

        let mut w = SqlWriter::new();
        w.push("SELECT ")
            .push_list(&projections, ", ", |w, p| {
                w.push(&p.expr)
                    .push(" AS ")
                    .push(&quote_ident(&p.column.alias));
            })
            .push(" FROM ")
            .push(anchor.table_name());

        for step in &steps {
            w.push(" ").push(&step.to_sql());
        }
        for (alias, table, edge) in self.relation_hops() {
            w.push(" LEFT JOIN ")
                .push(edge.parent.table_name())
                .push(" AS ")
                .push(&alias)
                .push(" ON ")
                .push(&edge.on_clause(table.table_name(), &alias));
        }

        if let Some(predicate) = Predicate::fold(&self.filters) {
            w.push(" WHERE ");
            predicate.write(&mut w);
        }

        if shape == PlanShape::Grouped {
            w.push(" GROUP BY ")
                .push_list(&self.fields, ", ", |w, f| {
                    w.push(&f.field.sql_expr());
                });
        }

        let order = self.order_terms(anchor, shape, &steps, &projections)?;
        if !order.is_empty() {
            w.push(" ORDER BY ").push(&order.join(", "));
        }

        let (sql, params) = w.finish();
        debug!(sql = %sql, params = params.len(), shape = ?shape, "compiled report plan");

        let columns = projections.into_iter().map(|p| p.column).collect();
        Ok(ReportQuery::new(sql, params, columns, shape))
    }

    fn check_tables_selected(&self) -> Result<(), ValidationError> {
        let referenced = self
            .fields
            .iter()
            .map(|f| &f.field)
            .chain(self.aggregations.iter().map(|a| &a.field))
            .chain(self.filters.iter().map(|f| &f.field));

        for field in referenced {
            if !self.tables.contains(&field.table) {
                return Err(ValidationError::TableNotSelected {
                    table: field.table,
                    field: field.qualified(),
                });
            }
        }
        Ok(())
    }

    /// With nothing selected, every column of the anchor is projected. When a
    /// join fans out, the columns of every added table are projected as well,
    /// so each output row stays distinguishable.
    fn field_projections(&self, steps: &[JoinStep]) -> Vec<Projection> {
        if self.fields.is_empty() && self.aggregations.is_empty() {
            let tables = if steps.iter().any(|step| step.fan_out) {
                &self.tables[..]
            } else {
                &self.tables[..1]
            };
            return tables
                .iter()
                .flat_map(|&table| {
                    table.columns().iter().map(move |column| Projection {
                        expr: format!("{}.{}", table, column.name),
                        column: OutputColumn {
                            alias: format!("{}_{}", table, column.name),
                            ty: column.ty,
                        },
                    })
                })
                .collect();
        }

        self.fields
            .iter()
            .map(|f| Projection {
                expr: f.field.sql_expr(),
                column: OutputColumn {
                    alias: f.alias.clone(),
                    ty: f.field.ty(),
                },
            })
            .collect()
    }

    fn aggregate_projections(&self) -> impl Iterator<Item = Projection> + '_ {
        self.aggregations.iter().map(|a| {
            let ty = a.field.ty();
            let expr = a.field.sql_expr();
            let expr = match a.function {
                AggregateFunction::Count => format!("COUNT({})", expr),
                AggregateFunction::Sum if ty == FieldType::Integer => {
                    format!("CAST(SUM({}) AS BIGINT)", expr)
                }
                AggregateFunction::Sum => format!("SUM({})", expr),
                AggregateFunction::Avg => format!("CAST(AVG({}) AS DOUBLE PRECISION)", expr),
                AggregateFunction::Max => format!("MAX({})", expr),
                AggregateFunction::Min => format!("MIN({})", expr),
            };
            Projection {
                expr,
                column: OutputColumn {
                    alias: a.alias.clone(),
                    // Validated when the aggregation was added.
                    ty: a.function.output_type(ty).unwrap_or(FieldType::Integer),
                },
            }
        })
    }

    /// Distinct relation hops in first-use order: fields, aggregations, filters.
    fn relation_hops(&self) -> Vec<(String, Entity, &'static JoinEdge)> {
        let referenced = self
            .fields
            .iter()
            .map(|f| &f.field)
            .chain(self.aggregations.iter().map(|a| &a.field))
            .chain(self.filters.iter().map(|f| &f.field));

        let mut hops: Vec<(String, Entity, &'static JoinEdge)> = Vec::new();
        for field in referenced {
            if let Some((alias, edge)) = field.hop() {
                if !hops.iter().any(|(existing, _, _)| *existing == alias) {
                    hops.push((alias, field.table, edge));
                }
            }
        }
        hops
    }

    fn order_terms(
        &self,
        anchor: Entity,
        shape: PlanShape,
        steps: &[JoinStep],
        projections: &[Projection],
    ) -> Result<Vec<String>, ValidationError> {
        let mut terms = Vec::with_capacity(self.orderings.len() + 1);
        for ordering in &self.orderings {
            if !projections.iter().any(|p| p.column.alias == ordering.alias) {
                return Err(ValidationError::UnknownAlias(ordering.alias.clone()));
            }
            terms.push(format!(
                "{} {}",
                quote_ident(&ordering.alias),
                ordering.direction.as_sql()
            ));
        }

        match shape {
            PlanShape::Rows => {
                terms.push(format!("{}.id", anchor));
                terms.extend(
                    steps
                        .iter()
                        .filter(|step| step.fan_out)
                        .map(|step| format!("{}.id", step.table)),
                );
            }
            PlanShape::Grouped if terms.is_empty() => {
                terms.extend((1..=self.fields.len()).map(|i| i.to_string()));
            }
            PlanShape::Grouped | PlanShape::BareAggregate => {}
        }
        Ok(terms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::literal::Literal;

    #[test]
    fn test_no_tables() {
        let err = QuerySpec::new().build().unwrap_err();
        assert_eq!(err, ValidationError::NoTableSelected);
        assert_eq!(err.to_string(), "no table selected");
    }

    #[test]
    fn test_bare_table_projects_every_anchor_column() {
        let mut spec = QuerySpec::new();
        spec.add_table("categories").unwrap();
        let query = spec.build().unwrap();
        assert_eq!(
            query.sql(),
            "SELECT categories.id AS \"categories_id\", \
             categories.external_id AS \"categories_external_id\", \
             categories.name AS \"categories_name\", \
             categories.box_art_url AS \"categories_box_art_url\", \
             categories.igdb_id AS \"categories_igdb_id\", \
             categories.created_at AS \"categories_created_at\" \
             FROM categories ORDER BY categories.id"
        );
        assert!(query.params().is_empty());
        assert_eq!(query.shape(), PlanShape::Rows);
    }

    #[test]
    fn test_every_table_builds_alone() {
        for entity in Entity::ALL {
            let mut spec = QuerySpec::new();
            spec.add_table(entity.table_name()).unwrap();
            let query = spec.build().unwrap();
            assert_eq!(query.columns().len(), entity.columns().len());
            assert!(query.sql().contains(&format!("FROM {} ORDER BY", entity)));
        }
    }

    #[test]
    fn test_fan_out_without_fields_projects_every_table() {
        let mut spec = QuerySpec::new();
        spec.add_table("accounts")
            .unwrap()
            .add_table("sessions")
            .unwrap();
        let query = spec.build().unwrap();

        let expected = Entity::Account.columns().len() + Entity::Session.columns().len();
        assert_eq!(query.columns().len(), expected);
        assert_eq!(query.columns()[0].alias, "accounts_id");
        assert!(query.columns().iter().any(|c| c.alias == "sessions_id"));
        assert!(query
            .sql()
            .ends_with("LEFT JOIN sessions ON sessions.account_id = accounts.id \
                        ORDER BY accounts.id, sessions.id"));
    }

    #[test]
    fn test_many_to_one_join_without_fields_keeps_anchor_columns() {
        let mut spec = QuerySpec::new();
        spec.add_table("sessions")
            .unwrap()
            .add_table("accounts")
            .unwrap();
        let query = spec.build().unwrap();
        assert_eq!(query.columns().len(), Entity::Session.columns().len());
        assert!(query.sql().ends_with("ORDER BY sessions.id"));
    }

    #[test]
    fn test_rows_with_joins_filters_and_ordering() {
        let mut spec = QuerySpec::new();
        spec.add_table("sessions")
            .unwrap()
            .add_table("accounts")
            .unwrap()
            .add_field("sessions", "title", None)
            .unwrap()
            .add_field("accounts", "login", Some("streamer"))
            .unwrap()
            .add_filter("sessions.viewer_count", "gt", 10, "AND")
            .unwrap()
            .order_by("streamer", "desc")
            .unwrap();

        let query = spec.build().unwrap();
        assert_eq!(
            query.sql(),
            "SELECT sessions.title AS \"sessions_title\", accounts.login AS \"streamer\" \
             FROM sessions LEFT JOIN accounts ON sessions.account_id = accounts.id \
             WHERE sessions.viewer_count > $1 \
             ORDER BY \"streamer\" DESC, sessions.id"
        );
        assert_eq!(query.params(), &[Literal::Integer(10)]);
    }

    #[test]
    fn test_relation_hop_adds_one_aliased_join() {
        let mut spec = QuerySpec::new();
        spec.add_table("clips")
            .unwrap()
            .add_field("clips", "account.login", None)
            .unwrap()
            .add_field("clips", "account.display_name", None)
            .unwrap()
            .add_filter("clips.account.view_count", "gte", 1000, "AND")
            .unwrap();

        let sql = spec.build().unwrap().sql().to_string();
        assert_eq!(sql.matches("LEFT JOIN").count(), 1);
        assert!(sql.contains(
            "LEFT JOIN accounts AS clips__account ON clips.account_id = clips__account.id"
        ));
        assert!(sql.contains("WHERE clips__account.view_count >= $1"));
    }

    #[test]
    fn test_grouped_aggregation() {
        let mut spec = QuerySpec::new();
        spec.add_table("sessions")
            .unwrap()
            .add_field("sessions", "language", None)
            .unwrap()
            .add_aggregation("sessions.viewer_count", "sum", Some("viewers"))
            .unwrap()
            .add_aggregation("sessions.viewer_count", "avg", None)
            .unwrap();

        let query = spec.build().unwrap();
        assert_eq!(query.shape(), PlanShape::Grouped);
        assert_eq!(
            query.sql(),
            "SELECT sessions.language AS \"sessions_language\", \
             CAST(SUM(sessions.viewer_count) AS BIGINT) AS \"viewers\", \
             CAST(AVG(sessions.viewer_count) AS DOUBLE PRECISION) AS \"avg_sessions_viewer_count\" \
             FROM sessions GROUP BY sessions.language ORDER BY 1"
        );
        let types: Vec<_> = query.columns().iter().map(|c| c.ty).collect();
        assert_eq!(
            types,
            vec![FieldType::Text, FieldType::Integer, FieldType::Float]
        );
    }

    #[test]
    fn test_bare_aggregate_has_no_group_by() {
        let mut spec = QuerySpec::new();
        spec.add_table("clips")
            .unwrap()
            .add_aggregation("clips.id", "count", None)
            .unwrap()
            .add_aggregation("clips.duration", "sum", None)
            .unwrap()
            .add_filter("clips.title", "contains", "speedrun", "AND")
            .unwrap();

        let query = spec.build().unwrap();
        assert_eq!(query.shape(), PlanShape::BareAggregate);
        assert_eq!(
            query.sql(),
            "SELECT COUNT(clips.id) AS \"count_clips_id\", \
             SUM(clips.duration) AS \"sum_clips_duration\" \
             FROM clips WHERE COALESCE(clips.title, '') ILIKE $1"
        );
    }

    #[test]
    fn test_unreachable_join_fails_build() {
        let mut spec = QuerySpec::new();
        spec.add_table("accounts")
            .unwrap()
            .add_table("categories")
            .unwrap();
        let err = spec.build().unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnreachableJoin {
                from: Entity::Account,
                to: Entity::Category,
            }
        );
    }

    #[test]
    fn test_field_on_unselected_table() {
        let mut spec = QuerySpec::new();
        spec.add_table("sessions")
            .unwrap()
            .add_field("accounts", "login", None)
            .unwrap();
        let err = spec.build().unwrap_err();
        assert_eq!(
            err,
            ValidationError::TableNotSelected {
                table: Entity::Account,
                field: "accounts.login".to_string(),
            }
        );
    }

    #[test]
    fn test_order_by_unknown_alias() {
        let mut spec = QuerySpec::new();
        spec.add_table("accounts")
            .unwrap()
            .order_by("nope", "asc")
            .unwrap();
        assert_eq!(
            spec.build().unwrap_err(),
            ValidationError::UnknownAlias("nope".to_string())
        );
    }

    #[test]
    fn test_order_by_default_projection_alias() {
        let mut spec = QuerySpec::new();
        spec.add_table("accounts")
            .unwrap()
            .order_by("accounts_view_count", "desc")
            .unwrap();
        let sql = spec.build().unwrap().sql().to_string();
        assert!(sql.ends_with("ORDER BY \"accounts_view_count\" DESC, accounts.id"));
    }

    #[test]
    fn test_build_is_idempotent() {
        let mut spec = QuerySpec::new();
        spec.add_table("clips")
            .unwrap()
            .add_table("categories")
            .unwrap()
            .add_field("categories", "name", None)
            .unwrap()
            .add_aggregation("clips.view_count", "max", None)
            .unwrap()
            .add_filter("clips.title", "contains", "a", "AND")
            .unwrap()
            .add_filter("clips.view_count", "gt", 3, "OR")
            .unwrap();

        let first = spec.build().unwrap();
        let second = spec.build().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_injection_never_reaches_sql_text() {
        let payload = "'; DROP TABLE accounts; --";
        let mut spec = QuerySpec::new();
        spec.add_table("accounts")
            .unwrap()
            .add_filter("accounts.description", "contains", payload, "AND")
            .unwrap()
            .add_filter("accounts.login", "equals", payload, "OR")
            .unwrap();

        let query = spec.build().unwrap();
        assert!(!query.sql().contains("DROP"));
        assert!(!query.limited_sql().contains("DROP"));
        assert_eq!(query.params()[1], Literal::from(payload));
    }

    #[test]
    fn test_limited_sql_binds_next_placeholder() {
        let mut spec = QuerySpec::new();
        spec.add_table("sessions")
            .unwrap()
            .add_filter("sessions.language", "equals", "en", "AND")
            .unwrap();
        let query = spec.build().unwrap();
        assert_eq!(
            query.limited_sql(),
            format!("{} LIMIT $2", query.sql())
        );
    }
}
