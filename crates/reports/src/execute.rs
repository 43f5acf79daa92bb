use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::stream::{self, BoxStream, StreamExt};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Number, Value};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::{PgPool, Row};

use crate::error::DataAccessError;
use crate::literal::Literal;
use crate::plan::{OutputColumn, PlanShape};
use crate::schema::FieldType;

/// A compiled report: SQL text plus its bound parameters.
///
/// Nothing touches the database until the rows are streamed or fetched, and
/// the same query can be executed any number of times.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportQuery {
    sql: String,
    limited_sql: String,
    params: Vec<Literal>,
    columns: Vec<OutputColumn>,
    aliases: Arc<[String]>,
    shape: PlanShape,
}

impl ReportQuery {
    pub(crate) fn new(
        sql: String,
        params: Vec<Literal>,
        columns: Vec<OutputColumn>,
        shape: PlanShape,
    ) -> Self {
        let limited_sql = format!("{} LIMIT ${}", sql, params.len() + 1);
        let aliases = columns.iter().map(|c| c.alias.clone()).collect();
        Self {
            sql,
            limited_sql,
            params,
            columns,
            aliases,
            shape,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// The same query with a trailing bound `LIMIT`.
    pub fn limited_sql(&self) -> &str {
        &self.limited_sql
    }

    pub fn params(&self) -> &[Literal] {
        &self.params
    }

    pub fn columns(&self) -> &[OutputColumn] {
        &self.columns
    }

    pub fn shape(&self) -> PlanShape {
        self.shape
    }

    /// Stream decoded rows, optionally capped at `limit`.
    ///
    /// A bare aggregate ignores `limit` and always yields its single row.
    pub fn stream<'a>(
        &'a self,
        pool: &'a PgPool,
        limit: Option<u64>,
    ) -> BoxStream<'a, Result<ReportRow, DataAccessError>> {
        let (sql, args) = match self.arguments(limit) {
            Ok(prepared) => prepared,
            Err(err) => return stream::once(async move { Err(err) }).boxed(),
        };

        sqlx::query_with(sql, args)
            .fetch(pool)
            .map(move |row| row.map_err(DataAccessError::from).and_then(|r| self.decode(&r)))
            .boxed()
    }

    /// Materialize every row on one pooled connection.
    pub async fn fetch_all(
        &self,
        pool: &PgPool,
        limit: Option<u64>,
    ) -> Result<Vec<ReportRow>, DataAccessError> {
        let (sql, args) = self.arguments(limit)?;
        let mut conn = pool.acquire().await?;
        let rows = sqlx::query_with(sql, args).fetch_all(&mut *conn).await?;
        rows.iter().map(|row| self.decode(row)).collect()
    }

    fn arguments(&self, limit: Option<u64>) -> Result<(&str, PgArguments), DataAccessError> {
        let mut args = PgArguments::default();
        for (i, param) in self.params.iter().enumerate() {
            param
                .add_to(&mut args)
                .map_err(|e| DataAccessError::Encode {
                    index: i + 1,
                    message: e.to_string(),
                })?;
        }

        // A bare aggregate is always exactly one row, so a limit never applies.
        match limit.filter(|_| self.shape != PlanShape::BareAggregate) {
            None => Ok((self.sql.as_str(), args)),
            Some(limit) => {
                let limit = i64::try_from(limit).unwrap_or(i64::MAX);
                Literal::Integer(limit)
                    .add_to(&mut args)
                    .map_err(|e| DataAccessError::Encode {
                        index: self.params.len() + 1,
                        message: e.to_string(),
                    })?;
                Ok((self.limited_sql.as_str(), args))
            }
        }
    }

    fn decode(&self, row: &PgRow) -> Result<ReportRow, DataAccessError> {
        let values = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, column)| {
                decode_value(row, i, column.ty).map_err(|source| DataAccessError::Decode {
                    column: column.alias.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ReportRow {
            columns: Arc::clone(&self.aliases),
            values,
        })
    }
}

fn decode_value(row: &PgRow, index: usize, ty: FieldType) -> Result<Value, sqlx::Error> {
    let value = match ty {
        FieldType::Text => row.try_get::<Option<String>, _>(index)?.map(Value::String),
        FieldType::Integer => row.try_get::<Option<i64>, _>(index)?.map(Value::from),
        FieldType::Float => row
            .try_get::<Option<f64>, _>(index)?
            .and_then(Number::from_f64)
            .map(Value::Number),
        FieldType::Boolean => row.try_get::<Option<bool>, _>(index)?.map(Value::Bool),
        FieldType::Timestamp => row
            .try_get::<Option<DateTime<Utc>>, _>(index)?
            .map(|ts| Value::String(ts.to_rfc3339())),
        FieldType::TextArray => row
            .try_get::<Option<Vec<String>>, _>(index)?
            .map(|tags| Value::Array(tags.into_iter().map(Value::String).collect())),
    };
    Ok(value.unwrap_or(Value::Null))
}

/// One output row, keyed by the query's output aliases in projection order.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl ReportRow {
    pub fn get(&self, alias: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == alias)
            .and_then(|i| self.values.get(i))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(String::as_str).zip(&self.values)
    }
}

impl Serialize for ReportRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (alias, value) in self.iter() {
            map.serialize_entry(alias, value)?;
        }
        map.end()
    }
}
