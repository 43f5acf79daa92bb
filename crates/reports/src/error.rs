use thiserror::Error;

use crate::schema::{Entity, FieldType};
use crate::spec::{AggregateFunction, Operator};

/// Rejected report input. Always raised before any I/O.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("no table selected")]
    NoTableSelected,

    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("unknown field {field} on table {table}")]
    UnknownField { table: Entity, field: String },

    #[error("unknown relation {relation} on table {table}")]
    UnknownRelation { table: Entity, relation: String },

    #[error("field path {0} is too deep; only one relation hop is allowed")]
    PathTooDeep(String),

    #[error("field path {0} must be qualified as table.field")]
    UnqualifiedPath(String),

    #[error("unknown operator: {0}")]
    UnknownOperator(String),

    #[error("unknown aggregate function: {0}")]
    UnknownFunction(String),

    #[error("unknown connective: {0} (expected AND or OR)")]
    UnknownConnective(String),

    #[error("unknown sort direction: {0} (expected asc or desc)")]
    UnknownDirection(String),

    #[error("operator {operator} is not defined for {field} ({ty})")]
    OperatorTypeMismatch {
        field: String,
        operator: Operator,
        ty: FieldType,
    },

    #[error("aggregate {function} is not defined for {field} ({ty})")]
    FunctionTypeMismatch {
        field: String,
        function: AggregateFunction,
        ty: FieldType,
    },

    #[error("value {value} is not a valid {ty} for {field}")]
    LiteralTypeMismatch {
        field: String,
        ty: FieldType,
        value: String,
    },

    #[error("field {0} cannot be filtered")]
    NotFilterable(String),

    #[error("invalid alias: {0:?}")]
    InvalidAlias(String),

    #[error("duplicate alias: {0}")]
    DuplicateAlias(String),

    #[error("unknown alias in ordering: {0}")]
    UnknownAlias(String),

    #[error("field {field} references table {table}, which was not added")]
    TableNotSelected { table: Entity, field: String },

    #[error("no join path between {from} and {to}")]
    UnreachableJoin { from: Entity, to: Entity },

    #[error("joining {table} would fan out a second one-to-many relation")]
    FanOutJoin { table: Entity },
}

/// Store-level failure while materializing a report.
#[derive(Debug, Error)]
pub enum DataAccessError {
    #[error("query failed: {0}")]
    Query(#[from] sqlx::Error),

    #[error("could not encode parameter ${index}: {message}")]
    Encode { index: usize, message: String },

    #[error("could not decode column {column}: {source}")]
    Decode { column: String, source: sqlx::Error },
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    DataAccess(#[from] DataAccessError),
}
