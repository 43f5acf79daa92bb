//! Ad hoc reports over the ingested entities.
//!
//! A [`QuerySpec`] is assembled from caller-supplied names, validated against
//! a static whitelist, and compiled into one parameterized PostgreSQL query.
//! Table and column identifiers only ever come from [`schema`]; every value
//! is a bound parameter.

pub mod error;
pub mod execute;
pub mod filters;
pub mod joins;
pub mod literal;
pub mod plan;
pub mod schema;
pub mod spec;
mod sql;

pub use error::{DataAccessError, ReportError, ValidationError};
pub use execute::{ReportQuery, ReportRow};
pub use literal::Literal;
pub use plan::{OutputColumn, PlanShape};
pub use schema::{Column, Entity, FieldPath, FieldRef, FieldType, JoinEdge, JOIN_EDGES};
pub use spec::{AggregateFunction, Connective, Direction, Operator, QuerySpec};
