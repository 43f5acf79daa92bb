//! The user-assembled report specification.
//!
//! Every `add_*` call validates its input against the schema whitelist and
//! rejects it on the spot. What is stored is already resolved, so compiling
//! never has to look at caller strings again.

use std::fmt;
use std::str::FromStr;

use tracing::debug;

use crate::error::ValidationError;
use crate::filters;
use crate::literal::Literal;
use crate::schema::{Entity, FieldPath, FieldRef, FieldType};

const MAX_ALIAS_LEN: usize = 63;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equals,
    Contains,
    Gt,
    Lt,
    Gte,
    Lte,
}

impl Operator {
    pub const ALL: [Operator; 6] = [
        Operator::Equals,
        Operator::Contains,
        Operator::Gt,
        Operator::Lt,
        Operator::Gte,
        Operator::Lte,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Equals => "equals",
            Operator::Contains => "contains",
            Operator::Gt => "gt",
            Operator::Lt => "lt",
            Operator::Gte => "gte",
            Operator::Lte => "lte",
        }
    }

    pub fn accepts(self, ty: FieldType) -> bool {
        match self {
            Operator::Equals => ty != FieldType::TextArray,
            Operator::Contains => ty == FieldType::Text,
            Operator::Gt | Operator::Lt | Operator::Gte | Operator::Lte => ty.is_orderable(),
        }
    }
}

impl FromStr for Operator {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operator::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownOperator(s.to_string()))
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Max,
    Min,
}

impl AggregateFunction {
    pub const ALL: [AggregateFunction; 5] = [
        AggregateFunction::Count,
        AggregateFunction::Sum,
        AggregateFunction::Avg,
        AggregateFunction::Max,
        AggregateFunction::Min,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AggregateFunction::Count => "count",
            AggregateFunction::Sum => "sum",
            AggregateFunction::Avg => "avg",
            AggregateFunction::Max => "max",
            AggregateFunction::Min => "min",
        }
    }

    /// Result type of the function over a field of type `ty`, if defined.
    pub fn output_type(self, ty: FieldType) -> Option<FieldType> {
        match self {
            AggregateFunction::Count => Some(FieldType::Integer),
            AggregateFunction::Sum if ty.is_numeric() => Some(ty),
            AggregateFunction::Avg if ty.is_numeric() => Some(FieldType::Float),
            AggregateFunction::Max | AggregateFunction::Min
                if ty.is_orderable() || ty == FieldType::Text =>
            {
                Some(ty)
            }
            _ => None,
        }
    }
}

impl FromStr for AggregateFunction {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AggregateFunction::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownFunction(s.to_string()))
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connective {
    And,
    Or,
}

impl FromStr for Connective {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("and") {
            Ok(Connective::And)
        } else if s.eq_ignore_ascii_case("or") {
            Ok(Connective::Or)
        } else {
            Err(ValidationError::UnknownConnective(s.to_string()))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

impl FromStr for Direction {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("asc") {
            Ok(Direction::Asc)
        } else if s.eq_ignore_ascii_case("desc") {
            Ok(Direction::Desc)
        } else {
            Err(ValidationError::UnknownDirection(s.to_string()))
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSelection {
    pub field: FieldRef,
    pub alias: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterPredicate {
    pub field: FieldRef,
    pub operator: Operator,
    pub value: Literal,
    pub connective: Connective,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregationRequest {
    pub field: FieldRef,
    pub function: AggregateFunction,
    pub alias: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ordering {
    pub alias: String,
    pub direction: Direction,
}

/// A report under construction.
///
/// ```no_run
/// use reports::QuerySpec;
///
/// # fn main() -> Result<(), reports::ValidationError> {
/// let mut spec = QuerySpec::new();
/// spec.add_table("sessions")?
///     .add_table("accounts")?
///     .add_field("accounts", "login", None)?
///     .add_aggregation("sessions.viewer_count", "sum", Some("total_viewers"))?
///     .add_filter("sessions.language", "equals", "en", "AND")?
///     .order_by("total_viewers", "desc")?;
/// let query = spec.build()?;
/// # let _ = query;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySpec {
    pub(crate) tables: Vec<Entity>,
    pub(crate) fields: Vec<FieldSelection>,
    pub(crate) filters: Vec<FilterPredicate>,
    pub(crate) aggregations: Vec<AggregationRequest>,
    pub(crate) orderings: Vec<Ordering>,
}

impl QuerySpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a whitelisted table. The first table added is the anchor.
    pub fn add_table(&mut self, name: &str) -> Result<&mut Self, ValidationError> {
        let entity: Entity = name.parse()?;
        if self.tables.contains(&entity) {
            debug!(table = %entity, "table already selected");
        } else {
            self.tables.push(entity);
        }
        Ok(self)
    }

    /// Select `field_path` (a column or `relation.column`) of `table`.
    pub fn add_field(
        &mut self,
        table: &str,
        field_path: &str,
        alias: Option<&str>,
    ) -> Result<&mut Self, ValidationError> {
        let table: Entity = table.parse()?;
        let field = FieldRef::new(table, FieldPath::resolve(table, field_path)?);
        let alias = match alias {
            Some(alias) => alias.to_string(),
            None => format!("{}_{}", table, field_path.replace('.', "_")),
        };
        self.claim_alias(&alias)?;
        self.fields.push(FieldSelection { field, alias });
        Ok(self)
    }

    /// Add a predicate on a table-qualified field path.
    ///
    /// The connective joins this predicate to everything added before it and
    /// is ignored for the first predicate.
    pub fn add_filter(
        &mut self,
        field_path: &str,
        operator: &str,
        value: impl Into<Literal>,
        connective: &str,
    ) -> Result<&mut Self, ValidationError> {
        let field = FieldRef::parse(field_path)?;
        let operator: Operator = operator.parse()?;
        let connective: Connective = connective.parse()?;
        let value = filters::validate(&field, operator, value.into())?;
        self.filters.push(FilterPredicate {
            field,
            operator,
            value,
            connective,
        });
        Ok(self)
    }

    pub fn add_aggregation(
        &mut self,
        field_path: &str,
        function: &str,
        alias: Option<&str>,
    ) -> Result<&mut Self, ValidationError> {
        let field = FieldRef::parse(field_path)?;
        let function: AggregateFunction = function.parse()?;
        if function.output_type(field.ty()).is_none() {
            return Err(ValidationError::FunctionTypeMismatch {
                field: field.qualified(),
                function,
                ty: field.ty(),
            });
        }
        let alias = match alias {
            Some(alias) => alias.to_string(),
            None => format!("{}_{}", function, field.qualified().replace('.', "_")),
        };
        self.claim_alias(&alias)?;
        self.aggregations.push(AggregationRequest {
            field,
            function,
            alias,
        });
        Ok(self)
    }

    /// Order by a field or aggregation alias. Aliases are checked at build time.
    pub fn order_by(&mut self, alias: &str, direction: &str) -> Result<&mut Self, ValidationError> {
        let direction: Direction = direction.parse()?;
        self.orderings.push(Ordering {
            alias: alias.to_string(),
            direction,
        });
        Ok(self)
    }

    pub fn tables(&self) -> &[Entity] {
        &self.tables
    }

    pub fn anchor(&self) -> Option<Entity> {
        self.tables.first().copied()
    }

    pub(crate) fn aliases(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .map(|f| f.alias.as_str())
            .chain(self.aggregations.iter().map(|a| a.alias.as_str()))
    }

    fn claim_alias(&self, alias: &str) -> Result<(), ValidationError> {
        validate_alias(alias)?;
        if self.aliases().any(|existing| existing == alias) {
            return Err(ValidationError::DuplicateAlias(alias.to_string()));
        }
        Ok(())
    }
}

pub(crate) fn validate_alias(alias: &str) -> Result<(), ValidationError> {
    let mut chars = alias.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid_start && valid_rest && alias.len() <= MAX_ALIAS_LEN {
        Ok(())
    } else {
        Err(ValidationError::InvalidAlias(alias.to_string()))
    }
}
