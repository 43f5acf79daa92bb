use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use sqlx::error::BoxDynError;
use sqlx::postgres::PgArguments;
use sqlx::Arguments;

use crate::error::ValidationError;
use crate::schema::{FieldRef, FieldType};

/// A filter value. Always sent to the database as a bound parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
}

impl Literal {
    /// Map a JSON scalar to a literal. Null, arrays and objects have no literal form.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Literal::Text(s.clone())),
            Value::Bool(b) => Some(Literal::Boolean(*b)),
            Value::Number(n) => n
                .as_i64()
                .map(Literal::Integer)
                .or_else(|| n.as_f64().map(Literal::Float)),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// Coerce the literal to the type of `field`.
    ///
    /// Integers widen to floats and RFC 3339 strings parse into timestamps.
    /// Nothing else converts.
    pub fn coerce(self, field: &FieldRef) -> Result<Self, ValidationError> {
        let ty = field.ty();
        match (ty, self) {
            (FieldType::Text, lit @ Literal::Text(_)) => Ok(lit),
            (FieldType::Integer, lit @ Literal::Integer(_)) => Ok(lit),
            (FieldType::Float, lit @ Literal::Float(_)) => Ok(lit),
            (FieldType::Float, Literal::Integer(i)) => Ok(Literal::Float(i as f64)),
            (FieldType::Boolean, lit @ Literal::Boolean(_)) => Ok(lit),
            (FieldType::Timestamp, lit @ Literal::Timestamp(_)) => Ok(lit),
            (FieldType::Timestamp, Literal::Text(s)) => DateTime::parse_from_rfc3339(&s)
                .map(|ts| Literal::Timestamp(ts.with_timezone(&Utc)))
                .map_err(|_| ValidationError::LiteralTypeMismatch {
                    field: field.qualified(),
                    ty,
                    value: s,
                }),
            (FieldType::TextArray, _) => Err(ValidationError::NotFilterable(field.qualified())),
            (ty, lit) => Err(ValidationError::LiteralTypeMismatch {
                field: field.qualified(),
                ty,
                value: lit.to_string(),
            }),
        }
    }

    pub(crate) fn add_to(&self, args: &mut PgArguments) -> Result<(), BoxDynError> {
        match self {
            Literal::Text(s) => args.add(s.clone()),
            Literal::Integer(i) => args.add(*i),
            Literal::Float(f) => args.add(*f),
            Literal::Boolean(b) => args.add(*b),
            Literal::Timestamp(ts) => args.add(*ts),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Text(s) => write!(f, "{:?}", s),
            Literal::Integer(i) => write!(f, "{}", i),
            Literal::Float(v) => write!(f, "{}", v),
            Literal::Boolean(b) => write!(f, "{}", b),
            Literal::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
        }
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Literal::Text(value.to_string())
    }
}

impl From<String> for Literal {
    fn from(value: String) -> Self {
        Literal::Text(value)
    }
}

impl From<i64> for Literal {
    fn from(value: i64) -> Self {
        Literal::Integer(value)
    }
}

impl From<i32> for Literal {
    fn from(value: i32) -> Self {
        Literal::Integer(value.into())
    }
}

impl From<f64> for Literal {
    fn from(value: f64) -> Self {
        Literal::Float(value)
    }
}

impl From<bool> for Literal {
    fn from(value: bool) -> Self {
        Literal::Boolean(value)
    }
}

impl From<DateTime<Utc>> for Literal {
    fn from(value: DateTime<Utc>) -> Self {
        Literal::Timestamp(value)
    }
}

impl Serialize for Literal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Literal::Text(s) => serializer.serialize_str(s),
            Literal::Integer(i) => serializer.serialize_i64(*i),
            Literal::Float(f) => serializer.serialize_f64(*f),
            Literal::Boolean(b) => serializer.serialize_bool(*b),
            Literal::Timestamp(ts) => serializer.serialize_str(&ts.to_rfc3339()),
        }
    }
}

impl<'de> Deserialize<'de> for Literal {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Literal::from_json(&value).ok_or_else(|| {
            serde::de::Error::custom("expected a string, number or boolean filter value")
        })
    }
}
