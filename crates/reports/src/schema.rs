//! Whitelisted report schema.
//!
//! Every identifier that reaches report SQL comes from the constants in this
//! module. Caller input only selects among them.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "&'static str")]
pub enum Entity {
    Category,
    Account,
    Session,
    Clip,
}

impl Entity {
    pub const ALL: [Entity; 4] = [
        Entity::Category,
        Entity::Account,
        Entity::Session,
        Entity::Clip,
    ];

    pub fn table_name(self) -> &'static str {
        match self {
            Entity::Category => "categories",
            Entity::Account => "accounts",
            Entity::Session => "sessions",
            Entity::Clip => "clips",
        }
    }

    pub fn columns(self) -> &'static [Column] {
        match self {
            Entity::Category => CATEGORY_COLUMNS,
            Entity::Account => ACCOUNT_COLUMNS,
            Entity::Session => SESSION_COLUMNS,
            Entity::Clip => CLIP_COLUMNS,
        }
    }

    pub fn column(self, name: &str) -> Option<&'static Column> {
        self.columns().iter().find(|c| c.name == name)
    }

    /// Many-to-one relations that can be used as a field path hop.
    pub fn relations(self) -> impl Iterator<Item = &'static JoinEdge> {
        JOIN_EDGES.iter().filter(move |edge| edge.child == self)
    }

    pub fn relation(self, name: &str) -> Option<&'static JoinEdge> {
        self.relations().find(|edge| edge.relation == name)
    }
}

impl FromStr for Entity {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Entity::ALL
            .into_iter()
            .find(|entity| entity.table_name() == s)
            .ok_or_else(|| ValidationError::UnknownTable(s.to_string()))
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

impl From<Entity> for &'static str {
    fn from(entity: Entity) -> Self {
        entity.table_name()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Integer,
    Float,
    Boolean,
    Timestamp,
    TextArray,
}

impl FieldType {
    pub fn is_numeric(self) -> bool {
        matches!(self, FieldType::Integer | FieldType::Float)
    }

    pub fn is_orderable(self) -> bool {
        matches!(
            self,
            FieldType::Integer | FieldType::Float | FieldType::Timestamp
        )
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Text => "text",
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Boolean => "boolean",
            FieldType::Timestamp => "timestamp",
            FieldType::TextArray => "text array",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Column {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub ty: FieldType,
}

const fn column(name: &'static str, ty: FieldType) -> Column {
    Column { name, ty }
}

const CATEGORY_COLUMNS: &[Column] = &[
    column("id", FieldType::Integer),
    column("external_id", FieldType::Text),
    column("name", FieldType::Text),
    column("box_art_url", FieldType::Text),
    column("igdb_id", FieldType::Text),
    column("created_at", FieldType::Timestamp),
];

const ACCOUNT_COLUMNS: &[Column] = &[
    column("id", FieldType::Integer),
    column("external_id", FieldType::Text),
    column("login", FieldType::Text),
    column("display_name", FieldType::Text),
    column("account_type", FieldType::Text),
    column("broadcaster_type", FieldType::Text),
    column("description", FieldType::Text),
    column("profile_image_url", FieldType::Text),
    column("offline_image_url", FieldType::Text),
    column("view_count", FieldType::Integer),
    column("created_at", FieldType::Timestamp),
];

const SESSION_COLUMNS: &[Column] = &[
    column("id", FieldType::Integer),
    column("external_id", FieldType::Text),
    column("account_id", FieldType::Integer),
    column("category_id", FieldType::Integer),
    column("title", FieldType::Text),
    column("viewer_count", FieldType::Integer),
    column("started_at", FieldType::Timestamp),
    column("language", FieldType::Text),
    column("thumbnail_url", FieldType::Text),
    column("tag_ids", FieldType::TextArray),
    column("is_mature", FieldType::Boolean),
    column("collected_at", FieldType::Timestamp),
];

const CLIP_COLUMNS: &[Column] = &[
    column("id", FieldType::Integer),
    column("external_id", FieldType::Text),
    column("url", FieldType::Text),
    column("embed_url", FieldType::Text),
    column("account_id", FieldType::Integer),
    column("category_id", FieldType::Integer),
    column("title", FieldType::Text),
    column("view_count", FieldType::Integer),
    column("created_at", FieldType::Timestamp),
    column("thumbnail_url", FieldType::Text),
    column("duration", FieldType::Float),
    column("vod_offset", FieldType::Integer),
];

/// A foreign key from `child` to `parent.id`.
///
/// The same edge is both a join rule between two added tables and the
/// `relation` hop usable in a field path on `child`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinEdge {
    pub child: Entity,
    pub parent: Entity,
    pub foreign_key: &'static str,
    pub relation: &'static str,
}

impl JoinEdge {
    pub fn connects(&self, a: Entity, b: Entity) -> bool {
        (self.child == a && self.parent == b) || (self.child == b && self.parent == a)
    }

    /// `child.fk = parent.id`, with either side optionally renamed.
    pub fn on_clause(&self, child_alias: &str, parent_alias: &str) -> String {
        format!("{}.{} = {}.id", child_alias, self.foreign_key, parent_alias)
    }
}

pub const JOIN_EDGES: &[JoinEdge] = &[
    JoinEdge {
        child: Entity::Session,
        parent: Entity::Account,
        foreign_key: "account_id",
        relation: "account",
    },
    JoinEdge {
        child: Entity::Session,
        parent: Entity::Category,
        foreign_key: "category_id",
        relation: "category",
    },
    JoinEdge {
        child: Entity::Clip,
        parent: Entity::Account,
        foreign_key: "account_id",
        relation: "account",
    },
    JoinEdge {
        child: Entity::Clip,
        parent: Entity::Category,
        foreign_key: "category_id",
        relation: "category",
    },
];

pub fn edge_between(a: Entity, b: Entity) -> Option<&'static JoinEdge> {
    JOIN_EDGES.iter().find(|edge| edge.connects(a, b))
}

/// A field path resolved against one table's schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldPath {
    Column(&'static Column),
    Related {
        edge: &'static JoinEdge,
        column: &'static Column,
    },
}

impl FieldPath {
    /// Resolve `column` or `relation.column` on `table`.
    pub fn resolve(table: Entity, path: &str) -> Result<Self, ValidationError> {
        let mut parts = path.split('.');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(name), None, _) => table
                .column(name)
                .map(FieldPath::Column)
                .ok_or_else(|| ValidationError::UnknownField {
                    table,
                    field: path.to_string(),
                }),
            (Some(relation), Some(name), None) => {
                let edge = table.relation(relation).ok_or_else(|| {
                    ValidationError::UnknownRelation {
                        table,
                        relation: relation.to_string(),
                    }
                })?;
                let column =
                    edge.parent
                        .column(name)
                        .ok_or_else(|| ValidationError::UnknownField {
                            table: edge.parent,
                            field: name.to_string(),
                        })?;
                Ok(FieldPath::Related { edge, column })
            }
            _ => Err(ValidationError::PathTooDeep(path.to_string())),
        }
    }

    pub fn column(&self) -> &'static Column {
        match self {
            FieldPath::Column(column) => column,
            FieldPath::Related { column, .. } => column,
        }
    }

    pub fn ty(&self) -> FieldType {
        self.column().ty
    }

    pub fn dotted(&self) -> String {
        match self {
            FieldPath::Column(column) => column.name.to_string(),
            FieldPath::Related { edge, column } => format!("{}.{}", edge.relation, column.name),
        }
    }
}

/// A field path anchored to a table: `table.column` or `table.relation.column`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRef {
    pub table: Entity,
    pub path: FieldPath,
}

impl FieldRef {
    pub fn new(table: Entity, path: FieldPath) -> Self {
        Self { table, path }
    }

    pub fn parse(qualified: &str) -> Result<Self, ValidationError> {
        let (table, rest) = qualified
            .split_once('.')
            .ok_or_else(|| ValidationError::UnqualifiedPath(qualified.to_string()))?;
        let table: Entity = table.parse()?;
        let path = FieldPath::resolve(table, rest)?;
        Ok(Self { table, path })
    }

    pub fn ty(&self) -> FieldType {
        self.path.ty()
    }

    pub fn qualified(&self) -> String {
        format!("{}.{}", self.table, self.path.dotted())
    }

    /// The relation join this field needs, as `(alias, edge)`.
    pub fn hop(&self) -> Option<(String, &'static JoinEdge)> {
        match self.path {
            FieldPath::Column(_) => None,
            FieldPath::Related { edge, .. } => Some((hop_alias(self.table, edge), edge)),
        }
    }

    /// Column reference as written in report SQL.
    pub fn sql_expr(&self) -> String {
        match self.path {
            FieldPath::Column(column) => format!("{}.{}", self.table, column.name),
            FieldPath::Related { edge, column } => {
                format!("{}.{}", hop_alias(self.table, edge), column.name)
            }
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified())
    }
}

pub fn hop_alias(table: Entity, edge: &JoinEdge) -> String {
    format!("{}__{}", table, edge.relation)
}
