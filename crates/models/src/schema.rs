//! Collection shapes as supplied by schema introspection.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ModelError;

/// Prefix reserved for system collections.
pub const SYSTEM_PREFIX: &str = "directus_";

pub const USERS_COLLECTION: &str = "directus_users";
pub const ROLES_COLLECTION: &str = "directus_roles";
pub const FILES_COLLECTION: &str = "directus_files";
pub const REVISIONS_COLLECTION: &str = "directus_revisions";

pub fn is_system_collection(name: &str) -> bool {
    name.starts_with(SYSTEM_PREFIX)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Integer,
    Float,
    String,
    Text,
    Boolean,
    Uuid,
    Json,
    Timestamp,
}

impl FieldType {
    /// Whether a non-null JSON value is acceptable for this type.
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::Integer => value.as_i64().is_some(),
            Self::Float => value.is_number(),
            Self::String | Self::Text => value.is_string(),
            Self::Boolean => value.is_boolean(),
            Self::Uuid => value.as_str().map(|s| uuid::Uuid::parse_str(s).is_ok()).unwrap_or(false),
            Self::Json => true,
            Self::Timestamp => value
                .as_str()
                .map(|s| chrono::DateTime::parse_from_rfc3339(s).is_ok())
                .unwrap_or(false),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    pub kind: FieldType,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default)]
    pub auto_increment: bool,
    #[serde(default)]
    pub default: Option<Value>,
}

fn default_true() -> bool { true }

impl FieldSchema {
    pub fn new(name: impl Into<String>, kind: FieldType) -> Self {
        Self { name: name.into(), kind, nullable: true, auto_increment: false, default: None }
    }

    pub fn required(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self.nullable = false;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// A value must be supplied on create: not nullable, no default, not generated.
    pub fn is_required_on_create(&self) -> bool {
        !self.nullable && self.default.is_none() && !self.auto_increment
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub name: String,
    pub primary_key: String,
    pub fields: BTreeMap<String, FieldSchema>,
    #[serde(default)]
    pub singleton: bool,
    /// Write a revision row for every mutated item.
    #[serde(default)]
    pub track_revisions: bool,
}

impl CollectionSchema {
    pub fn new(name: impl Into<String>, primary_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: primary_key.into(),
            fields: BTreeMap::new(),
            singleton: false,
            track_revisions: false,
        }
    }

    pub fn field(mut self, field: FieldSchema) -> Self {
        self.fields.insert(field.name.clone(), field);
        self
    }

    pub fn singleton(mut self) -> Self {
        self.singleton = true;
        self
    }

    pub fn track_revisions(mut self) -> Self {
        self.track_revisions = true;
        self
    }

    pub fn is_system(&self) -> bool { is_system_collection(&self.name) }

    pub fn primary_field(&self) -> Result<&FieldSchema, ModelError> {
        self.fields
            .get(&self.primary_key)
            .ok_or_else(|| ModelError::Validation(format!("collection {} has no primary key field {}", self.name, self.primary_key)))
    }

    pub fn get_field(&self, name: &str) -> Option<&FieldSchema> { self.fields.get(name) }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.name.trim().is_empty() {
            return Err(ModelError::Validation("collection name required".into()));
        }
        let pk = self.primary_field()?;
        if pk.nullable {
            return Err(ModelError::Validation(format!("primary key {}.{} must not be nullable", self.name, pk.name)));
        }
        if !matches!(pk.kind, FieldType::Integer | FieldType::String | FieldType::Uuid) {
            return Err(ModelError::Validation(format!("primary key {}.{} must be an integer, string or uuid", self.name, pk.name)));
        }
        Ok(())
    }
}

/// Schemas of the system tables created by the migration crate.
pub fn system_collections() -> Vec<CollectionSchema> {
    vec![
        CollectionSchema::new(ROLES_COLLECTION, "id")
            .field(FieldSchema::new("id", FieldType::Uuid).required())
            .field(FieldSchema::new("name", FieldType::String).required())
            .field(FieldSchema::new("admin_access", FieldType::Boolean).required().default_value(false))
            .field(FieldSchema::new("app_access", FieldType::Boolean).required().default_value(true)),
        CollectionSchema::new(USERS_COLLECTION, "id")
            .field(FieldSchema::new("id", FieldType::Uuid).required())
            .field(FieldSchema::new("email", FieldType::String))
            .field(FieldSchema::new("first_name", FieldType::String))
            .field(FieldSchema::new("last_name", FieldType::String))
            .field(FieldSchema::new("status", FieldType::String).required().default_value("active"))
            .field(FieldSchema::new("role", FieldType::Uuid)),
        CollectionSchema::new(FILES_COLLECTION, "id")
            .field(FieldSchema::new("id", FieldType::Uuid).required())
            .field(FieldSchema::new("storage", FieldType::String).required())
            .field(FieldSchema::new("filename_disk", FieldType::String))
            .field(FieldSchema::new("filename_download", FieldType::String).required())
            .field(FieldSchema::new("title", FieldType::String))
            .field(FieldSchema::new("type", FieldType::String))
            .field(FieldSchema::new("filesize", FieldType::Integer))
            .field(FieldSchema::new("uploaded_on", FieldType::Timestamp)),
    ]
}
