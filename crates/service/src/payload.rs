//! Checks a partial item against the collection schema and the caller's field access.

use models::schema::{CollectionSchema, FieldType};
use models::{Item, PrimaryKey};
use serde_json::Value;

use crate::errors::ServiceError;
use crate::permissions::FieldAccess;

fn check_fields(schema: &CollectionSchema, access: &FieldAccess, item: &Item) -> Result<(), ServiceError> {
    for (name, value) in item {
        let field = schema
            .get_field(name)
            .ok_or_else(|| ServiceError::Validation(format!("unknown field `{name}` on {}", schema.name)))?;
        if !access.allows(name) {
            return Err(ServiceError::Forbidden(format!("field `{name}` on {} is not writable", schema.name)));
        }
        if value.is_null() {
            if !field.nullable {
                return Err(ServiceError::Validation(format!("field `{name}` cannot be null")));
            }
        } else if !field.kind.accepts(value) {
            return Err(ServiceError::Validation(format!("field `{name}` expects {:?}, got {value}", field.kind)));
        }
    }
    Ok(())
}

/// Payload ready to insert, plus the key when it is known up front
/// (supplied by the caller or generated here).
pub(crate) fn prepare_create(
    schema: &CollectionSchema,
    access: &FieldAccess,
    mut item: Item,
) -> Result<(Option<PrimaryKey>, Item), ServiceError> {
    check_fields(schema, access, &item)?;

    let pk = schema.primary_field()?;
    if !item.contains_key(&pk.name) && pk.kind == FieldType::Uuid {
        item.insert(pk.name.clone(), Value::from(uuid::Uuid::new_v4().to_string()));
    }

    for field in schema.fields.values() {
        if item.contains_key(&field.name) {
            continue;
        }
        if let Some(default) = &field.default {
            item.insert(field.name.clone(), default.clone());
        } else if field.is_required_on_create() {
            return Err(ServiceError::Validation(format!("field `{}` is required", field.name)));
        }
    }

    let key = match item.get(&pk.name) {
        Some(v) => Some(
            PrimaryKey::from_json(v)
                .ok_or_else(|| ServiceError::Validation(format!("invalid primary key {v}")))?,
        ),
        None => None,
    };
    Ok((key, item))
}

/// Payload ready to apply to `key`. A primary key equal to `key` is dropped;
/// any other value is rejected since keys never change.
pub(crate) fn prepare_update(
    schema: &CollectionSchema,
    access: &FieldAccess,
    key: Option<&PrimaryKey>,
    mut item: Item,
) -> Result<Item, ServiceError> {
    if let Some(v) = item.remove(&schema.primary_key) {
        let same = match (PrimaryKey::from_json(&v), key) {
            (Some(given), Some(target)) => &given == target,
            _ => false,
        };
        if !same {
            return Err(ServiceError::Validation(format!("primary key `{}` cannot be changed", schema.primary_key)));
        }
    }
    check_fields(schema, access, &item)?;
    Ok(item)
}

/// Field defaults for every field `access` covers; fields without one are null.
pub(crate) fn defaults(schema: &CollectionSchema, access: &FieldAccess) -> Item {
    schema
        .fields
        .values()
        .filter(|f| access.allows(&f.name))
        .map(|f| (f.name.clone(), f.default.clone().unwrap_or(Value::Null)))
        .collect()
}
