//! Statements over schema-described collections.
//!
//! Collections are not sea-orm entities, so statements are assembled with
//! sea-query against `Alias` identifiers and rows are decoded per field type.

use std::collections::BTreeSet;

use models::query::{Filter, Query, Sort};
use models::schema::{CollectionSchema, FieldSchema, FieldType};
use models::{Item, PrimaryKey};
use sea_orm::sea_query::{
    Alias, Condition, DeleteStatement, Expr, InsertStatement, Keyword, Order, Query as SeaQuery, SelectStatement,
    SimpleExpr, UpdateStatement,
};
use sea_orm::{ConnectionTrait, DbBackend, QueryResult, Statement, Value as DbValue};
use serde_json::Value;
use tracing::trace;

use crate::errors::ServiceError;

/// Largest LIMIT every backend accepts; used when OFFSET needs a LIMIT.
const NO_LIMIT: u64 = i64::MAX as u64;

fn ident(name: &str) -> Alias { Alias::new(name) }

fn field<'a>(schema: &'a CollectionSchema, name: &str) -> Result<&'a FieldSchema, ServiceError> {
    schema
        .get_field(name)
        .ok_or_else(|| ServiceError::Validation(format!("unknown field `{name}` on {}", schema.name)))
}

/// Bind a JSON value for a column of `field`'s type.
pub(crate) fn bind(backend: DbBackend, field: &FieldSchema, value: &Value) -> Result<SimpleExpr, ServiceError> {
    if value.is_null() {
        return Ok(SimpleExpr::Keyword(Keyword::Null));
    }
    let mismatch = || ServiceError::Validation(format!("invalid value for field `{}`: {value}", field.name));
    let bound: DbValue = match field.kind {
        FieldType::Integer => value.as_i64().ok_or_else(mismatch)?.into(),
        FieldType::Float => value.as_f64().ok_or_else(mismatch)?.into(),
        FieldType::Boolean => value.as_bool().ok_or_else(mismatch)?.into(),
        // uuids are stored as text, as the system tables do
        FieldType::String | FieldType::Text | FieldType::Uuid => value.as_str().ok_or_else(mismatch)?.to_string().into(),
        FieldType::Json => match backend {
            DbBackend::Postgres => value.clone().into(),
            _ => value.to_string().into(),
        },
        FieldType::Timestamp => {
            let text = value.as_str().ok_or_else(mismatch)?;
            chrono::DateTime::parse_from_rfc3339(text).map_err(|_| mismatch())?;
            text.to_string().into()
        }
    };
    Ok(SimpleExpr::Value(bound))
}

pub(crate) fn bind_key(backend: DbBackend, schema: &CollectionSchema, key: &PrimaryKey) -> Result<SimpleExpr, ServiceError> {
    let pk = schema.primary_field()?;
    bind(backend, pk, &key.to_json())
}

fn bind_keys(backend: DbBackend, schema: &CollectionSchema, keys: &[PrimaryKey]) -> Result<Vec<SimpleExpr>, ServiceError> {
    keys.iter().map(|k| bind_key(backend, schema, k)).collect()
}

/// Compile a filter tree. Unknown fields are a validation error.
pub(crate) fn condition(backend: DbBackend, schema: &CollectionSchema, filter: &Filter) -> Result<Condition, ServiceError> {
    let leaf = |name: &str, value: &Value| -> Result<(Expr, SimpleExpr), ServiceError> {
        let f = field(schema, name)?;
        Ok((Expr::col(ident(name)), bind(backend, f, value)?))
    };
    let cond = match filter {
        Filter::Eq { field: name, value } if value.is_null() => {
            field(schema, name)?;
            Condition::all().add(Expr::col(ident(name)).is_null())
        }
        Filter::Neq { field: name, value } if value.is_null() => {
            field(schema, name)?;
            Condition::all().add(Expr::col(ident(name)).is_not_null())
        }
        Filter::Eq { field, value } => {
            let (col, v) = leaf(field, value)?;
            Condition::all().add(col.eq(v))
        }
        Filter::Neq { field, value } => {
            let (col, v) = leaf(field, value)?;
            Condition::all().add(col.ne(v))
        }
        Filter::Gt { field, value } => {
            let (col, v) = leaf(field, value)?;
            Condition::all().add(col.gt(v))
        }
        Filter::Gte { field, value } => {
            let (col, v) = leaf(field, value)?;
            Condition::all().add(col.gte(v))
        }
        Filter::Lt { field, value } => {
            let (col, v) = leaf(field, value)?;
            Condition::all().add(col.lt(v))
        }
        Filter::Lte { field, value } => {
            let (col, v) = leaf(field, value)?;
            Condition::all().add(col.lte(v))
        }
        Filter::In { field: name, values } => {
            let f = field(schema, name)?;
            let bound = values.iter().map(|v| bind(backend, f, v)).collect::<Result<Vec<_>, _>>()?;
            Condition::all().add(Expr::col(ident(name)).is_in(bound))
        }
        Filter::Null { field: name } => {
            field(schema, name)?;
            Condition::all().add(Expr::col(ident(name)).is_null())
        }
        Filter::NotNull { field: name } => {
            field(schema, name)?;
            Condition::all().add(Expr::col(ident(name)).is_not_null())
        }
        Filter::Contains { field: name, value } => {
            field(schema, name)?;
            let escaped = value.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
            Condition::all().add(Expr::col(ident(name)).like(sea_orm::sea_query::LikeExpr::new(format!("%{escaped}%")).escape('\\')))
        }
        Filter::And(children) => children
            .iter()
            .try_fold(Condition::all(), |acc, c| Ok::<_, ServiceError>(acc.add(condition(backend, schema, c)?)))?,
        Filter::Or(children) => children
            .iter()
            .try_fold(Condition::any(), |acc, c| Ok::<_, ServiceError>(acc.add(condition(backend, schema, c)?)))?,
    };
    Ok(cond)
}

/// SELECT `columns` with the query's filter, sort and window. Without an
/// explicit sort rows come back in primary key order.
pub(crate) fn select(
    backend: DbBackend,
    schema: &CollectionSchema,
    columns: &[String],
    query: &Query,
    limit: Option<u64>,
) -> Result<SelectStatement, ServiceError> {
    let mut stmt = SeaQuery::select();
    stmt.from(ident(&schema.name));
    for c in columns {
        field(schema, c)?;
        stmt.column(ident(c));
    }
    if let Some(filter) = &query.filter {
        stmt.cond_where(condition(backend, schema, filter)?);
    }
    let sort: Vec<Sort> = if query.sort.is_empty() { vec![Sort::asc(schema.primary_key.clone())] } else { query.sort.clone() };
    for s in &sort {
        field(schema, &s.field)?;
        stmt.order_by(ident(&s.field), if s.descending { Order::Desc } else { Order::Asc });
    }
    match (limit, query.offset) {
        (Some(l), _) => {
            stmt.limit(l);
        }
        (None, Some(_)) => {
            stmt.limit(NO_LIMIT);
        }
        (None, None) => {}
    }
    if let Some(offset) = query.offset {
        stmt.offset(offset);
    }
    Ok(stmt)
}

pub(crate) async fn fetch<C: ConnectionTrait>(
    conn: &C,
    schema: &CollectionSchema,
    columns: &[String],
    query: &Query,
    limit: Option<u64>,
) -> Result<Vec<Item>, ServiceError> {
    let backend = conn.get_database_backend();
    let stmt = select(backend, schema, columns, query, limit)?;
    let rows = conn.query_all(backend.build(&stmt)).await?;
    trace!(collection = %schema.name, rows = rows.len(), "rows_fetched");
    rows.iter().map(|row| decode(schema, columns, row)).collect()
}

pub(crate) async fn fetch_keys<C: ConnectionTrait>(
    conn: &C,
    schema: &CollectionSchema,
    query: &Query,
    limit: Option<u64>,
) -> Result<Vec<PrimaryKey>, ServiceError> {
    let columns = vec![schema.primary_key.clone()];
    let rows = fetch(conn, schema, &columns, query, limit).await?;
    rows.iter().map(|item| key_of(schema, item)).collect()
}

/// Rows for `keys`, every field included.
pub(crate) async fn fetch_by_keys<C: ConnectionTrait>(
    conn: &C,
    schema: &CollectionSchema,
    keys: &[PrimaryKey],
) -> Result<Vec<Item>, ServiceError> {
    if keys.is_empty() {
        return Ok(Vec::new());
    }
    let columns: Vec<String> = schema.fields.keys().cloned().collect();
    let query = Query::new().filter(Filter::is_in(schema.primary_key.clone(), keys.iter().map(PrimaryKey::to_json)));
    fetch(conn, schema, &columns, &query, None).await
}

/// The subset of `keys` with no row.
pub(crate) async fn missing_keys<C: ConnectionTrait>(
    conn: &C,
    schema: &CollectionSchema,
    keys: &[PrimaryKey],
) -> Result<Vec<PrimaryKey>, ServiceError> {
    if keys.is_empty() {
        return Ok(Vec::new());
    }
    let query = Query::new().filter(Filter::is_in(schema.primary_key.clone(), keys.iter().map(PrimaryKey::to_json)));
    let found: BTreeSet<PrimaryKey> = fetch_keys(conn, schema, &query, None).await?.into_iter().collect();
    Ok(keys.iter().filter(|k| !found.contains(k)).cloned().collect())
}

pub(crate) fn key_of(schema: &CollectionSchema, item: &Item) -> Result<PrimaryKey, ServiceError> {
    item.get(&schema.primary_key)
        .and_then(PrimaryKey::from_json)
        .ok_or_else(|| ServiceError::Db(format!("row in {} has no usable primary key", schema.name)))
}

fn decode(schema: &CollectionSchema, columns: &[String], row: &QueryResult) -> Result<Item, ServiceError> {
    let mut item = Item::new();
    for c in columns {
        let f = field(schema, c)?;
        item.insert(c.clone(), decode_value(row, f)?);
    }
    Ok(item)
}

fn decode_value(row: &QueryResult, f: &FieldSchema) -> Result<Value, ServiceError> {
    let col = f.name.as_str();
    let value = match f.kind {
        FieldType::Integer => match row.try_get::<Option<i64>>("", col) {
            Ok(v) => v.map(Value::from),
            Err(_) => row.try_get::<Option<i32>>("", col)?.map(Value::from),
        },
        FieldType::Float => match row.try_get::<Option<f64>>("", col) {
            Ok(v) => v.map(Value::from),
            Err(_) => row.try_get::<Option<f32>>("", col)?.map(|v| Value::from(f64::from(v))),
        },
        FieldType::Boolean => match row.try_get::<Option<bool>>("", col) {
            Ok(v) => v.map(Value::from),
            Err(_) => row.try_get::<Option<i64>>("", col)?.map(|v| Value::from(v != 0)),
        },
        FieldType::String | FieldType::Text => row.try_get::<Option<String>>("", col)?.map(Value::from),
        FieldType::Uuid => match row.try_get::<Option<String>>("", col) {
            Ok(v) => v.map(Value::from),
            Err(_) => row.try_get::<Option<uuid::Uuid>>("", col)?.map(|u| Value::from(u.to_string())),
        },
        FieldType::Json => match row.try_get::<Option<String>>("", col) {
            Ok(v) => v.map(|text| serde_json::from_str(&text).unwrap_or(Value::String(text))),
            Err(_) => row.try_get::<Option<Value>>("", col)?,
        },
        FieldType::Timestamp => match row.try_get::<Option<String>>("", col) {
            Ok(v) => v.map(Value::from),
            Err(_) => match row.try_get::<Option<chrono::DateTime<chrono::Utc>>>("", col) {
                Ok(v) => v.map(|dt| Value::from(dt.to_rfc3339())),
                Err(_) => row
                    .try_get::<Option<chrono::NaiveDateTime>>("", col)?
                    .map(|dt| Value::from(dt.and_utc().to_rfc3339())),
            },
        },
    };
    Ok(value.unwrap_or(Value::Null))
}

fn columns_and_values(backend: DbBackend, schema: &CollectionSchema, values: &Item) -> Result<Vec<(Alias, SimpleExpr)>, ServiceError> {
    values
        .iter()
        .map(|(name, value)| Ok((ident(name), bind(backend, field(schema, name)?, value)?)))
        .collect()
}

fn insert_statement(backend: DbBackend, schema: &CollectionSchema, values: &Item) -> Result<InsertStatement, ServiceError> {
    let pairs = columns_and_values(backend, schema, values)?;
    let mut stmt = SeaQuery::insert();
    stmt.into_table(ident(&schema.name));
    if pairs.is_empty() {
        stmt.or_default_values();
    } else {
        let (cols, exprs): (Vec<Alias>, Vec<SimpleExpr>) = pairs.into_iter().unzip();
        stmt.columns(cols);
        stmt.values(exprs).map_err(|e| ServiceError::Db(e.to_string()))?;
    }
    Ok(stmt)
}

/// Insert one row and return its key: the supplied one, else the generated one.
pub(crate) async fn insert<C: ConnectionTrait>(
    conn: &C,
    schema: &CollectionSchema,
    values: &Item,
    key: Option<PrimaryKey>,
) -> Result<PrimaryKey, ServiceError> {
    let backend = conn.get_database_backend();
    let mut stmt = insert_statement(backend, schema, values)?;
    if let Some(key) = key {
        conn.execute(backend.build(&stmt)).await?;
        return Ok(key);
    }
    if backend.support_returning() {
        stmt.returning_col(ident(&schema.primary_key));
        let row = conn
            .query_one(backend.build(&stmt))
            .await?
            .ok_or_else(|| ServiceError::Db(format!("insert into {} returned no row", schema.name)))?;
        let item = decode(schema, std::slice::from_ref(&schema.primary_key), &row)?;
        return key_of(schema, &item);
    }
    let res = conn.execute(backend.build(&stmt)).await?;
    let id = i64::try_from(res.last_insert_id())
        .map_err(|_| ServiceError::Db(format!("generated key for {} out of range", schema.name)))?;
    Ok(PrimaryKey::Integer(id))
}

fn update_statement(
    backend: DbBackend,
    schema: &CollectionSchema,
    keys: &[PrimaryKey],
    values: &Item,
) -> Result<UpdateStatement, ServiceError> {
    let mut stmt = SeaQuery::update();
    stmt.table(ident(&schema.name))
        .values(columns_and_values(backend, schema, values)?)
        .and_where(Expr::col(ident(&schema.primary_key)).is_in(bind_keys(backend, schema, keys)?));
    Ok(stmt)
}

/// Apply `values` to every row in `keys`. Empty payloads write nothing.
pub(crate) async fn update<C: ConnectionTrait>(
    conn: &C,
    schema: &CollectionSchema,
    keys: &[PrimaryKey],
    values: &Item,
) -> Result<u64, ServiceError> {
    if keys.is_empty() || values.is_empty() {
        return Ok(0);
    }
    let backend = conn.get_database_backend();
    let stmt = update_statement(backend, schema, keys, values)?;
    Ok(conn.execute(backend.build(&stmt)).await?.rows_affected())
}

fn delete_statement(backend: DbBackend, schema: &CollectionSchema, keys: &[PrimaryKey]) -> Result<DeleteStatement, ServiceError> {
    let mut stmt = SeaQuery::delete();
    stmt.from_table(ident(&schema.name))
        .and_where(Expr::col(ident(&schema.primary_key)).is_in(bind_keys(backend, schema, keys)?));
    Ok(stmt)
}

pub(crate) async fn delete<C: ConnectionTrait>(conn: &C, schema: &CollectionSchema, keys: &[PrimaryKey]) -> Result<u64, ServiceError> {
    if keys.is_empty() {
        return Ok(0);
    }
    let backend = conn.get_database_backend();
    let stmt = delete_statement(backend, schema, keys)?;
    Ok(conn.execute(backend.build(&stmt)).await?.rows_affected())
}

/// Move a Postgres serial sequence past the largest key, after rows were
/// inserted with explicit keys. Other backends track this themselves.
pub(crate) async fn reset_sequence<C: ConnectionTrait>(conn: &C, schema: &CollectionSchema) -> Result<(), ServiceError> {
    let backend = conn.get_database_backend();
    if backend != DbBackend::Postgres {
        return Ok(());
    }
    let table = schema.name.replace('"', "\"\"");
    let pk = schema.primary_key.replace('"', "\"\"");
    let sql = format!(
        r#"SELECT setval(pg_get_serial_sequence('"{table}"', '{pk}'), (SELECT MAX("{pk}") FROM "{table}"))"#,
        table = table.replace('\'', "''"),
        pk = pk.replace('\'', "''"),
    );
    conn.execute(Statement::from_string(backend, sql)).await?;
    trace!(collection = %schema.name, "sequence_reset");
    Ok(())
}
