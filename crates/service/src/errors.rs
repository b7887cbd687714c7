use sea_orm::{DbErr, SqlErr};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("mutation limit exceeded: {count} mutations, maximum is {limit}")]
    LimitExceeded { count: u64, limit: u64 },
    #[error("user integrity violation: {0}")]
    IntegrityViolation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("fetch error: {0}")]
    Fetch(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Db(String),
    #[error("model error: {0}")]
    Model(#[from] models::errors::ModelError),
}

impl ServiceError {
    pub fn not_found(entity: &str) -> Self { Self::NotFound(format!("{} not found", entity)) }

    /// Stable numeric code for external mapping/logging
    pub fn code(&self) -> u16 {
        match self {
            ServiceError::Validation(_) => 1001,
            ServiceError::Forbidden(_) => 1002,
            ServiceError::NotFound(_) => 1003,
            ServiceError::Conflict(_) => 1004,
            ServiceError::LimitExceeded { .. } => 1005,
            ServiceError::IntegrityViolation(_) => 1006,
            ServiceError::Storage(_) => 1101,
            ServiceError::Fetch(_) => 1102,
            ServiceError::Db(_) => 1200,
            ServiceError::Model(_) => 1201,
        }
    }
}

impl From<DbErr> for ServiceError {
    fn from(e: DbErr) -> Self {
        match e.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(msg)) => ServiceError::Conflict(msg),
            Some(SqlErr::ForeignKeyConstraintViolation(msg)) => ServiceError::Conflict(msg),
            _ => ServiceError::Db(e.to_string()),
        }
    }
}

impl From<common::CoreError> for ServiceError {
    fn from(e: common::CoreError) -> Self {
        match e {
            common::CoreError::InvalidUrl(msg) => ServiceError::Validation(format!("invalid import url: {msg}")),
            other => ServiceError::Fetch(other.to_string()),
        }
    }
}
