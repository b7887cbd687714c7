use sea_orm::DbErr;
use thiserror::Error;

/// Failures from schema definitions and the system entity helpers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("database error: {0}")]
    Db(String),
}

impl From<DbErr> for ModelError {
    fn from(e: DbErr) -> Self { ModelError::Db(e.to_string()) }
}
