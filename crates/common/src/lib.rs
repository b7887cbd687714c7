use thiserror::Error;

pub mod fetch;
pub mod utils;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("upstream responded with status {0}")]
    Status(u16),
}
