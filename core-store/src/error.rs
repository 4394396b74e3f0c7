use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Offline storage unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Store is closed")]
    Closed,

    #[error("Invalid {entity} record: {message}")]
    InvalidRecord { entity: String, message: String },
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolClosed => StoreError::Closed,
            other => StoreError::Database(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
