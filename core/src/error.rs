use sled::transaction::TransactionError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),
    #[error("encoding error: {0}")]
    Codec(#[from] bincode::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("corrupt index key: {0}")]
    CorruptKey(String),
    #[error("backend unavailable: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<TransactionError<Error>> for Error {
    fn from(err: TransactionError<Error>) -> Self {
        match err {
            TransactionError::Abort(e) => e,
            TransactionError::Storage(e) => Error::Storage(e),
        }
    }
}
