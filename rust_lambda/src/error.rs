use std::time::Duration;
use thiserror::Error;

use crate::scanner::ScannerError;
use crate::store::StoreError;

/// Failure while handling a single object. Recorded in the summary, never
/// propagated out of the invocation.
#[derive(Debug, Error)]
pub enum ObjectError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Scanner(#[from] ScannerError),
    #[error("temporary file error: {0}")]
    TempFile(#[from] std::io::Error),
    #[error("abandoned after {0:?} to return before the invocation deadline")]
    OutOfTime(Duration),
}

/// Failure that aborts the whole invocation.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("no bucket configured for a full-bucket scan, set S3_BUCKET_NAME")]
    MissingBucket,
    #[error("invocation payload is not a scan request: {0}")]
    InvalidEvent(#[from] serde_json::Error),
    #[error(transparent)]
    Listing(#[from] StoreError),
}
