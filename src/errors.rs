use std::io;
use thiserror::Error;

/// Failures surfaced by the upload ingestion path.
///
/// The parse variants mean the client sent a body this crate could not
/// make sense of; the hosting application maps them to a 4xx response.
/// [`IngestError::Io`] wraps a failure of the underlying streams or the
/// spool directory and belongs on the 5xx side.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("request carries no usable Content-Length header")]
    MissingContentLength,
    #[error("multipart body ended before a complete file field was found")]
    MissingFileField,
    #[error("file field carries no usable filename")]
    MissingFilename,
    #[error("multipart part header line exceeds {0} bytes")]
    PartHeaderTooLong(usize),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl IngestError {
    /// True when the failure was caused by a malformed client body rather
    /// than a malfunction on our side.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Io(_))
    }
}

pub type IngestResult<T> = Result<T, IngestError>;
