//! Single-file upload transfers.
//!
//! A transfer takes one [`FileDescriptor`], streams it to the upload
//! endpoint through a [`Transport`], reports fractional byte progress on
//! a [`ProgressSink`], and always resolves to a [`TransferOutcome`].

mod http;
mod progress;
mod types;
mod unit;
mod validation;

pub use http::{HttpTransport, HttpTransportConfig, classify_response};
pub use progress::{ByteProgress, ProgressSink, SpeedCalculator};
pub use types::{DataHandle, ErrorKind, FileDescriptor, TransferOutcome};
pub use unit::{Transport, TransportFuture, transfer_file};
pub use validation::validate_relative_path;

/// Size of the pieces a file body is streamed in.
///
/// Progress is reported once per piece, so this also bounds how often a
/// transfer emits byte progress.
pub const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Errors produced while sending a single file.
///
/// Never escapes [`transfer_file`]: every variant is folded into an
/// [`ErrorKind`] on the resulting [`TransferOutcome`].
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("server returned HTTP {0}")]
    Http(u16),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("server rejected upload: {0}")]
    Rejected(String),

    #[error("cannot read local file: {0}")]
    LocalRead(#[from] std::io::Error),

    #[error("invalid path: {0}")]
    InvalidPath(String),
}

impl TransferError {
    /// Outcome classification for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransferError::Network(_) => ErrorKind::Network,
            TransferError::Http(status) => ErrorKind::Http(*status),
            TransferError::MalformedResponse(_) => ErrorKind::MalformedResponse,
            TransferError::Rejected(_) => ErrorKind::Rejected,
            TransferError::LocalRead(_) => ErrorKind::LocalRead,
            TransferError::InvalidPath(_) => ErrorKind::InvalidPath,
        }
    }
}
