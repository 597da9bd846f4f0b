//! Upload error types.

/// Errors reading a drop entry.
///
/// Never fatal to a session: the entry that produced it contributes no
/// files and the scan continues.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a file: {0}")]
    NotAFile(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("unreadable entry {name}: {reason}")]
    Unreadable { name: String, reason: String },
}

/// Errors returned by the session API.
///
/// Raised before any work starts. Everything that goes wrong after that
/// is counted as a failed file in the session result instead.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("invalid upload policy: {0}")]
    InvalidPolicy(String),
}
