use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;

/// Where a file's content is read from when it is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataHandle {
    /// A file on the local filesystem, streamed from disk at send time.
    Path(PathBuf),
    /// Content already held in memory.
    Memory(Bytes),
}

/// One file to upload, as produced by flattening a drop.
///
/// Immutable once built. `relative_path` always uses `/` separators and
/// is relative to the drop root (e.g. `dir/sub/c.txt`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    pub name: String,
    pub relative_path: String,
    pub byte_size: u64,
    pub data: DataHandle,
}

impl FileDescriptor {
    /// Descriptor for a file on disk.
    pub fn from_path(relative_path: impl Into<String>, path: PathBuf, byte_size: u64) -> Self {
        let relative_path = relative_path.into();
        Self {
            name: file_name(&relative_path),
            relative_path,
            byte_size,
            data: DataHandle::Path(path),
        }
    }

    /// Descriptor for in-memory content.
    pub fn from_bytes(relative_path: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let relative_path = relative_path.into();
        let data = data.into();
        Self {
            name: file_name(&relative_path),
            relative_path,
            byte_size: data.len() as u64,
            data: DataHandle::Memory(data),
        }
    }
}

fn file_name(relative_path: &str) -> String {
    relative_path
        .rsplit('/')
        .next()
        .unwrap_or(relative_path)
        .to_string()
}

/// Why a transfer failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Connection, TLS, or body streaming failure.
    Network,
    /// Non-2xx status.
    Http(u16),
    /// 2xx status but the body is not an upload response.
    MalformedResponse,
    /// Parseable response that does not report the file as stored.
    Rejected,
    /// The local content could not be opened or read.
    LocalRead,
    /// The relative path would escape the destination directory.
    InvalidPath,
    /// Never dispatched because the session was cancelled.
    Cancelled,
    /// The batch running this transfer failed as a whole.
    Orchestration,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Network => f.write_str("network"),
            ErrorKind::Http(status) => write!(f, "http {status}"),
            ErrorKind::MalformedResponse => f.write_str("malformed-response"),
            ErrorKind::Rejected => f.write_str("rejected"),
            ErrorKind::LocalRead => f.write_str("local-read"),
            ErrorKind::InvalidPath => f.write_str("invalid-path"),
            ErrorKind::Cancelled => f.write_str("cancelled"),
            ErrorKind::Orchestration => f.write_str("orchestration"),
        }
    }
}

/// Terminal classification of one file's transfer.
///
/// Produced exactly once per descriptor in a session. `file_id` is the
/// descriptor's position in the session's flat file list.
#[derive(Debug, Clone)]
pub struct TransferOutcome {
    pub file_id: usize,
    pub file: Arc<FileDescriptor>,
    pub error: Option<ErrorKind>,
}

impl TransferOutcome {
    pub fn succeeded(file_id: usize, file: Arc<FileDescriptor>) -> Self {
        Self {
            file_id,
            file,
            error: None,
        }
    }

    pub fn failed(file_id: usize, file: Arc<FileDescriptor>, kind: ErrorKind) -> Self {
        Self {
            file_id,
            file,
            error: Some(kind),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
