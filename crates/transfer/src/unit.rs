//! The transfer unit: one file, one request, one outcome.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::progress::ProgressSink;
use crate::types::{ErrorKind, FileDescriptor, TransferOutcome};
use crate::validation::validate_relative_path;
use crate::TransferError;

/// Boxed future returned by [`Transport::send`].
pub type TransportFuture<'a> = Pin<Box<dyn Future<Output = Result<(), TransferError>> + Send + 'a>>;

/// Abstract upload endpoint.
///
/// [`HttpTransport`](crate::HttpTransport) is the production implementation.
/// Keeping this a trait lets the scheduler run against mocks that stall,
/// fail, or count concurrency.
pub trait Transport: Send + Sync {
    /// Sends one file into `destination`.
    ///
    /// Implementations report cumulative bytes on `progress` while the body
    /// is streamed and return `Ok(())` when the server accepted the upload:
    /// a JSON reply with `success: true`, or one whose `data.successful` is
    /// above zero. Servers that answer `success: true` without storing the
    /// file are not detected.
    fn send<'a>(
        &'a self,
        destination: &'a str,
        file: &'a FileDescriptor,
        progress: &'a ProgressSink,
    ) -> TransportFuture<'a>;
}

/// Transfers one file and classifies the result.
///
/// Never fails: transport errors, bad statuses, and unparseable bodies all
/// become a failed [`TransferOutcome`].
pub async fn transfer_file(
    transport: &dyn Transport,
    destination: &str,
    file_id: usize,
    file: Arc<FileDescriptor>,
    progress: &ProgressSink,
) -> TransferOutcome {
    if let Err(e) = validate_relative_path(&file.relative_path) {
        warn!(path = %file.relative_path, error = %e, "refusing to upload");
        return TransferOutcome::failed(file_id, file, ErrorKind::InvalidPath);
    }

    match transport.send(destination, &file, progress).await {
        Ok(()) => {
            debug!(path = %file.relative_path, bytes = file.byte_size, "transfer succeeded");
            TransferOutcome::succeeded(file_id, file)
        }
        Err(e) => {
            debug!(path = %file.relative_path, error = %e, "transfer failed");
            let kind = e.kind();
            TransferOutcome::failed(file_id, file, kind)
        }
    }
}
