//! Multipart HTTP transport for the file server upload endpoint.

use std::time::Duration;

use bytes::Bytes;
use fileup_protocol::ApiResponse;
use fileup_protocol::constants::{FIELD_FILE, FIELD_PATH, FIELD_RELATIVE_PATH, UPLOAD_ENDPOINT};
use futures_util::{TryStreamExt, stream};
use reqwest::multipart::{Form, Part};
use tokio_util::io::ReaderStream;
use tracing::trace;

use crate::progress::ProgressSink;
use crate::types::{DataHandle, FileDescriptor};
use crate::unit::{Transport, TransportFuture};
use crate::{STREAM_CHUNK_SIZE, TransferError};

/// Settings for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Server base URL, e.g. `http://nas.local:8080`.
    pub base_url: String,
    /// Endpoint path appended to `base_url`.
    pub endpoint: String,
    /// Sent as `Authorization: Bearer <token>` when set.
    pub bearer_token: Option<String>,
    /// Whole-request timeout. `None` keeps the client default (no timeout).
    pub timeout: Option<Duration>,
}

impl HttpTransportConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            endpoint: UPLOAD_ENDPOINT.to_string(),
            bearer_token: None,
            timeout: None,
        }
    }

    /// Full endpoint URL.
    pub fn url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.endpoint)
    }
}

/// Uploads each file as its own `multipart/form-data` POST.
///
/// The client is shared across transfers, so concurrent sends reuse its
/// connection pool.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    bearer_token: Option<String>,
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig) -> Result<Self, TransferError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;
        Ok(Self::with_client(client, config))
    }

    /// Builds a transport on an existing client.
    pub fn with_client(client: reqwest::Client, config: HttpTransportConfig) -> Self {
        Self {
            client,
            url: config.url(),
            bearer_token: config.bearer_token,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn send_file(
        &self,
        destination: &str,
        file: &FileDescriptor,
        progress: &ProgressSink,
    ) -> Result<(), TransferError> {
        let body = body_for(file, progress).await?;
        let part = Part::stream_with_length(body, file.byte_size)
            .file_name(file.name.clone())
            .mime_str("application/octet-stream")?;

        let form = Form::new()
            .text(FIELD_PATH, destination.to_string())
            .part(FIELD_FILE, part)
            .text(FIELD_RELATIVE_PATH, file.relative_path.clone());

        let mut request = self.client.post(&self.url).multipart(form);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        progress.complete();

        let status = response.status().as_u16();
        let body = response.bytes().await?;
        trace!(path = %file.relative_path, status, len = body.len(), "upload response");

        classify_response(status, &body)
    }
}

impl Transport for HttpTransport {
    fn send<'a>(
        &'a self,
        destination: &'a str,
        file: &'a FileDescriptor,
        progress: &'a ProgressSink,
    ) -> TransportFuture<'a> {
        Box::pin(self.send_file(destination, file, progress))
    }
}

/// Builds a streaming request body that reports progress as it is read.
async fn body_for(
    file: &FileDescriptor,
    progress: &ProgressSink,
) -> Result<reqwest::Body, TransferError> {
    let sink = progress.clone();
    let mut sent: u64 = 0;
    let count = move |chunk: &Bytes| {
        sent += chunk.len() as u64;
        sink.report(sent);
    };

    match &file.data {
        DataHandle::Path(path) => {
            let handle = tokio::fs::File::open(path).await?;
            let stream = ReaderStream::with_capacity(handle, STREAM_CHUNK_SIZE).inspect_ok(count);
            Ok(reqwest::Body::wrap_stream(stream))
        }
        DataHandle::Memory(data) => {
            let data = data.clone();
            let len = data.len();
            let pieces = (0..len)
                .step_by(STREAM_CHUNK_SIZE)
                .map(move |start| {
                    Ok::<_, std::io::Error>(data.slice(start..(start + STREAM_CHUNK_SIZE).min(len)))
                });
            let stream = stream::iter(pieces).inspect_ok(count);
            Ok(reqwest::Body::wrap_stream(stream))
        }
    }
}

/// Classifies an upload response.
///
/// Success needs a 2xx status and a JSON envelope that asserts the file
/// was stored. Anything else maps to the matching [`TransferError`].
pub fn classify_response(status: u16, body: &[u8]) -> Result<(), TransferError> {
    if !(200..300).contains(&status) {
        return Err(TransferError::Http(status));
    }

    let envelope: ApiResponse = serde_json::from_slice(body)
        .map_err(|e| TransferError::MalformedResponse(e.to_string()))?;

    if envelope.asserts_upload() {
        if let Some(receipt) = envelope.receipt() {
            trace!(uploaded = ?receipt.uploaded, failed = ?receipt.failed, "upload receipt");
        }
        Ok(())
    } else if envelope.message.is_empty() {
        Err(TransferError::Rejected("server did not store the file".into()))
    } else {
        Err(TransferError::Rejected(envelope.message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorKind;

    #[test]
    fn classify_success_envelope() {
        let body = br#"{"success":true,"data":{"successful":1,"total":1}}"#;
        assert!(classify_response(200, body).is_ok());
        assert!(classify_response(201, body).is_ok());
    }

    #[test]
    fn classify_non_2xx_is_http_error() {
        let body = br#"{"success":true}"#;
        let err = classify_response(413, body).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Http(413));
        assert_eq!(classify_response(300, body).unwrap_err().kind(), ErrorKind::Http(300));
        assert_eq!(classify_response(199, body).unwrap_err().kind(), ErrorKind::Http(199));
    }

    #[test]
    fn classify_unparseable_body() {
        let err = classify_response(200, b"<html>gateway</html>").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedResponse);

        let err = classify_response(200, b"").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedResponse);
    }

    #[test]
    fn classify_envelope_without_success() {
        let body = br#"{"success":false,"message":"Cannot create directory"}"#;
        let err = classify_response(200, body).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Rejected);
        assert!(err.to_string().contains("Cannot create directory"));
    }

    #[test]
    fn classify_receipt_only_success() {
        let body = br#"{"success":false,"data":{"successful":1}}"#;
        assert!(classify_response(200, body).is_ok());
    }

    #[test]
    fn config_url_joins_base_and_endpoint() {
        let config = HttpTransportConfig::new("http://nas.local:8080/");
        assert_eq!(config.url(), "http://nas.local:8080/api/files/upload");
    }
}
