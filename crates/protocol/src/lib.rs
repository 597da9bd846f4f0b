//! Wire types shared between the upload client and the file server.
//!
//! The server answers every API call with an [`ApiResponse`] envelope.
//! For uploads the `data` field carries an [`UploadReceipt`].

pub mod constants;
pub mod messages;

pub use messages::{ApiResponse, UploadReceipt};
