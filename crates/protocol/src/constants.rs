/// Path of the multipart upload endpoint, relative to the server base URL.
pub const UPLOAD_ENDPOINT: &str = "/api/files/upload";

/// Multipart field carrying the destination directory.
pub const FIELD_PATH: &str = "path";

/// Multipart field carrying the file content.
pub const FIELD_FILE: &str = "file";

/// Multipart field carrying the file's path relative to the drop root.
///
/// The trailing `[]` is part of the name: the server reads it as a list
/// parallel to the `file` parts.
pub const FIELD_RELATIVE_PATH: &str = "relativePath[]";
