use serde::{Deserialize, Serialize};

/// Response envelope returned by every file server endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T = serde_json::Value> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// Builds a successful envelope around `data`.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: String::new(),
            data: Some(data),
        }
    }

    /// Builds a failed envelope with an error message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

/// Per-request upload summary sent by the server in `ApiResponse::data`.
///
/// Field names follow the server's snake_case JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadReceipt {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub uploaded: Vec<String>,
    #[serde(default)]
    pub failed: Vec<String>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub successful: u64,
    #[serde(default)]
    pub failed_count: u64,
}

impl ApiResponse {
    /// Whether the envelope reports the uploaded file as stored.
    ///
    /// The server sets `success` on the envelope, but a receipt with a
    /// positive `successful` count is accepted on its own as well.
    pub fn asserts_upload(&self) -> bool {
        self.success
            || self
                .data
                .as_ref()
                .and_then(|d| d.get("successful"))
                .and_then(serde_json::Value::as_u64)
                .is_some_and(|n| n > 0)
    }

    /// Decodes `data` as an [`UploadReceipt`], if it has that shape.
    pub fn receipt(&self) -> Option<UploadReceipt> {
        self.data
            .as_ref()
            .and_then(|d| serde_json::from_value(d.clone()).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_server_upload_response() {
        let json = r#"{
            "success": true,
            "data": {
                "message": "Uploaded 1 file(s) successfully",
                "uploaded": ["/docs/a.txt"],
                "failed": [],
                "total": 1,
                "successful": 1,
                "failed_count": 0
            }
        }"#;
        let resp: ApiResponse<UploadReceipt> = serde_json::from_str(json).unwrap();
        assert!(resp.success);
        let data = resp.data.unwrap();
        assert_eq!(data.uploaded, vec!["/docs/a.txt"]);
        assert_eq!(data.successful, 1);
        assert_eq!(data.failed_count, 0);
    }

    #[test]
    fn parses_error_envelope_without_data() {
        let json = r#"{"success": false, "message": "File is too large"}"#;
        let resp: ApiResponse = serde_json::from_str(json).unwrap();
        assert!(!resp.success);
        assert_eq!(resp.message, "File is too large");
        assert!(resp.data.is_none());
        assert!(!resp.asserts_upload());
    }

    #[test]
    fn receipt_alone_asserts_upload() {
        let json = r#"{"success": false, "data": {"successful": 2}}"#;
        let resp: ApiResponse = serde_json::from_str(json).unwrap();
        assert!(resp.asserts_upload());
        assert_eq!(resp.receipt().unwrap().successful, 2);
    }

    #[test]
    fn success_with_foreign_data_shape() {
        let json = r#"{"success": true, "data": "stored"}"#;
        let resp: ApiResponse = serde_json::from_str(json).unwrap();
        assert!(resp.asserts_upload());
        assert!(resp.receipt().is_none());
    }

    #[test]
    fn success_flag_wins_over_zero_receipt() {
        let json = r#"{"success": true, "data": {"successful": 0, "failed_count": 1}}"#;
        let resp: ApiResponse = serde_json::from_str(json).unwrap();
        assert!(resp.asserts_upload());
    }

    #[test]
    fn missing_success_field_is_rejected() {
        let json = r#"{"data": {"successful": 1}}"#;
        assert!(serde_json::from_str::<ApiResponse>(json).is_err());
    }

    #[test]
    fn error_envelope_omits_empty_fields() {
        let resp: ApiResponse<UploadReceipt> = ApiResponse::error("nope");
        let json = serde_json::to_string(&resp).unwrap();
        assert_eq!(json, r#"{"success":false,"message":"nope"}"#);

        let ok = ApiResponse::ok(UploadReceipt::default());
        let json = serde_json::to_string(&ok).unwrap();
        assert!(json.starts_with(r#"{"success":true,"data":"#));
    }
}
