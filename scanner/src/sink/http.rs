use std::future::Future;
use std::time::Duration;

use label_scan_common::config::ApiConfig;
use label_scan_common::frame::StillImage;
use label_scan_common::verdict::ComplianceVerdict;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use tracing::{debug, info, warn};

use super::{CaptureSink, SinkError};

const SMART_SCAN_PATH: &str = "/api/v1/smart-scan";
const UPLOAD_FILE_NAME: &str = "mobile-scan.jpg";

/// Client for the compliance API's smart-scan endpoint.
pub struct HttpComplianceSink {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpComplianceSink {
    pub fn new(config: &ApiConfig) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}{}", config.base_url.trim_end_matches('/'), SMART_SCAN_PATH),
            token: config.token.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post(&self, image: StillImage, alt_language: bool) -> Result<ComplianceVerdict, SinkError> {
        let size = image.jpeg.len();
        let part = Part::bytes(image.jpeg)
            .file_name(UPLOAD_FILE_NAME)
            .mime_str("image/jpeg")?;
        let form = Form::new()
            .part("file", part)
            .text("tamil_support", alt_language.to_string());

        // The server reads the language flag from the query string.
        let url = format!("{}?tamil_support={}", self.endpoint, alt_language);
        let mut request = self.client.post(&url).multipart(form);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        debug!(url, bytes = size, "posting capture to compliance API");
        let response = request.send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        if status == StatusCode::UNAUTHORIZED {
            warn!("compliance API refused the bearer token");
            return Err(SinkError::Unauthorized);
        }
        if !status.is_success() {
            return Err(SinkError::Rejected {
                status: status.as_u16(),
                detail: error_detail(&body),
            });
        }

        let verdict = ComplianceVerdict::from_json(&body)
            .map_err(|e| SinkError::InvalidResponse(e.to_string()))?;
        info!(
            status = verdict.compliance_status.as_str(),
            confidence = verdict.confidence_score,
            server_ms = verdict.processing_time_ms,
            "compliance verdict received"
        );
        Ok(verdict)
    }
}

impl CaptureSink for HttpComplianceSink {
    fn submit(
        &self,
        image: StillImage,
        alt_language: bool,
    ) -> impl Future<Output = Result<ComplianceVerdict, SinkError>> + Send {
        self.post(image, alt_language)
    }
}

/// Pull a human-readable reason out of an error body.
///
/// Validation errors carry `{"detail": "..."}`; anything else is passed
/// through as text, truncated.
fn error_detail(body: &[u8]) -> String {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
        match value.get("detail") {
            Some(serde_json::Value::String(s)) => return s.clone(),
            Some(other) => return other.to_string(),
            None => {}
        }
    }
    let text = String::from_utf8_lossy(body);
    text.chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{jpeg_fixture, serve};
    use axum::extract::{Multipart, Query};
    use axum::http::{HeaderMap, StatusCode as AxumStatus};
    use axum::response::IntoResponse;
    use axum::routing::post;
    use axum::{Json, Router};
    use label_scan_common::frame::CaptureTrigger;
    use label_scan_common::verdict::ComplianceStatus;
    use std::collections::HashMap;

    fn api_config(base_url: String, token: Option<&str>) -> ApiConfig {
        ApiConfig {
            base_url,
            token: token.map(str::to_string),
            timeout_secs: 5,
            alt_language: false,
        }
    }

    fn still() -> StillImage {
        StillImage {
            jpeg: jpeg_fixture(16, 16, 90),
            width: 16,
            height: 16,
            captured_at_ms: 1708300000000,
            trigger: CaptureTrigger::Auto,
        }
    }

    async fn smart_scan(
        Query(query): Query<HashMap<String, String>>,
        headers: HeaderMap,
        mut multipart: Multipart,
    ) -> impl IntoResponse {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if auth != "Bearer secret" {
            return (AxumStatus::UNAUTHORIZED, Json(serde_json::json!({"detail": "Not authenticated"})));
        }

        let mut file_ok = false;
        let mut form_flag = String::new();
        while let Some(field) = multipart.next_field().await.unwrap() {
            let name = field.name().map(str::to_string);
            match name.as_deref() {
                Some("file") => {
                    let name_ok = field.file_name() == Some("mobile-scan.jpg");
                    let type_ok = field.content_type() == Some("image/jpeg");
                    let bytes = field.bytes().await.unwrap();
                    file_ok = name_ok && type_ok && bytes.starts_with(&[0xFF, 0xD8]);
                }
                Some("tamil_support") => form_flag = field.text().await.unwrap(),
                _ => {}
            }
        }
        if !file_ok {
            return (AxumStatus::BAD_REQUEST, Json(serde_json::json!({"detail": "File must be an image"})));
        }

        let lang = query.get("tamil_support").cloned().unwrap_or_default();
        (
            AxumStatus::OK,
            Json(serde_json::json!({
                "extracted_text": format!("query={lang} form={form_flag}"),
                "compliance_results": [
                    {"field": "MRP", "status": "FOUND", "confidence": 90, "detected_text": "MRP 45"},
                    {"field": "Best Before", "status": "MISSING", "confidence": 0}
                ],
                "pii_detected": [],
                "tamper_alert": false,
                "tamper_score": 1.0,
                "tamper_reason": "",
                "compliance_status": "NON_COMPLIANT",
                "confidence_score": 64.0,
                "processing_time_ms": 420.5
            })),
        )
    }

    fn api() -> Router {
        Router::new().route(SMART_SCAN_PATH, post(smart_scan))
    }

    #[tokio::test]
    async fn posts_capture_and_parses_verdict() {
        let base = serve(api()).await;
        let sink = HttpComplianceSink::new(&api_config(base, Some("secret"))).unwrap();

        let verdict = sink.submit(still(), true).await.unwrap();
        assert_eq!(verdict.compliance_status, ComplianceStatus::NonCompliant);
        assert_eq!(verdict.missing_fields(), vec!["Best Before"]);
        assert_eq!(verdict.extracted_text, "query=true form=true");
        assert_eq!(verdict.processing_time_ms, 420.5);
    }

    #[tokio::test]
    async fn missing_token_is_unauthorized() {
        let base = serve(api()).await;
        let sink = HttpComplianceSink::new(&api_config(base, None)).unwrap();
        let err = sink.submit(still(), false).await.unwrap_err();
        assert!(matches!(err, SinkError::Unauthorized));
    }

    #[tokio::test]
    async fn validation_failure_carries_detail() {
        let base = serve(api()).await;
        let sink = HttpComplianceSink::new(&api_config(base, Some("secret"))).unwrap();
        let mut bad = still();
        bad.jpeg = b"not a jpeg".to_vec();
        let err = sink.submit(bad, false).await.unwrap_err();
        match err {
            SinkError::Rejected { status, detail } => {
                assert_eq!(status, 400);
                assert_eq!(detail, "File must be an image");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn garbage_body_is_invalid_response() {
        let app = Router::new().route(SMART_SCAN_PATH, post(|| async { "<html>oops</html>" }));
        let base = serve(app).await;
        let sink = HttpComplianceSink::new(&api_config(base, None)).unwrap();
        let err = sink.submit(still(), false).await.unwrap_err();
        assert!(matches!(err, SinkError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn refused_connection_is_network_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let sink = HttpComplianceSink::new(&api_config(format!("http://{addr}"), None)).unwrap();
        let err = sink.submit(still(), false).await.unwrap_err();
        assert!(err.is_network());
    }

    #[test]
    fn endpoint_ignores_trailing_slash() {
        let sink = HttpComplianceSink::new(&api_config("http://api.local/".into(), None)).unwrap();
        assert_eq!(sink.endpoint(), "http://api.local/api/v1/smart-scan");
    }

    #[test]
    fn error_detail_falls_back_to_text() {
        assert_eq!(error_detail(br#"{"detail": "bad"}"#), "bad");
        assert_eq!(error_detail(br#"{"detail": [{"msg": "x"}]}"#), r#"[{"msg":"x"}]"#);
        assert_eq!(error_detail(b"Internal Server Error"), "Internal Server Error");
    }
}
