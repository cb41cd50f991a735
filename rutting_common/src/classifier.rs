//! Client side of the remote severity classifier.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::asset::ImageAsset;
use crate::config::Config;
use crate::severity::SeverityClass;

/// One image as it goes over the wire.
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub file_name: String,
    pub mime: String,
    pub bytes: Arc<[u8]>,
}

impl From<&ImageAsset> for BatchItem {
    fn from(asset: &ImageAsset) -> Self {
        Self {
            file_name: asset.display_name().to_string(),
            mime: asset.mime().to_string(),
            bytes: Arc::clone(asset.bytes()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionResult {
    pub file_name: String,
    pub predicted_class: SeverityClass,
    /// Per-class confidence, when the service reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probabilities: Option<BTreeMap<String, f32>>,
}

impl PredictionResult {
    pub fn new(file_name: impl Into<String>, predicted_class: impl Into<SeverityClass>) -> Self {
        Self {
            file_name: file_name.into(),
            predicted_class: predicted_class.into(),
            probabilities: None,
        }
    }

    /// Confidence of the predicted class, if probabilities were returned.
    pub fn confidence(&self) -> Option<f32> {
        self.probabilities
            .as_ref()?
            .get(self.predicted_class.as_str())
            .copied()
    }
}

#[derive(Debug, Error)]
pub enum ClassifyError {
    /// Connection refused, DNS failure, timeout, broken body stream.
    #[error("could not reach the inference service: {0}")]
    Transport(String),

    /// The service answered with a non-success status.
    #[error("inference service rejected the batch with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    /// The service answered 2xx but the body is not a results list.
    #[error("malformed inference response: {0}")]
    Malformed(String),

    /// The request itself could not be assembled.
    #[error("could not build the batch request: {0}")]
    InvalidRequest(String),
}

/// Anything that can turn a batch of images into one prediction per image.
pub trait Classifier: Send + Sync {
    /// Issues exactly one request for the whole batch.
    fn classify(
        &self,
        batch: Vec<BatchItem>,
    ) -> impl Future<Output = Result<Vec<PredictionResult>, ClassifyError>> + Send;
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    results: Vec<WireEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEntry {
    file_name: String,
    predicted_class: Option<SeverityClass>,
    #[serde(default)]
    probabilities: Option<BTreeMap<String, f32>>,
    error: Option<String>,
}

/// Parses a success body of the form `{"results": [{"fileName", "predictedClass"}, ...]}`.
///
/// Entries that carry an `error` instead of a class make the whole body
/// malformed: the batch either classifies completely or not at all.
pub fn parse_response(body: &[u8]) -> Result<Vec<PredictionResult>, ClassifyError> {
    let response: BatchResponse =
        serde_json::from_slice(body).map_err(|e| ClassifyError::Malformed(e.to_string()))?;

    response
        .results
        .into_iter()
        .map(|entry| match entry.predicted_class {
            Some(predicted_class) => Ok(PredictionResult {
                file_name: entry.file_name,
                predicted_class,
                probabilities: entry.probabilities,
            }),
            None => Err(ClassifyError::Malformed(format!(
                "no predictedClass for {:?}: {}",
                entry.file_name,
                entry.error.as_deref().unwrap_or("field missing")
            ))),
        })
        .collect()
}

/// Posts the batch as one `multipart/form-data` request, every image under
/// the same field name.
pub struct HttpClassifier {
    client: reqwest::Client,
    endpoint: String,
    field_name: String,
}

impl HttpClassifier {
    pub fn new(
        endpoint: impl Into<String>,
        field_name: impl Into<String>,
        timeout: Option<Duration>,
    ) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            field_name: field_name.into(),
        })
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Self::new(
            config.endpoint.clone(),
            config.field_name.clone(),
            config.request_timeout,
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn build_form(&self, batch: Vec<BatchItem>) -> Result<Form, ClassifyError> {
        batch.into_iter().try_fold(Form::new(), |form, item| {
            let part = Part::bytes(item.bytes.to_vec())
                .file_name(item.file_name)
                .mime_str(&item.mime)
                .map_err(|e| {
                    ClassifyError::InvalidRequest(format!("content type {:?}: {e}", item.mime))
                })?;
            Ok(form.part(self.field_name.clone(), part))
        })
    }
}

impl Classifier for HttpClassifier {
    async fn classify(
        &self,
        batch: Vec<BatchItem>,
    ) -> Result<Vec<PredictionResult>, ClassifyError> {
        let count = batch.len();
        let bytes: usize = batch.iter().map(|item| item.bytes.len()).sum();
        let form = self.build_form(batch)?;

        info!(
            "Posting batch of {} images ({:.1} KiB) to {}",
            count,
            bytes as f64 / 1024.0,
            self.endpoint
        );

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ClassifyError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClassifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ClassifyError::Transport(e.to_string()))?;
        debug!("Inference response: {} bytes", body.len());

        parse_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Multipart;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    async fn spawn_server(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/predict/")
    }

    /// Answers in submission order, cycling through the three classes, and
    /// echoes what it saw of each part.
    async fn cycling_predictor(mut multipart: Multipart) -> Json<Value> {
        let classes = ["Normal", "Severe", "Moderate"];
        let mut results = Vec::new();
        while let Some(field) = multipart.next_field().await.unwrap() {
            let field_name = field.name().map(str::to_string);
            let file_name = field.file_name().unwrap_or_default().to_string();
            let content_type = field.content_type().map(str::to_string);
            let size = field.bytes().await.unwrap().len();
            let class = classes[results.len() % classes.len()];
            results.push(json!({
                "fileName": file_name,
                "predictedClass": class,
                "probabilities": {"Moderate": 0.1, "Normal": 0.8, "Severe": 0.1},
                "field": field_name,
                "contentType": content_type,
                "size": size,
            }));
        }
        Json(json!({ "results": results }))
    }

    fn item(name: &str, bytes: &[u8]) -> BatchItem {
        BatchItem {
            file_name: name.to_string(),
            mime: "image/png".to_string(),
            bytes: bytes.into(),
        }
    }

    #[test]
    fn test_parse_response() {
        let body = br#"{"results": [
            {"fileName": "a.png", "predictedClass": "Normal"},
            {"fileName": "b.png", "predictedClass": "Severe",
             "probabilities": {"Moderate": 0.05, "Normal": 0.05, "Severe": 0.9}}
        ]}"#;
        let results = parse_response(body).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0], PredictionResult::new("a.png", "Normal"));
        assert_eq!(results[1].predicted_class, SeverityClass::Severe);
        assert_eq!(results[1].confidence(), Some(0.9));
        assert_eq!(results[0].confidence(), None);
    }

    #[test]
    fn test_parse_response_rejects_error_entries() {
        let body = br#"{"results": [
            {"fileName": "broken.png", "error": "Could not process file."}
        ]}"#;
        let err = parse_response(body).unwrap_err();
        assert!(matches!(err, ClassifyError::Malformed(ref m) if m.contains("broken.png")));
    }

    #[test]
    fn test_parse_response_rejects_other_shapes() {
        assert!(matches!(
            parse_response(br#"{"predictions": []}"#),
            Err(ClassifyError::Malformed(_))
        ));
        assert!(matches!(
            parse_response(b"<html>oops</html>"),
            Err(ClassifyError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_classify_posts_one_multipart_batch() {
        let endpoint = spawn_server(Router::new().route("/predict/", post(cycling_predictor))).await;
        let classifier = HttpClassifier::new(endpoint, "files", Some(Duration::from_secs(5))).unwrap();

        let batch = vec![
            item("a.png", b"aaaa"),
            item("b.png", b"bb"),
            item("c.png", b"c"),
        ];
        let results = classifier.classify(batch).await.unwrap();

        let names: Vec<_> = results.iter().map(|r| r.file_name.as_str()).collect();
        assert_eq!(names, ["a.png", "b.png", "c.png"]);
        let classes: Vec<_> = results.iter().map(|r| r.predicted_class.clone()).collect();
        assert_eq!(
            classes,
            [
                SeverityClass::Normal,
                SeverityClass::Severe,
                SeverityClass::Moderate
            ]
        );
    }

    #[tokio::test]
    async fn test_classify_sends_field_name_and_content_type() {
        async fn inspect(mut multipart: Multipart) -> Json<Value> {
            let field = multipart.next_field().await.unwrap().unwrap();
            let name = field.name().map(str::to_string);
            let content_type = field.content_type().map(str::to_string);
            let file_name = field.file_name().unwrap_or_default().to_string();
            let class = if name.as_deref() == Some("images") && content_type.as_deref() == Some("image/jpeg") {
                "Normal"
            } else {
                "Severe"
            };
            Json(json!({"results": [{"fileName": file_name, "predictedClass": class}]}))
        }

        let endpoint = spawn_server(Router::new().route("/predict/", post(inspect))).await;
        let classifier = HttpClassifier::new(endpoint, "images", None).unwrap();
        let mut jpeg = item("road.jpg", b"\xff\xd8");
        jpeg.mime = "image/jpeg".to_string();

        let results = classifier.classify(vec![jpeg]).await.unwrap();
        assert_eq!(results[0].predicted_class, SeverityClass::Normal);
    }

    #[tokio::test]
    async fn test_classify_maps_error_status_to_rejected() {
        async fn reject() -> (StatusCode, &'static str) {
            (StatusCode::UNPROCESSABLE_ENTITY, "field required")
        }

        let endpoint = spawn_server(Router::new().route("/predict/", post(reject))).await;
        let classifier = HttpClassifier::new(endpoint, "files", None).unwrap();

        let err = classifier.classify(vec![item("a.png", b"a")]).await.unwrap_err();
        match err {
            ClassifyError::Rejected { status, body } => {
                assert_eq!(status, 422);
                assert_eq!(body, "field required");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_classify_unreachable_is_transport() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let classifier =
            HttpClassifier::new(format!("http://{addr}/predict/"), "files", None).unwrap();
        let err = classifier.classify(vec![item("a.png", b"a")]).await.unwrap_err();
        assert!(matches!(err, ClassifyError::Transport(_)));
    }
}
