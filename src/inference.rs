use std::time::Duration;

use anyhow::Context;
use axum::async_trait;
use bytes::Bytes;
use reqwest::multipart;
use serde::{Deserialize, Serialize};

use crate::config::InferenceConfig;

/// Confidence distribution over the fixed label set, always serialized in
/// this exact field order. Labels the service did not return stay null.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceScores {
    pub immature: Option<f64>,
    pub mature: Option<f64>,
    pub normal: Option<f64>,
}

impl ConfidenceScores {
    /// Re-key an arbitrary JSON map into the canonical order. Unknown
    /// labels are dropped; non-numeric values count as missing.
    pub fn canonicalize(value: &serde_json::Value) -> Self {
        Self {
            immature: value.get("immature").and_then(serde_json::Value::as_f64),
            mature: value.get("mature").and_then(serde_json::Value::as_f64),
            normal: value.get("normal").and_then(serde_json::Value::as_f64),
        }
    }
}

/// Response contract of the scoring service. Every field is required;
/// a payload missing any of them is treated as a malformed upstream reply.
#[derive(Debug, Clone, Deserialize)]
pub struct InferenceResponse {
    pub prediction: String,
    pub explanation: String,
    /// Raw map as returned by the service, in whatever order it chose.
    pub confidence_scores: serde_json::Value,
    #[serde(rename = "photoUrl")]
    pub photo_url: String,
}

#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn classify(&self, filename: &str, image: Bytes) -> anyhow::Result<InferenceResponse>;
}

/// Talks to the external classifier over HTTP multipart, with a bounded
/// request timeout.
pub struct HttpInferenceClient {
    http: reqwest::Client,
    url: String,
}

impl HttpInferenceClient {
    pub fn new(config: &InferenceConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("build inference http client")?;
        Ok(Self {
            http,
            url: config.url.clone(),
        })
    }
}

#[async_trait]
impl InferenceClient for HttpInferenceClient {
    async fn classify(&self, filename: &str, image: Bytes) -> anyhow::Result<InferenceResponse> {
        let part = multipart::Part::bytes(image.to_vec())
            .file_name(filename.to_string())
            .mime_str("application/octet-stream")
            .context("build multipart part")?;
        let form = multipart::Form::new().part("image", part);

        let res = self
            .http
            .post(&self.url)
            .multipart(form)
            .send()
            .await
            .context("inference service unreachable")?;

        anyhow::ensure!(
            res.status().is_success(),
            "inference service returned {}",
            res.status()
        );

        let body = res
            .json::<InferenceResponse>()
            .await
            .context("malformed inference response")?;
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_order_is_fixed_regardless_of_input_order() {
        let raw = json!({"mature": 0.7, "normal": 0.2, "immature": 0.1});
        let scores = ConfidenceScores::canonicalize(&raw);
        let out = serde_json::to_string(&scores).unwrap();
        assert_eq!(out, r#"{"immature":0.1,"mature":0.7,"normal":0.2}"#);
    }

    #[test]
    fn unknown_labels_are_dropped() {
        let raw = json!({"immature": 0.5, "bogus": 0.9, "mature": 0.3, "normal": 0.2});
        let scores = ConfidenceScores::canonicalize(&raw);
        let out = serde_json::to_string(&scores).unwrap();
        assert!(!out.contains("bogus"));
    }

    #[test]
    fn missing_labels_become_null() {
        let raw = json!({"mature": 0.9});
        let scores = ConfidenceScores::canonicalize(&raw);
        assert_eq!(scores.immature, None);
        assert_eq!(scores.mature, Some(0.9));
        assert_eq!(scores.normal, None);
        let out = serde_json::to_string(&scores).unwrap();
        assert_eq!(out, r#"{"immature":null,"mature":0.9,"normal":null}"#);
    }

    #[test]
    fn canonicalize_survives_non_object_input() {
        let scores = ConfidenceScores::canonicalize(&serde_json::Value::Null);
        assert_eq!(scores.immature, None);
        assert_eq!(scores.mature, None);
        assert_eq!(scores.normal, None);
    }

    #[test]
    fn response_requires_all_fields() {
        let missing = json!({
            "prediction": "mature",
            "confidence_scores": {"mature": 1.0},
            "photoUrl": "http://x/y.jpg"
        });
        assert!(serde_json::from_value::<InferenceResponse>(missing).is_err());

        let full = json!({
            "prediction": "mature",
            "explanation": "lens opacity detected",
            "confidence_scores": {"mature": 1.0},
            "photoUrl": "http://x/y.jpg"
        });
        let parsed = serde_json::from_value::<InferenceResponse>(full).unwrap();
        assert_eq!(parsed.prediction, "mature");
    }
}
