//! HTTP delivery to a Librato-style metrics API.
//!
//! Batches are posted as JSON with basic auth. Any status above 204 is a
//! failure and carries the response body so the API's error message
//! survives into the logs.

use crate::collator::Batch;
use crate::core::{CollatorError, EndpointConfig, Result};
use crate::transport::Transport;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Annotation event, posted immediately rather than batched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    /// Short title shown on charts
    pub title: String,
    /// Source the annotation applies to
    pub source: Option<String>,
    /// Longer description
    pub description: Option<String>,
    /// Related links
    pub links: Vec<Link>,
    /// Epoch seconds the event started
    pub start_time: Option<i64>,
    /// Epoch seconds the event ended
    pub end_time: Option<i64>,
}

/// Link attached to an [`Annotation`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    /// Relationship, e.g. "github"
    #[serde(rename = "rel")]
    pub relationship: String,
    /// Target URL
    #[serde(rename = "href")]
    pub url: String,
    /// Display label
    pub label: Option<String>,
}

/// Posts batches and annotations over HTTP.
pub struct HttpTransport {
    client: reqwest::Client,
    metrics_url: String,
    annotations_url: String,
    user: String,
    token: String,
}

impl HttpTransport {
    /// Build a transport from endpoint settings
    pub fn new(config: &EndpointConfig) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self::with_client(config, client))
    }

    /// Use a caller-supplied HTTP client, e.g. one with a proxy configured
    pub fn with_client(config: &EndpointConfig, client: reqwest::Client) -> Self {
        Self {
            client,
            metrics_url: config.metrics_url.clone(),
            annotations_url: config.annotations_url.trim_end_matches('/').to_string(),
            user: config.user.clone(),
            token: config.token.clone(),
        }
    }

    /// Post an annotation to the stream called `name`.
    ///
    /// Annotations are not batched; this makes one request right away.
    pub async fn post_annotation(&self, name: &str, annotation: &Annotation) -> Result<()> {
        if name.is_empty() {
            return Err(CollatorError::MissingAnnotationName);
        }

        let url = format!("{}/{}", self.annotations_url, name);
        self.post_json(&url, annotation).await
    }

    async fn post_json<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<()> {
        let payload = serde_json::to_vec(body)?;

        let response = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .basic_auth(&self.user, Some(&self.token))
            .body(payload)
            .send()
            .await?;

        let status = response.status().as_u16();
        // Read the body either way so the connection can be reused
        let body = response.text().await.unwrap_or_default();

        if status > 204 {
            return Err(CollatorError::HttpStatus { status, body });
        }

        debug!(url, status, "request accepted");
        Ok(())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, batch: &Batch) -> Result<()> {
        self.post_json(&self.metrics_url, batch).await
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_annotation_wire_shape() {
        let annotation = Annotation {
            title: "deploy".to_string(),
            links: vec![Link {
                relationship: "github".to_string(),
                url: "https://example.com/commit/1".to_string(),
                label: None,
            }],
            start_time: Some(100),
            ..Annotation::default()
        };

        let encoded = serde_json::to_value(&annotation).unwrap();
        assert_eq!(encoded["title"], json!("deploy"));
        assert_eq!(encoded["links"][0]["rel"], json!("github"));
        assert_eq!(encoded["links"][0]["href"], json!("https://example.com/commit/1"));
        assert_eq!(encoded["start_time"], json!(100));
        assert_eq!(encoded["end_time"], json!(null));
    }

    #[test]
    fn test_annotations_url_trailing_slash() {
        let config = EndpointConfig {
            annotations_url: "http://localhost/v1/annotations/".to_string(),
            ..EndpointConfig::default()
        };
        let transport = HttpTransport::with_client(&config, reqwest::Client::new());
        assert_eq!(transport.annotations_url, "http://localhost/v1/annotations");
    }

    #[tokio::test]
    async fn test_empty_annotation_name_rejected() {
        let transport =
            HttpTransport::with_client(&EndpointConfig::default(), reqwest::Client::new());
        let result = transport.post_annotation("", &Annotation::default()).await;
        assert!(matches!(result, Err(CollatorError::MissingAnnotationName)));
    }
}
