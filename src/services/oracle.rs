use crate::core::{OracleError, Similarity, SimilarityOracle};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

/// Body sent to the similarity endpoint
#[derive(Debug, Serialize)]
struct SimilarityRequest<'a> {
    text_a: &'a str,
    text_b: &'a str,
    context: &'a str,
}

/// Similarity oracle reached over HTTP
///
/// POSTs `{text_a, text_b, context}` and expects `{similarity, reasoning}`.
pub struct HttpSimilarityOracle {
    endpoint: String,
    api_key: Option<String>,
    client: Client,
}

impl HttpSimilarityOracle {
    /// Create a new oracle client with a request timeout
    pub fn new(endpoint: String, api_key: Option<String>, timeout: Duration) -> Result<Self, OracleError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            endpoint,
            api_key: api_key.filter(|k| !k.is_empty()),
            client,
        })
    }
}

#[async_trait]
impl SimilarityOracle for HttpSimilarityOracle {
    async fn similarity(&self, a: &str, b: &str, context: &str) -> Result<Similarity, OracleError> {
        tracing::debug!("Requesting similarity from: {}", self.endpoint);

        let mut request = self.client.post(&self.endpoint).json(&SimilarityRequest {
            text_a: a,
            text_b: b,
            context,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_else(|_| "Unable to read body".to_string());
            tracing::error!("Similarity oracle returned {}: {}", status, body);
            return Err(OracleError::Status(status.as_u16()));
        }

        let json: Value = response.json().await?;

        let similarity = json
            .get("similarity")
            .and_then(|s| s.as_f64())
            .ok_or_else(|| OracleError::InvalidResponse("Missing similarity".into()))?;

        if !(0.0..=1.0).contains(&similarity) {
            return Err(OracleError::InvalidResponse(format!(
                "similarity {} outside [0, 1]",
                similarity
            )));
        }

        let reasoning = json
            .get("reasoning")
            .and_then(|r| r.as_str())
            .unwrap_or_default()
            .to_string();

        Ok(Similarity { similarity, reasoning })
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oracle_for(server: &mockito::Server) -> HttpSimilarityOracle {
        HttpSimilarityOracle::new(
            format!("{}/similarity", server.url()),
            Some("secret".to_string()),
            Duration::from_secs(2),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_similarity_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/similarity")
            .match_header("authorization", "Bearer secret")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "text_a": "luxury homes",
                "context": "Specialty"
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"similarity": 0.82, "reasoning": "both describe high-end housing"}"#)
            .create_async()
            .await;

        let oracle = oracle_for(&server);
        let verdict = oracle
            .similarity("luxury homes", "high-end residential", "Specialty")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(verdict.similarity, 0.82);
        assert_eq!(verdict.reasoning, "both describe high-end housing");
    }

    #[tokio::test]
    async fn test_similarity_error_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/similarity")
            .with_status(503)
            .create_async()
            .await;

        let oracle = oracle_for(&server);
        let err = oracle.similarity("a", "b", "ctx").await.unwrap_err();
        assert!(matches!(err, OracleError::Status(503)));
    }

    #[tokio::test]
    async fn test_similarity_out_of_range() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/similarity")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"similarity": 3.5}"#)
            .create_async()
            .await;

        let oracle = oracle_for(&server);
        let err = oracle.similarity("a", "b", "ctx").await.unwrap_err();
        assert!(matches!(err, OracleError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_similarity_missing_field() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/similarity")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"score": 0.4}"#)
            .create_async()
            .await;

        let oracle = oracle_for(&server);
        assert!(oracle.similarity("a", "b", "ctx").await.is_err());
    }

    #[test]
    fn test_empty_api_key_ignored() {
        let oracle = HttpSimilarityOracle::new("http://oracle.test".into(), Some(String::new()), Duration::from_secs(1)).unwrap();
        assert!(oracle.api_key.is_none());
    }
}
