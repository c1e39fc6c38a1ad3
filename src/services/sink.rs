use crate::core::{MatchSink, SinkError};
use crate::models::MatchIntent;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tokio::sync::mpsc;

/// Hands intents to an in-process persistence worker
pub struct ChannelSink {
    sender: mpsc::Sender<MatchIntent>,
}

impl ChannelSink {
    /// Create a sink plus the receiving end for the worker
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<MatchIntent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl MatchSink for ChannelSink {
    async fn emit(&self, intent: MatchIntent) -> Result<(), SinkError> {
        self.sender.send(intent).await.map_err(|_| SinkError::Closed)
    }
}

/// Records intents as structured log lines only
#[derive(Debug, Default)]
pub struct LoggingSink;

#[async_trait]
impl MatchSink for LoggingSink {
    async fn emit(&self, intent: MatchIntent) -> Result<(), SinkError> {
        tracing::info!(
            intent_id = %intent.intent_id,
            pro_id = %intent.pro_id,
            client_id = %intent.client_id,
            rule_set_id = %intent.rule_set_id,
            total_score = intent.total_score,
            "create match record"
        );
        Ok(())
    }
}

/// POSTs intents as JSON to a persistence service
pub struct WebhookSink {
    url: String,
    client: Client,
}

impl WebhookSink {
    pub fn new(url: String, timeout: Duration) -> Result<Self, SinkError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { url, client })
    }
}

#[async_trait]
impl MatchSink for WebhookSink {
    async fn emit(&self, intent: MatchIntent) -> Result<(), SinkError> {
        let response = self.client.post(&self.url).json(&intent).send().await?;

        if !response.status().is_success() {
            return Err(SinkError::Status(response.status().as_u16()));
        }

        tracing::debug!("Delivered match intent {} to {}", intent.intent_id, self.url);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn intent() -> MatchIntent {
        MatchIntent {
            intent_id: uuid::Uuid::new_v4(),
            pro_id: "pro-1".into(),
            client_id: "client-1".into(),
            rule_set_id: "default".into(),
            total_score: 52,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_channel_sink_delivers() {
        let (sink, mut receiver) = ChannelSink::new(4);
        sink.emit(intent()).await.unwrap();

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.pro_id, "pro-1");
        assert_eq!(received.total_score, 52);
    }

    #[tokio::test]
    async fn test_channel_sink_closed() {
        let (sink, receiver) = ChannelSink::new(1);
        drop(receiver);
        assert!(matches!(sink.emit(intent()).await, Err(SinkError::Closed)));
    }

    #[tokio::test]
    async fn test_logging_sink() {
        assert!(LoggingSink.emit(intent()).await.is_ok());
    }

    #[tokio::test]
    async fn test_webhook_sink() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/matches")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "pro_id": "pro-1",
                "client_id": "client-1",
                "total_score": 52
            })))
            .with_status(201)
            .create_async()
            .await;

        let sink = WebhookSink::new(format!("{}/matches", server.url()), Duration::from_secs(2)).unwrap();
        sink.emit(intent()).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_webhook_sink_error_status() {
        let mut server = mockito::Server::new_async().await;
        server.mock("POST", "/matches").with_status(500).create_async().await;

        let sink = WebhookSink::new(format!("{}/matches", server.url()), Duration::from_secs(2)).unwrap();
        assert!(matches!(sink.emit(intent()).await, Err(SinkError::Status(500))));
    }
}
