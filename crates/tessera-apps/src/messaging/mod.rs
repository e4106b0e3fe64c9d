//! User-message producer and consumer.
//!
//! `POST /message` stamps the message with a header describing the HTTP
//! request, logs it, and publishes it keyed by subject. A single consumer
//! task decodes and logs every record on the topic.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use http::Method;
use serde::{Deserialize, Serialize};
use tessera_core::{RequestContext, ServiceError};
use tessera_server::{HandlerError, HandlerRegistry, Router};
use thiserror::Error;

use crate::broker::{Broker, BrokerError};
use crate::task::BackgroundTask;

/// Describes the HTTP request a message was sent with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestHeader {
    /// Peer IP address, without port.
    pub remote_address: String,
    /// `Host` header.
    pub host: String,
    /// HTTP method.
    pub method: String,
    /// Request path.
    pub path: String,
    /// Query parameters; repeated keys keep every value.
    pub query: BTreeMap<String, Vec<String>>,
    /// Whether the request arrived over TLS.
    pub secure: bool,
    /// Epoch milliseconds when the message was produced.
    pub timestamp: i64,
}

impl RequestHeader {
    /// Captures the header for the request in `ctx`.
    pub fn from_context(ctx: &RequestContext) -> Self {
        Self {
            remote_address: ctx
                .remote_addr()
                .map(|addr| addr.ip().to_string())
                .unwrap_or_default(),
            host: ctx.header("host").unwrap_or_default().to_string(),
            method: ctx.method().as_str().to_string(),
            path: ctx.path().to_string(),
            query: ctx.query().to_multimap(),
            secure: false,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// A user action event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMessage {
    /// Who acted.
    pub subject: String,
    /// What they did.
    pub action: String,
    /// What they did it to.
    pub object: String,
    /// Filled in by the producer.
    #[serde(default)]
    pub request_header: Option<RequestHeader>,
}

impl fmt::Display for UserMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "{} {} {}", self.subject, self.action, self.object),
        }
    }
}

/// Messaging failures.
#[derive(Debug, Error)]
pub enum MessagingError {
    /// The broker rejected the record.
    #[error("unable to send event for message: {0}")]
    Broker(#[from] BrokerError),

    /// The message did not encode.
    #[error("unable to encode message: {0}")]
    Codec(#[from] serde_json::Error),
}

impl From<MessagingError> for ServiceError {
    fn from(err: MessagingError) -> Self {
        ServiceError::internal_with_source("message publishing failed", err)
    }
}

/// Produces user messages.
#[derive(Debug, Clone)]
pub struct MessageService {
    broker: Arc<Broker>,
    topic: String,
}

impl MessageService {
    /// Publishes to `topic` on `broker`.
    pub fn new(broker: Arc<Broker>, topic: impl Into<String>) -> Self {
        Self {
            broker,
            topic: topic.into(),
        }
    }

    /// The topic messages go to.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Stamps, logs and publishes `message`, returning its offset.
    pub async fn send(
        &self,
        ctx: &RequestContext,
        mut message: UserMessage,
    ) -> Result<u64, MessagingError> {
        message.request_header = Some(RequestHeader::from_context(ctx));
        tracing::info!(topic = %self.topic, "Producing message: {message}");

        let payload = serde_json::to_string(&message)?;
        let offset = self
            .broker
            .publish(&self.topic, Some(&message.subject), payload)
            .await?;
        Ok(offset)
    }

    /// Routes and handlers.
    pub fn routes(&self) -> (Router, HandlerRegistry) {
        let mut router = Router::new();
        router.add_route(Method::POST, "/message", "messaging.send");

        let mut handlers = HandlerRegistry::new();
        let svc = self.clone();
        handlers.register("messaging.send", move |ctx, message: UserMessage| {
            let svc = svc.clone();
            async move {
                svc.send(&ctx, message).await.map_err(ServiceError::from)?;
                Ok::<_, HandlerError>(())
            }
        });

        (router, handlers)
    }
}

/// Logs every message published on a topic.
#[derive(Debug)]
pub struct MessageConsumer {
    broker: Arc<Broker>,
    topic: String,
    task: BackgroundTask,
}

impl MessageConsumer {
    /// Consumes `topic` on `broker` once started.
    pub fn new(broker: Arc<Broker>, topic: impl Into<String>) -> Self {
        Self {
            broker,
            topic: topic.into(),
            task: BackgroundTask::new("message-consumer"),
        }
    }

    /// Subscribes and spawns the consumer loop. The broker must be running.
    pub async fn start(&self) -> Result<(), BrokerError> {
        let mut subscription = self.broker.subscribe(&self.topic).await?;
        self.task.start(move |shutdown| async move {
            loop {
                tokio::select! {
                    () = shutdown.recv() => break,
                    record = subscription.recv() => {
                        let Some(record) = record else { break };
                        match serde_json::from_str::<UserMessage>(&record.payload) {
                            Ok(message) => tracing::info!(
                                offset = record.offset,
                                "Consuming message: {message}"
                            ),
                            Err(e) => tracing::error!(
                                offset = record.offset,
                                error = %e,
                                "Unable to consume message"
                            ),
                        }
                    }
                }
            }
        });
        Ok(())
    }

    /// Stops the consumer loop.
    pub async fn stop(&self) {
        self.task.stop().await;
    }

    /// Returns `true` while consuming.
    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderMap, HeaderValue};
    use std::net::SocketAddr;
    use tessera_core::QueryParams;

    fn message() -> UserMessage {
        UserMessage {
            subject: "thomas".to_string(),
            action: "likes".to_string(),
            object: "rust".to_string(),
            request_header: None,
        }
    }

    #[test]
    fn test_request_header_from_context() {
        let mut headers = HeaderMap::new();
        headers.insert("host", HeaderValue::from_static("localhost:9000"));
        let ctx = RequestContext::new()
            .with_target(Method::POST, "/message")
            .with_query(QueryParams::parse("a=1&a=2"))
            .with_headers(headers)
            .with_remote_addr(Some(SocketAddr::from(([127, 0, 0, 1], 40_000))));

        let header = RequestHeader::from_context(&ctx);
        assert_eq!(header.remote_address, "127.0.0.1");
        assert_eq!(header.host, "localhost:9000");
        assert_eq!(header.method, "POST");
        assert_eq!(header.path, "/message");
        assert_eq!(header.query["a"], vec!["1", "2"]);
        assert!(!header.secure);
        assert!(header.timestamp > 0);
    }

    #[tokio::test]
    async fn test_send_publishes_keyed_by_subject() {
        let broker = Arc::new(Broker::new());
        broker.start().await.unwrap();
        broker.create_topic("user-messages").await.unwrap();
        let mut subscription = broker.subscribe("user-messages").await.unwrap();

        let svc = MessageService::new(Arc::clone(&broker), "user-messages");
        svc.send(&RequestContext::new(), message()).await.unwrap();

        let record = subscription.recv().await.unwrap();
        assert_eq!(record.key.as_deref(), Some("thomas"));
        let decoded: UserMessage = serde_json::from_str(&record.payload).unwrap();
        assert!(decoded.request_header.is_some());
        broker.stop().await;
    }

    #[tokio::test]
    async fn test_consumer_lifecycle() {
        let broker = Arc::new(Broker::new());
        let consumer = MessageConsumer::new(Arc::clone(&broker), "user-messages");
        assert!(consumer.start().await.is_err());

        broker.start().await.unwrap();
        broker.create_topic("user-messages").await.unwrap();
        consumer.start().await.unwrap();
        assert!(consumer.is_running());

        MessageService::new(Arc::clone(&broker), "user-messages")
            .send(&RequestContext::new(), message())
            .await
            .unwrap();

        consumer.stop().await;
        broker.stop().await;
        assert!(!consumer.is_running());
    }
}
