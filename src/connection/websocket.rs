//! WebSocket specialization of `ConnectionHandler` (spec §4.1 table row
//! "WebSocket"): ping/pong liveness, UTF-8-lossy message decoding.

use super::handler::ConnectionHandler;
use crate::error::CoreError;
use crate::health::HealthCheckResult;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    pub service_name: String,
    pub url: String,
    pub pong_timeout: Duration,
}

impl WebSocketConfig {
    pub fn new(service_name: impl Into<String>, url: impl Into<String>) -> Self {
        Self { service_name: service_name.into(), url: url.into(), pong_timeout: Duration::from_secs(10) }
    }
}

/// Holds a live websocket connection, established lazily on `establish`.
/// Liveness is checked by sending a `Ping` and waiting up to
/// `pong_timeout` for any reply frame.
pub struct WebSocketConnectionHandler {
    config: WebSocketConfig,
    stream: Mutex<Option<WsStream>>,
}

impl WebSocketConnectionHandler {
    pub fn new(config: WebSocketConfig) -> Self {
        Self { config, stream: Mutex::new(None) }
    }

    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), CoreError> {
        let mut guard = self.stream.lock().await;
        let stream = guard
            .as_mut()
            .ok_or_else(|| CoreError::transport(&self.config.service_name, "not connected"))?;
        stream
            .send(Message::Text(text.into().into()))
            .await
            .map_err(|e| CoreError::transport(&self.config.service_name, e.to_string()))
    }

    /// Receive the next message as lossily-decoded text, or `None` on a
    /// non-text/binary control frame.
    pub async fn receive(&self) -> Result<Option<String>, CoreError> {
        let mut guard = self.stream.lock().await;
        let stream = guard
            .as_mut()
            .ok_or_else(|| CoreError::transport(&self.config.service_name, "not connected"))?;
        match stream.next().await {
            Some(Ok(Message::Text(t))) => Ok(Some(t.to_string())),
            Some(Ok(Message::Binary(b))) => Ok(Some(String::from_utf8_lossy(&b).into_owned())),
            Some(Ok(_)) => Ok(None),
            Some(Err(e)) => Err(CoreError::transport(&self.config.service_name, e.to_string())),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ConnectionHandler for WebSocketConnectionHandler {
    async fn establish(&self) -> Result<(), CoreError> {
        let (stream, _response) = connect_async(&self.config.url)
            .await
            .map_err(|e| CoreError::transport(&self.config.service_name, e.to_string()))?;
        *self.stream.lock().await = Some(stream);
        Ok(())
    }

    async fn check_health(&self) -> HealthCheckResult {
        let mut guard = self.stream.lock().await;
        let stream = match guard.as_mut() {
            Some(s) => s,
            None => return HealthCheckResult::unhealthy("not connected"),
        };
        if let Err(e) = stream.send(Message::Ping(Vec::new().into())).await {
            return HealthCheckResult::unhealthy(e.to_string());
        }
        match tokio::time::timeout(self.config.pong_timeout, stream.next()).await {
            Ok(Some(Ok(_frame))) => HealthCheckResult::healthy(),
            Ok(Some(Err(e))) => HealthCheckResult::unhealthy(e.to_string()),
            Ok(None) => HealthCheckResult::unhealthy("stream closed"),
            Err(_) => HealthCheckResult::unhealthy("pong timeout"),
        }
    }

    async fn cleanup(&self) {
        if let Some(mut stream) = self.stream.lock().await.take() {
            let _ = stream.close(None).await;
        }
    }

    fn service_name(&self) -> &str {
        &self.config.service_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn establish_fails_against_unreachable_host() {
        let handler = WebSocketConnectionHandler::new(WebSocketConfig::new(
            "svc",
            "ws://127.0.0.1:9/",
        ));
        assert!(handler.establish().await.is_err());
    }

    #[tokio::test]
    async fn check_health_unestablished_is_unhealthy() {
        let handler = WebSocketConnectionHandler::new(WebSocketConfig::new(
            "svc",
            "ws://127.0.0.1:9/",
        ));
        let result = handler.check_health().await;
        assert!(!result.healthy);
    }

    #[tokio::test]
    async fn send_and_receive_without_connection_errors() {
        let handler = WebSocketConnectionHandler::new(WebSocketConfig::new(
            "svc",
            "ws://127.0.0.1:9/",
        ));
        assert!(handler.send_text("hi").await.is_err());
        assert!(handler.receive().await.is_err());
    }

    #[tokio::test]
    async fn cleanup_without_connection_is_safe() {
        let handler = WebSocketConnectionHandler::new(WebSocketConfig::new(
            "svc",
            "ws://127.0.0.1:9/",
        ));
        handler.cleanup().await;
    }
}
