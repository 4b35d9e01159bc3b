//! Websocket link to the collector.
//!
//! [`StreamingClient`] owns at most one live connection. A background reader
//! task answers application-level pings and notices when the peer goes away;
//! websocket-level pings are answered by the transport itself.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use racing_telemetry_core::{CaptureConfig, StreamingError, TelemetryRecord};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use url::Url;

use crate::protocol::{InboundMessage, OutboundMessage};
use crate::session::duration_ms;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = Arc<Mutex<SplitSink<WsStream, Message>>>;

/// Upper bound on the close handshake during `disconnect`.
const CLOSE_TIMEOUT: Duration = Duration::from_millis(500);

struct Link {
    sink: WsSink,
    closed: CancellationToken,
    reader: JoinHandle<()>,
}

pub struct StreamingClient {
    endpoint: String,
    credential: String,
    connect_timeout: Duration,
    session_id: Option<String>,
    link: Option<Link>,
}

impl std::fmt::Debug for StreamingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingClient")
            .field("endpoint", &self.endpoint)
            .field("session_id", &self.session_id)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl StreamingClient {
    pub fn new(config: &CaptureConfig) -> Self {
        Self {
            endpoint: config.endpoint_url.trim().to_string(),
            credential: config.credential.clone(),
            connect_timeout: config.connect_timeout(),
            session_id: None,
            link: None,
        }
    }

    /// Session id carried on the next connection URL.
    pub fn set_session_id(&mut self, session_id: Option<String>) {
        self.session_id = session_id;
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Endpoint URL with the credential and session id as query parameters.
    pub fn connection_url(&self) -> Result<Url, StreamingError> {
        let mut url = Url::parse(&self.endpoint).map_err(|e| StreamingError::Connect {
            endpoint: self.endpoint.clone(),
            reason: e.to_string(),
        })?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("api_key", &self.credential);
            if let Some(session_id) = &self.session_id {
                query.append_pair("session_id", session_id);
            }
        }
        Ok(url)
    }

    /// Establish the websocket, bounded by the connect timeout.
    ///
    /// Any previous link is torn down first.
    pub async fn try_connect(&mut self) -> Result<(), StreamingError> {
        self.disconnect().await;

        let url = self.connection_url()?;
        let connect_error = |reason: String| StreamingError::Connect {
            endpoint: self.endpoint.clone(),
            reason,
        };

        let (stream, response) = tokio::time::timeout(self.connect_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_elapsed| StreamingError::Timeout {
                timeout_ms: duration_ms(self.connect_timeout),
            })?
            .map_err(|e| connect_error(e.to_string()))?;

        debug!(endpoint = %self.endpoint, status = %response.status(), "Websocket established");

        let (sink, stream) = stream.split();
        let sink = Arc::new(Mutex::new(sink));
        let closed = CancellationToken::new();
        let reader = tokio::spawn(read_loop(stream, Arc::clone(&sink), closed.clone()));

        self.link = Some(Link {
            sink,
            closed,
            reader,
        });
        Ok(())
    }

    /// `true` once the websocket handshake has completed.
    pub async fn connect(&mut self) -> bool {
        match self.try_connect().await {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "Connect attempt failed");
                false
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.link
            .as_ref()
            .is_some_and(|link| !link.closed.is_cancelled())
    }

    /// Resolves when the current link drops. Pending forever without a link.
    pub async fn closed(&self) {
        match &self.link {
            Some(link) => link.closed.cancelled().await,
            None => std::future::pending::<()>().await,
        }
    }

    /// Send one record. `false` when there is no usable link or the write failed.
    pub async fn send(&mut self, record: &TelemetryRecord) -> bool {
        let Some(link) = self.link.as_ref().filter(|link| !link.closed.is_cancelled()) else {
            return false;
        };

        let text = match (OutboundMessage::Telemetry { data: record }).to_json() {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Failed to serialize telemetry record");
                return false;
            }
        };

        let result = link.sink.lock().await.send(Message::Text(text.into())).await;
        match result {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "Websocket send failed");
                link.closed.cancel();
                false
            }
        }
    }

    /// Close the link if there is one. Always safe to call.
    pub async fn disconnect(&mut self) {
        let Some(link) = self.link.take() else {
            return;
        };

        link.closed.cancel();
        let close = async {
            let mut sink = link.sink.lock().await;
            sink.close().await
        };
        match tokio::time::timeout(CLOSE_TIMEOUT, close).await {
            Ok(Ok(())) => trace!("Websocket closed"),
            Ok(Err(e)) => trace!(error = %e, "Websocket close returned an error"),
            Err(_elapsed) => debug!("Websocket close timed out"),
        }
        link.reader.abort();
    }
}

async fn read_loop(mut stream: SplitStream<WsStream>, sink: WsSink, closed: CancellationToken) {
    loop {
        let next = tokio::select! {
            _ = closed.cancelled() => break,
            next = stream.next() => next,
        };

        match next {
            Some(Ok(Message::Text(text))) => {
                if InboundMessage::parse(text.as_str()) == Some(InboundMessage::Ping) {
                    let pong = match OutboundMessage::Pong.to_json() {
                        Ok(pong) => pong,
                        Err(e) => {
                            warn!(error = %e, "Failed to serialize pong");
                            continue;
                        }
                    };
                    if let Err(e) = sink.lock().await.send(Message::Text(pong.into())).await {
                        debug!(error = %e, "Failed to answer ping");
                        break;
                    }
                    trace!("Answered collector ping");
                }
            }
            Some(Ok(Message::Close(frame))) => {
                debug!(?frame, "Collector closed the websocket");
                break;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                debug!(error = %e, "Websocket read failed");
                break;
            }
            None => break,
        }
    }
    closed.cancel();
}


#[cfg(test)]
mod tests {
    use super::test_server::{ServerEvent, next_text, spawn};
    use super::*;
    use racing_telemetry_core::{RecordTimestamp, SourceTitle};

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    const WAIT: Duration = Duration::from_secs(5);

    fn config_for(endpoint: String) -> CaptureConfig {
        CaptureConfig {
            endpoint_url: endpoint,
            credential: "key with space".to_string(),
            connect_timeout_ms: 1000,
            ..CaptureConfig::default()
        }
    }

    fn record() -> TelemetryRecord {
        TelemetryRecord::new(SourceTitle::LeMansUltimate, RecordTimestamp::now())
    }

    #[test]
    fn test_connection_url_carries_credential_and_session() -> TestResult {
        let mut client = StreamingClient::new(&config_for("wss://collector.test/api/v1/ws".into()));
        let url = client.connection_url()?;
        assert_eq!(url.path(), "/api/v1/ws");
        assert_eq!(url.query(), Some("api_key=key+with+space"));

        client.set_session_id(Some("s-1".to_string()));
        let url = client.connection_url()?;
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("api_key".to_string(), "key with space".to_string()),
                ("session_id".to_string(), "s-1".to_string()),
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_send_without_connection_returns_false() -> TestResult {
        let mut client = StreamingClient::new(&config_for("ws://127.0.0.1:9/ws".into()));
        assert!(!client.is_connected());
        assert!(!client.send(&record()).await);
        client.disconnect().await;
        client.disconnect().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_fails() -> TestResult {
        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;
        drop(listener);

        let mut client = StreamingClient::new(&config_for(format!("ws://{addr}/ws")));
        assert!(!client.connect().await);
        assert!(!client.is_connected());
        Ok(())
    }

    #[tokio::test]
    async fn test_connect_send_and_disconnect() -> TestResult {
        let (addr, mut events) = spawn(Vec::new()).await?;
        let mut client = StreamingClient::new(&config_for(format!("ws://{addr}/ws")));
        client.set_session_id(Some("s-9".to_string()));

        assert!(client.connect().await);
        assert!(client.is_connected());

        match tokio::time::timeout(WAIT, events.recv()).await? {
            Some(ServerEvent::Connected { uri }) => {
                assert!(uri.starts_with("/ws?api_key="));
                assert!(uri.contains("session_id=s-9"));
            }
            other => return Err(format!("unexpected event {other:?}").into()),
        }

        let sent = record();
        assert!(client.send(&sent).await);
        let text = tokio::time::timeout(WAIT, next_text(&mut events))
            .await?
            .ok_or("server closed")?;
        let value: serde_json::Value = serde_json::from_str(&text)?;
        assert_eq!(value["type"], "telemetry");
        assert_eq!(serde_json::from_value::<TelemetryRecord>(value["data"].clone())?, sent);

        client.disconnect().await;
        assert!(!client.is_connected());
        assert!(!client.send(&sent).await);
        client.disconnect().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_collector_ping_answered_with_pong() -> TestResult {
        let (addr, mut events) = spawn(vec![r#"{"type":"ping"}"#.to_string()]).await?;
        let mut client = StreamingClient::new(&config_for(format!("ws://{addr}/ws")));
        assert!(client.connect().await);

        let text = tokio::time::timeout(WAIT, next_text(&mut events))
            .await?
            .ok_or("server closed")?;
        assert_eq!(text, r#"{"type":"pong"}"#);

        client.disconnect().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_server_close_is_observed() -> TestResult {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            if let Ok((stream, _)) = listener.accept().await
                && let Ok(mut socket) = tokio_tungstenite::accept_async(stream).await
            {
                let _closed = socket.close(None).await;
            }
        });

        let mut client = StreamingClient::new(&config_for(format!("ws://{addr}/ws")));
        assert!(client.connect().await);
        tokio::time::timeout(WAIT, client.closed()).await?;
        assert!(!client.is_connected());
        assert!(!client.send(&record()).await);
        Ok(())
    }
}
