//! Session begin/end exchange with the collector's REST API.

use std::time::Duration;

use chrono::Utc;
use racing_telemetry_core::{CaptureConfig, StreamingError};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

#[derive(Debug, Serialize)]
struct BeginSessionRequest<'a> {
    client: &'a str,
    started_at: chrono::DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct BeginSessionResponse {
    session_id: String,
}

/// Locally generated session id, used when the handshake is disabled.
pub fn local_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Thin client over `POST /sessions` and `POST /sessions/{id}/end`.
#[derive(Debug, Clone)]
pub struct SessionClient {
    http: Client,
    api_url: String,
    credential: String,
    begin_timeout: Duration,
    end_timeout: Duration,
}

impl SessionClient {
    pub fn new(config: &CaptureConfig) -> Result<Self, StreamingError> {
        let http = Client::builder()
            .user_agent(concat!("racing-telemetry/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StreamingError::Session(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_url: config.api_url.trim().trim_end_matches('/').to_string(),
            credential: config.credential.clone(),
            begin_timeout: config.session.begin_timeout(),
            end_timeout: config.session.end_timeout(),
        })
    }

    /// `api_url` with `segments` appended, each percent-encoded as one segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, StreamingError> {
        let invalid = |reason: String| {
            StreamingError::Session(format!("invalid api url {}: {reason}", self.api_url))
        };
        let mut url = Url::parse(&self.api_url).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| invalid("cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Ask the collector for a new session id.
    pub async fn begin(&self) -> Result<String, StreamingError> {
        let url = self.endpoint(&["sessions"])?;
        let body = BeginSessionRequest {
            client: concat!("racing-telemetry/", env!("CARGO_PKG_VERSION")),
            started_at: Utc::now(),
        };

        let response = self
            .http
            .post(url)
            .bearer_auth(&self.credential)
            .timeout(self.begin_timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| request_error(e, self.begin_timeout))?
            .error_for_status()
            .map_err(|e| StreamingError::Session(e.to_string()))?;

        let parsed: BeginSessionResponse = response
            .json()
            .await
            .map_err(|e| StreamingError::Session(format!("invalid session response: {e}")))?;

        if parsed.session_id.trim().is_empty() {
            return Err(StreamingError::Session(
                "collector returned an empty session id".to_string(),
            ));
        }

        debug!(session_id = %parsed.session_id, "Session begun");
        Ok(parsed.session_id)
    }

    /// Best-effort end notification. Never waits longer than the end timeout.
    pub async fn end(&self, session_id: &str) -> Result<(), StreamingError> {
        let url = self.endpoint(&["sessions", session_id, "end"])?;
        let request = self
            .http
            .post(url)
            .bearer_auth(&self.credential)
            .timeout(self.end_timeout)
            .send();

        let response = tokio::time::timeout(self.end_timeout, request)
            .await
            .map_err(|_elapsed| StreamingError::Timeout {
                timeout_ms: duration_ms(self.end_timeout),
            })?
            .map_err(|e| request_error(e, self.end_timeout))?;

        response
            .error_for_status()
            .map_err(|e| StreamingError::Session(e.to_string()))?;

        debug!(session_id, "Session ended");
        Ok(())
    }
}

fn request_error(error: reqwest::Error, timeout: Duration) -> StreamingError {
    if error.is_timeout() {
        StreamingError::Timeout {
            timeout_ms: duration_ms(timeout),
        }
    } else {
        StreamingError::Session(error.to_string())
    }
}

pub(crate) fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn config_for(server: &MockServer) -> CaptureConfig {
        let mut config = CaptureConfig {
            api_url: format!("{}/", server.uri()),
            credential: "secret-key".to_string(),
            ..CaptureConfig::default()
        };
        config.session.handshake = true;
        config.session.end_timeout_ms = 200;
        config.session.begin_timeout_ms = 500;
        config
    }

    #[test]
    fn test_local_session_ids_are_unique_uuids() -> TestResult {
        let first = local_session_id();
        let second = local_session_id();
        assert_ne!(first, second);
        assert_eq!(uuid::Uuid::parse_str(&first)?.get_version_num(), 4);
        Ok(())
    }

    #[tokio::test]
    async fn test_begin_returns_collector_session_id() -> TestResult {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sessions"))
            .and(header("authorization", "Bearer secret-key"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(serde_json::json!({ "session_id": "s-42" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = SessionClient::new(&config_for(&server))?;
        assert_eq!(client.begin().await?, "s-42");
        Ok(())
    }

    #[tokio::test]
    async fn test_begin_rejected_by_collector() -> TestResult {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sessions"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = SessionClient::new(&config_for(&server))?;
        let result = client.begin().await;
        assert!(matches!(result, Err(StreamingError::Session(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_begin_with_empty_session_id_fails() -> TestResult {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sessions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "session_id": "" })),
            )
            .mount(&server)
            .await;

        let client = SessionClient::new(&config_for(&server))?;
        assert!(client.begin().await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_end_posts_to_session_path() -> TestResult {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sessions/s-42/end"))
            .and(header("authorization", "Bearer secret-key"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = SessionClient::new(&config_for(&server))?;
        client.end("s-42").await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_end_escapes_reserved_characters_in_session_id() -> TestResult {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sessions/a%2Fb%3Fc/end"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = SessionClient::new(&config_for(&server))?;
        client.end("a/b?c").await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_session_paths_extend_api_base_path() -> TestResult {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/sessions"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(serde_json::json!({ "session_id": "s-7" })),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/sessions/s-7/end"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = config_for(&server);
        config.api_url = format!("{}/api/v1/", server.uri());
        let client = SessionClient::new(&config)?;
        let session_id = client.begin().await?;
        client.end(&session_id).await?;
        Ok(())
    }

    #[test]
    fn test_unusable_api_url_is_a_session_error() -> TestResult {
        let config = CaptureConfig {
            api_url: "mailto:collector@example.com".to_string(),
            ..CaptureConfig::default()
        };
        let client = SessionClient::new(&config)?;
        assert!(matches!(
            client.endpoint(&["sessions"]),
            Err(StreamingError::Session(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_end_is_bounded_by_timeout() -> TestResult {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sessions/slow/end"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let client = SessionClient::new(&config_for(&server))?;
        let started = std::time::Instant::now();
        let result = client.end("slow").await;

        assert!(matches!(result, Err(StreamingError::Timeout { .. })));
        assert!(started.elapsed() < Duration::from_secs(2));
        Ok(())
    }
}
