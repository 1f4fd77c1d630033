use super::{SignalOutput, SignalSource};
use crate::error::{AdapterFailure, ConfigError};
use crate::evidence::EvidenceKind;
use crate::message::MessageInput;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use url::Url;

#[derive(Serialize)]
struct ScoreRequest<'a> {
    kind: EvidenceKind,
    subject: &'a str,
    sender: &'a str,
    recipient: &'a str,
    body: &'a str,
}

/// Delegates one signal kind to an external scoring service.
///
/// The service receives the message as JSON and must answer with a
/// [`SignalOutput`] body: `{"score": .., "description": .., "detail": {..},
/// "url_scores": [{"url": .., "score": ..}]}`.
pub struct HttpSignalSource {
    kind: EvidenceKind,
    name: String,
    endpoint: Url,
    client: Client,
}

impl HttpSignalSource {
    pub fn new(kind: EvidenceKind, endpoint: &str, timeout: Duration) -> Result<Self, ConfigError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| ConfigError::Invalid(format!("endpoint '{endpoint}': {e}")))?;
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("phish-verdict/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConfigError::Invalid(format!("HTTP client: {e}")))?;

        Ok(Self {
            kind,
            name: format!("http:{kind}"),
            endpoint,
            client,
        })
    }
}

#[async_trait::async_trait]
impl SignalSource for HttpSignalSource {
    fn kind(&self) -> EvidenceKind {
        self.kind
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn analyze(&self, message: &MessageInput) -> Result<SignalOutput, AdapterFailure> {
        let request = ScoreRequest {
            kind: self.kind,
            subject: &message.subject,
            sender: &message.sender,
            recipient: &message.recipient,
            body: &message.body,
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| AdapterFailure::Failed(format!("{}: {e}", self.endpoint)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AdapterFailure::Failed(format!(
                "{} returned {status}",
                self.endpoint
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AdapterFailure::Failed(format!("{}: {e}", self.endpoint)))?;

        serde_json::from_str::<SignalOutput>(&body)
            .map_err(|e| AdapterFailure::Malformed(format!("{}: {e}", self.endpoint)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve exactly one canned HTTP response and return the endpoint URL.
    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                if request_complete(&request) {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });

        format!("http://{addr}/score")
    }

    fn request_complete(request: &[u8]) -> bool {
        let text = String::from_utf8_lossy(request);
        let Some(header_end) = text.find("\r\n\r\n") else {
            return false;
        };
        let content_length = text[..header_end]
            .lines()
            .find_map(|l| {
                let (k, v) = l.split_once(':')?;
                k.eq_ignore_ascii_case("content-length")
                    .then(|| v.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        request.len() >= header_end + 4 + content_length
    }

    fn message() -> MessageInput {
        MessageInput::new("Hello", "a@example.com", "b@example.org", "See http://x.tk/")
    }

    #[tokio::test]
    async fn test_successful_response() {
        let endpoint = serve_once(
            "200 OK",
            r#"{"score":0.72,"description":"Model flagged body","url_scores":[{"url":"http://x.tk/","score":0.9}]}"#,
        )
        .await;
        let source =
            HttpSignalSource::new(EvidenceKind::Links, &endpoint, Duration::from_secs(5)).unwrap();

        let output = source.analyze(&message()).await.unwrap();
        assert_eq!(output.score, 0.72);
        assert_eq!(output.description, "Model flagged body");
        assert_eq!(output.url_scores.len(), 1);
        assert_eq!(source.name(), "http:links");
    }

    #[tokio::test]
    async fn test_error_status_is_failure() {
        let endpoint = serve_once("503 Service Unavailable", "{}").await;
        let source =
            HttpSignalSource::new(EvidenceKind::Content, &endpoint, Duration::from_secs(5))
                .unwrap();
        assert!(matches!(
            source.analyze(&message()).await,
            Err(AdapterFailure::Failed(_))
        ));
    }

    #[tokio::test]
    async fn test_unexpected_body_is_malformed() {
        let endpoint = serve_once("200 OK", r#"{"verdict":"phishing"}"#).await;
        let source =
            HttpSignalSource::new(EvidenceKind::Content, &endpoint, Duration::from_secs(5))
                .unwrap();
        assert!(matches!(
            source.analyze(&message()).await,
            Err(AdapterFailure::Malformed(_))
        ));
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        assert!(matches!(
            HttpSignalSource::new(EvidenceKind::Subject, "::not-a-url", Duration::from_secs(1)),
            Err(ConfigError::Invalid(_))
        ));
    }
}
