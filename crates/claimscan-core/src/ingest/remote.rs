use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use super::extractor::{ExtractOptions, Extractor, TokenSink, UNKNOWN_ENTITY};
use crate::config::RemoteConfig;

const SYSTEM_PROMPT: &str = "\
You read insurance claim documents and identify the primary insured entity: \
the business or person who holds the policy the claim is made under.

Rules:
- Answer with the entity name only, with no explanation or surrounding text
- Prefer fields such as \"Named Insured\", \"Insured\", \"Policy Holder\" or \"Certificate Holder\"
- Ignore agents, brokers, adjusters and other secondary parties

Example answers: \"Harbor Freight Co\" or \"Jane Doe\"";

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Remote returned status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("Remote reported an error: {0}")]
    Service(String),
    #[error("Malformed response frame: {0}")]
    Malformed(String),
    #[error("Remote returned no text")]
    Empty,
}

pub type RemoteResult<T> = Result<T, RemoteError>;

#[must_use]
pub fn build_extraction_prompt(text: &str) -> String {
    format!("{SYSTEM_PROMPT}\n\nDocument text:\n{text}\n\nExtract the primary insured entity name:")
}

#[derive(Debug, Serialize)]
pub struct CompletionRequest<'a> {
    pub prompt: &'a str,
    pub max_length: u32,
    pub temperature: f32,
}

#[derive(Debug, Default, Deserialize)]
struct RawFrame {
    token: Option<String>,
    response: Option<String>,
    result: Option<String>,
    error: Option<String>,
    detail: Option<String>,
}

/// One unit of output from the completion service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionFrame {
    Token(String),
    Completion(String),
    Error(String),
    Done,
}

impl CompletionFrame {
    pub fn parse_json(json: &str) -> RemoteResult<Self> {
        let raw: RawFrame =
            serde_json::from_str(json).map_err(|e| RemoteError::Malformed(format!("{e}: {json}")))?;

        if let Some(message) = raw.error.or(raw.detail) {
            return Ok(Self::Error(message));
        }
        if let Some(token) = raw.token {
            return Ok(Self::Token(token));
        }
        raw.response
            .or(raw.result)
            .map(Self::Completion)
            .ok_or_else(|| RemoteError::Malformed(format!("no known field in {json}")))
    }

    /// Parse one server-sent-events line. Lines other than `data:` carry no
    /// frame.
    pub fn parse_sse_line(line: &str) -> RemoteResult<Option<Self>> {
        let Some(data) = line.trim_end_matches('\r').strip_prefix("data:") else {
            return Ok(None);
        };
        let data = data.trim();

        if data == "[DONE]" {
            return Ok(Some(Self::Done));
        }
        Self::parse_json(data).map(Some)
    }
}

fn error_detail(body: &str) -> String {
    serde_json::from_str::<RawFrame>(body)
        .ok()
        .and_then(|raw| raw.error.or(raw.detail))
        .unwrap_or_else(|| body.chars().take(200).collect())
}

fn is_loopback(endpoint: &str) -> bool {
    url::Url::parse(endpoint)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .is_some_and(|host| matches!(host.as_str(), "localhost" | "127.0.0.1" | "[::1]"))
}

/// Asks a remote completion service for the insured name. Every failure
/// degrades to [`UNKNOWN_ENTITY`].
pub struct RemoteExtractor {
    client: Client,
    endpoint: String,
}

impl RemoteExtractor {
    pub fn new(config: &RemoteConfig) -> RemoteResult<Self> {
        let mut builder = Client::builder()
            .connect_timeout(Duration::from_secs(u64::from(config.connect_timeout_seconds)))
            .timeout(Duration::from_secs(u64::from(config.request_timeout_seconds)));

        if let Some(ref ua) = config.user_agent {
            builder = builder.user_agent(ua);
        }

        // A model server on this machine is never reached through a proxy.
        if is_loopback(&config.endpoint) {
            builder = builder.no_proxy();
        }

        Ok(Self {
            client: builder.build()?,
            endpoint: config.endpoint.clone(),
        })
    }

    pub async fn extract_via_remote(
        &self,
        text: &str,
        options: &ExtractOptions,
        tokens: Option<&TokenSink>,
    ) -> String {
        match self.request(text, options, tokens).await {
            Ok(name) => {
                tracing::info!(name = %name, "Remote model extracted insured name");
                name
            }
            Err(e) => {
                tracing::warn!(endpoint = %self.endpoint, error = %e, "Remote extraction failed");
                UNKNOWN_ENTITY.to_string()
            }
        }
    }

    async fn request(
        &self,
        text: &str,
        options: &ExtractOptions,
        tokens: Option<&TokenSink>,
    ) -> RemoteResult<String> {
        let prompt = build_extraction_prompt(text);
        let body = CompletionRequest {
            prompt: &prompt,
            max_length: options.max_tokens,
            temperature: options.temperature,
        };

        let response = self.client.post(&self.endpoint).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Status {
                status: status.as_u16(),
                message: error_detail(&body),
            });
        }

        let streaming = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("text/event-stream"));

        let output = if streaming {
            read_event_stream(response, tokens).await?
        } else {
            read_single_payload(response, tokens).await?
        };

        let trimmed = output.trim();
        if trimmed.is_empty() {
            return Err(RemoteError::Empty);
        }
        Ok(trimmed.to_string())
    }
}

fn emit(tokens: Option<&TokenSink>, fragment: &str) {
    // A closed receiver only stops progress delivery.
    if let Some(tokens) = tokens {
        let _ = tokens.send(fragment.to_string());
    }
}

/// Apply one frame to the accumulated output. Returns `true` at end of stream.
fn apply_frame(
    frame: CompletionFrame,
    output: &mut String,
    tokens: Option<&TokenSink>,
) -> RemoteResult<bool> {
    match frame {
        CompletionFrame::Token(token) => {
            emit(tokens, &token);
            output.push_str(&token);
            Ok(false)
        }
        CompletionFrame::Completion(text) => {
            emit(tokens, &text);
            output.push_str(&text);
            Ok(false)
        }
        CompletionFrame::Error(message) => Err(RemoteError::Service(message)),
        CompletionFrame::Done => Ok(true),
    }
}

async fn read_event_stream(
    mut response: Response,
    tokens: Option<&TokenSink>,
) -> RemoteResult<String> {
    let mut pending: Vec<u8> = Vec::new();
    let mut output = String::new();

    while let Some(chunk) = response.chunk().await? {
        pending.extend_from_slice(&chunk);

        while let Some(newline) = pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = pending.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line);

            if let Some(frame) = CompletionFrame::parse_sse_line(line.trim_end())? {
                if apply_frame(frame, &mut output, tokens)? {
                    return Ok(output);
                }
            }
        }
    }

    let rest = String::from_utf8_lossy(&pending);
    if let Some(frame) = CompletionFrame::parse_sse_line(rest.trim())? {
        apply_frame(frame, &mut output, tokens)?;
    }

    tracing::debug!("Event stream closed without a completion marker");
    Ok(output)
}

async fn read_single_payload(
    response: Response,
    tokens: Option<&TokenSink>,
) -> RemoteResult<String> {
    let body = response.text().await?;
    let frame = match CompletionFrame::parse_json(&body)? {
        CompletionFrame::Completion(text) => CompletionFrame::Completion(text.trim().to_string()),
        frame => frame,
    };
    let mut output = String::new();
    apply_frame(frame, &mut output, tokens)?;
    Ok(output)
}

#[async_trait::async_trait]
impl Extractor for RemoteExtractor {
    async fn extract(
        &self,
        text: &str,
        options: &ExtractOptions,
        tokens: Option<&TokenSink>,
    ) -> String {
        self.extract_via_remote(text, options, tokens).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::mpsc;
    use tokio::task::JoinHandle;

    async fn read_request_body(socket: &mut TcpStream) -> String {
        let mut data = Vec::new();
        let mut buf = [0u8; 4096];

        loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                return String::new();
            }
            data.extend_from_slice(&buf[..n]);

            let Some(end) = data.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let headers = String::from_utf8_lossy(&data[..end]).to_lowercase();
            let length = headers
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);

            let body_start = end + 4;
            if data.len() >= body_start + length {
                return String::from_utf8_lossy(&data[body_start..body_start + length]).into_owned();
            }
        }
    }

    /// Answers a single request with a canned response and hands back the
    /// request body.
    async fn serve_once(
        status: &'static str,
        content_type: &'static str,
        body: &str) -> (RemoteConfig, JoinHandle<String>,
    ) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nConnection: close\r\n\r\n{body}"
        );

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request_body(&mut socket).await;
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            request
        });

        let config = RemoteConfig {
            endpoint: format!("http://{addr}/chat"),
            request_timeout_seconds: 5,
            ..RemoteConfig::default()
        };
        (config, handle)
    }

    async fn run(config: &RemoteConfig, tokens: Option<&TokenSink>) -> String {
        RemoteExtractor::new(config)
            .unwrap()
            .extract_via_remote("Loss notice for the warehouse", &ExtractOptions::default(), tokens)
            .await
    }

    #[test]
    fn test_prompt_layout() {
        let prompt = build_extraction_prompt("Claim text here");

        assert!(prompt.starts_with(SYSTEM_PROMPT));
        assert!(prompt.contains("\n\nDocument text:\nClaim text here\n\n"));
        assert!(prompt.ends_with("Extract the primary insured entity name:"));
    }

    #[test]
    fn test_parse_sse_lines() {
        assert_eq!(
            CompletionFrame::parse_sse_line(r#"data: {"token": "Acme"}"#).unwrap(),
            Some(CompletionFrame::Token("Acme".into()))
        );
        assert_eq!(
            CompletionFrame::parse_sse_line("data: [DONE]").unwrap(),
            Some(CompletionFrame::Done)
        );
        assert_eq!(
            CompletionFrame::parse_sse_line(r#"data: {"error": "CUDA out of memory"}"#).unwrap(),
            Some(CompletionFrame::Error("CUDA out of memory".into()))
        );
        assert_eq!(CompletionFrame::parse_sse_line("").unwrap(), None);
        assert_eq!(CompletionFrame::parse_sse_line(": keep-alive").unwrap(), None);
        assert!(matches!(
            CompletionFrame::parse_sse_line("data: {not json"),
            Err(RemoteError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_json_payloads() {
        assert_eq!(
            CompletionFrame::parse_json(r#"{"response": "Acme LLC"}"#).unwrap(),
            CompletionFrame::Completion("Acme LLC".into())
        );
        assert_eq!(
            CompletionFrame::parse_json(r#"{"result": "Acme LLC"}"#).unwrap(),
            CompletionFrame::Completion("Acme LLC".into())
        );
        assert_eq!(
            CompletionFrame::parse_json(r#"{"detail": "Not Found"}"#).unwrap(),
            CompletionFrame::Error("Not Found".into())
        );
        assert!(CompletionFrame::parse_json(r#"{"other": 1}"#).is_err());
    }

    #[test]
    fn test_loopback_detection() {
        assert!(is_loopback("http://localhost:8000/chat"));
        assert!(is_loopback("http://127.0.0.1:9000/chat"));
        assert!(!is_loopback("https://models.internal.example/chat"));
        assert!(!is_loopback("not a url"));
    }

    #[tokio::test]
    async fn test_streamed_tokens() {
        let body = "data: {\"token\": \"Riley \"}\n\n\
                    data: {\"token\": \"HealthCare\"}\n\n\
                    data: {\"token\": \" LLC \"}\n\n\
                    data: [DONE]\n\n";
        let (config, server) = serve_once("200 OK", "text/event-stream", body).await;
        let (tx, mut rx) = mpsc::unbounded_channel();

        let name = run(&config, Some(&tx)).await;
        drop(tx);

        assert_eq!(name, "Riley HealthCare LLC");
        let mut received = Vec::new();
        while let Some(token) = rx.recv().await {
            received.push(token);
        }
        assert_eq!(received, ["Riley ", "HealthCare", " LLC "]);

        let request: serde_json::Value = serde_json::from_str(&server.await.unwrap()).unwrap();
        assert_eq!(request["max_length"], 200);
        assert!((request["temperature"].as_f64().unwrap() - 0.3).abs() < 1e-6);
        assert!(request["prompt"]
            .as_str()
            .unwrap()
            .contains("Loss notice for the warehouse"));
    }

    #[tokio::test]
    async fn test_single_json_response() {
        let (config, _server) = serve_once(
            "200 OK",
            "application/json",
            r#"{"response": "  Evergreen Farms Ltd  "}"#,
        )
        .await;

        let (tx, mut rx) = mpsc::unbounded_channel();

        assert_eq!(run(&config, Some(&tx)).await, "Evergreen Farms Ltd");
        drop(tx);
        assert_eq!(rx.recv().await.as_deref(), Some("Evergreen Farms Ltd"));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_error_status_yields_unknown() {
        let (config, _server) = serve_once(
            "500 Internal Server Error",
            "application/json",
            r#"{"error": "model not loaded"}"#,
        )
        .await;

        assert_eq!(run(&config, None).await, UNKNOWN_ENTITY);
    }

    #[tokio::test]
    async fn test_error_frame_yields_unknown() {
        let body = "data: {\"token\": \"Acme\"}\n\ndata: {\"error\": \"generation aborted\"}\n\n";
        let (config, _server) = serve_once("200 OK", "text/event-stream", body).await;

        assert_eq!(run(&config, None).await, UNKNOWN_ENTITY);
    }

    #[tokio::test]
    async fn test_malformed_frame_yields_unknown() {
        let body = "data: {\"token\": \"Acme\"}\n\ndata: <html>oops</html>\n\n";
        let (config, _server) = serve_once("200 OK", "text/event-stream", body).await;

        assert_eq!(run(&config, None).await, UNKNOWN_ENTITY);
    }

    #[tokio::test]
    async fn test_blank_completion_yields_unknown() {
        let (config, _server) = serve_once(
            "200 OK",
            "text/event-stream",
            "data: {\"token\": \"   \"}\n\ndata: [DONE]\n\n",
        )
        .await;

        assert_eq!(run(&config, None).await, UNKNOWN_ENTITY);
    }

    #[tokio::test]
    async fn test_unreachable_service_yields_unknown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let config = RemoteConfig {
            endpoint: format!("http://{addr}/chat"),
            connect_timeout_seconds: 2,
            request_timeout_seconds: 2,
            ..RemoteConfig::default()
        };

        assert_eq!(run(&config, None).await, UNKNOWN_ENTITY);
    }

    #[tokio::test]
    async fn test_slow_service_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_request_body(&mut socket).await;
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });
        let config = RemoteConfig {
            endpoint: format!("http://{addr}/chat"),
            request_timeout_seconds: 1,
            ..RemoteConfig::default()
        };

        assert_eq!(run(&config, None).await, UNKNOWN_ENTITY);
    }
}
