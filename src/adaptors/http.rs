//! Minimal hand-rolled HTTP/1.1 client used to fetch or post small
//! payloads without pulling in a full HTTP stack: DNS resolution via
//! `tokio::net::lookup_host`, a raw `TcpStream`, and a three-state
//! (status line → headers → body) response parser.

use std::collections::HashMap;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::HttpAdaptorError;

const DEFAULT_PORT: u16 = 80;
const DEFAULT_TIMEOUT_MS: u64 = 1000;

/// Outcome handed to the caller's callback: either a response with a
/// numeric status and (for 200s) headers and body, or a failure
/// reported through the synthetic codes in [`HttpAdaptorError`].
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub code: u16,
    pub headers: Option<HashMap<String, String>>,
    pub body: Option<Vec<u8>>,
}

impl HttpResponse {
    fn from_error(err: HttpAdaptorError) -> HttpResponse {
        HttpResponse {
            code: err.code(),
            headers: None,
            body: None,
        }
    }
}

/// Optional per-request parameters, all defaulted per the adaptor's
/// surface: `port = 80`, `timeout_ms = 1000`.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub port: Option<u16>,
    pub timeout_ms: Option<u64>,
    pub headers: Option<HashMap<String, String>>,
}

impl RequestOptions {
    fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS))
    }
}

/// `GET path` against `host`, invoking `callback(task, response)` on
/// completion.
pub async fn get_request<F>(task: String, host: &str, path: &str, options: RequestOptions, callback: F)
where
    F: FnOnce(String, HttpResponse),
{
    let response = request("GET", host, path, None, &options).await;
    callback(task, response);
}

/// `POST path` with `body` against `host`, invoking
/// `callback(task, response)` on completion.
pub async fn post_request<F>(task: String, host: &str, path: &str, body: &[u8], options: RequestOptions, callback: F)
where
    F: FnOnce(String, HttpResponse),
{
    let response = request("POST", host, path, Some(body), &options).await;
    callback(task, response);
}

async fn request(method: &str, host: &str, path: &str, body: Option<&[u8]>, options: &RequestOptions) -> HttpResponse {
    match do_request(method, host, path, body, options).await {
        Ok(response) => response,
        Err(err) => HttpResponse::from_error(err),
    }
}

async fn do_request(
    method: &str,
    host: &str,
    path: &str,
    body: Option<&[u8]>,
    options: &RequestOptions,
) -> Result<HttpResponse, HttpAdaptorError> {
    let deadline = options.timeout();
    let authority = format!("{}:{}", host, options.port());

    let addr = timeout(deadline, tokio::net::lookup_host(&authority))
        .await
        .map_err(|_| HttpAdaptorError::Transport)?
        .map_err(|_| HttpAdaptorError::Protocol)?
        .next()
        .ok_or(HttpAdaptorError::Protocol)?;

    let mut stream = timeout(deadline, TcpStream::connect(addr))
        .await
        .map_err(|_| HttpAdaptorError::Transport)?
        .map_err(|_| HttpAdaptorError::Protocol)?;

    let request_bytes = build_request(method, host, path, body, options.headers.as_ref());
    timeout(deadline, stream.write_all(&request_bytes))
        .await
        .map_err(|_| HttpAdaptorError::Transport)?
        .map_err(|_| HttpAdaptorError::Protocol)?;

    timeout(deadline, read_response(stream))
        .await
        .map_err(|_| HttpAdaptorError::Transport)?
}

fn build_request(method: &str, host: &str, path: &str, body: Option<&[u8]>, headers: Option<&HashMap<String, String>>) -> Vec<u8> {
    let mut out = format!("{method} {path} HTTP/1.1\r\nHost: {host}\r\nConnection: close\r\n");
    if let Some(headers) = headers {
        for (k, v) in headers {
            out.push_str(&format!("{k}: {v}\r\n"));
        }
    }
    if let Some(body) = body {
        out.push_str(&format!("Content-Length: {}\r\n\r\n", body.len()));
        let mut bytes = out.into_bytes();
        bytes.extend_from_slice(body);
        return bytes;
    }
    out.push_str("\r\n");
    out.into_bytes()
}

/// Status line → headers → body, in that order. A 200 missing
/// `Content-Length` is a protocol failure; any other status is
/// reported by code with no body read.
async fn read_response(stream: TcpStream) -> Result<HttpResponse, HttpAdaptorError> {
    let mut reader = BufReader::new(stream);

    let mut status_line = String::new();
    reader
        .read_line(&mut status_line)
        .await
        .map_err(|_| HttpAdaptorError::Transport)?;
    let code = parse_status_code(&status_line).ok_or(HttpAdaptorError::Protocol)?;

    let mut headers = HashMap::new();
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).await.map_err(|_| HttpAdaptorError::Transport)?;
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }

    if code != 200 {
        return Ok(HttpResponse {
            code,
            headers: None,
            body: None,
        });
    }

    let content_length: usize = headers
        .get("content-length")
        .and_then(|v| v.parse().ok())
        .ok_or(HttpAdaptorError::Protocol)?;

    let mut body = vec![0u8; content_length];
    tokio::io::AsyncReadExt::read_exact(&mut reader, &mut body)
        .await
        .map_err(|_| HttpAdaptorError::Transport)?;

    Ok(HttpResponse {
        code,
        headers: Some(headers),
        body: Some(body),
    })
}

fn parse_status_code(status_line: &str) -> Option<u16> {
    status_line.split_whitespace().nth(1)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_status_code() {
        assert_eq!(parse_status_code("HTTP/1.1 200 OK\r\n"), Some(200));
        assert_eq!(parse_status_code("HTTP/1.1 404 Not Found\r\n"), Some(404));
        assert_eq!(parse_status_code("garbage"), None);
    }

    #[test]
    fn builds_get_request_with_content_length_only_when_body_present() {
        let get = build_request("GET", "example.com", "/", None, None);
        let text = String::from_utf8(get).unwrap();
        assert!(text.starts_with("GET / HTTP/1.1\r\n"));
        assert!(!text.contains("Content-Length"));

        let post = build_request("POST", "example.com", "/", Some(b"hi"), None);
        let text = String::from_utf8(post).unwrap();
        assert!(text.contains("Content-Length: 2\r\n"));
        assert!(text.ends_with("hi"));
    }

    #[tokio::test]
    async fn dns_failure_reports_synthetic_450() {
        let options = RequestOptions {
            timeout_ms: Some(500),
            ..Default::default()
        };
        let (tx, rx) = tokio::sync::oneshot::channel();
        get_request("task-1".to_string(), "nosuchhost.invalid", "/", options, move |task, response| {
            let _ = tx.send((task, response));
        })
        .await;
        let (task, response) = rx.await.unwrap();
        assert_eq!(task, "task-1");
        assert_eq!(response.code, 450);
        assert!(response.headers.is_none());
        assert!(response.body.is_none());
    }
}
