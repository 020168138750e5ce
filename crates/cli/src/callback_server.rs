use adsight_connect::{CallbackPage, CodeExchange, ConnectResult};
use anyhow::{Context, Result};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

pub const CALLBACK_PATH: &str = "/callback";

/// Loopback listener the provider redirects to. Serves exactly one
/// authorization callback.
pub struct CallbackServer {
    listener: TcpListener,
    port: u16,
}

impl CallbackServer {
    /// Binds 127.0.0.1; port 0 picks a free one.
    pub async fn bind(port: u16) -> Result<Self> {
        let addr = format!("127.0.0.1:{port}");
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind callback listener on {addr}"))?;
        let port = listener.local_addr()?.port();
        Ok(Self { listener, port })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn origin(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn callback_url(&self) -> String {
        format!("{}{CALLBACK_PATH}", self.origin())
    }

    pub async fn serve_once<X>(&self, page: &CallbackPage<'_, X>) -> Result<ConnectResult<Value>>
    where
        X: CodeExchange + ?Sized,
    {
        info!("Waiting for OAuth callback on {}", self.callback_url());

        loop {
            let (mut stream, peer) = self.listener.accept().await?;
            debug!("Callback connection from {peer}");

            let mut buffer = vec![0; 4096];
            let n = stream.read(&mut buffer).await?;
            let request = String::from_utf8_lossy(&buffer[..n]);

            let Some((path, query)) = request_target(&request) else {
                respond(&mut stream, "400 Bad Request", "Bad request", "Malformed request.").await;
                continue;
            };
            if path != CALLBACK_PATH {
                debug!(path, "Ignoring request outside the callback path");
                respond(&mut stream, "404 Not Found", "Not found", "Nothing here.").await;
                continue;
            }

            let result = page.complete(query).await;
            match &result {
                Ok(_) => {
                    respond(
                        &mut stream,
                        "200 OK",
                        "Google Ads connected",
                        "Connection complete. You can close this window and return to the terminal.",
                    )
                    .await
                }
                Err(e) => respond(&mut stream, "200 OK", "Connection failed", &e.to_string()).await,
            }
            return Ok(result);
        }
    }
}

/// Splits the request line target into path and query.
fn request_target(request: &str) -> Option<(&str, &str)> {
    let line = request.lines().next()?;
    let mut parts = line.split_whitespace();
    let method = parts.next()?;
    let target = parts.next()?;
    if method != "GET" {
        return None;
    }
    Some(target.split_once('?').unwrap_or((target, "")))
}

async fn respond(stream: &mut TcpStream, status: &str, title: &str, message: &str) {
    let body = format!(
        "<!doctype html><html><head><title>{title}</title></head>\
         <body style=\"font-family: sans-serif; text-align: center; padding-top: 4em\">\
         <h2>{title}</h2><p>{}</p></body></html>",
        escape_html(message)
    );
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    if let Err(e) = stream.write_all(response.as_bytes()).await {
        warn!("Failed to write callback response: {e}");
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use adsight_api::ConnectionReport;
    use adsight_connect::{CallbackParams, OAuthState, PendingAuthorization};
    use async_trait::async_trait;
    use serde_json::json;

    struct Backend;

    #[async_trait]
    impl CodeExchange for Backend {
        async fn exchange_code(&self, params: &CallbackParams) -> ConnectResult<Value> {
            Ok(json!({ "code": params.code }))
        }

        async fn confirm_connection(&self) -> ConnectResult<ConnectionReport> {
            Ok(ConnectionReport {
                connected: true,
                message: None,
            })
        }
    }

    async fn get(port: u16, target: &str) -> String {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let request = format!("GET {target} HTTP/1.1\r\nHost: 127.0.0.1\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[test]
    fn request_target_splits_query() {
        assert_eq!(
            request_target("GET /callback?code=a&state=b HTTP/1.1\r\nHost: x\r\n"),
            Some(("/callback", "code=a&state=b"))
        );
        assert_eq!(request_target("GET /favicon.ico HTTP/1.1"), Some(("/favicon.ico", "")));
        assert_eq!(request_target("POST /callback HTTP/1.1"), None);
        assert_eq!(request_target(""), None);
    }

    #[tokio::test]
    async fn serves_one_callback_and_skips_stray_requests() {
        let server = CallbackServer::bind(0).await.unwrap();
        let port = server.port();
        let pending = PendingAuthorization::new();
        pending.store(OAuthState::new("abc123"));

        let client = tokio::spawn(async move {
            let stray = get(port, "/favicon.ico").await;
            let done = get(port, "/callback?code=c0de&state=abc123").await;
            (stray, done)
        });

        let page = CallbackPage::new(&Backend, pending.clone());
        let result = server.serve_once(&page).await.unwrap();
        let (stray, done) = client.await.unwrap();

        assert_eq!(result.unwrap()["exchange"]["code"], "c0de");
        assert!(stray.starts_with("HTTP/1.1 404"));
        assert!(done.contains("Google Ads connected"));
        assert!(!pending.is_pending());
    }
}
