//! HTTP health probe run before early connection attempts.

use std::time::Duration;

use tracing::{debug, warn};

/// Probes the backend's health endpoints over plain HTTP. Returns true
/// on the first 2xx response; tries each path in order otherwise.
pub(crate) async fn probe(
    client: &reqwest::Client,
    origin: &str,
    paths: &[String],
    timeout: Duration,
) -> bool {
    for path in paths {
        let url = format!("{origin}{path}");
        match client.get(&url).timeout(timeout).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(url = %url, "health probe ok");
                return true;
            }
            Ok(response) => {
                warn!(url = %url, status = %response.status(), "health probe rejected");
            }
            Err(e) => {
                warn!(url = %url, error = %e, "health probe unreachable");
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Minimal one-shot HTTP server. The responder maps the request line
    /// to a status line and body.
    async fn spawn_stub(responder: fn(&str) -> (&'static str, &'static str)) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    let n = socket.read(&mut buf).await.unwrap_or(0);
                    let request = String::from_utf8_lossy(&buf[..n]).to_string();
                    let (status, body) = responder(&request);
                    let response = format!(
                        "HTTP/1.1 {status}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                });
            }
        });
        format!("http://{addr}")
    }

    fn paths() -> Vec<String> {
        vec!["/chat/health".to_string(), "/status".to_string()]
    }

    #[tokio::test]
    async fn probe_accepts_first_healthy_path() {
        let origin = spawn_stub(|_| ("200 OK", "ok")).await;
        let client = reqwest::Client::new();
        assert!(probe(&client, &origin, &paths(), Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn probe_falls_back_to_second_path() {
        let origin = spawn_stub(|request| {
            if request.starts_with("GET /chat/health") {
                ("404 Not Found", "nope")
            } else {
                ("200 OK", "ok")
            }
        })
        .await;
        let client = reqwest::Client::new();
        assert!(probe(&client, &origin, &paths(), Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn probe_fails_when_all_paths_reject() {
        let origin = spawn_stub(|_| ("503 Service Unavailable", "down")).await;
        let client = reqwest::Client::new();
        assert!(!probe(&client, &origin, &paths(), Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn probe_fails_when_nothing_listens() {
        // Bind then drop to land on a port with no listener.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let origin = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let client = reqwest::Client::new();
        assert!(!probe(&client, &origin, &paths(), Duration::from_millis(500)).await);
    }
}
