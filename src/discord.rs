use std::time::Duration;

use reqwest::Client;

/// Posts plain text messages to a Discord channel webhook.
pub struct DiscordWebhook {
    client: Client,
    url: String,
}

impl DiscordWebhook {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url: url.to_string() })
    }

    /// Send `message` as the content of a new post. Non-2xx answers are errors.
    pub async fn send(&self, message: &str) -> anyhow::Result<()> {
        let payload = serde_json::json!({
            "content": message,
        });

        self.client
            .post(&self.url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// A one-route HTTP server which answers every request with a fixed status
/// and hands the request bodies to the test.
#[cfg(test)]
pub(crate) mod test_server {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

    pub(crate) async fn spawn(status: &'static str) -> (String, UnboundedReceiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/api/webhooks/1/token", listener.local_addr().unwrap());
        let (tx, rx) = unbounded_channel();
        tokio::spawn(async move {
            loop {
                let (stream, _) = listener.accept().await.unwrap();
                let tx = tx.clone();
                tokio::spawn(async move {
                    let _ = handle(stream, status, tx).await;
                });
            }
        });
        (url, rx)
    }

    async fn handle(
        mut stream: TcpStream,
        status: &str,
        tx: UnboundedSender<String>,
    ) -> std::io::Result<()> {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        let header_end = loop {
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                return Ok(());
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let headers = String::from_utf8_lossy(&buf[..header_end]).to_lowercase();
        let content_length = headers
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|value| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        while buf.len() < header_end + content_length {
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }

        let _ = tx.send(String::from_utf8_lossy(&buf[header_end..]).to_string());
        let response = format!("HTTP/1.1 {status}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
        stream.write_all(response.as_bytes()).await?;
        stream.shutdown().await
    }
}

#[tokio::test]
async fn test_send_posts_content() {
    let (url, mut bodies) = test_server::spawn("204 No Content").await;
    let webhook = DiscordWebhook::new(&url, DiscordWebhook::DEFAULT_TIMEOUT).unwrap();

    webhook.send("⚠️ Battery below 50%! (Current: 45%)").await.unwrap();

    let body: serde_json::Value = serde_json::from_str(&bodies.recv().await.unwrap()).unwrap();
    assert_eq!(body, serde_json::json!({ "content": "⚠️ Battery below 50%! (Current: 45%)" }));
}

#[tokio::test]
async fn test_send_fails_on_error_status() {
    let (url, _bodies) = test_server::spawn("500 Internal Server Error").await;
    let webhook = DiscordWebhook::new(&url, DiscordWebhook::DEFAULT_TIMEOUT).unwrap();

    assert!(webhook.send("hello").await.is_err());
}

#[tokio::test]
async fn test_send_fails_when_unreachable() {
    // Bind then drop to get a port nothing listens on
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/", listener.local_addr().unwrap());
    drop(listener);
    let webhook = DiscordWebhook::new(&url, Duration::from_secs(2)).unwrap();

    assert!(webhook.send("hello").await.is_err());
}
