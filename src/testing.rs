//! Test doubles: a loopback HTTP server and a scripted page fetcher.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use crate::fetch::PageFetcher;
use crate::model::{CatalogRecord, ContentType, FetchOutcome, QueueEntry};

#[derive(Debug, Clone)]
pub enum Reply {
    Status(u16, String),
    /// Read the request, then never answer.
    Stall,
    /// Read the request, then reset the connection.
    Reset,
}

impl Reply {
    pub fn html(body: &str) -> Self {
        Reply::Status(200, body.to_string())
    }

    pub fn status(code: u16) -> Self {
        Reply::Status(code, String::new())
    }
}

/// Serve every connection on 127.0.0.1 with `handler(raw_request)`.
/// Returns the base URL.
pub async fn spawn_server<F>(handler: F) -> String
where
    F: Fn(&str) -> Reply + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handler = Arc::new(handler);

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                let mut buf = vec![0u8; 16 * 1024];
                let mut len = 0;
                loop {
                    let n = stream.read(&mut buf[len..]).await.unwrap_or(0);
                    if n == 0 {
                        return;
                    }
                    len += n;
                    if buf[..len].windows(4).any(|w| w == b"\r\n\r\n") || len == buf.len() {
                        break;
                    }
                }
                let request = String::from_utf8_lossy(&buf[..len]).to_string();

                match handler(&request) {
                    Reply::Status(code, body) => {
                        let response = format!(
                            "HTTP/1.1 {code} X\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                            body.len()
                        );
                        let _ = stream.write_all(response.as_bytes()).await;
                        let _ = stream.shutdown().await;
                    }
                    Reply::Stall => {
                        tokio::time::sleep(Duration::from_secs(30)).await;
                    }
                    Reply::Reset => {
                        #[allow(deprecated)]
                        let _ = stream.set_linger(Some(Duration::ZERO));
                        drop(stream);
                    }
                }
            });
        }
    });

    format!("http://{addr}")
}

/// Request path of a raw HTTP request.
pub fn request_path(request: &str) -> &str {
    request.split_whitespace().nth(1).unwrap_or("/")
}

pub fn record_for(entry: &QueueEntry) -> CatalogRecord {
    CatalogRecord {
        movie_id: entry.movie_id.clone(),
        url: entry.url.clone(),
        title: format!("Film {}", entry.movie_id),
        content_type: ContentType::Movie,
        release_year: 2001,
        runtime_minutes: 101,
        rating: 3.9,
        rating_count: 1000,
        genre_bitmask: 0b100,
        country_code: 3,
        poster_url: format!("https://a.ltrbxd.com/{}.jpg", entry.movie_id),
    }
}

/// Returns canned outcomes by URL; unscripted URLs succeed.
#[derive(Default)]
pub struct ScriptedFetcher {
    script: HashMap<String, FetchOutcome>,
    pub calls: RefCell<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deprecated(mut self, entry: &QueueEntry) -> Self {
        self.script.insert(
            entry.url.clone(),
            FetchOutcome::Deprecated {
                movie_id: entry.movie_id.clone(),
                url: entry.url.clone(),
            },
        );
        self
    }

    pub fn failing(mut self, entry: &QueueEntry) -> Self {
        self.script.insert(
            entry.url.clone(),
            FetchOutcome::TransientFailure {
                movie_id: entry.movie_id.clone(),
                url: entry.url.clone(),
                reason: crate::error::FailureReason::MissingField("runtime"),
            },
        );
        self
    }

    pub fn fatal(mut self, url: &str) -> Self {
        self.script.insert(
            url.to_string(),
            FetchOutcome::FatalConnectionFault {
                reason: "connection reset by peer".into(),
            },
        );
        self
    }

    pub fn called(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl PageFetcher for ScriptedFetcher {
    async fn fetch(&self, entry: &QueueEntry) -> FetchOutcome {
        self.calls.borrow_mut().push(entry.url.clone());
        tokio::task::yield_now().await;
        self.script
            .get(&entry.url)
            .cloned()
            .unwrap_or_else(|| FetchOutcome::Success(record_for(entry)))
    }
}

impl PageFetcher for &ScriptedFetcher {
    async fn fetch(&self, entry: &QueueEntry) -> FetchOutcome {
        (**self).fetch(entry).await
    }
}
