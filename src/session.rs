use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::config::HarvestConfig;
use crate::error::HarvestError;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";
const BROWSER_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";

/// Status and, for 200 responses, the body of one page request.
#[derive(Debug)]
pub struct PageResponse {
    pub status: u16,
    pub body: Option<String>,
}

/// One HTTP client context, shared read-only by the batches of a session window.
pub struct Session {
    id: usize,
    client: reqwest::Client,
    base_url: String,
    total: Semaphore,
    per_host: Mutex<HashMap<String, Arc<Semaphore>>>,
    per_host_limit: usize,
}

impl Session {
    pub fn open(id: usize, config: &HarvestConfig) -> Result<Self, HarvestError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        headers.insert(ACCEPT, HeaderValue::from_static(BROWSER_ACCEPT));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
        headers.insert("DNT", HeaderValue::from_static("1"));
        headers.insert("Upgrade-Insecure-Requests", HeaderValue::from_static("1"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(config.max_connections_per_host)
            .build()?;

        info!(
            "Session {} opened (max {} connections, {} per host)",
            id, config.max_connections, config.max_connections_per_host
        );

        Ok(Self {
            id,
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            total: Semaphore::new(config.max_connections.max(1)),
            per_host: Mutex::new(HashMap::new()),
            per_host_limit: config.max_connections_per_host.max(1),
        })
    }

    /// Absolute URL for a queue path such as `/film/parasite-2019/`.
    pub fn page_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        }
    }

    /// GET `url` while holding both a session-wide and a per-host connection slot.
    pub async fn get_page(&self, url: &str) -> Result<PageResponse, reqwest::Error> {
        let host_slots = self.host_slots(url);
        // Neither semaphore is ever closed, so acquire cannot fail.
        let _total = self.total.acquire().await.ok();
        let _host = host_slots.acquire().await.ok();

        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let body = if status == 200 {
            Some(response.text().await?)
        } else {
            None
        };
        Ok(PageResponse { status, body })
    }

    fn host_slots(&self, url: &str) -> Arc<Semaphore> {
        let host = reqwest::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default();
        let mut map = self.per_host.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            map.entry(host)
                .or_insert_with(|| Arc::new(Semaphore::new(self.per_host_limit))),
        )
    }

    pub fn close(self) {
        debug!("Session {} closing", self.id);
        drop(self.client);
        info!("Session {} closed", self.id);
    }
}

/// Opens the HTTP session for each window.
pub trait SessionFactory {
    type Session;

    fn open(&self, session_num: usize) -> Result<Self::Session, HarvestError>;
    fn close(&self, session: Self::Session);
}

pub struct HttpSessionFactory {
    config: HarvestConfig,
}

impl HttpSessionFactory {
    pub fn new(config: HarvestConfig) -> Self {
        Self { config }
    }
}

impl SessionFactory for HttpSessionFactory {
    type Session = Session;

    fn open(&self, session_num: usize) -> Result<Session, HarvestError> {
        Session::open(session_num, &self.config)
    }

    fn close(&self, session: Session) {
        session.close();
    }
}
