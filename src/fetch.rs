use std::error::Error as _;
use std::io;

use tracing::{debug, warn};

use crate::error::{FailureReason, ParseError};
use crate::model::{FetchOutcome, QueueEntry};
use crate::parse::parse_page;
use crate::session::Session;

/// Harvests one queue entry. Never fails: every problem is folded into the outcome.
#[allow(async_fn_in_trait)]
pub trait PageFetcher {
    async fn fetch(&self, entry: &QueueEntry) -> FetchOutcome;
}

impl PageFetcher for Session {
    async fn fetch(&self, entry: &QueueEntry) -> FetchOutcome {
        let url = self.page_url(&entry.url);
        match self.get_page(&url).await {
            Ok(page) => classify_response(entry, page.status, page.body),
            Err(err) => classify_error(entry, &err),
        }
    }
}

/// Map a completed response to an outcome, parsing and encoding on 200.
pub fn classify_response(entry: &QueueEntry, status: u16, body: Option<String>) -> FetchOutcome {
    match status {
        404 | 410 => {
            warn!("URL deprecated: {} - status code: {}", entry.url, status);
            FetchOutcome::Deprecated {
                movie_id: entry.movie_id.clone(),
                url: entry.url.clone(),
            }
        }
        200 => {
            let parsed = body
                .as_deref()
                .map(parse_page)
                .unwrap_or(Err(ParseError::MalformedDocument("empty body".into())));
            match parsed {
                Ok(page) => FetchOutcome::Success(page.into_record(entry)),
                Err(err) => {
                    debug!("Failed to parse {}: {}", entry.url, err);
                    transient(entry, err.into())
                }
            }
        }
        other => {
            warn!("Failed to fetch {} - status code: {}", entry.url, other);
            transient(entry, FailureReason::BadStatus(other))
        }
    }
}

/// Map a transport error. Timeouts stay local to the item. A dropped
/// connection means the session itself is compromised.
pub fn classify_error(entry: &QueueEntry, err: &reqwest::Error) -> FetchOutcome {
    if err.is_timeout() {
        warn!("Failed to fetch {} - timed out", entry.url);
        return transient(entry, FailureReason::Timeout);
    }
    if is_connection_fault(err) {
        warn!("Connection terminated by remote for {}: {}", entry.url, err);
        return FetchOutcome::FatalConnectionFault {
            reason: format!("{}: {}", entry.url, describe(err)),
        };
    }
    warn!("Failed to fetch {} - {}", entry.url, err);
    transient(entry, FailureReason::Network(describe(err)))
}

fn transient(entry: &QueueEntry, reason: FailureReason) -> FetchOutcome {
    FetchOutcome::TransientFailure {
        movie_id: entry.movie_id.clone(),
        url: entry.url.clone(),
        reason,
    }
}

pub fn is_connection_fault(err: &reqwest::Error) -> bool {
    if err.is_connect() {
        return true;
    }
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            if matches!(
                io_err.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionRefused
            ) {
                return true;
            }
        }
        source = cause.source();
    }
    false
}

/// The error message with its causes, innermost last.
fn describe(err: &reqwest::Error) -> String {
    let mut msg = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        msg.push_str(": ");
        msg.push_str(&cause.to_string());
        source = cause.source();
    }
    msg
}
