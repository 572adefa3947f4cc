//! HTTP byte-range transport with retry.

use std::fmt;
use std::io::Read;
use std::time::Duration;

use silo_types::{Result, SiloError};

/// Backoff settings for transient HTTP errors.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub retry_max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 200,
            retry_max_delay_ms: 5_000,
        }
    }
}

/// Serves byte ranges of a remote resource. Bounds are inclusive.
pub trait RangeFetcher: Send + Sync {
    fn content_length(&self, url: &str) -> Result<u64>;
    fn fetch_range(&self, url: &str, from: u64, to: u64) -> Result<Vec<u8>>;
}

/// Unified error for a request plus body read, so transient body I/O
/// errors retry on the same loop as HTTP-level ones.
enum FetchError {
    Http(Box<ureq::Error>),
    BodyIo(std::io::Error),
    /// Application error, never retried.
    Permanent(String),
}

impl FetchError {
    fn http(e: ureq::Error) -> Self {
        FetchError::Http(Box::new(e))
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Http(e) => write!(f, "{e}"),
            FetchError::BodyIo(e) => write!(f, "body read error: {e}"),
            FetchError::Permanent(msg) => write!(f, "{msg}"),
        }
    }
}

/// Whether an HTTP error is transient and worth retrying.
fn is_retryable_http(err: &ureq::Error) -> bool {
    match err {
        ureq::Error::Transport(_) => true,
        ureq::Error::Status(code, _) => *code == 429 || *code >= 500,
    }
}

fn is_retryable_io(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::TimedOut
            | std::io::ErrorKind::Interrupted
    )
}

fn is_retryable(err: &FetchError) -> bool {
    match err {
        FetchError::Http(e) => is_retryable_http(e.as_ref()),
        FetchError::BodyIo(e) => is_retryable_io(e),
        FetchError::Permanent(_) => false,
    }
}

/// Retry a closure on transient errors with exponential backoff + jitter.
fn retry_fetch<T>(
    config: &RetryConfig,
    op_name: &str,
    f: impl Fn() -> std::result::Result<T, FetchError>,
) -> std::result::Result<T, FetchError> {
    let mut delay_ms = config.retry_delay_ms;
    let mut last_err = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let jitter = rand::random::<u64>() % delay_ms.max(1);
            std::thread::sleep(Duration::from_millis(delay_ms + jitter));
            delay_ms = (delay_ms * 2).min(config.retry_max_delay_ms);
        }
        match f() {
            Ok(val) => return Ok(val),
            Err(e) if is_retryable(&e) && attempt < config.max_retries => {
                tracing::warn!(
                    "{op_name}: transient error (attempt {}/{}), retrying: {e}",
                    attempt + 1,
                    config.max_retries,
                );
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.expect("at least one attempt was made"))
}

/// Range fetcher over a plain HTTP server supporting partial content.
pub struct HttpRangeFetcher {
    agent: ureq::Agent,
    retry: RetryConfig,
}

impl HttpRangeFetcher {
    pub fn new(retry: RetryConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(30))
            .timeout_read(Duration::from_secs(300))
            .build();
        Self { agent, retry }
    }

    /// Content length from the `Content-Range` total of a one-byte range
    /// request, for servers that reject HEAD.
    fn length_via_get(&self, url: &str) -> Result<u64> {
        let resp = retry_fetch(&self.retry, &format!("GET(0-0) {url}"), || {
            self.agent
                .get(url)
                .set("Range", "bytes=0-0")
                .call()
                .map_err(FetchError::http)
        })
        .map_err(|e| SiloError::Http(format!("GET(0-0) {url}: {e}")))?;
        let header = resp.header("Content-Range").unwrap_or_default().to_string();
        let total = header
            .rsplit_once('/')
            .and_then(|(_, total)| total.parse::<u64>().ok())
            .ok_or_else(|| {
                SiloError::Http(format!(
                    "GET(0-0) {url}: missing or malformed Content-Range total: '{header}'"
                ))
            })?;
        Ok(total)
    }
}

impl Default for HttpRangeFetcher {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

impl RangeFetcher for HttpRangeFetcher {
    fn content_length(&self, url: &str) -> Result<u64> {
        let result = retry_fetch(&self.retry, &format!("HEAD {url}"), || {
            self.agent.head(url).call().map_err(FetchError::http)
        });
        match result {
            Ok(resp) => resp
                .header("Content-Length")
                .and_then(|v| v.parse().ok())
                .ok_or_else(|| {
                    SiloError::Http(format!("HEAD {url}: missing Content-Length header"))
                }),
            // Some servers refuse HEAD outright.
            Err(FetchError::Http(e))
                if matches!(e.as_ref(), ureq::Error::Status(405 | 501, _)) =>
            {
                self.length_via_get(url)
            }
            Err(e) => Err(SiloError::Http(format!("HEAD {url}: {e}"))),
        }
    }

    fn fetch_range(&self, url: &str, from: u64, to: u64) -> Result<Vec<u8>> {
        if to < from {
            return Err(SiloError::Http(format!(
                "GET_RANGE {url}: empty range {from}-{to}"
            )));
        }
        let expected_len = to - from + 1;
        let range_header = format!("bytes={from}-{to}");
        retry_fetch(&self.retry, &format!("GET_RANGE {url}"), || {
            let resp = self
                .agent
                .get(url)
                .set("Range", &range_header)
                .call()
                .map_err(FetchError::http)?;
            if resp.status() != 206 {
                return Err(FetchError::Permanent(format!(
                    "expected 206 Partial Content, got HTTP {}",
                    resp.status()
                )));
            }
            let content_range = resp.header("Content-Range").unwrap_or_default().to_string();
            validate_content_range(&content_range, from, expected_len)
                .map_err(FetchError::Permanent)?;
            let mut buf = Vec::with_capacity(expected_len as usize);
            resp.into_reader()
                .read_to_end(&mut buf)
                .map_err(FetchError::BodyIo)?;
            if buf.len() as u64 != expected_len {
                return Err(FetchError::Permanent(format!(
                    "short range body: got {} bytes, expected {expected_len}",
                    buf.len()
                )));
            }
            Ok(buf)
        })
        .map_err(|e| SiloError::Http(format!("GET_RANGE {url} [{from}-{to}]: {e}")))
    }
}

/// Validate a `Content-Range: bytes {start}-{end}/{total}` header against
/// the requested offset and length.
fn validate_content_range(
    header: &str,
    expected_offset: u64,
    expected_length: u64,
) -> std::result::Result<(), String> {
    let rest = header
        .strip_prefix("bytes ")
        .ok_or_else(|| format!("malformed Content-Range header: '{header}'"))?;
    let (range_part, _total) = rest
        .split_once('/')
        .ok_or_else(|| format!("malformed Content-Range header: '{header}'"))?;
    let (start_str, end_str) = range_part
        .split_once('-')
        .ok_or_else(|| format!("malformed Content-Range header: '{header}'"))?;
    let start: u64 = start_str
        .parse()
        .map_err(|_| format!("malformed Content-Range start: '{header}'"))?;
    let end: u64 = end_str
        .parse()
        .map_err(|_| format!("malformed Content-Range end: '{header}'"))?;
    let range_len = end
        .checked_sub(start)
        .and_then(|d| d.checked_add(1))
        .ok_or_else(|| format!("Content-Range end < start: '{header}'"))?;
    if start != expected_offset || range_len != expected_length {
        return Err(format!(
            "Content-Range mismatch: got '{header}', expected bytes \
             {expected_offset}-{}",
            expected_offset + expected_length - 1
        ));
    }
    Ok(())
}
