//! JSON-over-HTTP client for wiki APIs, with redacted logging and
//! caller-controlled retries.
//!
//! - Request options: headers, query params, timeout, retries
//! - Sensitive query params and headers never reach the logs
//! - 429, 5xx and MediaWiki `maxlag` replies are retried with exponential
//!   backoff (honouring `Retry-After`), but only when the caller asks for it:
//!   the default budget is zero
//! - Optional *raw* request/response logging via `CONCORD_HTTP_RAW=1`
//!
//! Example (no_run):
//! ```rust
//! # async fn demo() -> Result<(), concord_http::HttpError> {
//! let client = concord_http::HttpClient::new("https://en.wikipedia.org/w/api.php")?;
//! let got: serde_json::Value = client
//!     .get_json("", concord_http::RequestOpts::default())
//!     .await?;
//! # Ok(()) }
//! ```
//!
//! Observability: every attempt emits `http.request.start` and
//! `http.response.headers`; retries, decode failures and final errors are
//! logged at `warn`. Raw lines use target `http.raw`.

use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER, USER_AGENT};
use reqwest::{Client, Method, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::borrow::Cow;
use std::env;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::sleep;

const RAW_ENV: &str = "CONCORD_HTTP_RAW";
const RAW_MAX_BODY: usize = 64 * 1024;
const SNIPPET_MAX: usize = 500;
const REDACTED: &str = "<redacted>";
const MAXLAG_CODE: &str = "maxlag";
const RATE_LIMIT_FLOOR: Duration = Duration::from_millis(1100);

static REQUEST_SEQ: AtomicU64 = AtomicU64::new(1);

// ==============================
// Errors
// ==============================

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("invalid URL: {0}")]
    Url(String),
    #[error("request build failed: {0}")]
    Build(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("decode error: {0}, body_snippet: {1}")]
    Decode(String, String),
    #[error("server returned error {status}: {message}, request_id={request_id}")]
    Api {
        status: StatusCode,
        message: String,
        request_id: String,
    },
}

// ==============================
// Request Options
// ==============================

/// Per-request tuning knobs for the HTTP client.
///
/// ```
/// use concord_http::RequestOpts;
/// use std::borrow::Cow;
/// use std::time::Duration;
///
/// let opts = RequestOpts {
///     timeout: Some(Duration::from_secs(30)),
///     query: Some(vec![("action", Cow::Borrowed("parse"))]),
///     ..Default::default()
/// };
///
/// assert_eq!(opts.timeout.unwrap().as_secs(), 30);
/// assert!(opts.retries.is_none());
/// ```
#[derive(Clone, Debug, Default)]
pub struct RequestOpts<'a> {
    pub timeout: Option<Duration>,
    pub retries: Option<usize>,
    pub headers: Option<HeaderMap>,
    pub query: Option<Vec<(&'a str, Cow<'a, str>)>>, // e.g. [("page", "Foo".into())]
}

// ==============================
// Client
// ==============================

#[derive(Clone)]
pub struct HttpClient {
    base: Url,
    inner: Client,
    /// Applied when a request carries no timeout of its own. `None` leaves
    /// requests unbounded.
    pub default_timeout: Option<Duration>,
    pub max_retries: usize,
}

/// One completed request/response exchange.
struct Reply {
    req_id: String,
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl Reply {
    fn upstream_request_id(&self) -> &str {
        self.headers
            .get("x-request-id")
            .or_else(|| self.headers.get("x-cache"))
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-")
    }

    /// MediaWiki reports replication lag as a 200 carrying an error envelope.
    fn is_maxlag(&self) -> bool {
        self.status.is_success()
            && mediawiki_error(&self.body).is_some_and(|e| e.code == MAXLAG_CODE)
    }

    /// Delay before the given (1-based) retry, or `None` when the reply is
    /// not retryable at all.
    fn retry_delay(&self, retry: usize) -> Option<Duration> {
        let rate_limited = self.status == StatusCode::TOO_MANY_REQUESTS;
        if !(rate_limited || self.status.is_server_error() || self.is_maxlag()) {
            return None;
        }
        if let Some(secs) = retry_after_secs(&self.headers) {
            return Some(Duration::from_secs(secs));
        }
        let delay = backoff(retry);
        Some(if rate_limited {
            delay.max(RATE_LIMIT_FLOOR)
        } else {
            delay
        })
    }

    fn decode<T: DeserializeOwned>(&self) -> Result<T, HttpError> {
        serde_json::from_slice::<T>(&self.body).map_err(|e| {
            let snippet = snip_body(&self.body);
            tracing::warn!(
                req_id=%self.req_id,
                serde_line=e.line(),
                serde_col=e.column(),
                serde_err=%e,
                body_snippet=%snippet,
                "http.response.decode_error"
            );
            HttpError::Decode(e.to_string(), snippet)
        })
    }

    fn into_error(self) -> HttpError {
        let message = extract_error_message(&self.body);
        let request_id = self.upstream_request_id().to_string();
        tracing::warn!(
            req_id=%self.req_id,
            status=%self.status,
            message=%message,
            x_request_id=%request_id,
            body_snippet=%snip_body(&self.body),
            "http.error"
        );
        HttpError::Api {
            status: self.status,
            message,
            request_id,
        }
    }
}

impl HttpClient {
    /// Construct a client anchored to a base URL.
    ///
    /// ```no_run
    /// use concord_http::{HttpClient, HttpError};
    /// use std::time::Duration;
    ///
    /// let client = HttpClient::new("https://en.wikipedia.org/w/api.php")?;
    /// assert_eq!(client.default_timeout, None);
    /// assert_eq!(client.max_retries, 0);
    ///
    /// let bounded = client.with_timeout(Duration::from_secs(15));
    /// assert_eq!(bounded.default_timeout, Some(Duration::from_secs(15)));
    /// # Ok::<(), HttpError>(())
    /// ```
    pub fn new(base: &str) -> Result<Self, HttpError> {
        Self::with_user_agent(base, concat!("concord/", env!("CARGO_PKG_VERSION")))
    }

    /// Like [`HttpClient::new`] but sends `user_agent` on every request.
    /// Wikimedia endpoints reject anonymous clients without one.
    pub fn with_user_agent(base: &str, user_agent: &str) -> Result<Self, HttpError> {
        let base = Url::parse(base).map_err(|e| HttpError::Url(e.to_string()))?;
        let mut default_headers = HeaderMap::new();
        let ua = HeaderValue::from_str(user_agent)
            .map_err(|e| HttpError::Build(format!("invalid User-Agent: {e}")))?;
        default_headers.insert(USER_AGENT, ua);

        let inner = Client::builder()
            .default_headers(default_headers)
            .build()
            .map_err(|e| HttpError::Build(e.to_string()))?;
        Ok(Self {
            base,
            inner,
            default_timeout: None,
            max_retries: 0,
        })
    }

    /// Bound every request that does not set its own timeout.
    pub fn with_timeout(mut self, dur: Duration) -> Self {
        self.default_timeout = Some(dur);
        self
    }

    /// Override the default retry budget (zero unless the caller opts in).
    ///
    /// ```no_run
    /// use concord_http::{HttpClient, HttpError};
    ///
    /// let client = HttpClient::new("https://en.wikipedia.org/w/api.php")?.with_retries(3);
    /// assert_eq!(client.max_retries, 3);
    /// # Ok::<(), HttpError>(())
    /// ```
    pub fn with_retries(mut self, n: usize) -> Self {
        self.max_retries = n;
        self
    }

    /// Base URL every request path is resolved against.
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// GET JSON with per-request options (headers/query/timeout/retries).
    ///
    /// An empty `path` targets the base URL itself. A `maxlag` reply that
    /// outlives the retry budget is decoded like any other success, so the
    /// caller sees the error envelope.
    pub async fn get_json<T>(&self, path: &str, opts: RequestOpts<'_>) -> Result<T, HttpError>
    where
        T: DeserializeOwned,
    {
        let url = self
            .base
            .join(path)
            .map_err(|e| HttpError::Url(e.to_string()))?;
        let budget = opts.retries.unwrap_or(self.max_retries);
        let timeout = opts.timeout.or(self.default_timeout);
        let query = opts.query.unwrap_or_default();
        let pairs: Vec<(&str, &str)> = query.iter().map(|(k, v)| (*k, v.as_ref())).collect();

        let mut retries_used = 0usize;
        loop {
            let req_id = format!("r{:x}", REQUEST_SEQ.fetch_add(1, Ordering::Relaxed));
            tracing::debug!(
                req_id=%req_id,
                attempt=retries_used + 1,
                max_retries=budget,
                endpoint=%endpoint_label(&url),
                query=?redact_query(&query),
                timeout_ms=?timeout.map(|t| t.as_millis() as u64),
                "http.request.start"
            );
            if raw_enabled() {
                let mut raw_url = url.clone();
                raw_url.query_pairs_mut().extend_pairs(pairs.iter());
                let curl = make_curl(&raw_url, opts.headers.as_ref());
                tracing::debug!(target: "http.raw", %req_id, %curl, "request");
            }

            let exchanged = self
                .exchange(&req_id, &url, &pairs, timeout, opts.headers.as_ref())
                .await;
            let reply = match exchanged {
                Ok(reply) => reply,
                Err(message) if retries_used < budget => {
                    retries_used += 1;
                    let delay = backoff(retries_used);
                    tracing::warn!(
                        req_id=%req_id,
                        retry=retries_used,
                        max_retries=budget,
                        backoff_ms=delay.as_millis() as u64,
                        message=%message,
                        "http.retrying.network"
                    );
                    sleep(delay).await;
                    continue;
                }
                Err(message) => {
                    tracing::warn!(
                        req_id=%req_id,
                        retries_used,
                        message=%message,
                        "http.network_error"
                    );
                    return Err(HttpError::Network(message));
                }
            };

            if retries_used < budget {
                if let Some(delay) = reply.retry_delay(retries_used + 1) {
                    retries_used += 1;
                    tracing::warn!(
                        req_id=%req_id,
                        status=%reply.status,
                        maxlag=reply.is_maxlag(),
                        retry=retries_used,
                        max_retries=budget,
                        backoff_ms=delay.as_millis() as u64,
                        message=%extract_error_message(&reply.body),
                        "http.retrying"
                    );
                    sleep(delay).await;
                    continue;
                }
            }

            return if reply.status.is_success() {
                reply.decode()
            } else {
                Err(reply.into_error())
            };
        }
    }

    /// Send once and read the whole body. Transport failures come back as
    /// their message so the caller can decide whether to retry.
    async fn exchange(
        &self,
        req_id: &str,
        url: &Url,
        pairs: &[(&str, &str)],
        timeout: Option<Duration>,
        headers: Option<&HeaderMap>,
    ) -> Result<Reply, String> {
        let mut rb = self.inner.request(Method::GET, url.clone()).query(pairs);
        if let Some(timeout) = timeout {
            rb = rb.timeout(timeout);
        }
        if let Some(hdrs) = headers {
            rb = rb.headers(hdrs.clone());
        }

        let started = Instant::now();
        let resp = rb.send().await.map_err(|e| e.to_string())?;
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.bytes().await.map_err(|e| e.to_string())?.to_vec();
        let reply = Reply {
            req_id: req_id.to_string(),
            status,
            headers,
            body,
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        tracing::debug!(
            req_id=%req_id,
            %status,
            duration_ms,
            body_len=reply.body.len(),
            x_request_id=%reply.upstream_request_id(),
            "http.response.headers"
        );
        if raw_enabled() {
            let truncated = reply.body.len() > RAW_MAX_BODY;
            let shown = &reply.body[..reply.body.len().min(RAW_MAX_BODY)];
            tracing::info!(
                target: "http.raw",
                %req_id,
                %status,
                duration_ms,
                headers=?redact_headers(&reply.headers),
                body=%String::from_utf8_lossy(shown),
                truncated
            );
        }
        tracing::trace!(
            req_id=%req_id,
            body_snippet=%snip_body(&reply.body),
            "http.response.body_snippet"
        );
        Ok(reply)
    }
}

// ==============================
// Logging helpers
// ==============================

fn raw_enabled() -> bool {
    matches!(
        env::var(RAW_ENV).as_deref(),
        Ok("1") | Ok("true") | Ok("yes")
    )
}

fn endpoint_label(url: &Url) -> String {
    format!("{}{}", url.host_str().unwrap_or("-"), url.path())
}

fn is_secret(key: &str) -> bool {
    matches!(
        key.to_ascii_lowercase().as_str(),
        "authorization"
            | "cookie"
            | "access_token"
            | "api_key"
            | "key"
            | "token"
            | "lgpassword"
            | "lgtoken"
            | "csrftoken"
            | "secret"
            | "client_secret"
    )
}

fn shown(key: &str, value: &str) -> String {
    if is_secret(key) {
        REDACTED.to_string()
    } else {
        value.to_string()
    }
}

fn redact_headers(h: &HeaderMap) -> Vec<(String, String)> {
    h.iter()
        .map(|(k, v)| (k.to_string(), shown(k.as_str(), v.to_str().unwrap_or(""))))
        .collect()
}

fn redact_query(query: &[(&str, Cow<'_, str>)]) -> Vec<(String, String)> {
    query
        .iter()
        .map(|(k, v)| ((*k).to_string(), shown(k, v)))
        .collect()
}

fn redact_url(url: &Url) -> String {
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.to_string(), shown(&k, &v)))
        .collect();
    let mut redacted = url.clone();
    if !pairs.is_empty() {
        redacted.query_pairs_mut().clear().extend_pairs(pairs);
    }
    redacted.to_string()
}

/// Best-effort curl line for reproducing a request, secrets redacted.
fn make_curl(url: &Url, headers: Option<&HeaderMap>) -> String {
    let mut parts = vec!["curl".to_string()];
    for (name, val) in headers.map(redact_headers).unwrap_or_default() {
        parts.push(format!("-H '{}: {}'", name, val.replace('\'', r"'\''")));
    }
    parts.push(format!("'{}'", redact_url(url)));
    parts.join(" ")
}

fn snip_body(body: &[u8]) -> String {
    let mut snip = String::from_utf8_lossy(body).into_owned();
    if snip.len() > SNIPPET_MAX {
        let mut cut = SNIPPET_MAX;
        while !snip.is_char_boundary(cut) {
            cut -= 1;
        }
        snip.truncate(cut);
        snip.push_str("...");
    }
    snip
}

// ==============================
// Retry & error helpers
// ==============================

fn backoff(retry: usize) -> Duration {
    Duration::from_millis(200u64.saturating_mul(1 << retry.saturating_sub(1).min(16)))
}

fn retry_after_secs(h: &HeaderMap) -> Option<u64> {
    h.get(RETRY_AFTER)?.to_str().ok()?.trim().parse().ok()
}

/// `{"error": {"code": ..., "info": ...}}`
#[derive(Deserialize)]
struct MediaWikiError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    info: String,
}

fn mediawiki_error(body: &[u8]) -> Option<MediaWikiError> {
    #[derive(Deserialize)]
    struct Envelope {
        error: MediaWikiError,
    }
    serde_json::from_slice::<Envelope>(body).ok().map(|e| e.error)
}

fn extract_error_message(body: &[u8]) -> String {
    #[derive(Deserialize)]
    struct Generic {
        #[serde(default)]
        message: String,
        #[serde(default)]
        detail: String,
        #[serde(default)]
        error: String,
    }

    if let Some(MediaWikiError { code, info }) = mediawiki_error(body) {
        match (code.is_empty(), info.is_empty()) {
            (false, false) => return format!("{code}: {info}"),
            (true, false) => return info,
            (false, true) => return code,
            (true, true) => {}
        }
    }
    if let Ok(g) = serde_json::from_slice::<Generic>(body) {
        if let Some(msg) = [g.message, g.detail, g.error]
            .into_iter()
            .find(|m| !m.is_empty())
        {
            return msg;
        }
    }
    snip_body(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(status: u16, headers: &[(&'static str, &'static str)], body: &str) -> Reply {
        let mut map = HeaderMap::new();
        for (k, v) in headers {
            map.insert(*k, HeaderValue::from_static(*v));
        }
        Reply {
            req_id: "r1".into(),
            status: StatusCode::from_u16(status).unwrap(),
            headers: map,
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn mediawiki_error_envelope_is_preferred() {
        let body = br#"{"error":{"code":"missingtitle","info":"The page you specified doesn't exist."}}"#;
        assert_eq!(
            extract_error_message(body),
            "missingtitle: The page you specified doesn't exist."
        );
    }

    #[test]
    fn generic_message_and_plain_bodies() {
        assert_eq!(extract_error_message(br#"{"message":"nope"}"#), "nope");
        assert_eq!(extract_error_message(br#"{"detail":"gone"}"#), "gone");
        assert_eq!(extract_error_message(b"Service Unavailable"), "Service Unavailable");
    }

    #[test]
    fn snippets_truncate_on_char_boundaries() {
        let body = "é".repeat(400);
        let snip = snip_body(body.as_bytes());
        assert!(snip.ends_with("..."));
        assert!(snip.len() <= SNIPPET_MAX + 3);
    }

    #[test]
    fn secrets_are_redacted_in_query_and_url() {
        let q = vec![("page", Cow::Borrowed("Foo")), ("lgpassword", Cow::Borrowed("s3cr3t"))];
        let redacted = redact_query(&q);
        assert_eq!(redacted[0], ("page".into(), "Foo".into()));
        assert_eq!(redacted[1], ("lgpassword".into(), REDACTED.into()));

        let url = Url::parse("https://example.org/w/api.php?page=Foo&api_key=abc").unwrap();
        let shown = redact_url(&url);
        assert!(shown.contains("page=Foo"));
        assert!(!shown.contains("abc"));
    }

    #[test]
    fn backoff_grows_exponentially() {
        assert_eq!(backoff(1), Duration::from_millis(200));
        assert_eq!(backoff(2), Duration::from_millis(400));
        assert_eq!(backoff(3), Duration::from_millis(800));
    }

    #[test]
    fn retry_delays_by_reply_kind() {
        assert_eq!(reply(404, &[], "").retry_delay(1), None);
        assert_eq!(reply(200, &[], "{}").retry_delay(1), None);
        assert_eq!(
            reply(503, &[], "").retry_delay(2),
            Some(Duration::from_millis(400))
        );
        assert_eq!(reply(429, &[], "").retry_delay(1), Some(RATE_LIMIT_FLOOR));
        assert_eq!(
            reply(429, &[("retry-after", "3")], "").retry_delay(1),
            Some(Duration::from_secs(3))
        );
    }

    #[test]
    fn maxlag_success_is_retryable() {
        let lagged = reply(
            200,
            &[("retry-after", "5")],
            r#"{"error":{"code":"maxlag","info":"Waiting for 10.64.0.1: 6 seconds lagged"}}"#,
        );
        assert!(lagged.is_maxlag());
        assert_eq!(lagged.retry_delay(1), Some(Duration::from_secs(5)));

        let missing = reply(200, &[], r#"{"error":{"code":"missingtitle","info":"x"}}"#);
        assert!(!missing.is_maxlag());
    }

    #[test]
    fn empty_path_targets_base() {
        let client = HttpClient::new("https://en.wikipedia.org/w/api.php").unwrap();
        assert_eq!(
            client.base().join("").unwrap().as_str(),
            "https://en.wikipedia.org/w/api.php"
        );
    }
}
