//! Remote content source: directory listings and raw file bytes.
//!
//! [`GithubSource`] speaks the repository contents API:
//!
//! ```text
//! GET {api}/repos/{owner}/{repo}/contents/{path}?ref={ref}
//!   Accept: application/vnd.github+json   -> listing (array) or single entry (object)
//!   Accept: application/vnd.github.raw    -> file bytes
//! ```
//!
//! Every call goes through the same two loops: bounded linear-backoff retry
//! on 5xx, and rate-limit handling (sleep until reset, or fail with
//! [`RemoteError::RateLimited`] when waiting is disabled). HTTP and time are
//! behind the [`Transport`] and [`Clock`] traits so both loops are testable
//! without a network or real sleeping.

use std::io::Read;
use std::time::Duration;

use serde::Deserialize;

use repomirror_core::{EntryKind, RefName, RemoteEntry, RepoId, RepoPath, SyncRequest};

use crate::error::RemoteError;

const USER_AGENT: &str = concat!("repomirror/", env!("CARGO_PKG_VERSION"));
const ACCEPT_JSON: &str = "application/vnd.github+json";
const ACCEPT_RAW: &str = "application/vnd.github.raw";

// ---------------------------------------------------------------------------
// RemoteSource
// ---------------------------------------------------------------------------

/// Result of listing a remote path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Listing {
    /// The path names a single file.
    File(RemoteEntry),
    /// The path names a directory; entries are its immediate children.
    Dir(Vec<RemoteEntry>),
}

/// Read-only view of a remote repository at a ref.
pub trait RemoteSource {
    fn list(&self, path: &RepoPath, git_ref: &RefName) -> Result<Listing, RemoteError>;
    fn fetch(&self, path: &RepoPath, git_ref: &RefName) -> Result<Vec<u8>, RemoteError>;
}

impl<T: RemoteSource + ?Sized> RemoteSource for &T {
    fn list(&self, path: &RepoPath, git_ref: &RefName) -> Result<Listing, RemoteError> {
        (**self).list(path, git_ref)
    }

    fn fetch(&self, path: &RepoPath, git_ref: &RefName) -> Result<Vec<u8>, RemoteError> {
        (**self).fetch(path, git_ref)
    }
}

// ---------------------------------------------------------------------------
// Transport + clock seams
// ---------------------------------------------------------------------------

/// A GET request as the transport sees it.
#[derive(Debug, Clone)]
pub struct HttpRequest<'a> {
    pub url: &'a str,
    pub query: &'a [(&'a str, &'a str)],
    pub headers: &'a [(&'static str, String)],
}

/// A fully-read HTTP response. Non-2xx statuses are responses, not errors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    fn body_excerpt(&self) -> String {
        let text = String::from_utf8_lossy(&self.body);
        text.chars().take(200).collect()
    }
}

/// Blocking HTTP GET.
pub trait Transport {
    fn get(&self, request: &HttpRequest<'_>) -> Result<HttpResponse, RemoteError>;
}

/// [`Transport`] backed by a `ureq` agent.
#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        let agent = ureq::AgentBuilder::new()
            .user_agent(USER_AGENT)
            .timeout_connect(Duration::from_secs(15))
            .timeout_read(Duration::from_secs(120))
            .build();
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for UreqTransport {
    fn get(&self, request: &HttpRequest<'_>) -> Result<HttpResponse, RemoteError> {
        let transport_err = |message: String| RemoteError::Transport {
            url: request.url.to_owned(),
            message,
        };

        let mut call = self.agent.get(request.url);
        for (key, value) in request.query {
            call = call.query(key, value);
        }
        for (key, value) in request.headers {
            call = call.set(key, value);
        }

        let response = match call.call() {
            Ok(response) => response,
            Err(ureq::Error::Status(_, response)) => response,
            Err(ureq::Error::Transport(err)) => return Err(transport_err(err.to_string())),
        };

        let status = response.status();
        let headers = response
            .headers_names()
            .into_iter()
            .filter_map(|name| {
                let value = response.header(&name)?.to_owned();
                Some((name, value))
            })
            .collect();
        let mut body = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut body)
            .map_err(|e| transport_err(e.to_string()))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// Wall clock and sleeping.
pub trait Clock {
    /// Current time as Unix seconds.
    fn now_unix(&self) -> i64;
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Retry and rate-limit timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first on a transient 5xx.
    pub max_retries: u32,
    /// Delay before retry `n` is `step * n`.
    pub step: Duration,
    /// Added to the advertised reset time before retrying.
    pub reset_margin: Duration,
    /// Wait used when a rate limit carries no reset time.
    pub unknown_reset_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            step: Duration::from_millis(1500),
            reset_margin: Duration::from_secs(2),
            unknown_reset_wait: Duration::from_secs(60),
        }
    }
}

fn is_transient(status: u16) -> bool {
    matches!(status, 500 | 502 | 503 | 504)
}

/// `Some(reset_at)` when the response is a rate-limit signal.
fn rate_limit_reset(response: &HttpResponse, now: i64) -> Option<Option<i64>> {
    if response.status != 403 && response.status != 429 {
        return None;
    }
    if response.header("x-ratelimit-remaining").map(str::trim) == Some("0") {
        let reset = response
            .header("x-ratelimit-reset")
            .and_then(|v| v.trim().parse::<i64>().ok());
        return Some(reset);
    }
    if let Some(secs) = response
        .header("retry-after")
        .and_then(|v| v.trim().parse::<i64>().ok())
    {
        return Some(Some(now.saturating_add(secs)));
    }
    if response.status == 429 {
        return Some(None);
    }
    None
}

// ---------------------------------------------------------------------------
// GithubSource
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ContentsPayload {
    Many(Vec<RemoteEntry>),
    One(RemoteEntry),
}

/// [`RemoteSource`] over the repository contents API.
#[derive(Debug, Clone)]
pub struct GithubSource<T = UreqTransport, C = SystemClock> {
    api_url: String,
    repo: RepoId,
    token: Option<String>,
    wait_on_rate_limit: bool,
    retry: RetryPolicy,
    transport: T,
    clock: C,
}

impl GithubSource {
    /// Source for `request.repo` using the real network and clock.
    pub fn new(api_url: &str, request: &SyncRequest) -> Self {
        Self::with_parts(
            api_url,
            request.repo.clone(),
            request.token.clone(),
            request.wait_on_rate_limit,
            UreqTransport::new(),
            SystemClock,
        )
    }
}

impl<T: Transport, C: Clock> GithubSource<T, C> {
    pub fn with_parts(
        api_url: &str,
        repo: RepoId,
        token: Option<String>,
        wait_on_rate_limit: bool,
        transport: T,
        clock: C,
    ) -> Self {
        Self {
            api_url: api_url.trim_end_matches('/').to_owned(),
            repo,
            token,
            wait_on_rate_limit,
            retry: RetryPolicy::default(),
            transport,
            clock,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn contents_url(&self, path: &RepoPath) -> String {
        let encoded: Vec<_> = path
            .as_str()
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_url,
            self.repo.owner,
            self.repo.name,
            encoded.join("/")
        )
    }

    fn headers(&self, accept: &str) -> Vec<(&'static str, String)> {
        let mut headers = vec![("Accept", accept.to_owned())];
        if let Some(token) = &self.token {
            headers.push(("Authorization", format!("Bearer {token}")));
        }
        headers
    }

    /// One logical request: retries transient failures, then absorbs or
    /// reports rate limiting.
    fn get(&self, url: &str, git_ref: &RefName, accept: &str) -> Result<HttpResponse, RemoteError> {
        let headers = self.headers(accept);
        let query = [("ref", git_ref.0.as_str())];
        let request = HttpRequest {
            url,
            query: &query,
            headers: &headers,
        };

        loop {
            let response = self.send_with_retry(&request)?;
            let Some(reset_at) = rate_limit_reset(&response, self.clock.now_unix()) else {
                return Ok(response);
            };
            if !self.wait_on_rate_limit {
                return Err(RemoteError::RateLimited { reset_at });
            }
            let wait = self.rate_limit_wait(reset_at);
            tracing::warn!(
                wait_secs = wait.as_secs(),
                "rate limit reached; waiting until reset"
            );
            self.clock.sleep(wait);
        }
    }

    fn rate_limit_wait(&self, reset_at: Option<i64>) -> Duration {
        match reset_at {
            Some(reset) => {
                let margin = self.retry.reset_margin.as_secs() as i64;
                let secs = reset
                    .saturating_sub(self.clock.now_unix())
                    .saturating_add(margin)
                    .max(0);
                Duration::from_secs(secs as u64)
            }
            None => self.retry.unknown_reset_wait,
        }
    }

    fn send_with_retry(&self, request: &HttpRequest<'_>) -> Result<HttpResponse, RemoteError> {
        let mut attempt = 0;
        loop {
            tracing::debug!(url = request.url, attempt, "remote request");
            let response = self.transport.get(request)?;
            if !is_transient(response.status) {
                return Ok(response);
            }
            if attempt >= self.retry.max_retries {
                return Err(RemoteError::TransientServer {
                    status: response.status,
                    url: request.url.to_owned(),
                });
            }
            attempt += 1;
            tracing::warn!(
                url = request.url,
                status = response.status,
                attempt,
                "transient server error; retrying"
            );
            self.clock.sleep(self.retry.step * attempt);
        }
    }

    fn check_status(
        &self,
        response: &HttpResponse,
        url: &str,
        path: &RepoPath,
        git_ref: &RefName,
    ) -> Result<(), RemoteError> {
        match response.status {
            s if (200..300).contains(&s) => Ok(()),
            404 => Err(RemoteError::NotFound {
                path: path.to_string(),
                git_ref: git_ref.to_string(),
            }),
            403 => Err(RemoteError::AccessDenied {
                url: url.to_owned(),
            }),
            status => Err(RemoteError::Http {
                status,
                url: url.to_owned(),
                body: response.body_excerpt(),
            }),
        }
    }
}

impl<T: Transport, C: Clock> RemoteSource for GithubSource<T, C> {
    fn list(&self, path: &RepoPath, git_ref: &RefName) -> Result<Listing, RemoteError> {
        let url = self.contents_url(path);
        let response = self.get(&url, git_ref, ACCEPT_JSON)?;
        self.check_status(&response, &url, path, git_ref)?;

        let payload: ContentsPayload =
            serde_json::from_slice(&response.body).map_err(|source| RemoteError::Decode {
                path: path.to_string(),
                source,
            })?;
        Ok(match payload {
            ContentsPayload::Many(entries) => Listing::Dir(entries),
            ContentsPayload::One(entry) if entry.kind == EntryKind::File => Listing::File(entry),
            ContentsPayload::One(entry) => {
                tracing::debug!(
                    path = %entry.path,
                    kind = ?entry.kind,
                    "requested path is neither a file nor a directory"
                );
                Listing::Dir(Vec::new())
            }
        })
    }

    fn fetch(&self, path: &RepoPath, git_ref: &RefName) -> Result<Vec<u8>, RemoteError> {
        let url = self.contents_url(path);
        let response = self.get(&url, git_ref, ACCEPT_RAW)?;
        self.check_status(&response, &url, path, git_ref)?;
        Ok(response.body)
    }
}
