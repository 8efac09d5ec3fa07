//! Retrying fetch layer for the catalog upstreams.
//!
//! One outbound GET with bounded retries, linear backoff, a rotating
//! User-Agent pool, optional TLS-verification bypass, and proxy
//! pass-through. Failures come back as a typed [`FetchError`]; nothing
//! escapes this boundary as a panic or an untyped error.
//!
//! The backoff is linear (`base × attempt_index`), not exponential — that
//! matches the observed upstream tolerance and keeps worst-case latency
//! predictable for a chat round-trip.

use std::time::Duration;

use rand::Rng;
use reqwest::header::USER_AGENT;
use reqwest::StatusCode;

use crate::config::EngineConfig;

/// Rotation pool of plausible desktop client signatures. A 403/429 rotates
/// to the next entry before the retry; this only changes the fingerprint,
/// not the network path, so IP-based throttling will still exhaust the
/// attempts (known limitation).
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36 Edg/121.0.0.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:122.0) Gecko/20100101 Firefox/122.0",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// Connection refused / DNS / TLS handshake failure.
    Connect,
    /// Per-request timeout elapsed.
    Timeout,
    /// Body transfer broke mid-stream.
    Transfer,
    /// Non-2xx response.
    Status,
}

/// Terminal outcome of a fetch. Callers branch on `kind`; this never
/// propagates past the resolver boundary as a hard failure.
#[derive(Debug, Clone, thiserror::Error)]
#[error("fetch failed after {attempts} attempt(s): {kind:?} (last status: {last_status:?})")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub last_status: Option<u16>,
    pub attempts: u32,
}

/// Per-request options. Headers and query pairs are appended to the
/// defaults; `insecure_tls` routes through the certificate-ignoring
/// client (some upstreams sit behind chronically broken TLS).
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub insecure_tls: bool,
}

impl FetchOptions {
    pub fn insecure() -> Self {
        Self {
            insecure_tls: true,
            ..Default::default()
        }
    }
}

pub struct RetryingFetcher {
    verified: reqwest::Client,
    unverified: reqwest::Client,
    /// No-redirect client used only by [`resolve_redirect`](Self::resolve_redirect).
    redirectless: reqwest::Client,
    attempts: u32,
    retry_delay: Duration,
}

impl RetryingFetcher {
    pub fn new(config: &EngineConfig) -> Result<Self, reqwest::Error> {
        let proxy = config.proxy.as_deref().and_then(|address| {
            match reqwest::Proxy::all(address) {
                Ok(proxy) => Some(proxy),
                Err(e) => {
                    tracing::warn!(proxy = %address, error = %e, "Proxy rejected by HTTP client; continuing without it");
                    None
                }
            }
        });

        let builder = |insecure: bool| {
            let mut b = reqwest::Client::builder()
                .timeout(config.request_timeout())
                .cookie_store(true)
                .danger_accept_invalid_certs(insecure);
            if let Some(proxy) = proxy.clone() {
                b = b.proxy(proxy);
            }
            b
        };

        Ok(Self {
            verified: builder(false).build()?,
            unverified: builder(true).build()?,
            redirectless: builder(false)
                .redirect(reqwest::redirect::Policy::none())
                .build()?,
            attempts: config.fetch.attempts.max(1),
            retry_delay: config.retry_delay(),
        })
    }

    fn client(&self, options: &FetchOptions) -> &reqwest::Client {
        if options.insecure_tls {
            &self.unverified
        } else {
            &self.verified
        }
    }

    fn classify(error: &reqwest::Error) -> FetchErrorKind {
        if error.is_timeout() {
            FetchErrorKind::Timeout
        } else if error.is_connect() {
            FetchErrorKind::Connect
        } else {
            FetchErrorKind::Transfer
        }
    }

    /// GET `url` with bounded retries. Retryable: connect failure, timeout,
    /// HTTP 403/429, body-transfer failure. Terminal: any other non-2xx.
    /// Never sleeps after the final attempt.
    pub async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<String, FetchError> {
        let client = self.client(options);
        let mut ua_index = rand::rng().random_range(0..USER_AGENTS.len());
        let mut last = FetchError {
            kind: FetchErrorKind::Connect,
            last_status: None,
            attempts: 0,
        };

        for attempt in 1..=self.attempts {
            let mut request = client
                .get(url)
                .header(USER_AGENT, USER_AGENTS[ua_index])
                .query(&options.query);
            for (name, value) in &options.headers {
                request = request.header(name.as_str(), value.as_str());
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS {
                        tracing::warn!(
                            url,
                            status = status.as_u16(),
                            attempt,
                            "Request intercepted; rotating client signature"
                        );
                        ua_index = (ua_index + 1) % USER_AGENTS.len();
                        last = FetchError {
                            kind: FetchErrorKind::Status,
                            last_status: Some(status.as_u16()),
                            attempts: attempt,
                        };
                    } else if !status.is_success() {
                        tracing::error!(url, status = status.as_u16(), "Request failed");
                        return Err(FetchError {
                            kind: FetchErrorKind::Status,
                            last_status: Some(status.as_u16()),
                            attempts: attempt,
                        });
                    } else {
                        match response.text().await {
                            Ok(body) => return Ok(body),
                            Err(e) => {
                                tracing::warn!(url, error = %e, attempt, "Body transfer failed; retrying");
                                last = FetchError {
                                    kind: FetchErrorKind::Transfer,
                                    last_status: Some(status.as_u16()),
                                    attempts: attempt,
                                };
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(url, error = %e, attempt, "Request failed; retrying");
                    last = FetchError {
                        kind: Self::classify(&e),
                        last_status: e.status().map(|s| s.as_u16()),
                        attempts: attempt,
                    };
                }
            }

            if attempt < self.attempts {
                tokio::time::sleep(self.retry_delay * attempt).await;
            }
        }

        tracing::error!(url, attempts = last.attempts, "Request exhausted retries");
        Err(last)
    }

    /// Best-effort resolution of a jump link to its real target: HEAD
    /// without following redirects and read `Location`, falling back to a
    /// full GET and its final URL. Returns the input untouched on failure.
    pub async fn resolve_redirect(&self, url: &str) -> String {
        match self.redirectless.head(url).send().await {
            Ok(response) if response.status().is_redirection() => {
                if let Some(location) = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                {
                    return location.to_string();
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(url, error = %e, "HEAD redirect probe failed; trying GET");
            }
        }

        match self.verified.get(url).send().await {
            Ok(response) => response.url().to_string(),
            Err(e) => {
                tracing::warn!(url, error = %e, "Redirect resolution failed; keeping jump link");
                url.to_string()
            }
        }
    }
}
