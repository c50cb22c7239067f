//! HTTP Fetch Layer
//!
//! A single fetch with a configurable identity, classified into a tagged
//! outcome (success / redirect / blocked / anti-bot challenge / failure).
//! Network-level errors never propagate as `Err`: callers must be able to
//! continue a crawl past any dead URL. Proxy selection belongs to the
//! evasion controller; this layer only passes the proxy through.

pub mod evasion;

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::errors::{VigilError, VigilResult};

/// Bodies larger than this are truncated before scanning.
const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// `server` header values that identify a bot-mitigation vendor.
const BOT_MITIGATION_VENDORS: &[&str] = &[
    "cloudflare",
    "akamai",
    "imperva",
    "incapsula",
    "sucuri",
    "ddos-guard",
    "big-ip",
    "awselb",
];

/// The request fingerprint used for one fetch.
#[derive(Debug, Clone)]
pub struct RequestIdentity {
    pub user_agent: String,
    pub accept: String,
    pub accept_language: String,
    pub accept_encoding: String,
    pub referer: Option<String>,
    /// Low-probability extras (DNT, Cache-Control) added for diversity
    pub extra_headers: Vec<(String, String)>,
    /// Whether this identity was randomized by the evasion controller
    pub randomized: bool,
}

impl Default for RequestIdentity {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36"
                .to_string(),
            accept: "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".to_string(),
            accept_language: "en-US,en;q=0.9".to_string(),
            accept_encoding: "gzip, deflate".to_string(),
            referer: None,
            extra_headers: Vec::new(),
            randomized: false,
        }
    }
}

/// Classified result of one fetch.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Success {
        status: u16,
        /// Lowercased header names
        headers: HashMap<String, String>,
        body: Bytes,
    },
    Redirect {
        status: u16,
        location: Option<String>,
    },
    Blocked {
        status: u16,
    },
    AntiBotChallenge,
    Failure {
        reason: String,
    },
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Success { .. })
    }

    /// Outcomes that feed the evasion controller's block tally.
    pub fn is_block_signal(&self) -> bool {
        match self {
            FetchOutcome::AntiBotChallenge => true,
            FetchOutcome::Blocked { status } => matches!(status, 401 | 403 | 429 | 451 | 503),
            _ => false,
        }
    }
}

/// Anti-bot classification heuristic: a CDN challenge marker on a 503, a
/// mitigation vendor in `server` on 403/503, or a rate-limit header with
/// zero quota remaining.
pub fn is_anti_bot_response(status: u16, headers: &HashMap<String, String>) -> bool {
    if status == 503 && headers.contains_key("cf-ray") {
        return true;
    }
    if matches!(status, 403 | 503) {
        if let Some(server) = headers.get("server") {
            let server = server.to_lowercase();
            if BOT_MITIGATION_VENDORS.iter().any(|v| server.contains(v)) {
                return true;
            }
        }
    }
    for key in ["x-ratelimit-remaining", "ratelimit-remaining"] {
        if headers.get(key).map(|v| v.trim() == "0").unwrap_or(false) {
            return true;
        }
    }
    false
}

/// Map a status/header/body triple into a tagged outcome.
pub fn classify_response(
    status: u16,
    headers: HashMap<String, String>,
    location: Option<String>,
    body: Bytes,
) -> FetchOutcome {
    if is_anti_bot_response(status, &headers) {
        return FetchOutcome::AntiBotChallenge;
    }
    match status {
        200..=299 => FetchOutcome::Success {
            status,
            headers,
            body,
        },
        300..=399 => FetchOutcome::Redirect { status, location },
        _ => FetchOutcome::Blocked { status },
    }
}

/// The suspension point of the whole pipeline. Implemented by the real
/// reqwest-backed client and by in-memory stubs in tests.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(
        &self,
        url: &str,
        identity: &RequestIdentity,
        proxy: Option<&str>,
    ) -> FetchOutcome;
}

/// reqwest-backed fetch client. Redirects are surfaced, not followed, so
/// the crawler can keep `Location` targets inside scope rules.
pub struct FetchClient {
    default_client: reqwest::Client,
    proxy_clients: Mutex<HashMap<String, reqwest::Client>>,
    timeout: Duration,
    /// Authentication material from the scan target
    cookies: HashMap<String, String>,
    headers: HashMap<String, String>,
}

impl FetchClient {
    pub fn new(
        timeout: Duration,
        cookies: HashMap<String, String>,
        headers: HashMap<String, String>,
    ) -> VigilResult<Self> {
        let default_client = Self::builder(timeout)
            .build()
            .map_err(|e| VigilError::HttpClient(e.to_string()))?;
        Ok(Self {
            default_client,
            proxy_clients: Mutex::new(HashMap::new()),
            timeout,
            cookies,
            headers,
        })
    }

    fn builder(timeout: Duration) -> reqwest::ClientBuilder {
        reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .danger_accept_invalid_certs(true)
    }

    /// Per-proxy clients are built lazily and cached for the scan lifetime.
    fn client_for(&self, proxy: Option<&str>) -> reqwest::Client {
        let Some(proxy_url) = proxy else {
            return self.default_client.clone();
        };
        let mut cache = self.proxy_clients.lock().expect("proxy cache poisoned");
        if let Some(client) = cache.get(proxy_url) {
            return client.clone();
        }
        let built = reqwest::Proxy::all(proxy_url)
            .and_then(|p| Self::builder(self.timeout).proxy(p).build());
        match built {
            Ok(client) => {
                cache.insert(proxy_url.to_string(), client.clone());
                client
            }
            Err(e) => {
                log::warn!("Unusable proxy '{proxy_url}', falling back to direct: {e}");
                self.default_client.clone()
            }
        }
    }

    fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

#[async_trait]
impl Fetcher for FetchClient {
    async fn fetch(
        &self,
        url: &str,
        identity: &RequestIdentity,
        proxy: Option<&str>,
    ) -> FetchOutcome {
        let client = self.client_for(proxy);

        let mut request = client
            .get(url)
            .header("User-Agent", &identity.user_agent)
            .header("Accept", &identity.accept)
            .header("Accept-Language", &identity.accept_language)
            .header("Accept-Encoding", &identity.accept_encoding);

        if let Some(referer) = &identity.referer {
            request = request.header("Referer", referer);
        }
        for (name, value) in &identity.extra_headers {
            request = request.header(name, value);
        }
        if let Some(cookie) = self.cookie_header() {
            request = request.header("Cookie", cookie);
        }
        for (name, value) in &self.headers {
            request = request.header(name, value);
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                log::debug!("Fetch failed for {url}: {e}");
                return FetchOutcome::Failure {
                    reason: e.to_string(),
                };
            }
        };

        let status = response.status().as_u16();
        let mut headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                headers.insert(name.as_str().to_lowercase(), v.to_string());
            }
        }
        let location = headers.get("location").cloned();

        let body = if (200..300).contains(&status) {
            match response.bytes().await {
                Ok(b) if b.len() > MAX_BODY_BYTES => b.slice(..MAX_BODY_BYTES),
                Ok(b) => b,
                Err(e) => {
                    log::debug!("Body read failed for {url}: {e}");
                    return FetchOutcome::Failure {
                        reason: e.to_string(),
                    };
                }
            }
        } else {
            Bytes::new()
        };

        classify_response(status, headers, location, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_cdn_challenge_on_503() {
        let h = headers(&[("cf-ray", "8a1b2c3d4e5f-FRA")]);
        assert!(is_anti_bot_response(503, &h));
        assert!(matches!(
            classify_response(503, h, None, Bytes::new()),
            FetchOutcome::AntiBotChallenge
        ));
    }

    #[test]
    fn test_mitigation_vendor_on_403() {
        let h = headers(&[("server", "cloudflare")]);
        assert!(is_anti_bot_response(403, &h));
        // Same vendor on a 200 is not a challenge
        assert!(!is_anti_bot_response(200, &h));
    }

    #[test]
    fn test_exhausted_rate_limit_is_challenge() {
        let h = headers(&[("x-ratelimit-remaining", "0")]);
        assert!(is_anti_bot_response(429, &h));
        let h = headers(&[("x-ratelimit-remaining", "42")]);
        assert!(!is_anti_bot_response(429, &h));
    }

    #[test]
    fn test_redirect_carries_location() {
        let h = headers(&[("location", "https://example.test/login")]);
        let loc = h.get("location").cloned();
        match classify_response(302, h, loc, Bytes::new()) {
            FetchOutcome::Redirect { status, location } => {
                assert_eq!(status, 302);
                assert_eq!(location.as_deref(), Some("https://example.test/login"));
            }
            other => panic!("expected redirect, got {other:?}"),
        }
    }

    #[test]
    fn test_success_and_block_classes() {
        match classify_response(200, HashMap::new(), None, Bytes::from_static(b"ok")) {
            FetchOutcome::Success { status, body, .. } => {
                assert_eq!(status, 200);
                assert_eq!(&body[..], b"ok");
            }
            other => panic!("expected success, got {other:?}"),
        }
        assert!(matches!(
            classify_response(404, HashMap::new(), None, Bytes::new()),
            FetchOutcome::Blocked { status: 404 }
        ));
    }

    #[test]
    fn test_block_signal_statuses() {
        assert!(FetchOutcome::Blocked { status: 403 }.is_block_signal());
        assert!(FetchOutcome::Blocked { status: 429 }.is_block_signal());
        assert!(!FetchOutcome::Blocked { status: 404 }.is_block_signal());
        assert!(FetchOutcome::AntiBotChallenge.is_block_signal());
        assert!(!FetchOutcome::Failure {
            reason: "timeout".into()
        }
        .is_block_signal());
    }

    #[test]
    fn test_default_identity_is_desktop_browser() {
        let id = RequestIdentity::default();
        assert!(id.user_agent.contains("Mozilla/5.0"));
        assert!(id.referer.is_none());
        assert!(!id.randomized);
    }
}
