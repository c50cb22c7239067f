//! Evasion Controller
//!
//! Decides, per request, what identity the fetch layer should use, which
//! proxy to route through, and how long to wait, adapting to observed
//! block events. Identity randomization aims at fingerprint diversity, not
//! cryptographic unpredictability. Owns the request counters that feed the
//! post-hoc stealth score.

use std::collections::BTreeSet;
use std::time::Duration;

use rand::seq::SliceRandom;
use rand::Rng;

use super::{FetchOutcome, RequestIdentity};
use crate::models::StealthTelemetry;

const USER_AGENT_POOL: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:127.0) Gecko/20100101 Firefox/127.0",
    "Mozilla/5.0 (X11; Linux x86_64; rv:127.0) Gecko/20100101 Firefox/127.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36 Edg/126.0.0.0",
];

const ACCEPT_LANGUAGE_POOL: &[&str] = &[
    "en-US,en;q=0.9",
    "en-GB,en;q=0.9",
    "en-US,en;q=0.8,de;q=0.5",
    "en-US,en;q=0.9,fr;q=0.6",
];

const SEARCH_REFERERS: &[&str] = &[
    "https://www.google.com/",
    "https://www.bing.com/",
    "https://duckduckgo.com/",
];

/// Tunable cadence and randomization parameters.
#[derive(Debug, Clone)]
pub struct EvasionConfig {
    /// Uniform range for the per-request delay, seconds
    pub base_delay_secs: (f64, f64),
    /// Every Nth request incurs the longer burst pause
    pub burst_size: usize,
    pub burst_delay_secs: (f64, f64),
    /// Block count past which adaptive backoff kicks in
    pub block_threshold: usize,
    /// Extra backoff per observed block, seconds
    pub backoff_step_secs: f64,
    pub max_backoff_secs: f64,
    pub referer_probability: f64,
    pub extra_header_probability: f64,
    /// Round-robin proxy pool; empty means direct
    pub proxies: Vec<String>,
}

impl Default for EvasionConfig {
    fn default() -> Self {
        Self {
            base_delay_secs: (0.5, 3.0),
            burst_size: 5,
            burst_delay_secs: (5.0, 15.0),
            block_threshold: 3,
            backoff_step_secs: 2.0,
            max_backoff_secs: 30.0,
            referer_probability: 0.7,
            extra_header_probability: 0.15,
            proxies: Vec::new(),
        }
    }
}

/// Per-scan mutable state. Single owner under cooperative scheduling;
/// no locking needed.
pub struct EvasionController {
    config: EvasionConfig,
    /// Scheme+host of the target, used for same-origin referer spoofing
    origin: String,
    request_count: usize,
    pages_fetched: usize,
    blocked_requests: usize,
    failed_requests: usize,
    detection_events: Vec<String>,
    techniques: BTreeSet<&'static str>,
    proxy_cursor: usize,
}

impl EvasionController {
    pub fn new(config: EvasionConfig, origin: impl Into<String>) -> Self {
        Self {
            config,
            origin: origin.into(),
            request_count: 0,
            pages_fetched: 0,
            blocked_requests: 0,
            failed_requests: 0,
            detection_events: Vec::new(),
            techniques: BTreeSet::new(),
            proxy_cursor: 0,
        }
    }

    /// Randomized identity for the next request.
    pub fn next_identity(&mut self) -> RequestIdentity {
        let mut rng = rand::thread_rng();
        let mut identity = RequestIdentity {
            user_agent: USER_AGENT_POOL
                .choose(&mut rng)
                .copied()
                .unwrap_or(USER_AGENT_POOL[0])
                .to_string(),
            accept_language: ACCEPT_LANGUAGE_POOL
                .choose(&mut rng)
                .copied()
                .unwrap_or(ACCEPT_LANGUAGE_POOL[0])
                .to_string(),
            randomized: true,
            ..RequestIdentity::default()
        };
        self.techniques.insert("user_agent_rotation");

        if rng.gen_bool(self.config.referer_probability) {
            identity.referer = if rng.gen_bool(0.5) {
                SEARCH_REFERERS.choose(&mut rng).map(|r| r.to_string())
            } else {
                Some(format!("{}/", self.origin.trim_end_matches('/')))
            };
            self.techniques.insert("referer_spoofing");
        }

        if rng.gen_bool(self.config.extra_header_probability) {
            identity.extra_headers.push(("DNT".to_string(), "1".to_string()));
            self.techniques.insert("header_randomization");
        }
        if rng.gen_bool(self.config.extra_header_probability) {
            identity
                .extra_headers
                .push(("Cache-Control".to_string(), "no-cache".to_string()));
            self.techniques.insert("header_randomization");
        }

        identity
    }

    /// Pre-request delay: uniform base, burst pause every Nth request, and
    /// adaptive backoff proportional to the block count, capped.
    pub fn next_delay(&mut self) -> Duration {
        self.request_count += 1;
        let mut rng = rand::thread_rng();

        let (lo, hi) = self.config.base_delay_secs;
        let mut delay = rng.gen_range(lo..=hi);

        if self.config.burst_size > 0 && self.request_count % self.config.burst_size == 0 {
            let (blo, bhi) = self.config.burst_delay_secs;
            delay += rng.gen_range(blo..=bhi);
            self.techniques.insert("burst_pacing");
        }

        if self.blocked_requests > self.config.block_threshold {
            let backoff = (self.blocked_requests as f64 * self.config.backoff_step_secs)
                .min(self.config.max_backoff_secs);
            delay += backoff;
            self.techniques.insert("adaptive_backoff");
        }

        Duration::from_secs_f64(delay)
    }

    /// Round-robin through the configured proxy pool.
    pub fn next_proxy(&mut self) -> Option<String> {
        if self.config.proxies.is_empty() {
            return None;
        }
        let proxy = self.config.proxies[self.proxy_cursor % self.config.proxies.len()].clone();
        self.proxy_cursor += 1;
        self.techniques.insert("proxy_rotation");
        Some(proxy)
    }

    /// Feed an observed outcome back into the running tallies.
    pub fn record(&mut self, url: &str, outcome: &FetchOutcome) {
        match outcome {
            FetchOutcome::Success { .. } => self.pages_fetched += 1,
            FetchOutcome::AntiBotChallenge => {
                self.blocked_requests += 1;
                self.detection_events
                    .push(format!("anti-bot challenge at {url}"));
                log::info!("Anti-bot challenge observed at {url}");
            }
            FetchOutcome::Blocked { status } if outcome.is_block_signal() => {
                self.blocked_requests += 1;
                self.detection_events.push(format!("HTTP {status} at {url}"));
            }
            FetchOutcome::Blocked { .. } => {}
            FetchOutcome::Redirect { .. } => {}
            FetchOutcome::Failure { reason } => {
                self.failed_requests += 1;
                log::debug!("Fetch failure at {url}: {reason}");
            }
        }
    }

    pub fn blocked_requests(&self) -> usize {
        self.blocked_requests
    }

    pub fn failed_requests(&self) -> usize {
        self.failed_requests
    }

    /// `success_rate − detection_penalty + evasion_bonus`, clamped to [0, 1].
    pub fn stealth_score(&self) -> f64 {
        let attempts = self.pages_fetched + self.blocked_requests;
        let success_rate = if attempts == 0 {
            1.0
        } else {
            self.pages_fetched as f64 / attempts as f64
        };
        let detection_penalty = (0.1 * self.detection_events.len() as f64).min(0.5);
        let evasion_bonus = (0.02 * self.techniques.len() as f64).min(0.2);
        (success_rate - detection_penalty + evasion_bonus).clamp(0.0, 1.0)
    }

    /// Snapshot for the phase result.
    pub fn telemetry(&self) -> StealthTelemetry {
        StealthTelemetry {
            techniques_applied: self.techniques.iter().map(|t| t.to_string()).collect(),
            detection_events: self.detection_events.clone(),
            blocked_requests: self.blocked_requests,
            pages_fetched: self.pages_fetched,
            stealth_score: self.stealth_score(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::collections::HashMap;

    fn controller() -> EvasionController {
        EvasionController::new(EvasionConfig::default(), "https://example.test")
    }

    fn success() -> FetchOutcome {
        FetchOutcome::Success {
            status: 200,
            headers: HashMap::new(),
            body: Bytes::new(),
        }
    }

    #[test]
    fn test_base_delay_within_range() {
        let mut c = EvasionController::new(
            EvasionConfig {
                burst_size: 0,
                ..EvasionConfig::default()
            },
            "https://example.test",
        );
        for _ in 0..20 {
            let d = c.next_delay().as_secs_f64();
            assert!((0.5..=3.0).contains(&d), "delay {d} outside base range");
        }
    }

    #[test]
    fn test_burst_pause_every_nth_request() {
        let mut c = controller();
        let mut delays = Vec::new();
        for _ in 0..5 {
            delays.push(c.next_delay().as_secs_f64());
        }
        // 5th request carries the 5-15s burst pause on top of the base range
        assert!(delays[4] >= 5.0, "burst delay missing: {delays:?}");
        for d in &delays[..4] {
            assert!(*d <= 3.0 + f64::EPSILON);
        }
    }

    #[test]
    fn test_adaptive_backoff_after_blocks() {
        let mut c = EvasionController::new(
            EvasionConfig {
                burst_size: 0,
                ..EvasionConfig::default()
            },
            "https://example.test",
        );
        for i in 0..6 {
            c.record(
                &format!("https://example.test/p{i}"),
                &FetchOutcome::Blocked { status: 403 },
            );
        }
        // 6 blocks * 2s step = 12s extra on top of at most 3s base
        let d = c.next_delay().as_secs_f64();
        assert!(d >= 12.0, "backoff not applied: {d}");
        assert!(d <= 3.0 + 30.0 + f64::EPSILON);
    }

    #[test]
    fn test_proxy_round_robin() {
        let mut c = EvasionController::new(
            EvasionConfig {
                proxies: vec!["http://p1:8080".into(), "http://p2:8080".into()],
                ..EvasionConfig::default()
            },
            "https://example.test",
        );
        assert_eq!(c.next_proxy().as_deref(), Some("http://p1:8080"));
        assert_eq!(c.next_proxy().as_deref(), Some("http://p2:8080"));
        assert_eq!(c.next_proxy().as_deref(), Some("http://p1:8080"));
    }

    #[test]
    fn test_no_proxy_pool_means_direct() {
        assert!(controller().next_proxy().is_none());
    }

    #[test]
    fn test_identity_randomization_pools() {
        let mut c = controller();
        for _ in 0..10 {
            let id = c.next_identity();
            assert!(USER_AGENT_POOL.contains(&id.user_agent.as_str()));
            assert!(ACCEPT_LANGUAGE_POOL.contains(&id.accept_language.as_str()));
            assert!(id.randomized);
        }
    }

    #[test]
    fn test_stealth_score_formula() {
        let mut c = controller();
        for _ in 0..8 {
            c.record("https://example.test/ok", &success());
        }
        c.record("https://example.test/blocked", &FetchOutcome::AntiBotChallenge);
        c.record("https://example.test/blocked2", &FetchOutcome::AntiBotChallenge);
        // success_rate 8/10, penalty 0.2, no techniques recorded yet
        let score = c.stealth_score();
        assert!((score - 0.6).abs() < 1e-9, "unexpected score {score}");
    }

    #[test]
    fn test_stealth_score_clamped_under_total_block() {
        let mut c = controller();
        for i in 0..10 {
            c.record(
                &format!("https://example.test/p{i}"),
                &FetchOutcome::AntiBotChallenge,
            );
        }
        let score = c.stealth_score();
        assert!((0.0..=1.0).contains(&score));
        assert!(score < 0.1, "fully blocked scan should score near zero");
    }

    #[test]
    fn test_telemetry_snapshot() {
        let mut c = controller();
        let _ = c.next_identity();
        c.record("https://example.test/", &success());
        let t = c.telemetry();
        assert_eq!(t.pages_fetched, 1);
        assert!(t.techniques_applied.contains(&"user_agent_rotation".to_string()));
    }
}
