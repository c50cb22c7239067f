//! Crawl Frontier and Engine
//!
//! A budgeted, roughly breadth-first crawl over one target domain. The
//! frontier owns scope rules and deduplication; the engine owns fetch
//! scheduling (concurrent batches in basic/deep mode, a strictly sequential
//! cadence-controlled loop in stealth mode) and feeds every body through the
//! content extractor. Bodies are cached for the later pattern re-pass.

pub mod fingerprint;
pub mod probes;

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use futures::future::join_all;
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use crate::extract::ContentExtractor;
use crate::fetch::evasion::EvasionController;
use crate::fetch::{FetchOutcome, Fetcher, RequestIdentity};
use crate::models::{PhaseResult, ScanMode, ScanTarget};

/// Path fragments that mutate or destroy server-side session state.
/// Visiting them from an authenticated crawl would break the scan.
const SESSION_DESTRUCTIVE: &[&str] = &["logout", "signout", "delete", "remove", "destroy"];

/// A fetched body kept around for the final pattern re-pass.
#[derive(Debug, Clone)]
pub struct PageBody {
    pub url: String,
    pub body: Bytes,
    /// Whether the body already went through pattern extraction
    pub pattern_scanned: bool,
}

/// URL queue with scope, depth and dedup rules. Budgets are enforced
/// silently: out-of-budget URLs are dropped, never errors.
pub struct CrawlFrontier {
    queue: VecDeque<(String, usize)>,
    seen: HashSet<String>,
    scope_domain: String,
    follow_subdomains: bool,
    follow_external: bool,
    max_depth: usize,
}

impl CrawlFrontier {
    pub fn new(target: &ScanTarget) -> Self {
        Self {
            queue: VecDeque::new(),
            seen: HashSet::new(),
            scope_domain: target.scope_domain(),
            follow_subdomains: target.follow_subdomains,
            follow_external: target.follow_external_links,
            max_depth: target.max_depth,
        }
    }

    /// Whether a parsed URL is inside the crawl's scope rules.
    fn in_scope(&self, url: &Url) -> bool {
        if !matches!(url.scheme(), "http" | "https") {
            return false;
        }
        let Some(host) = url.host_str() else {
            return false;
        };
        let host_ok = host == self.scope_domain
            || (self.follow_subdomains && host.ends_with(&format!(".{}", self.scope_domain)))
            || self.follow_external;
        if !host_ok {
            return false;
        }
        let path = url.path().to_lowercase();
        !SESSION_DESTRUCTIVE.iter().any(|p| path.contains(p))
    }

    /// Enqueue a URL at the given depth. Returns whether it was accepted.
    /// Fragments are stripped before dedup; `/a` and `/a#top` are one page.
    pub fn push(&mut self, raw: &str, depth: usize) -> bool {
        if depth > self.max_depth {
            return false;
        }
        let Ok(mut url) = Url::parse(raw) else {
            return false;
        };
        url.set_fragment(None);
        if !self.in_scope(&url) {
            return false;
        }
        let normalized = url.to_string();
        if !self.seen.insert(normalized.clone()) {
            return false;
        }
        self.queue.push_back((normalized, depth));
        true
    }

    pub fn pop(&mut self) -> Option<(String, usize)> {
        self.queue.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

fn push_attr_values(doc: &Html, selector: &str, attr: &str, out: &mut Vec<String>) {
    if let Ok(sel) = Selector::parse(selector) {
        for element in doc.select(&sel) {
            if let Some(value) = element.value().attr(attr) {
                out.push(value.to_string());
            }
        }
    }
}

/// Extract candidate links from one page: anchor/script/stylesheet/image
/// references from the DOM, resource paths quoted inside inline scripts, and
/// CSS `url(...)` references. All resolved against `base`.
pub fn discover(content: &str, base: &str) -> Vec<String> {
    let Ok(base_url) = Url::parse(base) else {
        return Vec::new();
    };

    let mut raw_refs = Vec::new();
    {
        let doc = Html::parse_document(content);
        push_attr_values(&doc, "a[href]", "href", &mut raw_refs);
        push_attr_values(&doc, "script[src]", "src", &mut raw_refs);
        push_attr_values(&doc, "link[href]", "href", &mut raw_refs);
        push_attr_values(&doc, "img[src]", "src", &mut raw_refs);
        push_attr_values(&doc, "iframe[src]", "src", &mut raw_refs);
        push_attr_values(&doc, "form[action]", "action", &mut raw_refs);
    }

    // Resource paths mentioned inside scripts and fetch() calls
    if let Ok(re) = Regex::new(r#"["']((?:https?://|/)[^"'\s<>]{1,200}?\.(?:js|json))["']"#) {
        for caps in re.captures_iter(content) {
            raw_refs.push(caps[1].to_string());
        }
    }
    if let Ok(re) = Regex::new(r#"["'](/api/[A-Za-z0-9_\-./]{0,120})["']"#) {
        for caps in re.captures_iter(content) {
            raw_refs.push(caps[1].to_string());
        }
    }
    // CSS url(...) references
    if let Ok(re) = Regex::new(r#"url\(\s*['"]?([^'")\s]{1,200})['"]?\s*\)"#) {
        for caps in re.captures_iter(content) {
            let r = &caps[1];
            if !r.starts_with("data:") {
                raw_refs.push(r.to_string());
            }
        }
    }

    let mut resolved = Vec::new();
    let mut seen = HashSet::new();
    for r in raw_refs {
        let r = r.trim();
        if r.is_empty() || r.starts_with("javascript:") || r.starts_with("mailto:") {
            continue;
        }
        if let Ok(url) = base_url.join(r) {
            let s = url.to_string();
            if seen.insert(s.clone()) {
                resolved.push(s);
            }
        }
    }
    resolved
}

/// Whether this URL's content type is enabled for pattern extraction.
/// Disabled types are still crawled for links, just not scanned.
fn extraction_enabled(url: &str, target: &ScanTarget) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_lowercase();
    if path.ends_with(".js") || path.ends_with(".mjs") {
        return target.scan_javascript;
    }
    if path.ends_with(".css") {
        return target.scan_css;
    }
    if path.ends_with(".zip") || path.ends_with(".jar") {
        return target.scan_archives;
    }
    if path.ends_with(".pdf") || path.ends_with(".doc") || path.ends_with(".docx") {
        return target.scan_documents;
    }
    true
}

/// Runs one crawl mode over the frontier.
pub struct CrawlEngine {
    fetcher: Arc<dyn Fetcher>,
    extractor: Arc<ContentExtractor>,
}

impl CrawlEngine {
    pub fn new(fetcher: Arc<dyn Fetcher>, extractor: Arc<ContentExtractor>) -> Self {
        Self { fetcher, extractor }
    }

    /// Concurrent budgeted crawl used by the basic and deep phases. Each
    /// round fetches `min(concurrency, remaining budget)` URLs, so the page
    /// budget is exact even on the last round.
    pub async fn crawl_concurrent(
        &self,
        target: &ScanTarget,
        mode: ScanMode,
        cache: &mut Vec<PageBody>,
        deadline: Option<Instant>,
    ) -> PhaseResult {
        let start = Instant::now();
        let mut result = PhaseResult::new(mode);
        let mut frontier = CrawlFrontier::new(target);
        frontier.push(&target.url, 0);

        let identity = RequestIdentity::default();

        while result.pages_scanned < target.max_pages {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                log::info!("Deadline reached, ending {mode} crawl early");
                break;
            }

            let remaining = target.max_pages - result.pages_scanned;
            let batch_size = target.concurrency.min(remaining);
            let mut batch = Vec::with_capacity(batch_size);
            while batch.len() < batch_size {
                match frontier.pop() {
                    Some(item) => batch.push(item),
                    None => break,
                }
            }
            if batch.is_empty() {
                break;
            }

            let fetches = batch
                .iter()
                .map(|(url, _)| self.fetcher.fetch(url, &identity, None));
            let outcomes = join_all(fetches).await;

            for ((url, depth), outcome) in batch.into_iter().zip(outcomes) {
                self.absorb(
                    target,
                    &mut frontier,
                    &mut result,
                    cache,
                    &url,
                    depth,
                    outcome,
                );
            }
        }

        result.duration_secs = start.elapsed().as_secs_f64();
        result
    }

    /// Sequential stealth crawl. Every request goes through the evasion
    /// controller for identity, proxy and cadence.
    pub async fn crawl_stealth(
        &self,
        target: &ScanTarget,
        evasion: &mut EvasionController,
        cache: &mut Vec<PageBody>,
        deadline: Option<Instant>,
    ) -> PhaseResult {
        let start = Instant::now();
        let mut result = PhaseResult::new(ScanMode::Stealth);
        let mut frontier = CrawlFrontier::new(target);
        frontier.push(&target.url, 0);

        while result.pages_scanned < target.max_pages {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                log::info!("Deadline reached, ending stealth crawl early");
                break;
            }
            let Some((url, depth)) = frontier.pop() else {
                break;
            };

            let delay = evasion.next_delay();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let identity = evasion.next_identity();
            let proxy = evasion.next_proxy();

            let outcome = self.fetcher.fetch(&url, &identity, proxy.as_deref()).await;
            evasion.record(&url, &outcome);

            self.absorb(
                target,
                &mut frontier,
                &mut result,
                cache,
                &url,
                depth,
                outcome,
            );
        }

        result.blocked_requests = evasion.blocked_requests();
        result.failed_requests = evasion.failed_requests();
        result.stealth = Some(evasion.telemetry());
        result.duration_secs = start.elapsed().as_secs_f64();
        result
    }

    /// Fold one fetch outcome into the running phase result: extract
    /// findings, discover links, cache the body, tally blocks and failures.
    #[allow(clippy::too_many_arguments)]
    fn absorb(
        &self,
        target: &ScanTarget,
        frontier: &mut CrawlFrontier,
        result: &mut PhaseResult,
        cache: &mut Vec<PageBody>,
        url: &str,
        depth: usize,
        outcome: FetchOutcome,
    ) {
        match outcome {
            FetchOutcome::Success { body, .. } => {
                // Only successful visits count against the page budget
                result.pages_scanned += 1;
                let scanned = extraction_enabled(url, target);
                if scanned {
                    result.findings.extend(self.extractor.extract(url, &body));
                }
                let text = String::from_utf8_lossy(&body);
                for link in discover(&text, url) {
                    frontier.push(&link, depth + 1);
                }
                cache.push(PageBody {
                    url: url.to_string(),
                    body,
                    pattern_scanned: scanned,
                });
            }
            FetchOutcome::Redirect { location, .. } => {
                // Server-side move: re-enqueue the destination at the same
                // depth so scope rules still apply to it
                if let Some(loc) = location {
                    if let Ok(base) = Url::parse(url) {
                        if let Ok(dest) = base.join(&loc) {
                            frontier.push(dest.as_str(), depth);
                        }
                    }
                }
            }
            ref o @ (FetchOutcome::Blocked { .. } | FetchOutcome::AntiBotChallenge) => {
                if o.is_block_signal() {
                    result.blocked_requests += 1;
                }
            }
            FetchOutcome::Failure { reason } => {
                log::debug!("Fetch failure at {url}: {reason}");
                result.failed_requests += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> ScanTarget {
        ScanTarget::new("https://example.test/")
    }

    #[test]
    fn test_frontier_rejects_out_of_scope_host() {
        let mut f = CrawlFrontier::new(&target());
        assert!(f.push("https://example.test/page", 0));
        assert!(!f.push("https://other.host/page", 0));
    }

    #[test]
    fn test_frontier_subdomains_gated_by_toggle() {
        let mut t = target();
        let mut f = CrawlFrontier::new(&t);
        assert!(!f.push("https://api.example.test/v1", 0));

        t.follow_subdomains = true;
        let mut f = CrawlFrontier::new(&t);
        assert!(f.push("https://api.example.test/v1", 0));
    }

    #[test]
    fn test_frontier_rejects_session_destructive_paths() {
        let mut f = CrawlFrontier::new(&target());
        assert!(!f.push("https://example.test/account/logout", 0));
        assert!(!f.push("https://example.test/items/delete/3", 0));
        assert!(f.push("https://example.test/account/settings", 0));
    }

    #[test]
    fn test_frontier_strips_fragment_before_dedup() {
        let mut f = CrawlFrontier::new(&target());
        assert!(f.push("https://example.test/docs#intro", 0));
        assert!(!f.push("https://example.test/docs#usage", 0));
        assert!(!f.push("https://example.test/docs", 0));
    }

    #[test]
    fn test_frontier_drops_depth_overflow_silently() {
        let mut f = CrawlFrontier::new(&target());
        assert!(!f.push("https://example.test/deep", 4));
        assert!(f.push("https://example.test/deep", 3));
    }

    #[test]
    fn test_frontier_rejects_non_http_schemes() {
        let mut f = CrawlFrontier::new(&target());
        assert!(!f.push("ftp://example.test/files", 0));
        assert!(!f.push("mailto:admin@example.test", 0));
    }

    #[test]
    fn test_discover_resolves_relative_links() {
        let html = r#"<a href="/about">About</a><script src="assets/app.js"></script>"#;
        let links = discover(html, "https://example.test/pages/index.html");
        assert!(links.contains(&"https://example.test/about".to_string()));
        assert!(links.contains(&"https://example.test/pages/assets/app.js".to_string()));
    }

    #[test]
    fn test_discover_finds_script_string_resources() {
        let html = r#"<script>fetch("/api/v1/users"); var cfg = "/static/config.json";</script>"#;
        let links = discover(html, "https://example.test/");
        assert!(links.contains(&"https://example.test/api/v1/users".to_string()));
        assert!(links.contains(&"https://example.test/static/config.json".to_string()));
    }

    #[test]
    fn test_discover_finds_css_url_references() {
        let html = r#"<style>.bg { background: url('/media/bg.png'); }</style>"#;
        let links = discover(html, "https://example.test/");
        assert!(links.contains(&"https://example.test/media/bg.png".to_string()));
    }

    #[test]
    fn test_discover_skips_data_and_javascript_urls() {
        let html = r#"<a href="javascript:void(0)">x</a><style>i{background:url(data:image/png;base64,AAAA)}</style>"#;
        let links = discover(html, "https://example.test/");
        assert!(links.is_empty(), "unexpected links: {links:?}");
    }

    #[test]
    fn test_extraction_toggles_by_extension() {
        let mut t = target();
        t.scan_javascript = false;
        assert!(!extraction_enabled("https://example.test/app.js?v=3", &t));
        assert!(extraction_enabled("https://example.test/index.html", &t));
        t.scan_archives = false;
        assert!(!extraction_enabled("https://example.test/backup.zip", &t));
    }
}
