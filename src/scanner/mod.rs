//! Scan Orchestrator
//!
//! Drives the phase pipeline over one target: basic crawl, stealth crawl,
//! deep crawl with discovery probes and fingerprinting, then a pattern
//! re-pass over cached bodies and final consolidation into a verdict.
//! Phases are independently toggleable; a skipped or expired phase is
//! recorded, never fatal. Partial results are always a valid verdict.

pub mod risk;

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use url::Url;

use crate::crawl::fingerprint::TechFingerprinter;
use crate::crawl::probes::DiscoveryProbes;
use crate::crawl::{CrawlEngine, PageBody};
use crate::errors::VigilResult;
use crate::extract::ContentExtractor;
use crate::fetch::evasion::{EvasionConfig, EvasionController};
use crate::fetch::Fetcher;
use crate::models::{DeepTelemetry, Finding, ScanMode, ScanTarget, ScanVerdict};
use crate::patterns::PatternBank;

/// Cached bodies re-scanned in the final pattern pass, at most.
const REPASS_BODY_CAP: usize = 50;

pub struct ScanOrchestrator {
    fetcher: Arc<dyn Fetcher>,
    extractor: Arc<ContentExtractor>,
    engine: CrawlEngine,
}

impl ScanOrchestrator {
    /// Build the pipeline around a fetcher. The pattern bank is compiled
    /// once here and shared by every component.
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        let bank = Arc::new(PatternBank::new());
        let extractor = Arc::new(ContentExtractor::new(bank));
        let engine = CrawlEngine::new(Arc::clone(&fetcher), Arc::clone(&extractor));
        Self {
            fetcher,
            extractor,
            engine,
        }
    }

    /// Run the full pipeline and consolidate a verdict.
    pub async fn scan(&self, target: &ScanTarget) -> VigilResult<ScanVerdict> {
        target.validate()?;

        let started_at = Utc::now();
        let deadline = target
            .deadline_secs
            .map(|s| Instant::now() + Duration::from_secs(s));

        let mut cache: Vec<PageBody> = Vec::new();
        let mut phases = Vec::new();
        let mut phase_failures = Vec::new();
        let mut stealth_score = None;

        if target.phases.basic {
            if expired(deadline) {
                phase_failures.push("basic phase skipped: deadline expired".to_string());
            } else {
                log::info!("Starting basic crawl of {}", target.url);
                let result = self
                    .engine
                    .crawl_concurrent(target, ScanMode::Basic, &mut cache, deadline)
                    .await;
                log::info!(
                    "Basic crawl done: {} pages, {} findings",
                    result.pages_scanned,
                    result.findings.len()
                );
                phases.push(result);
            }
        }

        if target.phases.stealth {
            if expired(deadline) {
                phase_failures.push("stealth phase skipped: deadline expired".to_string());
            } else {
                log::info!("Starting stealth crawl of {}", target.url);
                let config = EvasionConfig {
                    proxies: target.proxies.clone(),
                    ..EvasionConfig::default()
                };
                let mut evasion = EvasionController::new(config, origin_of(&target.url));
                let result = self
                    .engine
                    .crawl_stealth(target, &mut evasion, &mut cache, deadline)
                    .await;
                stealth_score = result.stealth.as_ref().map(|t| t.stealth_score);
                log::info!(
                    "Stealth crawl done: {} pages, {} blocked",
                    result.pages_scanned,
                    result.blocked_requests
                );
                phases.push(result);
            }
        }

        if target.phases.deep {
            if expired(deadline) {
                phase_failures.push("deep phase skipped: deadline expired".to_string());
            } else {
                log::info!("Starting deep discovery of {}", target.url);
                let mut result = self
                    .engine
                    .crawl_concurrent(target, ScanMode::Deep, &mut cache, deadline)
                    .await;

                let mut telemetry = DeepTelemetry::default();
                telemetry.technologies = TechFingerprinter::new(Arc::clone(&self.fetcher))
                    .fingerprint(&target.url)
                    .await;

                let crawled: Vec<String> = cache.iter().map(|p| p.url.clone()).collect();
                let probes =
                    DiscoveryProbes::new(Arc::clone(&self.fetcher), Arc::clone(&self.extractor));
                let probe_findings = probes.run(target, &crawled, &mut telemetry).await;
                result.findings.extend(probe_findings);

                log::info!(
                    "Deep discovery done: {} endpoints, {} admin panels, {} technologies",
                    telemetry.api_endpoints.len(),
                    telemetry.admin_panels.len(),
                    telemetry.technologies.len()
                );
                result.deep = Some(telemetry);
                phases.push(result);
            }
        }

        let mut repass_findings = Vec::new();
        if target.phases.repass {
            if expired(deadline) {
                phase_failures.push("pattern re-pass skipped: deadline expired".to_string());
            } else {
                repass_findings = self.repass(&mut cache);
                log::info!("Pattern re-pass yielded {} findings", repass_findings.len());
            }
        }

        let mut findings: Vec<Finding> = phases
            .iter()
            .flat_map(|p| p.findings.iter().cloned())
            .collect();
        findings.extend(repass_findings);
        rank(&mut findings);

        let total_pages_scanned: usize = phases.iter().map(|p| p.pages_scanned).sum();

        Ok(ScanVerdict {
            target_url: target.url.clone(),
            domain: target.scope_domain(),
            overall_risk_level: risk::overall_risk_level(&findings),
            vulnerability_score: risk::vulnerability_score(&findings),
            coverage_completeness: risk::coverage_completeness(total_pages_scanned),
            stealth_score,
            total_pages_scanned,
            phases,
            findings,
            phase_failures,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Re-run the pattern bank over cached bodies that earlier phases
    /// crawled but never pattern-scanned (disabled content types, mostly).
    fn repass(&self, cache: &mut [PageBody]) -> Vec<Finding> {
        let mut findings = Vec::new();
        let mut scanned = 0;

        for page in cache.iter_mut() {
            if page.pattern_scanned {
                continue;
            }
            if scanned >= REPASS_BODY_CAP {
                break;
            }
            findings.extend(self.extractor.extract(&page.url, &page.body));
            page.pattern_scanned = true;
            scanned += 1;
        }

        findings
    }
}

fn expired(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}

fn origin_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| {
            u.host_str()
                .map(|h| format!("{}://{}", u.scheme(), h))
        })
        .unwrap_or_else(|| url.to_string())
}

/// Highest risk first, confidence breaking ties. Duplicates across phases
/// are kept: the same secret seen twice is corroboration, not noise.
fn rank(findings: &mut [Finding]) {
    findings.sort_by(|a, b| {
        b.risk_level
            .cmp(&a.risk_level)
            .then_with(|| b.confidence.partial_cmp(&a.confidence).unwrap_or(Ordering::Equal))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{FetchOutcome, RequestIdentity};
    use crate::models::RiskLevel;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::collections::HashMap;

    struct MapFetcher {
        pages: HashMap<String, &'static str>,
    }

    #[async_trait]
    impl Fetcher for MapFetcher {
        async fn fetch(
            &self,
            url: &str,
            _identity: &RequestIdentity,
            _proxy: Option<&str>,
        ) -> FetchOutcome {
            match self.pages.get(url) {
                Some(body) => FetchOutcome::Success {
                    status: 200,
                    headers: HashMap::new(),
                    body: Bytes::from_static(body.as_bytes()),
                },
                None => FetchOutcome::Blocked { status: 404 },
            }
        }
    }

    fn basic_only_target(url: &str) -> ScanTarget {
        let mut target = ScanTarget::new(url);
        target.phases.stealth = false;
        target.phases.deep = false;
        target.phases.repass = false;
        target
    }

    #[tokio::test]
    async fn test_single_page_scan_finds_planted_secret() {
        let mut pages = HashMap::new();
        pages.insert(
            "https://host.internal/".to_string(),
            "<html><body>AKIAQ7RZPK3MXW9TFVLP</body></html>",
        );
        let orchestrator = ScanOrchestrator::new(Arc::new(MapFetcher { pages }));

        let verdict = orchestrator
            .scan(&basic_only_target("https://host.internal/"))
            .await
            .unwrap();

        assert_eq!(verdict.total_pages_scanned, 1);
        assert!(verdict
            .findings
            .iter()
            .any(|f| f.pattern_id == "aws_access_key"));
        assert!(verdict.vulnerability_score > 0.0);
    }

    #[tokio::test]
    async fn test_invalid_target_fails_before_io() {
        let orchestrator = ScanOrchestrator::new(Arc::new(MapFetcher {
            pages: HashMap::new(),
        }));
        let result = orchestrator.scan(&basic_only_target("not a url")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_unreachable_target_still_yields_verdict() {
        let orchestrator = ScanOrchestrator::new(Arc::new(MapFetcher {
            pages: HashMap::new(),
        }));
        let verdict = orchestrator
            .scan(&basic_only_target("https://dead.internal/"))
            .await
            .unwrap();
        assert_eq!(verdict.findings.len(), 0);
        assert_eq!(verdict.overall_risk_level, RiskLevel::Low);
    }

    #[test]
    fn test_rank_orders_by_risk_then_confidence() {
        let mk = |risk: RiskLevel, conf: f64| Finding {
            pattern_id: "r".to_string(),
            category: crate::models::Category::ApiKey,
            value: "v".to_string(),
            confidence: conf,
            risk_level: risk,
            location: "l".to_string(),
            context: String::new(),
            entropy: 3.0,
        };
        let mut findings = vec![
            mk(RiskLevel::Low, 0.9),
            mk(RiskLevel::Critical, 0.5),
            mk(RiskLevel::Critical, 0.9),
            mk(RiskLevel::High, 0.7),
        ];
        rank(&mut findings);
        assert_eq!(findings[0].risk_level, RiskLevel::Critical);
        assert!((findings[0].confidence - 0.9).abs() < 1e-9);
        assert_eq!(findings[3].risk_level, RiskLevel::Low);
    }

    #[test]
    fn test_origin_extraction() {
        assert_eq!(
            origin_of("https://example.test/deep/path?q=1"),
            "https://example.test"
        );
    }
}
