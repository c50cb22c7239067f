//! Core Data Model
//!
//! Findings, risk levels, scan targets and per-phase results shared by the
//! pattern bank, the crawlers and the orchestrator. Findings are immutable
//! once created; consolidation only filters and re-ranks, never mutates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

use crate::errors::{VigilError, VigilResult};

/// Ordinal severity attached to every detection rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "LOW"),
            RiskLevel::Medium => write!(f, "MEDIUM"),
            RiskLevel::High => write!(f, "HIGH"),
            RiskLevel::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Coarse grouping for findings. Pattern-rule categories plus the
/// classifications produced by discovery probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    CloudProvider,
    Payment,
    Database,
    Certificate,
    Authentication,
    Environment,
    Configuration,
    Encoded,
    SocialMedia,
    Analytics,
    Infrastructure,
    UrlCredential,
    Development,
    Communication,
    ApiKey,
    AdminPanel,
    BackupFile,
    SensitiveFile,
    InfoDisclosure,
    Directory,
}

impl Category {
    /// snake_case name as it appears in reports
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::CloudProvider => "cloud_provider",
            Category::Payment => "payment",
            Category::Database => "database",
            Category::Certificate => "certificate",
            Category::Authentication => "authentication",
            Category::Environment => "environment",
            Category::Configuration => "configuration",
            Category::Encoded => "encoded",
            Category::SocialMedia => "social_media",
            Category::Analytics => "analytics",
            Category::Infrastructure => "infrastructure",
            Category::UrlCredential => "url_credential",
            Category::Development => "development",
            Category::Communication => "communication",
            Category::ApiKey => "api_key",
            Category::AdminPanel => "admin_panel",
            Category::BackupFile => "backup_file",
            Category::SensitiveFile => "sensitive_file",
            Category::InfoDisclosure => "info_disclosure",
            Category::Directory => "directory",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single detected secret or exposure signal.
///
/// `value` holds the literal candidate secret, never truncated or hashed at
/// this layer: confidence and entropy scoring need the raw bytes. Redaction
/// is the reporter's job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Identifier of the rule that matched (e.g. `aws_access_key`)
    pub pattern_id: String,
    /// Coarse grouping
    pub category: Category,
    /// The matched candidate secret
    pub value: String,
    /// Rule base confidence adjusted by entropy, always in [0, 1]
    pub confidence: f64,
    /// Fixed per rule
    pub risk_level: RiskLevel,
    /// URL or pseudo-URL (`zip:<url>:<member>`, `<url>.<dotted.path>`)
    pub location: String,
    /// Fixed-width window of surrounding text for human review
    pub context: String,
    /// Shannon entropy of `value` in bits per symbol
    pub entropy: f64,
}

/// Which crawl strategy produced a phase result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    Basic,
    Stealth,
    Deep,
}

impl std::fmt::Display for ScanMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanMode::Basic => write!(f, "basic"),
            ScanMode::Stealth => write!(f, "stealth"),
            ScanMode::Deep => write!(f, "deep"),
        }
    }
}

/// Which phases of the orchestrator pipeline run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PhaseToggles {
    pub basic: bool,
    pub stealth: bool,
    pub deep: bool,
    pub repass: bool,
}

impl Default for PhaseToggles {
    fn default() -> Self {
        Self {
            basic: true,
            stealth: true,
            deep: true,
            repass: true,
        }
    }
}

/// One scan request's configuration. Created once per invocation and
/// read-only thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanTarget {
    /// Root URL the crawl starts from
    pub url: String,
    /// Domain scope; derived from the root URL when empty
    pub domain: String,
    /// Maximum crawl depth from the root
    pub max_depth: usize,
    /// Maximum number of pages visited per crawl mode
    pub max_pages: usize,
    /// Content-type toggles
    pub scan_javascript: bool,
    pub scan_css: bool,
    pub scan_archives: bool,
    pub scan_documents: bool,
    /// Discovery toggles
    pub probe_apis: bool,
    pub probe_admin: bool,
    pub probe_backups: bool,
    /// Scope policy
    pub follow_subdomains: bool,
    pub follow_external_links: bool,
    /// Authentication material for authenticated scans
    pub cookies: HashMap<String, String>,
    pub headers: HashMap<String, String>,
    /// Proxy pool rotated by the evasion controller
    pub proxies: Vec<String>,
    /// Simultaneous in-flight fetches (basic/deep modes)
    pub concurrency: usize,
    /// Per-fetch timeout in seconds
    pub timeout_secs: u64,
    /// Optional overall deadline; on expiry a best-effort verdict is produced
    pub deadline_secs: Option<u64>,
    /// Which pipeline phases run
    pub phases: PhaseToggles,
}

impl ScanTarget {
    /// New target with the default budgets and all toggles enabled.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            domain: String::new(),
            max_depth: 3,
            max_pages: 100,
            scan_javascript: true,
            scan_css: true,
            scan_archives: true,
            scan_documents: true,
            probe_apis: true,
            probe_admin: true,
            probe_backups: true,
            follow_subdomains: false,
            follow_external_links: false,
            cookies: HashMap::new(),
            headers: HashMap::new(),
            proxies: Vec::new(),
            concurrency: 8,
            timeout_secs: 30,
            deadline_secs: None,
            phases: PhaseToggles::default(),
        }
    }

    /// Fail-fast validation, run before any network activity.
    pub fn validate(&self) -> VigilResult<()> {
        let parsed = Url::parse(&self.url).map_err(|e| VigilError::url(e, self.url.clone()))?;
        match parsed.scheme() {
            "http" | "https" => {}
            other => {
                return Err(VigilError::config(format!(
                    "unsupported URL scheme '{other}', expected http or https"
                )))
            }
        }
        if parsed.host_str().is_none() {
            return Err(VigilError::config("target URL has no host"));
        }
        if self.max_depth == 0 {
            return Err(VigilError::config("max_depth must be greater than zero"));
        }
        if self.max_pages == 0 {
            return Err(VigilError::config("max_pages must be greater than zero"));
        }
        if self.concurrency == 0 {
            return Err(VigilError::config("concurrency must be greater than zero"));
        }
        if self.timeout_secs == 0 {
            return Err(VigilError::config("timeout must be greater than zero"));
        }
        Ok(())
    }

    /// Effective domain scope: the configured domain, or the root URL's host.
    pub fn scope_domain(&self) -> String {
        if !self.domain.is_empty() {
            return self.domain.clone();
        }
        Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default()
    }
}

/// Stealth-mode telemetry captured by the evasion controller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StealthTelemetry {
    /// Distinct evasion techniques applied at least once
    pub techniques_applied: Vec<String>,
    /// Observed push-back events (anti-bot challenges, rate limits)
    pub detection_events: Vec<String>,
    pub blocked_requests: usize,
    pub pages_fetched: usize,
    /// Derived score in [0, 1]
    pub stealth_score: f64,
}

/// Per-file metadata recorded during deep discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzedFile {
    pub url: String,
    pub kind: String,
    pub findings: usize,
}

/// Deep-crawl telemetry: everything discovery turned up beyond findings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeepTelemetry {
    pub discovered_urls: Vec<String>,
    pub analyzed_files: Vec<AnalyzedFile>,
    pub api_endpoints: Vec<String>,
    pub admin_panels: Vec<String>,
    /// Sensitive files keyed by filename category (environment, database, ...)
    pub sensitive_files: HashMap<String, Vec<String>>,
    /// Technology name -> evidence that triggered the match
    pub technologies: HashMap<String, String>,
}

/// Result of a single crawl mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseResult {
    pub mode: ScanMode,
    pub findings: Vec<Finding>,
    pub pages_scanned: usize,
    pub duration_secs: f64,
    pub blocked_requests: usize,
    pub failed_requests: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stealth: Option<StealthTelemetry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deep: Option<DeepTelemetry>,
}

impl PhaseResult {
    pub fn new(mode: ScanMode) -> Self {
        Self {
            mode,
            findings: Vec::new(),
            pages_scanned: 0,
            duration_secs: 0.0,
            blocked_requests: 0,
            failed_requests: 0,
            stealth: None,
            deep: None,
        }
    }
}

/// Consolidated outcome of a whole scan. Written only by the orchestrator's
/// consolidation step, read-only after that. Partial results are always a
/// valid verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanVerdict {
    pub target_url: String,
    pub domain: String,
    pub phases: Vec<PhaseResult>,
    /// Union of all phase findings plus the final pattern re-pass.
    /// Cross-phase duplicates are kept by design: corroboration matters.
    pub findings: Vec<Finding>,
    pub overall_risk_level: RiskLevel,
    pub vulnerability_score: f64,
    pub coverage_completeness: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stealth_score: Option<f64>,
    pub total_pages_scanned: usize,
    /// Notes for phases that failed internally; later phases still ran
    pub phase_failures: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}
