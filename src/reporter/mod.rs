//! Report Generation
//!
//! Turns a consolidated verdict into the JSON report written next to the
//! invocation: executive summary, breakdowns, per-phase results, threshold
//! driven recommendations and a redacted detail section for the top
//! findings. Secret values are truncated here and only here.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::errors::{VigilError, VigilResult};
use crate::models::{Finding, PhaseResult, RiskLevel, ScanTarget, ScanVerdict};

/// Findings listed in full (redacted) detail.
const DETAIL_LIMIT: usize = 10;

/// How many leading characters of a secret value survive redaction.
const VALUE_PREVIEW_CHARS: usize = 8;

#[derive(Debug, Serialize)]
pub struct ScanReport {
    pub executive_summary: ExecutiveSummary,
    pub findings_breakdown: FindingsBreakdown,
    pub scanner_results: Vec<PhaseSummary>,
    pub security_recommendations: Vec<String>,
    pub technical_details: TechnicalDetails,
    pub critical_findings_detail: Vec<FindingDetail>,
}

#[derive(Debug, Serialize)]
pub struct ExecutiveSummary {
    pub target_url: String,
    pub domain: String,
    pub overall_risk_level: RiskLevel,
    pub vulnerability_score: f64,
    pub total_findings: usize,
    pub coverage_completeness: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stealth_score: Option<f64>,
    pub total_pages_scanned: usize,
}

#[derive(Debug, Serialize)]
pub struct FindingsBreakdown {
    pub by_risk_level: BTreeMap<String, usize>,
    pub by_pattern: BTreeMap<String, usize>,
    pub by_location_type: BTreeMap<String, usize>,
}

#[derive(Debug, Serialize)]
pub struct PhaseSummary {
    pub mode: String,
    pub pages_scanned: usize,
    pub findings: usize,
    pub duration_secs: f64,
    pub blocked_requests: usize,
    pub failed_requests: usize,
}

#[derive(Debug, Serialize)]
pub struct TechnicalDetails {
    pub scanner_version: String,
    pub host: String,
    pub user: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub phase_failures: Vec<String>,
    /// Effective configuration, echoed for reproducibility
    pub configuration: ScanTarget,
}

#[derive(Debug, Serialize)]
pub struct FindingDetail {
    pub pattern_id: String,
    pub category: String,
    pub risk_level: RiskLevel,
    pub confidence: f64,
    pub location: String,
    /// Leading characters only; full values never leave the process
    pub value_preview: String,
    pub context: String,
}

/// Classify a finding location for the breakdown table.
fn location_type(location: &str) -> &'static str {
    if location.starts_with("zip:") {
        return "archive";
    }
    let path = location.split(['?', '#']).next().unwrap_or(location);
    let lower = path.to_lowercase();
    if lower.contains(".env") {
        "env_file"
    } else if lower.ends_with(".js") || lower.ends_with(".mjs") {
        "javascript"
    } else if lower.ends_with(".json") || lower.contains(".json.") {
        "json"
    } else if lower.ends_with(".css") {
        "stylesheet"
    } else if lower.ends_with(".xml") {
        "xml"
    } else {
        "web_page"
    }
}

fn redact(value: &str) -> String {
    let preview: String = value.chars().take(VALUE_PREVIEW_CHARS).collect();
    if value.chars().count() > VALUE_PREVIEW_CHARS {
        format!("{preview}...")
    } else {
        preview
    }
}

fn recommendations(verdict: &ScanVerdict) -> Vec<String> {
    let mut recs = Vec::new();

    let critical = verdict
        .findings
        .iter()
        .filter(|f| f.risk_level == RiskLevel::Critical)
        .count();
    let high = verdict
        .findings
        .iter()
        .filter(|f| f.risk_level == RiskLevel::High)
        .count();

    if critical > 0 {
        recs.push(format!(
            "URGENT: {critical} critical exposure(s) found. Rotate the affected \
             credentials immediately and audit access logs for abuse."
        ));
    }
    if high > 2 {
        recs.push(format!(
            "{high} high-risk findings indicate systemic secret leakage. Move \
             secrets out of client-reachable files into a managed secret store."
        ));
    }
    if verdict
        .findings
        .iter()
        .any(|f| f.location.starts_with("zip:"))
    {
        recs.push(
            "Archives containing secrets are publicly reachable. Remove backup \
             and source archives from the web root."
                .to_string(),
        );
    }
    if verdict.stealth_score.is_some_and(|s| s < 0.7) {
        recs.push(
            "The scan was throttled or challenged; perimeter defenses reacted. \
             Verify that the same controls also cover credential-bearing paths."
                .to_string(),
        );
    }
    if verdict.coverage_completeness < 0.5 {
        recs.push(
            "Coverage was limited. Re-run with a higher page budget or a longer \
             deadline for a fuller picture."
                .to_string(),
        );
    }
    if recs.is_empty() {
        recs.push(
            "No significant exposures detected. Keep secrets in server-side \
             configuration and re-scan after major deployments."
                .to_string(),
        );
    }

    recs
}

fn phase_summary(phase: &PhaseResult) -> PhaseSummary {
    PhaseSummary {
        mode: phase.mode.to_string(),
        pages_scanned: phase.pages_scanned,
        findings: phase.findings.len(),
        duration_secs: phase.duration_secs,
        blocked_requests: phase.blocked_requests,
        failed_requests: phase.failed_requests,
    }
}

fn detail(finding: &Finding) -> FindingDetail {
    FindingDetail {
        pattern_id: finding.pattern_id.clone(),
        category: finding.category.as_str().to_string(),
        risk_level: finding.risk_level,
        confidence: finding.confidence,
        location: finding.location.clone(),
        value_preview: redact(&finding.value),
        context: finding.context.clone(),
    }
}

/// Assemble the full report from a verdict and the target it came from.
pub fn build_report(verdict: &ScanVerdict, target: &ScanTarget) -> ScanReport {
    let mut by_risk_level = BTreeMap::new();
    let mut by_pattern = BTreeMap::new();
    let mut by_location_type = BTreeMap::new();
    for f in &verdict.findings {
        *by_risk_level.entry(f.risk_level.to_string()).or_insert(0) += 1;
        *by_pattern.entry(f.pattern_id.clone()).or_insert(0) += 1;
        *by_location_type
            .entry(location_type(&f.location).to_string())
            .or_insert(0) += 1;
    }

    // Findings arrive ranked; the detail section is just the head
    let critical_findings_detail = verdict
        .findings
        .iter()
        .take(DETAIL_LIMIT)
        .map(detail)
        .collect();

    ScanReport {
        executive_summary: ExecutiveSummary {
            target_url: verdict.target_url.clone(),
            domain: verdict.domain.clone(),
            overall_risk_level: verdict.overall_risk_level,
            vulnerability_score: verdict.vulnerability_score,
            total_findings: verdict.findings.len(),
            coverage_completeness: verdict.coverage_completeness,
            stealth_score: verdict.stealth_score,
            total_pages_scanned: verdict.total_pages_scanned,
        },
        findings_breakdown: FindingsBreakdown {
            by_risk_level,
            by_pattern,
            by_location_type,
        },
        scanner_results: verdict.phases.iter().map(phase_summary).collect(),
        security_recommendations: recommendations(verdict),
        technical_details: TechnicalDetails {
            scanner_version: env!("CARGO_PKG_VERSION").to_string(),
            host: whoami::fallible::hostname().unwrap_or_else(|_| "unknown".to_string()),
            user: whoami::username(),
            started_at: verdict.started_at,
            finished_at: verdict.finished_at,
            duration_secs: (verdict.finished_at - verdict.started_at)
                .num_milliseconds() as f64
                / 1000.0,
            phase_failures: verdict.phase_failures.clone(),
            configuration: target.clone(),
        },
        critical_findings_detail,
    }
}

/// Write the report as `<host>_report_<timestamp>.json` under `output_dir`.
/// Returns the written path.
pub fn write_report(report: &ScanReport, output_dir: &Path) -> VigilResult<PathBuf> {
    let host: String = report
        .executive_summary
        .domain
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect();
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let path = output_dir.join(format!("{host}_report_{timestamp}.json"));

    let json = serde_json::to_string_pretty(report)?;
    fs::write(&path, json).map_err(|e| VigilError::io(e, path.clone()))?;
    log::info!("Report written to {}", path.display());
    Ok(path)
}
