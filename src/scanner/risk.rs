//! Risk Scoring
//!
//! Consolidation arithmetic: the weighted vulnerability score, the overall
//! risk bucket and the coverage estimate. Pure functions over the finding
//! multiset so they stay trivially testable.

use crate::models::{Category, Finding, RiskLevel};

/// Pages considered "full coverage" of a typical site.
const COVERAGE_BASELINE_PAGES: usize = 100;

const SCORE_CAP: f64 = 100.0;

/// Business-impact weight of a finding's category.
fn category_weight(category: Category) -> f64 {
    match category {
        Category::Payment => 20.0,
        Category::Database => 15.0,
        Category::CloudProvider => 12.0,
        Category::ApiKey => 10.0,
        Category::AdminPanel => 8.0,
        Category::BackupFile => 7.0,
        Category::SensitiveFile => 6.0,
        Category::InfoDisclosure => 5.0,
        _ => 4.0,
    }
}

fn risk_multiplier(level: RiskLevel) -> f64 {
    match level {
        RiskLevel::Critical => 5.0,
        RiskLevel::High => 3.0,
        RiskLevel::Medium => 1.5,
        RiskLevel::Low => 1.0,
    }
}

/// Weighted sum over every finding, capped at 100.
pub fn vulnerability_score(findings: &[Finding]) -> f64 {
    let score: f64 = findings
        .iter()
        .map(|f| category_weight(f.category) * f.confidence * risk_multiplier(f.risk_level))
        .sum();
    score.min(SCORE_CAP)
}

/// Bucket the whole scan: any critical finding dominates, then a count of
/// high-risk findings, then sheer volume.
pub fn overall_risk_level(findings: &[Finding]) -> RiskLevel {
    if findings.iter().any(|f| f.risk_level == RiskLevel::Critical) {
        return RiskLevel::Critical;
    }
    let high = findings
        .iter()
        .filter(|f| f.risk_level == RiskLevel::High)
        .count();
    if high > 2 {
        return RiskLevel::High;
    }
    if findings.len() > 10 {
        return RiskLevel::Medium;
    }
    RiskLevel::Low
}

/// Fraction of the page baseline actually visited, in [0, 1].
pub fn coverage_completeness(total_pages_scanned: usize) -> f64 {
    (total_pages_scanned as f64 / COVERAGE_BASELINE_PAGES as f64).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(category: Category, risk: RiskLevel, confidence: f64) -> Finding {
        Finding {
            pattern_id: "test_rule".to_string(),
            category,
            value: "zX9mKw2Q8fLp4RvT".to_string(),
            confidence,
            risk_level: risk,
            location: "https://example.test/".to_string(),
            context: String::new(),
            entropy: 3.5,
        }
    }

    #[test]
    fn test_score_weights_payment_over_default() {
        let payment = vec![finding(Category::Payment, RiskLevel::High, 1.0)];
        let generic = vec![finding(Category::Analytics, RiskLevel::High, 1.0)];
        assert!(vulnerability_score(&payment) > vulnerability_score(&generic));
        assert!((vulnerability_score(&payment) - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_score_capped_at_hundred() {
        let findings: Vec<_> = (0..20)
            .map(|_| finding(Category::Payment, RiskLevel::Critical, 1.0))
            .collect();
        assert!((vulnerability_score(&findings) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_score_scales_with_confidence() {
        let full = vec![finding(Category::Database, RiskLevel::Critical, 1.0)];
        let half = vec![finding(Category::Database, RiskLevel::Critical, 0.5)];
        assert!((vulnerability_score(&half) * 2.0 - vulnerability_score(&full)).abs() < 1e-9);
    }

    #[test]
    fn test_empty_findings_score_zero() {
        assert_eq!(vulnerability_score(&[]), 0.0);
        assert_eq!(overall_risk_level(&[]), RiskLevel::Low);
    }

    #[test]
    fn test_any_critical_dominates() {
        let findings = vec![
            finding(Category::Analytics, RiskLevel::Low, 0.3),
            finding(Category::Certificate, RiskLevel::Critical, 0.99),
        ];
        assert_eq!(overall_risk_level(&findings), RiskLevel::Critical);
    }

    #[test]
    fn test_high_count_threshold() {
        let two_high: Vec<_> = (0..2)
            .map(|_| finding(Category::ApiKey, RiskLevel::High, 0.9))
            .collect();
        assert_eq!(overall_risk_level(&two_high), RiskLevel::Low);

        let three_high: Vec<_> = (0..3)
            .map(|_| finding(Category::ApiKey, RiskLevel::High, 0.9))
            .collect();
        assert_eq!(overall_risk_level(&three_high), RiskLevel::High);
    }

    #[test]
    fn test_volume_threshold() {
        let eleven_low: Vec<_> = (0..11)
            .map(|_| finding(Category::Analytics, RiskLevel::Low, 0.4))
            .collect();
        assert_eq!(overall_risk_level(&eleven_low), RiskLevel::Medium);
    }

    #[test]
    fn test_coverage_saturates() {
        assert_eq!(coverage_completeness(0), 0.0);
        assert!((coverage_completeness(50) - 0.5).abs() < 1e-9);
        assert_eq!(coverage_completeness(100), 1.0);
        assert_eq!(coverage_completeness(500), 1.0);
    }
}
