//! Vigil
//!
//! Credential exposure scanner for web applications. A budgeted crawl over
//! one target domain feeds every fetched body through a compiled bank of
//! secret-detection rules, with optional evasion-driven stealth crawling and
//! active discovery probing, then consolidates everything into a single
//! risk verdict and JSON report.
//!
//! The pipeline, top to bottom:
//! - [`patterns::PatternBank`]: regex rules, false-positive suppression,
//!   entropy-adjusted confidence
//! - [`extract::ContentExtractor`]: typed extraction (JSON, XML, archives,
//!   env files, generic text)
//! - [`fetch`]: classified HTTP outcomes behind the [`fetch::Fetcher`] trait,
//!   plus the evasion controller
//! - [`crawl`]: frontier, crawl engine, discovery probes, fingerprinting
//! - [`scanner::ScanOrchestrator`]: the phase state machine and consolidation
//! - [`reporter`]: the redacted JSON report

pub mod cli;
pub mod crawl;
pub mod errors;
pub mod extract;
pub mod fetch;
pub mod models;
pub mod patterns;
pub mod reporter;
pub mod scanner;

pub use errors::{VigilError, VigilResult};
pub use models::{Finding, RiskLevel, ScanMode, ScanTarget, ScanVerdict};
pub use patterns::PatternBank;
pub use scanner::ScanOrchestrator;
