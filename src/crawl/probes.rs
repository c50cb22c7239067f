//! Discovery Probes
//!
//! Active enumeration beyond link-following: common directories, well-known
//! sensitive files, backup copies of discovered source files, API roots and
//! admin panels. Every probe is error-isolated and self rate-limited; a dead
//! endpoint never aborts the pass.

use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use url::Url;

use crate::extract::ContentExtractor;
use crate::fetch::{FetchOutcome, Fetcher, RequestIdentity};
use crate::models::{AnalyzedFile, DeepTelemetry, Finding, ScanTarget};

const COMMON_DIRECTORIES: &[&str] = &[
    "admin", "administrator", "login", "wp-admin", "wp-content", "wp-includes", "dashboard",
    "panel", "cpanel", "phpmyadmin", "api", "apis", "rest", "graphql", "v1", "v2", "backup",
    "backups", "bak", "old", "tmp", "temp", "test", "tests", "dev", "staging", "stage", "demo",
    "config", "configs", "conf", "settings", "setup", "install", "uploads", "upload", "files",
    "file", "assets", "static", "media", "images", "img", "css", "js", "scripts", "includes",
    "lib", "libs", "vendor", "node_modules", "src", "source", "private", "secret", "hidden",
    "internal", "logs", "log", "data", "database", "db", "sql", "dump",
];

const SENSITIVE_FILES: &[&str] = &[
    ".env",
    ".env.local",
    ".env.production",
    ".env.backup",
    "config.json",
    "config.yml",
    "config.yaml",
    "settings.json",
    "appsettings.json",
    "app.config",
    "web.config",
    "wp-config.php.bak",
    "database.yml",
    "credentials.json",
    "secrets.json",
    "secrets.yml",
    ".git/config",
    ".gitignore",
    ".htaccess",
    ".htpasswd",
    "composer.json",
    "package.json",
    "Dockerfile",
    "docker-compose.yml",
    "id_rsa",
    "id_rsa.pub",
    "backup.sql",
    "dump.sql",
    "phpinfo.php",
    "robots.txt",
    "sitemap.xml",
    "crossdomain.xml",
];

const BACKUP_SUFFIXES: &[&str] = &[".bak", ".old", "~", ".swp", ".orig", ".save"];

const API_ROOTS: &[&str] = &["api", "api/v1", "api/v2", "graphql", "rest", "services"];

const API_DOC_PATHS: &[&str] = &["docs", "swagger", "swagger.json", "openapi.json", "redoc"];

const ADMIN_PATHS: &[&str] = &[
    "admin",
    "admin/login",
    "admin.php",
    "administrator",
    "wp-admin",
    "wp-login.php",
    "login",
    "signin",
    "dashboard",
    "manage",
    "management",
    "console",
    "cpanel",
    "phpmyadmin",
    "pma",
    "adminer.php",
    "admin/dashboard",
    "backend",
    "cms",
    "control",
    "moderator",
    "webadmin",
    "adminpanel",
    "user/login",
    "account/login",
];

/// How many directory wordlist entries one pass probes.
const DIRECTORY_SAMPLE: usize = 50;

/// How many discovered source-like URLs get backup-suffix probing.
const BACKUP_CANDIDATES: usize = 10;

/// Pause between consecutive probe requests.
const PROBE_DELAY_MS: u64 = 50;

/// Runs the active discovery pass of the deep phase.
pub struct DiscoveryProbes {
    fetcher: Arc<dyn Fetcher>,
    extractor: Arc<ContentExtractor>,
}

impl DiscoveryProbes {
    pub fn new(fetcher: Arc<dyn Fetcher>, extractor: Arc<ContentExtractor>) -> Self {
        Self { fetcher, extractor }
    }

    /// Run all enabled probe families against the target root, folding
    /// discoveries into `telemetry` and secrets into the returned findings.
    pub async fn run(
        &self,
        target: &ScanTarget,
        discovered_urls: &[String],
        telemetry: &mut DeepTelemetry,
    ) -> Vec<Finding> {
        let Ok(root) = Url::parse(&target.url) else {
            return Vec::new();
        };
        let mut findings = Vec::new();

        self.probe_directories(&root, telemetry).await;
        findings.extend(self.probe_sensitive_files(&root, telemetry).await);
        if target.probe_backups {
            findings.extend(self.probe_backups(discovered_urls, telemetry).await);
        }
        if target.probe_apis {
            self.probe_api_roots(&root, telemetry).await;
        }
        if target.probe_admin {
            findings.extend(self.probe_admin_panels(&root, telemetry).await);
        }

        findings
    }

    async fn probe(&self, url: &str) -> FetchOutcome {
        tokio::time::sleep(Duration::from_millis(PROBE_DELAY_MS)).await;
        self.fetcher
            .fetch(url, &RequestIdentity::default(), None)
            .await
    }

    /// Common-directory enumeration over a shuffled wordlist sample.
    /// 200/301/302/403 all count: a 403 directory exists even when listing
    /// is denied.
    async fn probe_directories(&self, root: &Url, telemetry: &mut DeepTelemetry) {
        let mut sample: Vec<&str> = COMMON_DIRECTORIES.to_vec();
        sample.shuffle(&mut rand::thread_rng());
        sample.truncate(DIRECTORY_SAMPLE);

        for dir in sample {
            let Ok(url) = root.join(&format!("{dir}/")) else {
                continue;
            };
            match self.probe(url.as_str()).await {
                FetchOutcome::Success { status, .. } if status == 200 => {
                    telemetry.discovered_urls.push(url.to_string());
                }
                FetchOutcome::Redirect {
                    status: 301 | 302, ..
                }
                | FetchOutcome::Blocked { status: 403 } => {
                    telemetry.discovered_urls.push(url.to_string());
                }
                _ => {}
            }
        }
    }

    /// Well-known sensitive filenames. Every 200 goes through full content
    /// extraction and filename categorization.
    async fn probe_sensitive_files(
        &self,
        root: &Url,
        telemetry: &mut DeepTelemetry,
    ) -> Vec<Finding> {
        let mut findings = Vec::new();

        for name in SENSITIVE_FILES {
            let Ok(url) = root.join(name) else {
                continue;
            };
            if let FetchOutcome::Success { body, .. } = self.probe(url.as_str()).await {
                let file_findings = self.extractor.extract(url.as_str(), &body);
                let category = categorize_sensitive_file(name);
                telemetry.analyzed_files.push(AnalyzedFile {
                    url: url.to_string(),
                    kind: category.to_string(),
                    findings: file_findings.len(),
                });
                telemetry
                    .sensitive_files
                    .entry(category.to_string())
                    .or_default()
                    .push(url.to_string());
                findings.extend(file_findings);
                log::info!("Exposed sensitive file: {url}");
            }
        }

        findings
    }

    /// Backup-suffix probing against a bounded subset of discovered
    /// source-like URLs (scripts, configs, pages with extensions).
    async fn probe_backups(
        &self,
        discovered_urls: &[String],
        telemetry: &mut DeepTelemetry,
    ) -> Vec<Finding> {
        let candidates: Vec<&String> = discovered_urls
            .iter()
            .filter(|u| {
                let path = u.split(['?', '#']).next().unwrap_or(u);
                path.rsplit('/')
                    .next()
                    .is_some_and(|f| f.contains('.') && !f.ends_with('/'))
            })
            .take(BACKUP_CANDIDATES)
            .collect();

        let mut findings = Vec::new();
        for original in candidates {
            for suffix in BACKUP_SUFFIXES {
                let url = format!("{original}{suffix}");
                if let FetchOutcome::Success { body, .. } = self.probe(&url).await {
                    let file_findings = self.extractor.extract(&url, &body);
                    telemetry.analyzed_files.push(AnalyzedFile {
                        url: url.clone(),
                        kind: "backup".to_string(),
                        findings: file_findings.len(),
                    });
                    telemetry
                        .sensitive_files
                        .entry("backup".to_string())
                        .or_default()
                        .push(url.clone());
                    findings.extend(file_findings);
                    log::info!("Exposed backup copy: {url}");
                }
            }
        }
        findings
    }

    /// API-root probing: 200/401/403 all prove the route exists. Confirmed
    /// roots get documentation-path follow-ups.
    async fn probe_api_roots(&self, root: &Url, telemetry: &mut DeepTelemetry) {
        for api in API_ROOTS {
            let Ok(url) = root.join(&format!("{api}/")) else {
                continue;
            };
            let confirmed = match self.probe(url.as_str()).await {
                FetchOutcome::Success { status: 200, .. } => true,
                FetchOutcome::Blocked {
                    status: 401 | 403, ..
                } => true,
                _ => false,
            };
            if !confirmed {
                continue;
            }
            telemetry.api_endpoints.push(url.to_string());

            for doc in API_DOC_PATHS {
                let Ok(doc_url) = url.join(doc) else {
                    continue;
                };
                if matches!(
                    self.probe(doc_url.as_str()).await,
                    FetchOutcome::Success { status: 200, .. }
                ) {
                    telemetry.api_endpoints.push(doc_url.to_string());
                }
            }
        }
    }

    /// Admin-panel probing: 200/301/302/401/403 count as a panel; a 200
    /// response body additionally goes through extraction.
    async fn probe_admin_panels(&self, root: &Url, telemetry: &mut DeepTelemetry) -> Vec<Finding> {
        let mut findings = Vec::new();

        for path in ADMIN_PATHS {
            let Ok(url) = root.join(path) else {
                continue;
            };
            match self.probe(url.as_str()).await {
                FetchOutcome::Success { status: 200, body, .. } => {
                    telemetry.admin_panels.push(url.to_string());
                    findings.extend(self.extractor.extract(url.as_str(), &body));
                }
                FetchOutcome::Redirect {
                    status: 301 | 302, ..
                }
                | FetchOutcome::Blocked {
                    status: 401 | 403, ..
                } => {
                    telemetry.admin_panels.push(url.to_string());
                }
                _ => {}
            }
        }

        findings
    }
}

/// Bucket a sensitive filename by what it likely leaks.
pub fn categorize_sensitive_file(name: &str) -> &'static str {
    let lower = name.to_lowercase();
    if lower.contains(".env") {
        "environment"
    } else if lower.contains("sql") || lower.contains("database") || lower.contains("dump") {
        "database"
    } else if lower.contains("id_rsa") || lower.contains(".pem") || lower.contains("htpasswd") {
        "credentials"
    } else if lower.contains("secret") || lower.contains("credential") {
        "credentials"
    } else if lower.contains(".git") {
        "source_control"
    } else if lower.contains("config") || lower.contains("settings") || lower.contains(".htaccess")
    {
        "configuration"
    } else if lower.contains("docker") || lower.contains("compose") {
        "infrastructure"
    } else {
        "disclosure"
    }
}
