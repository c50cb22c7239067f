use clap::{Parser, ValueEnum};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::errors::{VigilError, VigilResult};
use crate::models::{PhaseToggles, ScanTarget};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "vigil",
    about = "Vigil - Credential exposure scanner for web applications",
    version
)]
pub struct Args {
    /// Target URL to scan (http or https)
    pub url: String,

    /// Domain scope override (defaults to the target host)
    #[arg(short, long, default_value = "")]
    pub domain: String,

    /// Scan profile (which pipeline phases run)
    #[arg(short, long, default_value = "full")]
    pub mode: ScanProfile,

    /// Maximum crawl depth from the root URL
    #[arg(long, default_value = "3")]
    pub max_depth: usize,

    /// Maximum pages visited per crawl phase
    #[arg(long, default_value = "100")]
    pub max_pages: usize,

    /// Skip JavaScript files during content scanning
    #[arg(long)]
    pub no_js: bool,

    /// Skip stylesheets during content scanning
    #[arg(long)]
    pub no_css: bool,

    /// Skip zip archives during content scanning
    #[arg(long)]
    pub no_archives: bool,

    /// Skip document files during content scanning
    #[arg(long)]
    pub no_documents: bool,

    /// Skip API endpoint probing
    #[arg(long)]
    pub no_api_probes: bool,

    /// Skip admin panel probing
    #[arg(long)]
    pub no_admin_probes: bool,

    /// Skip backup-file probing
    #[arg(long)]
    pub no_backup_probes: bool,

    /// Follow subdomains of the scope domain
    #[arg(long)]
    pub subdomains: bool,

    /// Cookie in name=value form for authenticated scans (repeatable)
    #[arg(long = "cookie")]
    pub cookies: Vec<String>,

    /// Extra request header in "Name: Value" form (repeatable)
    #[arg(long = "header")]
    pub headers: Vec<String>,

    /// Proxy URL for the rotation pool (repeatable)
    #[arg(long = "proxy")]
    pub proxies: Vec<String>,

    /// Simultaneous fetches in basic/deep phases (0 = auto-detect)
    #[arg(short, long, default_value = "0")]
    pub concurrency: usize,

    /// Per-request timeout in seconds
    #[arg(long, default_value = "30")]
    pub timeout: u64,

    /// Overall scan deadline in seconds (best-effort verdict on expiry)
    #[arg(long)]
    pub deadline: Option<u64>,

    /// Directory the JSON report is written to
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,

    /// Enable verbose logging of all operations
    #[arg(short, long)]
    pub verbose: bool,

    /// Hide the banner and progress output
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum ScanProfile {
    /// Fast concurrent crawl with pattern scanning only
    Basic,
    /// Sequential evasion-driven crawl
    Stealth,
    /// Concurrent crawl plus active discovery probing
    Deep,
    /// All phases including the final pattern re-pass
    Full,
}

impl std::fmt::Display for ScanProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanProfile::Basic => write!(f, "Basic"),
            ScanProfile::Stealth => write!(f, "Stealth"),
            ScanProfile::Deep => write!(f, "Deep"),
            ScanProfile::Full => write!(f, "Full"),
        }
    }
}

impl ScanProfile {
    fn phases(self) -> PhaseToggles {
        match self {
            ScanProfile::Basic => PhaseToggles {
                basic: true,
                stealth: false,
                deep: false,
                repass: true,
            },
            ScanProfile::Stealth => PhaseToggles {
                basic: false,
                stealth: true,
                deep: false,
                repass: true,
            },
            ScanProfile::Deep => PhaseToggles {
                basic: true,
                stealth: false,
                deep: true,
                repass: true,
            },
            ScanProfile::Full => PhaseToggles::default(),
        }
    }
}

fn parse_pairs(raw: &[String], sep: char, what: &str) -> VigilResult<HashMap<String, String>> {
    let mut out = HashMap::new();
    for entry in raw {
        let Some((name, value)) = entry.split_once(sep) else {
            return Err(VigilError::config(format!(
                "invalid {what} '{entry}', expected name{sep}value"
            )));
        };
        out.insert(name.trim().to_string(), value.trim().to_string());
    }
    Ok(out)
}

impl Args {
    /// Build the validated scan target from the parsed arguments.
    pub fn to_target(&self) -> VigilResult<ScanTarget> {
        let mut target = ScanTarget::new(self.url.clone());
        target.domain = self.domain.clone();
        target.max_depth = self.max_depth;
        target.max_pages = self.max_pages;
        target.scan_javascript = !self.no_js;
        target.scan_css = !self.no_css;
        target.scan_archives = !self.no_archives;
        target.scan_documents = !self.no_documents;
        target.probe_apis = !self.no_api_probes;
        target.probe_admin = !self.no_admin_probes;
        target.probe_backups = !self.no_backup_probes;
        target.follow_subdomains = self.subdomains;
        target.cookies = parse_pairs(&self.cookies, '=', "cookie")?;
        target.headers = parse_pairs(&self.headers, ':', "header")?;
        target.proxies = self.proxies.clone();
        target.concurrency = if self.concurrency == 0 {
            num_cpus::get().min(16)
        } else {
            self.concurrency
        };
        target.timeout_secs = self.timeout;
        target.deadline_secs = self.deadline;
        target.phases = self.mode.phases();

        target.validate()?;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["vigil", "https://example.test/"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn test_defaults_map_to_full_scan() {
        let target = args(&[]).to_target().unwrap();
        assert_eq!(target.max_depth, 3);
        assert_eq!(target.max_pages, 100);
        assert!(target.phases.basic && target.phases.stealth && target.phases.deep);
        assert!(target.concurrency > 0);
    }

    #[test]
    fn test_profile_selects_phases() {
        let target = args(&["--mode", "basic"]).to_target().unwrap();
        assert!(target.phases.basic);
        assert!(!target.phases.stealth);
        assert!(!target.phases.deep);
        assert!(target.phases.repass);

        let target = args(&["--mode", "stealth"]).to_target().unwrap();
        assert!(!target.phases.basic);
        assert!(target.phases.stealth);
    }

    #[test]
    fn test_negative_toggles() {
        let target = args(&["--no-js", "--no-archives"]).to_target().unwrap();
        assert!(!target.scan_javascript);
        assert!(!target.scan_archives);
        assert!(target.scan_css);
    }

    #[test]
    fn test_cookie_and_header_parsing() {
        let target = args(&[
            "--cookie",
            "session=abc123",
            "--header",
            "Authorization: Bearer tok",
        ])
        .to_target()
        .unwrap();
        assert_eq!(target.cookies["session"], "abc123");
        assert_eq!(target.headers["Authorization"], "Bearer tok");
    }

    #[test]
    fn test_malformed_cookie_rejected() {
        assert!(args(&["--cookie", "no-separator"]).to_target().is_err());
    }

    #[test]
    fn test_invalid_url_rejected() {
        let parsed = Args::parse_from(["vigil", "not a url"]);
        assert!(parsed.to_target().is_err());
    }
}
