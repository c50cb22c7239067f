//! Technology Fingerprinting
//!
//! One root fetch, three evidence sources: the `server` header, the
//! `x-powered-by` header and body signatures. Matches are advisory; they
//! steer later probing and end up in the report, never in findings.

use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;

use crate::fetch::{FetchOutcome, Fetcher, RequestIdentity};

const SERVER_VENDORS: &[(&str, &str)] = &[
    ("apache", "Apache"),
    ("nginx", "nginx"),
    ("microsoft-iis", "Microsoft IIS"),
    ("cloudflare", "Cloudflare"),
    ("litespeed", "LiteSpeed"),
    ("caddy", "Caddy"),
];

const POWERED_BY_VENDORS: &[(&str, &str)] = &[
    ("php", "PHP"),
    ("asp.net", "ASP.NET"),
    ("express", "Express"),
    ("servlet", "Java Servlet"),
    ("next.js", "Next.js"),
];

/// Body signature -> technology name. Patterns are case-insensitive.
const BODY_SIGNATURES: &[(&str, &str)] = &[
    (r"(?i)wp-content|wp-includes", "WordPress"),
    (r"(?i)drupal\.settings|sites/all/themes", "Drupal"),
    (r"(?i)/media/jui/|joomla", "Joomla"),
    (r"(?i)laravel_session|csrf-token", "Laravel"),
    (r"(?i)csrfmiddlewaretoken", "Django"),
    (r#"(?i)data-reactroot|id="root""#, "React"),
    (r"(?i)ng-version|ng-app", "Angular"),
    (r"(?i)data-v-[0-9a-f]{8}|vue\.js", "Vue.js"),
    (r"(?i)jquery[.-][0-9]", "jQuery"),
    (r"(?i)bootstrap(?:\.min)?\.css", "Bootstrap"),
];

pub struct TechFingerprinter {
    fetcher: Arc<dyn Fetcher>,
}

impl TechFingerprinter {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }

    /// Fetch the root once and return technology name -> evidence.
    pub async fn fingerprint(&self, root_url: &str) -> HashMap<String, String> {
        let outcome = self
            .fetcher
            .fetch(root_url, &RequestIdentity::default(), None)
            .await;

        let FetchOutcome::Success { headers, body, .. } = outcome else {
            log::debug!("Fingerprint fetch of {root_url} did not succeed");
            return HashMap::new();
        };

        let mut technologies = HashMap::new();

        if let Some(server) = headers.get("server") {
            let lower = server.to_lowercase();
            for (marker, name) in SERVER_VENDORS {
                if lower.contains(marker) {
                    technologies
                        .insert(name.to_string(), format!("server header: {server}"));
                }
            }
        }

        if let Some(powered) = headers.get("x-powered-by") {
            let lower = powered.to_lowercase();
            for (marker, name) in POWERED_BY_VENDORS {
                if lower.contains(marker) {
                    technologies
                        .insert(name.to_string(), format!("x-powered-by header: {powered}"));
                }
            }
        }

        let text = String::from_utf8_lossy(&body);
        for (pattern, name) in BODY_SIGNATURES {
            if let Ok(re) = Regex::new(pattern) {
                if let Some(m) = re.find(&text) {
                    technologies
                        .insert(name.to_string(), format!("body signature: {}", m.as_str()));
                }
            }
        }

        technologies
    }
}
