use super::{SignalOutput, SignalSource, UrlScore};
use crate::config::LinkHeuristicsConfig;
use crate::error::AdapterFailure;
use crate::evidence::{EvidenceKind, SUSPICIOUS_URL_THRESHOLD};
use crate::message::MessageInput;
use regex::Regex;
use url::{Host, Url};

const URL_PATTERN: &str = r#"(?i)https?://[^\s<>"'()\[\]{}]+"#;

/// Shape-based URL scoring. Real reputation providers plug in through the
/// HTTP source instead; this covers what can be judged from the URL alone.
pub struct LinkAnalyzer {
    url_regex: Regex,
    shorteners: Vec<String>,
    risky_tlds: Vec<String>,
    trusted_domains: Vec<String>,
}

impl LinkAnalyzer {
    pub fn new(config: &LinkHeuristicsConfig) -> Self {
        let lower = |v: &[String]| v.iter().map(|s| s.to_lowercase()).collect::<Vec<_>>();
        Self {
            url_regex: Regex::new(URL_PATTERN).unwrap(),
            shorteners: lower(&config.shorteners),
            risky_tlds: lower(&config.risky_tlds),
            trusted_domains: lower(&config.trusted_domains),
        }
    }

    /// URLs in order of first appearance, without duplicates.
    pub fn extract_urls(&self, text: &str) -> Vec<String> {
        let mut urls: Vec<String> = Vec::new();
        for m in self.url_regex.find_iter(text) {
            let url = m.as_str().trim_end_matches(['.', ',', ';', ':', '!', '?']);
            if !urls.iter().any(|u| u == url) {
                urls.push(url.to_string());
            }
        }
        urls
    }

    pub fn score_url(&self, raw: &str) -> f64 {
        let Ok(url) = Url::parse(raw) else {
            log::debug!("Unparseable URL {}", raw);
            return 0.4;
        };

        let host = match url.host() {
            Some(Host::Domain(domain)) => domain.to_lowercase(),
            Some(Host::Ipv4(_)) | Some(Host::Ipv6(_)) => {
                // Raw addresses in place of a domain name
                return (0.6 + self.shape_penalties(&url)).min(1.0);
            }
            None => return 0.4,
        };

        if matches_domain_list(&host, &self.trusted_domains) {
            return 0.0;
        }

        let mut score = self.shape_penalties(&url);

        if self.shorteners.iter().any(|s| host == *s || host.ends_with(&format!(".{s}"))) {
            score += 0.3;
        }
        if let Some(tld) = host.rsplit('.').next() {
            if self.risky_tlds.iter().any(|t| t == tld) {
                score += 0.4;
            }
        }
        if host.split('.').any(|label| label.starts_with("xn--")) {
            score += 0.4;
        }
        if host.split('.').count() > 4 {
            score += 0.2;
        }

        score.min(1.0)
    }

    fn shape_penalties(&self, url: &Url) -> f64 {
        let mut score = 0.0;
        if !url.username().is_empty() || url.password().is_some() {
            score += 0.5;
        }
        if url.scheme() == "http" {
            score += 0.1;
        }
        if let Some(query) = url.query() {
            let query = query.to_lowercase();
            if ["redirect=", "goto=", "url=", "next="]
                .iter()
                .any(|p| query.contains(p))
            {
                score += 0.2;
            }
            if query.len() > 200 {
                score += 0.1;
            }
        }
        score
    }

    pub fn analyze_text(&self, text: &str) -> SignalOutput {
        let url_scores: Vec<UrlScore> = self
            .extract_urls(text)
            .into_iter()
            .map(|url| {
                let score = self.score_url(&url);
                UrlScore::new(url, score)
            })
            .collect();

        let max_score = url_scores.iter().map(|u| u.score).fold(0.0, f64::max);
        let suspicious: Vec<&str> = url_scores
            .iter()
            .filter(|u| u.score > SUSPICIOUS_URL_THRESHOLD)
            .map(|u| u.url.as_str())
            .collect();

        let description = if url_scores.is_empty() {
            "No links found".to_string()
        } else if suspicious.is_empty() {
            format!("No suspicious links among {} link(s)", url_scores.len())
        } else {
            let shown: Vec<&str> = suspicious.iter().take(3).copied().collect();
            format!(
                "Suspicious links detected ({} of {}): {}",
                suspicious.len(),
                url_scores.len(),
                shown.join(", ")
            )
        };

        SignalOutput::new(max_score, description)
            .with_detail("urls_found", url_scores.len())
            .with_detail("has_suspicious_urls", !suspicious.is_empty())
            .with_url_scores(url_scores)
    }
}

fn matches_domain_list(domain: &str, list: &[String]) -> bool {
    list.iter()
        .any(|d| domain == d || domain.ends_with(&format!(".{d}")))
}

#[async_trait::async_trait]
impl SignalSource for LinkAnalyzer {
    fn kind(&self) -> EvidenceKind {
        EvidenceKind::Links
    }

    fn name(&self) -> &str {
        "builtin:links"
    }

    async fn analyze(&self, message: &MessageInput) -> Result<SignalOutput, AdapterFailure> {
        Ok(self.analyze_text(&message.body))
    }
}
