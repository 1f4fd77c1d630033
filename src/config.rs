use crate::error::ConfigError;
use anyhow::Context;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub analysis: AnalysisConfig,
    pub signals: SignalsConfig,
    pub heuristics: HeuristicsConfig,
    pub notifications: NotificationsConfig,
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Upper bound on any single signal source call.
    pub adapter_timeout_ms: u64,
}

/// Which implementation backs each signal kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalsConfig {
    pub subject: SourceConfig,
    pub content: SourceConfig,
    pub links: SourceConfig,
    pub sender: SourceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceConfig {
    Builtin,
    Http { endpoint: String },
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeuristicsConfig {
    pub subject: TextPatternConfig,
    pub content: TextPatternConfig,
    pub links: LinkHeuristicsConfig,
    pub sender: SenderReputationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextPatternConfig {
    pub patterns: Vec<WeightedPattern>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightedPattern {
    pub name: String,
    pub pattern: String,
    /// Contribution in (0, 1] when the pattern matches.
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkHeuristicsConfig {
    pub shorteners: Vec<String>,
    pub risky_tlds: Vec<String>,
    pub trusted_domains: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderReputationConfig {
    pub trusted_domains: Vec<String>,
    pub email_service_providers: Vec<String>,
    pub suspicious_tlds: Vec<String>,
    pub known_malicious: Vec<String>,
    /// Brand names that only their own trusted domains may carry.
    pub protected_brands: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    pub default_page_size: usize,
    /// Emit an info log line for every created alert.
    pub log_alerts: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

fn pattern(name: &str, pattern: &str, weight: f64) -> WeightedPattern {
    WeightedPattern {
        name: name.to_string(),
        pattern: pattern.to_string(),
        weight,
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            analysis: AnalysisConfig {
                adapter_timeout_ms: 5000,
            },
            signals: SignalsConfig {
                subject: SourceConfig::Builtin,
                content: SourceConfig::Builtin,
                links: SourceConfig::Builtin,
                sender: SourceConfig::Builtin,
            },
            heuristics: HeuristicsConfig {
                subject: TextPatternConfig {
                    patterns: vec![
                        pattern("urgency", r"(?i)\b(urgent|immediate(ly)?|act now|final notice|last chance|expires? today)\b", 0.45),
                        pattern("account threat", r"(?i)\b(suspend(ed)?|locked|disabled|deactivat(ed|ion)|unusual (sign-?in|activity))\b", 0.5),
                        pattern("verification request", r"(?i)\b(verify|confirm|validate|update)\b.{0,20}\b(account|identity|password|payment|details)\b", 0.55),
                        pattern("prize or refund", r"(?i)\b(you('ve| have)? won|winner|prize|refund|claim your)\b", 0.4),
                        pattern("security alert", r"(?i)\bsecurity (alert|warning|notice)\b", 0.35),
                    ],
                },
                content: TextPatternConfig {
                    patterns: vec![
                        pattern("credential request", r"(?i)\b(enter|provide|confirm|verify)\b.{0,40}\b(password|pin|ssn|social security|card number|login details|credentials)\b", 0.6),
                        pattern("account threat", r"(?i)\b(account|access)\b.{0,40}\b(suspended|locked|terminated|limited|closed)\b", 0.45),
                        pattern("urgency", r"(?i)\b(within (24|48) hours|immediately|as soon as possible|failure to (respond|comply))\b", 0.35),
                        pattern("click lure", r"(?i)\b(click (here|below|the link)|follow the link|log ?in (here|now))\b", 0.35),
                        pattern("payment pressure", r"(?i)\b(wire transfer|gift cards?|bitcoin|overdue (invoice|payment)|payment (failed|declined))\b", 0.4),
                        pattern("generic greeting", r"(?i)\bdear (customer|user|client|account holder|member)\b", 0.2),
                    ],
                },
                links: LinkHeuristicsConfig {
                    shorteners: strings(&[
                        "bit.ly", "tinyurl.com", "t.co", "goo.gl", "ow.ly", "is.gd", "v.gd",
                        "tiny.cc", "rb.gy", "cutt.ly", "shorturl.at", "u.to",
                    ]),
                    risky_tlds: strings(&[
                        "tk", "ml", "ga", "cf", "gq", "xyz", "top", "icu", "shop", "click", "zip",
                        "mov",
                    ]),
                    trusted_domains: strings(&[
                        "google.com", "microsoft.com", "apple.com", "github.com",
                    ]),
                },
                sender: SenderReputationConfig {
                    trusted_domains: strings(&[
                        "google.com", "microsoft.com", "apple.com", "paypal.com", "amazon.com",
                    ]),
                    email_service_providers: strings(&[
                        "sendgrid.net", "mailgun.org", "mailchimp.com", "amazonses.com",
                    ]),
                    suspicious_tlds: strings(&[
                        "tk", "ml", "ga", "cf", "gq", "xyz", "top", "icu", "shop",
                    ]),
                    known_malicious: Vec::new(),
                    protected_brands: strings(&[
                        "paypal", "amazon", "microsoft", "apple", "google", "netflix",
                    ]),
                },
            },
            notifications: NotificationsConfig {
                default_page_size: 10,
                log_alerts: true,
            },
            logging: Some(LoggingConfig {
                level: "info".to_string(),
            }),
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file: {path}"))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse configuration file: {path}"))?;
        Ok(config)
    }

    pub fn to_file(&self, path: &str) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write configuration file: {path}"))?;
        Ok(())
    }

    /// Check everything that would otherwise only fail at analysis time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.analysis.adapter_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "analysis.adapter_timeout_ms must be greater than zero".to_string(),
            ));
        }

        for patterns in [&self.heuristics.subject, &self.heuristics.content] {
            for p in &patterns.patterns {
                compile_pattern(&p.pattern)?;
                if !(p.weight > 0.0 && p.weight <= 1.0) {
                    return Err(ConfigError::Invalid(format!(
                        "pattern '{}' weight {} must be in (0, 1]",
                        p.name, p.weight
                    )));
                }
            }
        }

        for (kind, source) in [
            ("subject", &self.signals.subject),
            ("content", &self.signals.content),
            ("links", &self.signals.links),
            ("sender", &self.signals.sender),
        ] {
            if let SourceConfig::Http { endpoint } = source {
                url::Url::parse(endpoint).map_err(|e| {
                    ConfigError::Invalid(format!("signals.{kind} endpoint '{endpoint}': {e}"))
                })?;
            }
        }

        if self.notifications.default_page_size == 0 {
            return Err(ConfigError::Invalid(
                "notifications.default_page_size must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    pub fn log_level(&self) -> log::LevelFilter {
        self.logging
            .as_ref()
            .and_then(|l| l.level.parse().ok())
            .unwrap_or(log::LevelFilter::Info)
    }
}

pub(crate) fn compile_pattern(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}
