use super::{SignalOutput, SignalSource};
use crate::config::SenderReputationConfig;
use crate::error::AdapterFailure;
use crate::evidence::EvidenceKind;
use crate::message::{extract_domain, MessageInput};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq)]
pub enum DomainReputation {
    Trusted,
    EmailServiceProvider,
    Unknown,
    Suspicious,
    /// Carries a protected brand name without being one of its domains.
    BrandLookalike(String),
    Malicious,
}

impl DomainReputation {
    pub fn score(&self) -> f64 {
        match self {
            DomainReputation::Trusted => 0.0,
            DomainReputation::EmailServiceProvider => 0.1,
            DomainReputation::Unknown => 0.2,
            DomainReputation::Suspicious => 0.7,
            DomainReputation::BrandLookalike(_) => 0.85,
            DomainReputation::Malicious => 1.0,
        }
    }
}

/// Classifies the sender domain against configured reputation lists.
pub struct SenderReputationAnalyzer {
    trusted_domains: HashSet<String>,
    esp_domains: HashSet<String>,
    suspicious_tlds: HashSet<String>,
    malicious_domains: HashSet<String>,
    protected_brands: Vec<String>,
}

impl SenderReputationAnalyzer {
    pub fn new(config: &SenderReputationConfig) -> Self {
        let set = |v: &[String]| v.iter().map(|d| d.to_lowercase()).collect::<HashSet<_>>();
        Self {
            trusted_domains: set(&config.trusted_domains),
            esp_domains: set(&config.email_service_providers),
            suspicious_tlds: set(&config.suspicious_tlds),
            malicious_domains: set(&config.known_malicious),
            protected_brands: config.protected_brands.iter().map(|b| b.to_lowercase()).collect(),
        }
    }

    pub fn classify(&self, domain: &str) -> DomainReputation {
        let domain = domain.to_lowercase();

        if in_hierarchy(&domain, &self.malicious_domains) {
            return DomainReputation::Malicious;
        }
        if in_hierarchy(&domain, &self.trusted_domains) {
            return DomainReputation::Trusted;
        }
        if in_hierarchy(&domain, &self.esp_domains) {
            return DomainReputation::EmailServiceProvider;
        }
        if let Some(brand) = self.protected_brands.iter().find(|b| domain.contains(b.as_str())) {
            return DomainReputation::BrandLookalike(brand.clone());
        }
        if domain
            .rsplit('.')
            .next()
            .is_some_and(|tld| self.suspicious_tlds.contains(tld))
        {
            return DomainReputation::Suspicious;
        }

        DomainReputation::Unknown
    }

    fn describe(domain: &str, reputation: &DomainReputation) -> String {
        match reputation {
            DomainReputation::Trusted => format!("Trusted sender domain: {domain}"),
            DomainReputation::EmailServiceProvider => {
                format!("Sender uses an email service provider: {domain}")
            }
            DomainReputation::Unknown => format!("Unknown sender domain reputation: {domain}"),
            DomainReputation::Suspicious => {
                format!("Sender domain uses a high-abuse top-level domain: {domain}")
            }
            DomainReputation::BrandLookalike(brand) => {
                format!("Sender domain imitates {brand} but is not an official domain: {domain}")
            }
            DomainReputation::Malicious => format!("Sender domain is known malicious: {domain}"),
        }
    }
}

/// Exact match or subdomain of any entry.
fn in_hierarchy(domain: &str, set: &HashSet<String>) -> bool {
    let mut candidate = domain;
    loop {
        if set.contains(candidate) {
            return true;
        }
        match candidate.split_once('.') {
            Some((_, parent)) => candidate = parent,
            None => return false,
        }
    }
}

#[async_trait::async_trait]
impl SignalSource for SenderReputationAnalyzer {
    fn kind(&self) -> EvidenceKind {
        EvidenceKind::Sender
    }

    fn name(&self) -> &str {
        "builtin:sender"
    }

    async fn analyze(&self, message: &MessageInput) -> Result<SignalOutput, AdapterFailure> {
        let domain = extract_domain(&message.sender)
            .ok_or_else(|| AdapterFailure::Malformed(format!("no domain in {}", message.sender)))?;
        let reputation = self.classify(&domain);

        Ok(
            SignalOutput::new(reputation.score(), Self::describe(&domain, &reputation))
                .with_detail("domain", domain),
        )
    }
}
