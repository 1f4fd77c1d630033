use crate::error::VerdictError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A message submitted for analysis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageInput {
    pub subject: String,
    pub sender: String,
    pub recipient: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_source: Option<String>,
}

impl MessageInput {
    pub fn new(
        subject: impl Into<String>,
        sender: impl Into<String>,
        recipient: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            sender: sender.into(),
            recipient: recipient.into(),
            body: body.into(),
            raw_source: None,
        }
    }

    /// Reject empty fields and malformed addresses before any signal source runs.
    pub fn validate(&self) -> Result<(), VerdictError> {
        for (field, value) in [
            ("subject", &self.subject),
            ("sender", &self.sender),
            ("recipient", &self.recipient),
            ("body", &self.body),
        ] {
            if value.trim().is_empty() {
                return Err(VerdictError::Validation(format!("{field} must not be empty")));
            }
        }

        for (field, value) in [("sender", &self.sender), ("recipient", &self.recipient)] {
            if !is_well_formed_address(value.trim()) {
                return Err(VerdictError::Validation(format!(
                    "{field} is not a valid email address: {value}"
                )));
            }
        }

        Ok(())
    }

    /// Domain part of the sender address, lowercased.
    pub fn sender_domain(&self) -> Option<String> {
        extract_domain(&self.sender)
    }

    /// Build a message from an RFC 822 style file: headers up to the first
    /// blank line, folded continuation lines joined, body after.
    ///
    /// Only the handful of headers the pipeline needs are interpreted; this is
    /// not a MIME parser.
    pub fn from_rfc822(source: &str) -> Self {
        let mut headers: HashMap<String, String> = HashMap::new();
        let mut body = String::new();
        let mut in_headers = true;
        let mut last_header_key: Option<String> = None;

        for line in source.lines() {
            if in_headers {
                if line.trim().is_empty() {
                    in_headers = false;
                    continue;
                }

                if line.starts_with(' ') || line.starts_with('\t') {
                    if let Some(existing) = last_header_key.as_ref().and_then(|k| headers.get_mut(k)) {
                        existing.push(' ');
                        existing.push_str(line.trim());
                    }
                    continue;
                }

                if let Some((key, value)) = line.split_once(':') {
                    let key = key.trim().to_lowercase();
                    last_header_key = Some(key.clone());
                    headers
                        .entry(key)
                        .and_modify(|existing| {
                            existing.push(' ');
                            existing.push_str(value.trim());
                        })
                        .or_insert_with(|| value.trim().to_string());
                }
            } else {
                body.push_str(line);
                body.push('\n');
            }
        }

        let sender = headers
            .get("return-path")
            .map(|v| v.trim_matches(['<', '>', ' ']).to_string())
            .filter(|v| !v.is_empty())
            .or_else(|| headers.get("from").map(|v| bare_address(v)))
            .unwrap_or_default();

        let recipient = headers
            .get("to")
            .and_then(|v| v.split(',').next())
            .map(bare_address)
            .unwrap_or_default();

        Self {
            subject: headers.get("subject").cloned().unwrap_or_default(),
            sender,
            recipient,
            body,
            raw_source: Some(source.to_string()),
        }
    }
}

/// Extract the domain from an email address.
pub fn extract_domain(email: &str) -> Option<String> {
    bare_address(email)
        .rsplit_once('@')
        .map(|(_, domain)| domain.to_lowercase())
        .filter(|d| !d.is_empty())
}

/// "Name <user@example.com>" -> "user@example.com"
fn bare_address(value: &str) -> String {
    match (value.rfind('<'), value.rfind('>')) {
        (Some(start), Some(end)) if start < end => value[start + 1..end].trim().to_string(),
        _ => value.trim().to_string(),
    }
}

fn is_well_formed_address(address: &str) -> bool {
    if address.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = address.rsplit_once('@') else {
        return false;
    };
    !local.is_empty()
        && !local.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains("..")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MessageInput {
        MessageInput::new(
            "Your invoice",
            "billing@example.com",
            "user@example.org",
            "Please find the invoice attached.",
        )
    }

    #[test]
    fn test_valid_message_passes() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn test_empty_fields_rejected() {
        let mut message = sample();
        message.subject = "   ".to_string();
        assert_eq!(
            message.validate(),
            Err(VerdictError::Validation("subject must not be empty".to_string()))
        );

        let mut message = sample();
        message.body.clear();
        assert!(matches!(message.validate(), Err(VerdictError::Validation(_))));
    }

    #[test]
    fn test_malformed_addresses_rejected() {
        for bad in ["no-at-sign", "@example.com", "user@localhost", "user@.com", "a b@example.com"] {
            let mut message = sample();
            message.sender = bad.to_string();
            assert!(
                matches!(message.validate(), Err(VerdictError::Validation(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_extract_domain() {
        assert_eq!(extract_domain("User@Example.COM"), Some("example.com".to_string()));
        assert_eq!(
            extract_domain("Support <help@paypal-secure.tk>"),
            Some("paypal-secure.tk".to_string())
        );
        assert_eq!(extract_domain("invalid"), None);
    }

    #[test]
    fn test_from_rfc822() {
        let source = "Return-Path: <bounce@mailer.example.net>\n\
                      From: Bank Team <alerts@bank.example>\n\
                      To: Jane <jane@example.org>, bob@example.org\n\
                      Subject: Verify your\n\
                      \taccount now\n\
                      \n\
                      Click here to verify.\n";
        let message = MessageInput::from_rfc822(source);

        assert_eq!(message.sender, "bounce@mailer.example.net");
        assert_eq!(message.recipient, "jane@example.org");
        assert_eq!(message.subject, "Verify your account now");
        assert_eq!(message.body, "Click here to verify.\n");
        assert!(message.raw_source.is_some());
        assert!(message.validate().is_ok());
    }

    #[test]
    fn test_from_rfc822_falls_back_to_from_header() {
        let source = "From: Alerts <alerts@bank.example>\nTo: jane@example.org\nSubject: Hi\n\nBody\n";
        let message = MessageInput::from_rfc822(source);
        assert_eq!(message.sender, "alerts@bank.example");
    }
}
