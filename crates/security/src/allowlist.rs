//! Allowlist policy: sender validation.
//!
//! Patterns are regular expressions matched at the start of the sender's
//! user id. An empty allowlist allows every sender.

use regex_lite::Regex;

/// Result of checking a sender against the allowlist.
#[derive(Debug, Clone, PartialEq)]
pub enum SenderCheckResult {
    /// Sender is allowed
    Allowed,
    /// Sender is denied
    Denied { sender_id: String, reason: String },
    /// No allowlist configured (allow by default)
    NoConfig,
}

impl SenderCheckResult {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Self::Denied { .. })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AllowlistError {
    #[error("invalid allowed_users pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Compiled sender allowlist.
#[derive(Debug, Clone, Default)]
pub struct SenderAllowlist {
    patterns: Vec<Regex>,
}

impl SenderAllowlist {
    /// Compile the configured patterns.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, AllowlistError> {
        let patterns = patterns
            .iter()
            .map(|p| {
                let p = p.as_ref();
                Regex::new(&format!("^(?:{p})")).map_err(|e| AllowlistError::InvalidPattern {
                    pattern: p.to_string(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// An allowlist that lets everyone through.
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Check a sender.
    ///
    /// Rules:
    /// - If no patterns are configured → allow all
    /// - Otherwise, some pattern must match at the start of `sender_id`
    pub fn check_sender(&self, sender_id: &str) -> SenderCheckResult {
        if self.patterns.is_empty() {
            return SenderCheckResult::NoConfig;
        }

        if self.patterns.iter().any(|re| re.is_match(sender_id)) {
            SenderCheckResult::Allowed
        } else {
            tracing::debug!(sender = sender_id, "Sender not in allowlist");
            SenderCheckResult::Denied {
                sender_id: sender_id.into(),
                reason: format!(
                    "Sender '{}' not in allowlist ({} patterns configured)",
                    sender_id,
                    self.patterns.len()
                ),
            }
        }
    }

    pub fn is_allowed(&self, sender_id: &str) -> bool {
        self.check_sender(sender_id).is_allowed()
    }
}
