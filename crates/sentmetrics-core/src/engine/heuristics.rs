//! Bounce and reply/forward-prefix heuristics.
//!
//! These are text and sender heuristics, not delivery reports: a message
//! that matches none of the patterns is "not classified as bounce", which is
//! not the same as confirmed delivered.

use std::sync::LazyLock;

use regex::Regex;

use crate::model::SentMessage;

/// Reply and forward prefixes used by Outlook in Portuguese and English.
pub const DEFAULT_IGNORED_PREFIXES: &[&str] = &["RES:", "RE:", "ENC:", "FW:", "FWD:", "TR:"];

#[allow(clippy::expect_used)] // Literal pattern
static SYSTEM_SENDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)postmaster|mailer-daemon|system\s*administrator|administrador\s+do\s+sistema")
        .expect("system sender pattern")
});

#[allow(clippy::expect_used)] // Literal pattern
static DELIVERY_FAILURE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)
        undeliverable
        | delivery\s+has\s+failed
        | delivery\s+status\s+notification\s+\(failure\)
        | mail\s+delivery\s+(failed|failure|subsystem)
        | returned\s+mail
        | message\s+not\s+delivered
        | address\s+not\s+found
        | user\s+unknown
        | recipient\s+address\s+rejected
        | mailbox\s+(unavailable|not\s+found|full)
        | falha\s+(de|na)\s+entrega
        | não\s+entregue
        | não\s+foi\s+possível\s+entregar
        | mensagem\s+não\s+entregue
        | no\s+se\s+puede\s+entregar
        | imposible\s+entregar
        ",
    )
    .expect("delivery failure pattern")
});

/// Whether a message looks like a non-delivery report.
///
/// True when the sender is a postmaster/mailer-daemon/system administrator
/// address, or when subject and body preview together contain a known
/// delivery-failure phrase. Case-insensitive.
#[must_use]
pub fn is_bounce(message: &SentMessage) -> bool {
    if SYSTEM_SENDER_RE.is_match(message.sender_str()) {
        return true;
    }

    let text = format!("{} {}", message.subject_str(), message.body_preview_str());
    DELIVERY_FAILURE_RE.is_match(&text)
}

/// Upper-cased reply/forward prefix tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoredPrefixes {
    tokens: Vec<String>,
}

impl IgnoredPrefixes {
    /// Build from raw tokens. Tokens are trimmed and upper-cased; empty
    /// tokens are dropped.
    #[must_use]
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tokens = tokens
            .into_iter()
            .map(|t| t.as_ref().trim().to_uppercase())
            .filter(|t| !t.is_empty())
            .collect();
        Self { tokens }
    }

    /// The configured tokens.
    #[must_use]
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Whether the subject, left-trimmed and upper-cased, starts with any
    /// configured token.
    #[must_use]
    pub fn matches(&self, subject: &str) -> bool {
        let normalized = subject.trim_start().to_uppercase();
        self.tokens.iter().any(|t| normalized.starts_with(t.as_str()))
    }
}

impl Default for IgnoredPrefixes {
    fn default() -> Self {
        Self::new(DEFAULT_IGNORED_PREFIXES)
    }
}

/// Whether a subject carries one of the ignored reply/forward prefixes.
#[must_use]
pub fn has_ignored_prefix(subject: &str, prefixes: &IgnoredPrefixes) -> bool {
    prefixes.matches(subject)
}
