//! Detection patterns for the built-in guardrail policy.
//!
//! Every pattern is compiled once by the `regex` crate, whose automata match
//! in time linear in the input. Adding a pattern adds a constant factor,
//! never a per-character rescan.

use lazy_static::lazy_static;
use regex::{Regex, RegexSet};

lazy_static! {
    // =========================================================================
    // PROMPT INJECTION
    // =========================================================================

    /// Instruction override, role takeover and prompt exfiltration phrasing
    pub static ref PROMPT_INJECTION_PATTERNS: RegexSet = RegexSet::new([
        r"(?i)\b(ignore|disregard|override|forget)\b.{0,40}\b(previous|prior|above|earlier|all|system)\b.{0,20}\b(instructions?|prompts?|rules|messages?)\b",
        r"(?i)\byou are now\b.{0,40}\b(dan|unfiltered|jailbroken|developer mode|unrestricted)\b",
        r"(?i)\b(reveal|print|show|repeat|dump)\b.{0,30}\b(system prompt|hidden instructions|developer message)\b",
        r"(?i)\bjailbreak\b",
    ]).unwrap();

    // =========================================================================
    // ACADEMIC HONOR CODE
    // =========================================================================

    /// Requests to have graded work done or to cheat on an assessment
    pub static ref HONOR_CODE_PATTERNS: RegexSet = RegexSet::new([
        r"(?i)\b(write|do|complete|finish|solve)\b.{0,20}\bmy\b.{0,20}\b(homework|essay|assignment|coursework|problem set|take-home)\b",
        r"(?i)\btake\b.{0,20}\b(exam|test|quiz|midterm|final)\b.{0,20}\bfor me\b",
        r"(?i)\banswers?\b.{0,20}\b(to|for)\b.{0,20}\b(the|my|this|tomorrow's|today's)\b.{0,20}\b(exam|test|quiz|midterm|final)\b",
        r"(?i)\b(plagiari[sz]e|paraphrase\b.{0,30}\bso\b.{0,30}\bnot\b.{0,10}\bdetect)",
    ]).unwrap();

    // =========================================================================
    // CREDENTIALS
    // =========================================================================

    /// API key / secret / token assignment
    /// Matches: api_key=xxx, secret: xxx, token=xxx, etc.
    pub static ref API_KEY_PATTERN: Regex = Regex::new(
        r#"(?i)(api[_-]?key|secret[_-]?key|access[_-]?token|auth[_-]?token|bearer|password|secret|token)["']?[\s:=]+['"]?[a-zA-Z0-9_\-]{16,}['"]?"#
    ).unwrap();

    /// AWS access key pattern (all AWS key prefixes)
    pub static ref AWS_KEY_PATTERN: Regex = Regex::new(
        r"\b(AKIA|ABIA|ACCA|AGPA|AIDA|AIPA|ANPA|ANVA|AROA|ASCA|ASIA)[A-Z0-9]{16}\b"
    ).unwrap();

    /// PEM private key header
    pub static ref PRIVATE_KEY_PATTERN: Regex = Regex::new(
        r"-----BEGIN (?:RSA |EC |DSA |OPENSSH |ENCRYPTED )?PRIVATE KEY-----"
    ).unwrap();
}

/// Check if content reads like a prompt-injection attempt.
pub fn contains_prompt_injection(content: &str) -> bool {
    PROMPT_INJECTION_PATTERNS.is_match(content)
}

/// Check if content asks for academic dishonesty.
pub fn contains_honor_code_violation(content: &str) -> bool {
    HONOR_CODE_PATTERNS.is_match(content)
}

/// Check if content contains any credentials (API keys, AWS keys or
/// private keys).
pub fn contains_credentials(content: &str) -> bool {
    API_KEY_PATTERN.is_match(content)
        || AWS_KEY_PATTERN.is_match(content)
        || PRIVATE_KEY_PATTERN.is_match(content)
}
