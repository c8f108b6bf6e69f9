//! Heuristics for credentials pasted into literal environment values
//!
//! Findings are advisory only; a false positive must never block a deployment.

use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

const KEYWORDS: &[&str] = &[
    "PASSWORD", "PASSWD", "PWD", "SECRET", "TOKEN", "API_KEY", "APIKEY", "ACCESS_KEY", "PRIVATE_KEY",
    "CREDENTIAL",
];

const TOKEN_PREFIXES: &[&str] = &[
    "ghp_", "gho_", "ghu_", "ghs_", "ghr_", "github_pat_", "glpat-", "xoxb-", "xoxp-", "sk_live_",
    "rk_live_", "AKIA", "ASIA", "AIza",
];

const MIN_ENTROPY_LEN: usize = 20;
const ENTROPY_THRESHOLD: f64 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretKind {
    UrlPassword,
    KnownToken,
    Keyword,
    HighEntropy,
}

impl fmt::Display for SecretKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SecretKind::UrlPassword => "password in a URL",
            SecretKind::KnownToken => "access token",
            SecretKind::Keyword => "credential",
            SecretKind::HighEntropy => "high-entropy string",
        };
        write!(f, "{}", s)
    }
}

fn url_password() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[a-zA-Z][a-zA-Z0-9+.-]*://[^:/@\s]+:([^@/\s]+)@").expect("valid regex")
    })
}

/// Returns what `value` looks like when it appears to hold a credential
pub fn scan_literal(key: &str, value: &str) -> Option<SecretKind> {
    let value = value.trim();
    if value.is_empty() || value.contains("${") {
        return None;
    }

    if let Some(caps) = url_password().captures(value) {
        let password = &caps[1];
        if !password.starts_with('$') {
            return Some(SecretKind::UrlPassword);
        }
    }

    if TOKEN_PREFIXES
        .iter()
        .any(|prefix| value.starts_with(prefix) && value.len() >= prefix.len() + 16)
    {
        return Some(SecretKind::KnownToken);
    }

    let upper = key.to_uppercase();
    if KEYWORDS.iter().any(|k| upper.contains(k)) && !is_placeholder(value) {
        return Some(SecretKind::Keyword);
    }

    if value.len() >= MIN_ENTROPY_LEN
        && !value.contains(char::is_whitespace)
        && shannon_entropy(value) > ENTROPY_THRESHOLD
    {
        return Some(SecretKind::HighEntropy);
    }

    None
}

fn is_placeholder(value: &str) -> bool {
    matches!(
        value.to_lowercase().as_str(),
        "true" | "false" | "none" | "null" | "changeme" | "example" | "xxx" | "secret" | "password"
    ) || value.len() < 4
}

/// Bits per character
fn shannon_entropy(value: &str) -> f64 {
    let mut counts: HashMap<char, usize> = HashMap::new();
    let mut total = 0usize;
    for c in value.chars() {
        *counts.entry(c).or_default() += 1;
        total += 1;
    }
    counts
        .values()
        .map(|&n| {
            let p = n as f64 / total as f64;
            -p * p.log2()
        })
        .sum()
}
