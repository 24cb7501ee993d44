//! Signature-based threat scanning and input sanitization.
//!
//! Matching is a denylist: every signature is a case-insensitive regex and a
//! hit anywhere in the input produces one finding. The scanner reports; it
//! never rejects. Rejection is the input gate's job (see `gate.rs`).

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::SignatureConfig;

/// Severity of a matched signature. Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

/// A compiled signature.
#[derive(Debug, Clone)]
pub struct ThreatSignature {
    pattern: Regex,
    pub severity: Severity,
    pub description: String,
}

impl ThreatSignature {
    pub fn new(
        pattern: &str,
        severity: Severity,
        description: impl Into<String>,
    ) -> Result<Self, regex::Error> {
        let pattern = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        Ok(Self {
            pattern,
            severity,
            description: description.into(),
        })
    }

    pub fn is_match(&self, input: &str) -> bool {
        self.pattern.is_match(input)
    }
}

/// One matched signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub severity: Severity,
    pub description: String,
}

/// Result of scanning one or more strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub is_threat: bool,
    pub threats: Vec<Finding>,
}

impl ScanReport {
    /// Highest severity among the findings.
    pub fn max_severity(&self) -> Option<Severity> {
        self.threats.iter().map(|f| f.severity).max()
    }
}

const BUILTIN_SIGNATURES: &[(&str, Severity, &str)] = &[
    (
        r"<script|javascript:|\bon\w+\s*=",
        Severity::Critical,
        "XSS attempt detected",
    ),
    (
        // Keyword pairs may be split by whitespace or inline comments.
        r"union\b.*\bselect|drop(?:\s|/\*.*?\*/)+table|insert(?:\s|/\*.*?\*/)+into|delete(?:\s|/\*.*?\*/)+from",
        Severity::Critical,
        "SQL injection attempt detected",
    ),
    (r"\.\./|\.\.\\|%2e%2e", Severity::High, "Path traversal attempt detected"),
    (
        r"(?:eval|exec|system|passthru)\s*\(",
        Severity::Critical,
        "Code injection attempt detected",
    ),
    (r"<(?:iframe|embed|object)", Severity::Medium, "Suspicious HTML tag detected"),
];

/// Stateless scanner over an immutable signature list.
#[derive(Debug, Clone)]
pub struct ThreatScanner {
    signatures: Vec<ThreatSignature>,
    sanitizer: Sanitizer,
}

impl ThreatScanner {
    /// Scanner with only the built-in signatures.
    pub fn builtin() -> Result<Self, regex::Error> {
        Self::with_extra(&[])
    }

    /// Built-in signatures followed by the configured ones, in order.
    pub fn with_extra(extra: &[SignatureConfig]) -> Result<Self, regex::Error> {
        let mut signatures = BUILTIN_SIGNATURES
            .iter()
            .map(|(pattern, severity, description)| {
                ThreatSignature::new(pattern, *severity, *description)
            })
            .collect::<Result<Vec<_>, _>>()?;

        for sig in extra {
            signatures.push(ThreatSignature::new(&sig.pattern, sig.severity, sig.description.clone())?);
        }

        Ok(Self {
            signatures,
            sanitizer: Sanitizer::new()?,
        })
    }

    pub fn sanitizer(&self) -> &Sanitizer {
        &self.sanitizer
    }

    pub fn signatures(&self) -> &[ThreatSignature] {
        &self.signatures
    }

    /// Scan a single string.
    pub fn scan(&self, input: &str) -> ScanReport {
        self.scan_all(&[input])
    }

    /// Scan several strings as one unit. A signature matching any of them
    /// contributes one finding, in declaration order.
    pub fn scan_all(&self, inputs: &[&str]) -> ScanReport {
        let threats: Vec<Finding> = self
            .signatures
            .iter()
            .filter(|sig| inputs.iter().any(|input| sig.is_match(input)))
            .map(|sig| Finding {
                severity: sig.severity,
                description: sig.description.clone(),
            })
            .collect();

        ScanReport {
            is_threat: !threats.is_empty(),
            threats,
        }
    }
}

/// Denylist transform applied to every string of a submission.
#[derive(Debug, Clone)]
pub struct Sanitizer {
    angle_brackets: Regex,
    javascript_uri: Regex,
    event_handler: Regex,
    eval_call: Regex,
}

impl Sanitizer {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            angle_brackets: Regex::new(r"[<>]")?,
            javascript_uri: Regex::new(r"(?i)javascript:")?,
            event_handler: Regex::new(r"(?i)\bon\w+=")?,
            eval_call: Regex::new(r"(?i)eval\(")?,
        })
    }

    /// Strip markup-injection fragments from a single string.
    pub fn sanitize_str(&self, input: &str) -> String {
        let s = self.angle_brackets.replace_all(input, "");
        let s = self.javascript_uri.replace_all(&s, "");
        let s = self.event_handler.replace_all(&s, "");
        let s = self.eval_call.replace_all(&s, "");
        s.trim().to_string()
    }

    /// Recursively sanitize every string in a JSON value. Object keys, array
    /// order and non-string scalars are preserved.
    pub fn sanitize(&self, value: Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.sanitize_str(&s)),
            Value::Array(items) => {
                Value::Array(items.into_iter().map(|v| self.sanitize(v)).collect())
            }
            Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, self.sanitize(v)))
                    .collect::<Map<String, Value>>(),
            ),
            other => other,
        }
    }
}

/// Collect every string in a JSON value, object keys included.
pub fn collect_strings(value: &Value) -> Vec<&str> {
    let mut out = Vec::new();
    walk(value, &mut out);
    out
}

fn walk<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
    match value {
        Value::String(s) => out.push(s),
        Value::Array(items) => items.iter().for_each(|v| walk(v, out)),
        Value::Object(map) => {
            for (k, v) in map {
                out.push(k);
                walk(v, out);
            }
        }
        _ => {}
    }
}
