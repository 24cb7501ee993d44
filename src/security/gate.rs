//! Mandatory input gate.
//!
//! Data-mutating handlers take `Screened<T>`. The only way to build one is to
//! pass a JSON body through `InputGate::screen`, which scans every string
//! (object keys included), rejects at or above the configured severity and
//! sanitizes what remains before deserializing into `T`.

use std::ops::Deref;
use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use thiserror::Error;

use crate::http::request::{client_address, user_agent};
use crate::http::response::ApiError;
use crate::observability::audit::{AuditEvent, AuditLog, AuditStatus};
use crate::observability::metrics;
use crate::security::scanner::{collect_strings, ScanReport, Severity, ThreatScanner};

#[derive(Debug, Error)]
pub enum GateError {
    #[error("input matched {} threat signature(s)", .0.threats.len())]
    Rejected(ScanReport),

    #[error("input does not match the expected shape: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Input that has been scanned and sanitized.
#[derive(Debug, Clone)]
pub struct Screened<T>(T);

impl<T> Screened<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Deref for Screened<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

#[derive(Debug, Clone)]
pub struct InputGate {
    scanner: Arc<ThreatScanner>,
    reject_at: Severity,
}

impl InputGate {
    pub fn new(scanner: Arc<ThreatScanner>, reject_at: Severity) -> Self {
        Self { scanner, reject_at }
    }

    pub fn scanner(&self) -> &ThreatScanner {
        &self.scanner
    }

    /// Scan then sanitize. Findings below `reject_at` are counted but the
    /// input passes, sanitized.
    pub fn screen(&self, value: Value) -> Result<Screened<Value>, GateError> {
        let report = self.scanner.scan_all(&collect_strings(&value));
        for finding in &report.threats {
            metrics::record_threat(finding.severity);
        }
        if report.max_severity().is_some_and(|s| s >= self.reject_at) {
            return Err(GateError::Rejected(report));
        }
        Ok(Screened(self.scanner.sanitizer().sanitize(value)))
    }

    pub fn screen_as<T: DeserializeOwned>(&self, value: Value) -> Result<Screened<T>, GateError> {
        let Screened(clean) = self.screen(value)?;
        Ok(Screened(serde_json::from_value(clean)?))
    }
}

impl<S, T> FromRequest<S> for Screened<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
    Arc<InputGate>: FromRef<S>,
    Arc<AuditLog>: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let address = client_address(req.headers(), req.extensions());
        let agent = user_agent(req.headers()).to_string();
        let path = req.uri().path().to_string();

        let Json(value) = Json::<Value>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;

        let gate = Arc::<InputGate>::from_ref(state);
        match gate.screen_as::<T>(value) {
            Ok(screened) => Ok(screened),
            Err(GateError::Rejected(report)) => {
                tracing::warn!(client = %address, path = %path, findings = report.threats.len(), "Input rejected by gate");
                Arc::<AuditLog>::from_ref(state).record(
                    AuditEvent::new("suspicious_query", path, address, agent, AuditStatus::Suspicious)
                        .with_details(json!({ "threats": report.threats })),
                );
                Err(ApiError::InputRejected)
            }
            Err(GateError::Malformed(e)) => Err(ApiError::BadRequest(e.to_string())),
        }
    }
}
