//! Best-effort audit trail for security-relevant events.
//!
//! Recording never fails from the caller's point of view: each sink error is
//! logged locally and swallowed. The remote sink hands events to a bounded
//! queue drained by one worker, so a slow backend cannot hold up the request
//! that produced the event.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

use crate::config::AuditConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Success,
    Failure,
    Suspicious,
}

/// One security-relevant event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub user_id: Option<String>,
    pub action: String,
    pub resource: String,
    pub ip_address: String,
    pub user_agent: String,
    pub status: AuditStatus,
    pub details: Value,
}

impl AuditEvent {
    pub fn new(
        action: impl Into<String>,
        resource: impl Into<String>,
        ip_address: impl Into<String>,
        user_agent: impl Into<String>,
        status: AuditStatus,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            user_id: None,
            action: action.into(),
            resource: resource.into(),
            ip_address: ip_address.into(),
            user_agent: user_agent.into(),
            status,
            details: Value::Null,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

/// Kinds of authentication-flow events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityEventKind {
    LoginAttempt,
    FailedAuth,
    AdminAccess,
    DataExport,
    SuspiciousQuery,
}

impl SecurityEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityEventKind::LoginAttempt => "login_attempt",
            SecurityEventKind::FailedAuth => "failed_auth",
            SecurityEventKind::AdminAccess => "admin_access",
            SecurityEventKind::DataExport => "data_export",
            SecurityEventKind::SuspiciousQuery => "suspicious_query",
        }
    }
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("no async runtime available for remote delivery")]
    NoRuntime,

    #[error("audit buffer lock poisoned")]
    Poisoned,

    #[error("remote sink queue full, event dropped")]
    QueueFull,

    #[error("remote sink worker stopped")]
    WorkerStopped,

    #[error("remote sink misconfigured: {0}")]
    Misconfigured(String),
}

/// A destination for audit events.
pub trait AuditSink: Send + Sync {
    fn name(&self) -> &'static str;

    fn record(&self, event: &AuditEvent) -> Result<(), AuditError>;
}

/// Bounded ring of recent events, served by the admin API.
#[derive(Debug)]
pub struct MemorySink {
    capacity: usize,
    events: Mutex<VecDeque<AuditEvent>>,
}

impl MemorySink {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            events: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    /// Newest first, at most `limit` events.
    pub fn recent(&self, limit: usize) -> Vec<AuditEvent> {
        let events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        events.iter().rev().take(limit).cloned().collect()
    }
}

impl AuditSink for MemorySink {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn record(&self, event: &AuditEvent) -> Result<(), AuditError> {
        if self.capacity == 0 {
            return Ok(());
        }
        let mut events = self.events.lock().map_err(|_| AuditError::Poisoned)?;
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(event.clone());
        Ok(())
    }
}

/// Posts events as rows to the backend's audit table.
///
/// Events go through a bounded queue to one delivery worker. When the queue
/// is full the event is dropped, so a slow backend costs at most
/// `queue_size` buffered events and one in-flight request.
#[derive(Debug, Clone)]
pub struct RemoteSink {
    queue: mpsc::Sender<AuditEvent>,
}

impl RemoteSink {
    /// Build the client and spawn the delivery worker on the current runtime.
    pub fn spawn(
        url: impl Into<String>,
        api_key: &str,
        queue_size: usize,
        timeout: Duration,
    ) -> Result<Self, AuditError> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| AuditError::NoRuntime)?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if !api_key.is_empty() {
            let key = HeaderValue::from_str(api_key)
                .map_err(|e| AuditError::Misconfigured(e.to_string()))?;
            let bearer = HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|e| AuditError::Misconfigured(e.to_string()))?;
            headers.insert("apikey", key);
            headers.insert(AUTHORIZATION, bearer);
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| AuditError::Misconfigured(e.to_string()))?;

        let (queue, rx) = mpsc::channel(queue_size.max(1));
        let worker = RemoteWorker {
            client,
            url: url.into(),
        };
        handle.spawn(worker.run(rx));
        Ok(Self { queue })
    }
}

impl AuditSink for RemoteSink {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn record(&self, event: &AuditEvent) -> Result<(), AuditError> {
        self.queue.try_send(event.clone()).map_err(|e| match e {
            TrySendError::Full(_) => AuditError::QueueFull,
            TrySendError::Closed(_) => AuditError::WorkerStopped,
        })
    }
}

struct RemoteWorker {
    client: reqwest::Client,
    url: String,
}

impl RemoteWorker {
    async fn run(self, mut rx: mpsc::Receiver<AuditEvent>) {
        while let Some(event) = rx.recv().await {
            match self.client.post(&self.url).json(&event).send().await {
                Ok(res) if res.status().is_success() => {}
                Ok(res) => {
                    tracing::error!(event_id = %event.id, status = %res.status(), "[AUDIT ERROR] remote sink rejected event")
                }
                Err(e) => {
                    tracing::error!(event_id = %event.id, error = %e, "[AUDIT ERROR] remote sink unreachable")
                }
            }
        }
        tracing::debug!("Remote audit worker stopped");
    }
}

/// Fan-out recorder used by the filter and request handlers.
pub struct AuditLog {
    memory: Arc<MemorySink>,
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog")
            .field("sinks", &self.sinks.iter().map(|s| s.name()).collect::<Vec<_>>())
            .finish()
    }
}

impl AuditLog {
    pub fn from_config(config: &AuditConfig) -> Self {
        let mut extra: Vec<Arc<dyn AuditSink>> = Vec::new();
        if config.remote_enabled {
            match RemoteSink::spawn(
                config.remote_url.clone(),
                &config.api_key,
                config.remote_queue_size,
                Duration::from_secs(config.remote_timeout_secs),
            ) {
                Ok(sink) => extra.push(Arc::new(sink)),
                Err(e) => tracing::error!(error = %e, "Remote audit sink disabled"),
            }
        }
        Self::with_sinks(config.buffer_size, extra)
    }

    pub fn with_sinks(buffer_size: usize, extra: Vec<Arc<dyn AuditSink>>) -> Self {
        let memory = Arc::new(MemorySink::new(buffer_size));
        let mut sinks: Vec<Arc<dyn AuditSink>> = vec![memory.clone()];
        sinks.extend(extra);
        Self { memory, sinks }
    }

    /// Record an event in every sink. Never fails.
    pub fn record(&self, event: AuditEvent) {
        tracing::info!(
            category = "audit",
            user = event.user_id.as_deref().unwrap_or("anonymous"),
            action = %event.action,
            resource = %event.resource,
            status = ?event.status,
            ip = %event.ip_address,
            "[AUDIT]"
        );
        if event.status == AuditStatus::Suspicious {
            tracing::error!(
                action = %event.action,
                ip = %event.ip_address,
                user_agent = %event.user_agent,
                details = %event.details,
                "[SECURITY ALERT] Suspicious activity detected"
            );
        }

        for sink in &self.sinks {
            if let Err(e) = sink.record(&event) {
                tracing::error!(sink = sink.name(), error = %e, "[AUDIT ERROR]");
            }
        }
    }

    /// Record an authentication-flow event. Only `FailedAuth` counts as a
    /// failure.
    pub fn log_security_event(
        &self,
        kind: SecurityEventKind,
        user_id: Option<&str>,
        ip: &str,
        user_agent: &str,
        details: Value,
    ) {
        let status = match kind {
            SecurityEventKind::FailedAuth => AuditStatus::Failure,
            _ => AuditStatus::Success,
        };
        let mut event = AuditEvent::new(kind.as_str(), "security", ip, user_agent, status)
            .with_details(details);
        if let Some(user) = user_id {
            event = event.with_user(user);
        }
        self.record(event);
    }

    pub fn recent(&self, limit: usize) -> Vec<AuditEvent> {
        self.memory.recent(limit)
    }
}
