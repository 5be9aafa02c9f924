//! Append-only audit trail of exchange attempts
//!
//! Every exchange that reaches policy evaluation produces exactly one
//! [`ExchangeAuditEvent`]. The event shape makes it impossible to attach a
//! token ID to a denial or a denial reason to a grant.
//!
//! [`JsonAuditSink`] hands events to a background task over a bounded
//! channel and returns immediately. A full or closed channel drops the
//! event with a warning; it never fails or delays the exchange.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::warn;

/// Value of the `event` field on every audit record
pub const AUDIT_EVENT: &str = "token.exchange";

/// Default number of events buffered between request tasks and the writer
pub const DEFAULT_AUDIT_BUFFER: usize = 1024;

/// What happened to an exchange attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AuditOutcome {
    Granted {
        scopes_granted: Vec<String>,
        ttl: i32,
        token_id: String,
    },
    Denied {
        denial_reason: String,
    },
}

/// One exchange attempt, success or denial
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeAuditEvent {
    pub subject: String,
    pub target: String,
    pub scopes_requested: Vec<String>,
    pub outcome: AuditOutcome,
}

impl ExchangeAuditEvent {
    /// Event for a minted credential
    pub fn granted(
        subject: impl Into<String>,
        target: impl Into<String>,
        scopes_requested: Vec<String>,
        scopes_granted: Vec<String>,
        ttl: i32,
        token_id: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            target: target.into(),
            scopes_requested,
            outcome: AuditOutcome::Granted {
                scopes_granted,
                ttl,
                token_id: token_id.into(),
            },
        }
    }

    /// Event for a policy denial
    pub fn denied(
        subject: impl Into<String>,
        target: impl Into<String>,
        scopes_requested: Vec<String>,
        denial_reason: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            target: target.into(),
            scopes_requested,
            outcome: AuditOutcome::Denied {
                denial_reason: denial_reason.into(),
            },
        }
    }

    pub fn is_granted(&self) -> bool {
        matches!(self.outcome, AuditOutcome::Granted { .. })
    }

    /// Render the event as a single JSON line (no trailing newline)
    pub fn to_json_line(&self, time: DateTime<Utc>) -> serde_json::Result<String> {
        serde_json::to_string(&AuditRecord {
            time,
            event: AUDIT_EVENT,
            subject: &self.subject,
            target: &self.target,
            scopes_requested: &self.scopes_requested,
            granted: self.is_granted(),
            outcome: &self.outcome,
        })
    }
}

/// Wire layout of one audit line
#[derive(Serialize)]
struct AuditRecord<'a> {
    time: DateTime<Utc>,
    event: &'static str,
    subject: &'a str,
    target: &'a str,
    scopes_requested: &'a [String],
    granted: bool,
    #[serde(flatten)]
    outcome: &'a AuditOutcome,
}

/// Destination for audit events
///
/// `record` must not block and must not fail the caller.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: ExchangeAuditEvent);
}

/// Audit sink writing JSON lines from a background task
#[derive(Debug, Clone)]
pub struct JsonAuditSink {
    tx: mpsc::Sender<ExchangeAuditEvent>,
}

impl JsonAuditSink {
    /// Start the writer task on the current tokio runtime
    ///
    /// The task runs until every clone of the sink is dropped, then flushes
    /// and hands the writer back through the join handle.
    pub fn spawn<W>(writer: W, capacity: usize) -> (Self, JoinHandle<W>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(write_events(rx, writer));
        (Self { tx }, handle)
    }

    /// Sink writing to the process's standard output
    pub fn stdout() -> (Self, JoinHandle<tokio::io::Stdout>) {
        Self::spawn(tokio::io::stdout(), DEFAULT_AUDIT_BUFFER)
    }
}

impl AuditSink for JsonAuditSink {
    fn record(&self, event: ExchangeAuditEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!(
                    subject = %event.subject,
                    target = %event.target,
                    granted = event.is_granted(),
                    "Audit buffer full, dropping event"
                );
            }
            Err(TrySendError::Closed(event)) => {
                warn!(
                    subject = %event.subject,
                    target = %event.target,
                    granted = event.is_granted(),
                    "Audit writer stopped, dropping event"
                );
            }
        }
    }
}

async fn write_events<W>(mut rx: mpsc::Receiver<ExchangeAuditEvent>, mut writer: W) -> W
where
    W: AsyncWrite + Unpin,
{
    while let Some(event) = rx.recv().await {
        let mut line = match event.to_json_line(Utc::now()) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Failed to serialize audit event");
                continue;
            }
        };
        line.push('\n');

        if let Err(e) = writer.write_all(line.as_bytes()).await {
            warn!(error = %e, "Failed to write audit event");
            continue;
        }
        if let Err(e) = writer.flush().await {
            warn!(error = %e, "Failed to flush audit writer");
        }
    }
    writer
}
