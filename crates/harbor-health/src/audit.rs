//! Per-run diagnostic context: audit trail and running severity.
//!
//! One `DiagnosticContext` lives for exactly one diagnostic run. Probes
//! borrow it to append audit lines and to escalate the severity; the
//! orchestrator consumes it when assembling the report.
//!
//! Severity is kept as an atomic max so concurrent probes can escalate
//! without coordination; it never decreases. Audit lines are appended
//! under a mutex and forwarded, in append order, to an optional sink.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use harbor_core::Severity;

/// Receiver side of a live audit stream.
pub type AuditStream = mpsc::UnboundedReceiver<String>;

/// Sender side of a live audit stream.
pub type AuditSink = mpsc::UnboundedSender<String>;

/// Kind of an audit line; rendered as its prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditKind {
    /// Run start/end markers.
    Banner,
    Step,
    Success,
    Data,
    Warning,
    Fail,
}

impl AuditKind {
    fn prefix(&self) -> &'static str {
        match self {
            AuditKind::Banner => "",
            AuditKind::Step => "STEP: ",
            AuditKind::Success => "SUCCESS: ",
            AuditKind::Data => "DATA: ",
            AuditKind::Warning => "WARNING: ",
            AuditKind::Fail => "FAIL: ",
        }
    }
}

#[derive(Debug, Default)]
pub struct DiagnosticContext {
    lines: Mutex<Vec<String>>,
    severity: AtomicU8,
    sink: Option<AuditSink>,
}

impl DiagnosticContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context that also forwards every line to `sink`.
    pub fn with_sink(sink: AuditSink) -> Self {
        Self {
            sink: Some(sink),
            ..Self::default()
        }
    }

    /// Create a context plus the receiving end of its live stream.
    pub fn streaming() -> (Self, AuditStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::with_sink(tx), rx)
    }

    /// Append one audit line.
    pub fn record(&self, kind: AuditKind, message: impl AsRef<str>) {
        let line = format!("{}{}", kind.prefix(), message.as_ref());
        match kind {
            AuditKind::Fail | AuditKind::Warning => warn!(target: "harbor_health", "{line}"),
            _ => info!(target: "harbor_health", "{line}"),
        }

        let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(sink) = &self.sink {
            // A closed receiver only means nobody is watching live.
            if sink.send(line.clone()).is_err() {
                debug!("audit stream receiver dropped");
            }
        }
        lines.push(line);
    }

    pub fn step(&self, message: impl AsRef<str>) {
        self.record(AuditKind::Step, message);
    }

    pub fn success(&self, message: impl AsRef<str>) {
        self.record(AuditKind::Success, message);
    }

    pub fn data(&self, message: impl AsRef<str>) {
        self.record(AuditKind::Data, message);
    }

    pub fn warning(&self, message: impl AsRef<str>) {
        self.record(AuditKind::Warning, message);
    }

    /// Record a failure and escalate to at least `Degraded`.
    pub fn fail(&self, message: impl AsRef<str>) {
        self.record(AuditKind::Fail, message);
        self.escalate(Severity::Degraded);
    }

    /// Raise the running severity to at least `to`.
    pub fn escalate(&self, to: Severity) {
        let prev = self.severity.fetch_max(to.rank(), Ordering::AcqRel);
        if to.rank() > prev {
            debug!(from = %Severity::from_rank(prev), to = %to, "severity escalated");
        }
    }

    pub fn severity(&self) -> Severity {
        Severity::from_rank(self.severity.load(Ordering::Acquire))
    }

    /// Snapshot of the lines recorded so far.
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Consume the context, yielding its audit log and final severity.
    ///
    /// Dropping the context here also closes the live stream.
    pub fn finish(self) -> (Vec<String>, Severity) {
        let severity = self.severity();
        let lines = self
            .lines
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        (lines, severity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_healthy_and_empty() {
        let ctx = DiagnosticContext::new();
        assert_eq!(ctx.severity(), Severity::Healthy);
        assert!(ctx.lines().is_empty());
    }

    #[test]
    fn lines_carry_prefixes() {
        let ctx = DiagnosticContext::new();
        ctx.step("Connecting to Galera node at 10.0.0.21...");
        ctx.data("10.0.0.21 Size=3, State=Synced");
        ctx.record(AuditKind::Banner, "--- DONE ---");
        assert_eq!(
            ctx.lines(),
            vec![
                "STEP: Connecting to Galera node at 10.0.0.21...",
                "DATA: 10.0.0.21 Size=3, State=Synced",
                "--- DONE ---",
            ]
        );
    }

    #[test]
    fn fail_escalates_to_degraded() {
        let ctx = DiagnosticContext::new();
        ctx.fail("MariaDB check on 10.0.0.21 failed");
        assert_eq!(ctx.severity(), Severity::Degraded);
    }

    #[test]
    fn severity_never_decreases() {
        let ctx = DiagnosticContext::new();
        ctx.escalate(Severity::Critical);
        ctx.escalate(Severity::Healthy);
        ctx.fail("late failure");
        assert_eq!(ctx.severity(), Severity::Critical);
    }

    #[test]
    fn escalation_is_order_independent() {
        let a = DiagnosticContext::new();
        a.escalate(Severity::Degraded);
        a.escalate(Severity::Critical);

        let b = DiagnosticContext::new();
        b.escalate(Severity::Critical);
        b.escalate(Severity::Degraded);

        assert_eq!(a.severity(), b.severity());
    }

    #[test]
    fn sink_receives_lines_in_order() {
        let (ctx, mut rx) = DiagnosticContext::streaming();
        ctx.step("one");
        ctx.warning("two");
        let (lines, _) = ctx.finish();

        assert_eq!(rx.try_recv().unwrap(), "STEP: one");
        assert_eq!(rx.try_recv().unwrap(), "WARNING: two");
        // Sender dropped with the context.
        assert!(rx.try_recv().is_err());
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn dropped_receiver_does_not_break_recording() {
        let (ctx, rx) = DiagnosticContext::streaming();
        drop(rx);
        ctx.step("still recorded");
        assert_eq!(ctx.lines(), vec!["STEP: still recorded"]);
    }
}
