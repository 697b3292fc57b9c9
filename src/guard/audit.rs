//! Audit Recorder — append-only account of every conversational turn.
//!
//! Two sinks receive equivalent information derived from the same
//! [`AuditRecord`]: a structured JSON-lines sink (one record per line) and a
//! human-readable sink (one labeled block per turn). Records are never
//! edited or deleted after write.
//!
//! A sink-write failure must not end the interactive session: the record is
//! buffered in memory, retried on the next write, and the failure is
//! surfaced once the sink recovers. [`AuditRecorder::recent`] reconstructs
//! the view from the structured sink so it spans process restarts.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::guard::authorize::Decision;
use crate::guard::classifier::Finding;

/// The immutable account of one turn's full lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Opaque session token, stable for the process's interactive lifetime.
    pub session_id: String,
    /// Turn sequence number, strictly increasing within a session.
    pub turn: u64,
    /// When the turn was processed.
    pub timestamp: DateTime<Utc>,
    /// Application/policy context identifier.
    pub app_context: String,
    /// Compliance framework tag of the active policy.
    pub framework: String,
    /// Original user input, verbatim.
    pub user_input: String,
    /// Full composed prompt sent to the model; `None` when blocked.
    pub prompt: Option<String>,
    /// Raw model output; `None` when blocked or the model was unavailable.
    pub raw_output: Option<String>,
    /// Final text shown to the user.
    pub final_output: String,
    /// Classifier findings for this turn, possibly empty.
    pub findings: Vec<Finding>,
    /// Authorization decision.
    pub decision: Decision,
    /// Override justification, if one was supplied.
    pub justification: Option<String>,
    /// Approver role recorded for a manager-tier override, if any.
    pub approver_role: Option<String>,
}

/// Render one record as a labeled human-readable block.
fn render_block(record: &AuditRecord) -> String {
    let findings = if record.findings.is_empty() {
        "(none)".to_owned()
    } else {
        record
            .findings
            .iter()
            .map(|f| format!("{} \"{}\" ({:?})", f.category, f.signal, f.severity))
            .collect::<Vec<_>>()
            .join("; ")
    };
    let decision = match record.decision {
        Decision::Allowed => "allowed",
        Decision::Blocked => "blocked",
        Decision::Overridden => "overridden",
    };
    format!(
        "=== turn {} | session {} | {} ===\n\
         app:           {} [{}]\n\
         decision:      {}\n\
         input:         {}\n\
         findings:      {}\n\
         justification: {}\n\
         approver:      {}\n\
         prompt sent:   {}\n\
         raw output:    {}\n\
         displayed:     {}\n",
        record.turn,
        record.session_id,
        record.timestamp.to_rfc3339(),
        record.app_context,
        record.framework,
        decision,
        record.user_input,
        findings,
        record.justification.as_deref().unwrap_or("(none)"),
        record.approver_role.as_deref().unwrap_or("(none)"),
        record.prompt.as_deref().unwrap_or("(none)"),
        record.raw_output.as_deref().unwrap_or("(none)"),
        record.final_output,
    )
}

/// State behind the recorder's mutex: both sinks plus the retry buffer.
struct RecorderInner {
    structured: Box<dyn Write + Send>,
    human: Box<dyn Write + Send>,
    /// Records that failed to reach the structured sink, oldest first.
    pending: Vec<AuditRecord>,
    /// Highest turn already recorded per session, for idempotence.
    last_turn: HashMap<String, u64>,
}

/// Append-only recorder writing both sink views of every turn.
pub struct AuditRecorder {
    inner: Mutex<RecorderInner>,
    /// Path of the structured sink, used by [`AuditRecorder::recent`].
    /// `None` when constructed from raw writers (tests).
    structured_path: Option<PathBuf>,
}

impl AuditRecorder {
    /// Open (or create) both append-only sink files.
    ///
    /// # Errors
    ///
    /// Returns an error if either file cannot be opened for append.
    pub fn new(
        structured_path: impl AsRef<Path>,
        human_path: impl AsRef<Path>,
    ) -> anyhow::Result<Self> {
        let open = |p: &Path| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(p)
        };
        let structured = open(structured_path.as_ref())?;
        let human = open(human_path.as_ref())?;
        Ok(Self {
            inner: Mutex::new(RecorderInner {
                structured: Box::new(structured),
                human: Box::new(human),
                pending: Vec::new(),
                last_turn: HashMap::new(),
            }),
            structured_path: Some(structured_path.as_ref().to_path_buf()),
        })
    }

    /// Build a recorder over arbitrary writers (for testing). `recent`
    /// then only sees records still buffered in memory.
    pub fn from_writers(structured: Box<dyn Write + Send>, human: Box<dyn Write + Send>) -> Self {
        Self {
            inner: Mutex::new(RecorderInner {
                structured,
                human,
                pending: Vec::new(),
                last_turn: HashMap::new(),
            }),
            structured_path: None,
        }
    }

    /// Persist one turn's record to both sinks.
    ///
    /// Idempotent per (session, turn): a duplicate turn number is dropped
    /// with a warning. Never panics and never surfaces an error to the
    /// caller; a failed write buffers the record and retries on the next
    /// call, reporting the recovery once the sink accepts writes again.
    pub fn record(&self, record: AuditRecord) {
        let mut inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(&seen) = inner.last_turn.get(&record.session_id) {
            if record.turn <= seen {
                tracing::warn!(
                    session = %record.session_id,
                    turn = record.turn,
                    "duplicate audit record for turn, dropping"
                );
                return;
            }
        }
        inner
            .last_turn
            .insert(record.session_id.clone(), record.turn);

        // Retry anything buffered from earlier failures first, so sink
        // order matches turn order.
        inner.pending.push(record);
        let queued = std::mem::take(&mut inner.pending);
        let total = queued.len();
        let mut written = 0usize;
        for rec in queued {
            if let Err(e) = write_both(&mut inner, &rec) {
                tracing::warn!(
                    session = %rec.session_id,
                    turn = rec.turn,
                    error = %e,
                    "audit sink write failed, buffering record"
                );
                inner.pending.push(rec);
                continue;
            }
            written = written.saturating_add(1);
        }

        // Surface earlier failures once the sink recovers.
        if total > 1 && written == total {
            let recovered = total.saturating_sub(1);
            tracing::warn!(
                recovered,
                "audit sink recovered, flushed buffered records"
            );
            let note = format!(
                "--- audit sink recovered: {recovered} earlier record(s) were buffered after a write failure ---\n"
            );
            if let Err(e) = inner.human.write_all(note.as_bytes()) {
                tracing::warn!(error = %e, "failed to note sink recovery in human log");
            }
        }
    }

    /// The most recent `n` records, oldest first, reconstructed from the
    /// structured sink (plus any records still buffered after a write
    /// failure), so the view spans process restarts.
    ///
    /// # Errors
    ///
    /// Returns an error if the structured sink file cannot be read.
    pub fn recent(&self, n: usize) -> anyhow::Result<Vec<AuditRecord>> {
        let mut records = Vec::new();
        if let Some(path) = &self.structured_path {
            match std::fs::read_to_string(path) {
                Ok(contents) => {
                    for line in contents.lines().filter(|l| !l.trim().is_empty()) {
                        match serde_json::from_str::<AuditRecord>(line) {
                            Ok(rec) => records.push(rec),
                            Err(e) => {
                                tracing::warn!(error = %e, "skipping malformed audit line");
                            }
                        }
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        let inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        records.extend(inner.pending.iter().cloned());

        let skip = records.len().saturating_sub(n);
        Ok(records.split_off(skip))
    }
}

/// Write one record to both sinks. The structured line is authoritative;
/// the human block is derived from the same record so the views cannot
/// diverge.
fn write_both(inner: &mut RecorderInner, record: &AuditRecord) -> anyhow::Result<()> {
    let line = serde_json::to_string(record)?;
    writeln!(inner.structured, "{line}")?;
    inner.structured.flush()?;

    let block = render_block(record);
    if let Err(e) = inner.human.write_all(block.as_bytes()).and_then(|()| inner.human.flush()) {
        // The structured record landed; losing the human rendering is
        // reported but does not re-queue the record.
        tracing::warn!(error = %e, "human audit sink write failed");
    }
    Ok(())
}
