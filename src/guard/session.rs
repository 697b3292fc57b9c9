//! Session and per-turn pipeline.
//!
//! One session holds an opaque token, a shared read-only policy, and a
//! monotonically increasing turn counter. [`Pipeline::handle_turn`] drives a
//! full turn: classify -> authorize -> compose -> generate -> record. One
//! turn is fully processed before the next is accepted; the model call is
//! the only suspending operation and is timeout-bounded here.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::guard::audit::{AuditRecord, AuditRecorder};
use crate::guard::authorize::{authorize, Decision, OverrideEvidence};
use crate::guard::classifier::{Classifier, Finding};
use crate::guard::compose::compose;
use crate::guard::policy::{OverrideTier, Policy, ViolationCategory};
use crate::providers::ModelProvider;

/// One interactive session against a single policy.
pub struct Session {
    /// Opaque externally-generated token, unique and stable for the
    /// session's lifetime. No particular format is assumed.
    session_id: String,
    /// Active policy, shared read-only, held for the session's lifetime.
    policy: Arc<Policy>,
    /// Turns processed so far; the next turn gets `turn + 1`.
    turn: u64,
}

impl Session {
    /// Start a session with the given token and policy.
    pub fn new(session_id: String, policy: Arc<Policy>) -> Self {
        Self {
            session_id,
            policy,
            turn: 0,
        }
    }

    /// The session token.
    pub fn id(&self) -> &str {
        &self.session_id
    }

    /// The active policy.
    pub fn policy(&self) -> &Arc<Policy> {
        &self.policy
    }

    /// Turns processed so far.
    pub fn turns(&self) -> u64 {
        self.turn
    }

    /// Claim the next turn number. Every turn consumes one, blocked or not.
    fn next_turn(&mut self) -> u64 {
        self.turn = self.turn.saturating_add(1);
        self.turn
    }
}

/// Where the pipeline obtains override evidence when a flagged turn can
/// still proceed. The interactive front end prompts the user; tests supply
/// canned evidence. Only consulted for tiers that have an override path.
pub trait EvidenceSource: Send + Sync {
    /// Ask for the evidence the tier requires. Returning empty fields
    /// declines the override.
    fn request(&self, findings: &[Finding], tier: OverrideTier) -> OverrideEvidence;
}

/// An [`EvidenceSource`] that always declines.
pub struct NoOverride;

impl EvidenceSource for NoOverride {
    fn request(&self, _findings: &[Finding], _tier: OverrideTier) -> OverrideEvidence {
        OverrideEvidence::declined()
    }
}

/// How a turn ended, with the text to display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The model answered (possibly under an override).
    Answered {
        /// Text shown to the user.
        display: String,
        /// `Allowed` or `Overridden`.
        decision: Decision,
    },
    /// The turn was blocked before any model call.
    Blocked {
        /// Block notice shown to the user.
        display: String,
    },
    /// The model call failed or timed out; the turn is still recorded.
    ModelUnavailable {
        /// Failure notice shown to the user.
        display: String,
    },
}

impl TurnOutcome {
    /// The text shown to the user regardless of outcome.
    pub fn display(&self) -> &str {
        match self {
            Self::Answered { display, .. }
            | Self::Blocked { display }
            | Self::ModelUnavailable { display } => display,
        }
    }
}

/// Render the block notice for a set of findings under a policy.
fn block_notice(policy: &Policy, findings: &[Finding]) -> String {
    let mut categories: Vec<String> = findings
        .iter()
        .map(|f| f.category.to_string())
        .collect();
    categories.dedup();
    let tier_hint = match policy.override_tier {
        OverrideTier::None => "",
        OverrideTier::UserJustification => " A justification is required to proceed.",
        OverrideTier::ManagerApproval => " Manager approval is required to proceed.",
        OverrideTier::Blocked => " This request cannot be overridden.",
    };
    let framework = if policy.framework == "none" {
        String::new()
    } else {
        format!(" under the {} framework", policy.framework)
    };
    format!(
        "Request blocked{framework}: {}.{tier_hint}",
        categories.join(", ")
    )
}

/// Whether any finding is policy-specific (used for log fields only).
fn has_red_line(findings: &[Finding]) -> bool {
    findings
        .iter()
        .any(|f| matches!(f.category, ViolationCategory::PolicyRedLine(_)))
}

/// Per-turn guardrail pipeline shared by every session.
pub struct Pipeline {
    classifier: Classifier,
    recorder: Arc<AuditRecorder>,
    provider: Arc<dyn ModelProvider>,
    /// Upper bound on one model call.
    request_timeout: Duration,
}

impl Pipeline {
    /// Assemble the pipeline.
    pub fn new(
        recorder: Arc<AuditRecorder>,
        provider: Arc<dyn ModelProvider>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            classifier: Classifier::new(),
            recorder,
            provider,
            request_timeout,
        }
    }

    /// Process one user turn end to end and return the outcome.
    ///
    /// Exactly one audit record is written per call, blocked or not. No
    /// error here ends the session: model failures become
    /// [`TurnOutcome::ModelUnavailable`] and sink failures are absorbed by
    /// the recorder.
    pub async fn handle_turn(
        &self,
        session: &mut Session,
        raw_text: &str,
        evidence_source: &dyn EvidenceSource,
    ) -> TurnOutcome {
        let turn = session.next_turn();
        let policy = Arc::clone(session.policy());

        let findings = self.classifier.classify(raw_text, &policy);
        tracing::debug!(
            turn,
            findings = findings.len(),
            red_line = has_red_line(&findings),
            "turn classified"
        );

        // Evidence is only worth collecting when an override path exists.
        let evidence = if !findings.is_empty()
            && matches!(
                policy.override_tier,
                OverrideTier::UserJustification | OverrideTier::ManagerApproval
            ) {
            evidence_source.request(&findings, policy.override_tier)
        } else {
            OverrideEvidence::declined()
        };

        let auth = authorize(findings, policy.override_tier, &evidence);

        let (outcome, prompt, raw_output) = match auth.decision {
            Decision::Blocked => {
                let display = block_notice(&policy, &auth.findings);
                tracing::info!(turn, session = %session.id(), "turn blocked");
                (TurnOutcome::Blocked { display }, None, None)
            }
            decision => {
                let prompt = compose(&policy, decision, raw_text);
                match tokio::time::timeout(
                    self.request_timeout,
                    self.provider.generate(&prompt),
                )
                .await
                {
                    Ok(Ok(text)) => (
                        TurnOutcome::Answered {
                            display: text.clone(),
                            decision,
                        },
                        Some(prompt),
                        Some(text),
                    ),
                    Ok(Err(e)) => {
                        tracing::warn!(turn, error = %e, "model call failed");
                        (
                            TurnOutcome::ModelUnavailable {
                                display: format!("Model unavailable: {e}"),
                            },
                            Some(prompt),
                            None,
                        )
                    }
                    Err(_) => {
                        tracing::warn!(turn, "model call timed out");
                        (
                            TurnOutcome::ModelUnavailable {
                                display: "Model unavailable: request timed out".to_owned(),
                            },
                            Some(prompt),
                            None,
                        )
                    }
                }
            }
        };

        self.recorder.record(AuditRecord {
            session_id: session.id().to_owned(),
            turn,
            timestamp: Utc::now(),
            app_context: policy.id.clone(),
            framework: policy.framework.clone(),
            user_input: raw_text.to_owned(),
            prompt,
            raw_output,
            final_output: outcome.display().to_owned(),
            findings: auth.findings,
            decision: auth.decision,
            justification: auth.justification,
            approver_role: auth.approver_role,
        });

        outcome
    }
}
