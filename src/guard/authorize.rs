//! Override Authorization — pure decision function over findings and evidence.
//!
//! Given the classifier's findings, the active policy's override tier, and
//! whatever evidence the caller supplied, decide whether the turn proceeds.
//! This is a pure function: no hidden state, no I/O, re-evaluated from
//! scratch every turn. A justification supplied on a prior turn never
//! carries forward.

use serde::{Deserialize, Serialize};

use crate::guard::classifier::Finding;
use crate::guard::policy::OverrideTier;

/// Terminal decision for one turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// No findings, or findings advisory under tier `none`.
    Allowed,
    /// Findings exist and the required evidence was not supplied, or the
    /// tier permits no override at all.
    Blocked,
    /// Findings exist and the caller supplied the evidence the tier demands.
    Overridden,
}

/// Evidence supplied by the caller when prompted for an override.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverrideEvidence {
    /// Free-text justification for proceeding despite findings.
    pub justification: Option<String>,
    /// Approver role or credential label (manager tier only).
    pub approver_role: Option<String>,
}

impl OverrideEvidence {
    /// Evidence with no fields supplied (a declined override).
    pub fn declined() -> Self {
        Self::default()
    }

    /// Trimmed justification, `None` when empty or absent.
    fn justification(&self) -> Option<&str> {
        self.justification
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Trimmed approver role, `None` when empty or absent.
    fn approver(&self) -> Option<&str> {
        self.approver_role
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Full authorization outcome, carrying everything the audit recorder needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorization {
    /// The decision for this turn.
    pub decision: Decision,
    /// The findings that triggered it (empty for a clean turn).
    pub findings: Vec<Finding>,
    /// Justification recorded for an override, if any.
    pub justification: Option<String>,
    /// Approver role recorded for a manager-tier override, if any.
    pub approver_role: Option<String>,
    /// The tier actually satisfied by an override.
    pub satisfied_tier: Option<OverrideTier>,
}

impl Authorization {
    fn allowed(findings: Vec<Finding>) -> Self {
        Self {
            decision: Decision::Allowed,
            findings,
            justification: None,
            approver_role: None,
            satisfied_tier: None,
        }
    }

    fn blocked(findings: Vec<Finding>) -> Self {
        Self {
            decision: Decision::Blocked,
            findings,
            justification: None,
            approver_role: None,
            satisfied_tier: None,
        }
    }
}

/// Decide whether a flagged (or clean) turn may proceed.
///
/// State machine: CLEAN -> ALLOWED; FLAGGED branches on the policy tier:
/// - `none`: advisory, ALLOWED with findings still recorded
/// - `user_justification`: non-empty justification -> OVERRIDDEN, else BLOCKED
/// - `manager_approval`: justification and approver role both required
/// - `blocked`: always BLOCKED, no override path
pub fn authorize(
    findings: Vec<Finding>,
    tier: OverrideTier,
    evidence: &OverrideEvidence,
) -> Authorization {
    if findings.is_empty() {
        return Authorization::allowed(findings);
    }

    match tier {
        OverrideTier::None => Authorization::allowed(findings),
        OverrideTier::UserJustification => match evidence.justification() {
            Some(justification) => Authorization {
                decision: Decision::Overridden,
                justification: Some(justification.to_owned()),
                approver_role: None,
                satisfied_tier: Some(OverrideTier::UserJustification),
                findings,
            },
            None => Authorization::blocked(findings),
        },
        OverrideTier::ManagerApproval => {
            match (evidence.justification(), evidence.approver()) {
                (Some(justification), Some(approver)) => Authorization {
                    decision: Decision::Overridden,
                    justification: Some(justification.to_owned()),
                    approver_role: Some(approver.to_owned()),
                    satisfied_tier: Some(OverrideTier::ManagerApproval),
                    findings,
                },
                _ => Authorization::blocked(findings),
            }
        }
        OverrideTier::Blocked => Authorization::blocked(findings),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::policy::{Severity, ViolationCategory};

    fn finding() -> Finding {
        Finding {
            category: ViolationCategory::RoleManipulation,
            signal: "ignore previous instructions".to_owned(),
            severity: Severity::High,
            description: "attempt to redefine the model's instructions".to_owned(),
        }
    }

    fn with_justification(text: &str) -> OverrideEvidence {
        OverrideEvidence {
            justification: Some(text.to_owned()),
            approver_role: None,
        }
    }

    #[test]
    fn test_clean_is_allowed_under_every_tier() {
        for tier in [
            OverrideTier::None,
            OverrideTier::UserJustification,
            OverrideTier::ManagerApproval,
            OverrideTier::Blocked,
        ] {
            let auth = authorize(vec![], tier, &OverrideEvidence::declined());
            assert_eq!(auth.decision, Decision::Allowed);
            assert!(auth.findings.is_empty());
        }
    }

    #[test]
    fn test_tier_none_is_advisory() {
        let auth = authorize(vec![finding()], OverrideTier::None, &OverrideEvidence::declined());
        assert_eq!(auth.decision, Decision::Allowed);
        // Findings are still carried for the audit record.
        assert_eq!(auth.findings.len(), 1);
    }

    #[test]
    fn test_user_justification_overrides() {
        let auth = authorize(
            vec![finding()],
            OverrideTier::UserJustification,
            &with_justification("approved test scenario"),
        );
        assert_eq!(auth.decision, Decision::Overridden);
        assert_eq!(auth.justification.as_deref(), Some("approved test scenario"));
        assert_eq!(auth.satisfied_tier, Some(OverrideTier::UserJustification));
    }

    #[test]
    fn test_user_justification_empty_blocks() {
        for evidence in [
            OverrideEvidence::declined(),
            with_justification(""),
            with_justification("   "),
        ] {
            let auth = authorize(vec![finding()], OverrideTier::UserJustification, &evidence);
            assert_eq!(auth.decision, Decision::Blocked);
            assert!(auth.justification.is_none());
        }
    }

    #[test]
    fn test_user_justification_is_idempotent() {
        let evidence = with_justification("peer review");
        let first = authorize(vec![finding()], OverrideTier::UserJustification, &evidence);
        let second = authorize(vec![finding()], OverrideTier::UserJustification, &evidence);
        assert_eq!(first, second);
    }

    #[test]
    fn test_manager_approval_requires_both_fields() {
        let justification_only = with_justification("peer review access");
        let auth = authorize(vec![finding()], OverrideTier::ManagerApproval, &justification_only);
        assert_eq!(auth.decision, Decision::Blocked);

        let approver_only = OverrideEvidence {
            justification: None,
            approver_role: Some("claims_manager".to_owned()),
        };
        let auth = authorize(vec![finding()], OverrideTier::ManagerApproval, &approver_only);
        assert_eq!(auth.decision, Decision::Blocked);
    }

    #[test]
    fn test_manager_approval_with_full_evidence() {
        let evidence = OverrideEvidence {
            justification: Some("peer review access".to_owned()),
            approver_role: Some("claims_manager".to_owned()),
        };
        let auth = authorize(vec![finding()], OverrideTier::ManagerApproval, &evidence);
        assert_eq!(auth.decision, Decision::Overridden);
        assert_eq!(auth.approver_role.as_deref(), Some("claims_manager"));
        assert_eq!(auth.satisfied_tier, Some(OverrideTier::ManagerApproval));
    }

    #[test]
    fn test_blocked_tier_has_no_override_escape() {
        let evidence = OverrideEvidence {
            justification: Some("I really need this".to_owned()),
            approver_role: Some("ceo".to_owned()),
        };
        let auth = authorize(vec![finding()], OverrideTier::Blocked, &evidence);
        assert_eq!(auth.decision, Decision::Blocked);
        assert!(auth.satisfied_tier.is_none());
    }

    #[test]
    fn test_blocked_carries_triggering_findings() {
        let auth = authorize(
            vec![finding(), finding()],
            OverrideTier::Blocked,
            &OverrideEvidence::declined(),
        );
        assert_eq!(auth.findings.len(), 2);
    }
}
