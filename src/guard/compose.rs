//! Prompt Composer — builds the payload sent to the model.
//!
//! The payload is the policy's system-prompt template followed by the user
//! text. An overridden turn keeps the policy framing: an override changes
//! the authorization to *send*, never the model's instructions, and the
//! audit record preserves that distinction. The composer is never invoked
//! for a blocked turn.

use crate::guard::authorize::Decision;
use crate::guard::policy::Policy;

/// Longest user-text section accepted into a composed prompt.
const MAX_USER_CHARS: usize = 2000;

/// Sanitize the user section of a prompt before composition.
///
/// Escapes backticks, collapses repeated blank lines and runs of spaces,
/// and truncates overlong input. The audit record keeps the verbatim text;
/// only the composed payload is sanitized.
pub fn sanitize_user_text(text: &str) -> String {
    let escaped = text.replace('`', "\\`");

    let mut collapsed = String::with_capacity(escaped.len());
    let mut last_was_space = false;
    let mut last_was_newline = false;
    for c in escaped.chars() {
        match c {
            '\n' => {
                if !last_was_newline {
                    collapsed.push('\n');
                }
                last_was_newline = true;
                last_was_space = false;
            }
            c if c == ' ' || c == '\t' => {
                if !last_was_space {
                    collapsed.push(' ');
                }
                last_was_space = true;
                last_was_newline = false;
            }
            c => {
                collapsed.push(c);
                last_was_space = false;
                last_was_newline = false;
            }
        }
    }

    let trimmed = collapsed.trim();
    if trimmed.chars().count() > MAX_USER_CHARS {
        let mut shortened: String = trimmed.chars().take(MAX_USER_CHARS).collect();
        shortened.push_str("...");
        return shortened;
    }
    trimmed.to_owned()
}

/// Compose the full prompt for an allowed or overridden turn.
///
/// The policy system prompt always leads, naming the active framework and
/// the behavioral boundary. For an overridden turn an explicit marker notes
/// that an authorized override accompanies the message, without relaxing
/// the instructions themselves.
pub fn compose(policy: &Policy, decision: Decision, user_text: &str) -> String {
    debug_assert!(
        decision != Decision::Blocked,
        "composer must not be invoked for a blocked turn"
    );

    let sanitized = sanitize_user_text(user_text);
    let mut prompt = String::new();
    prompt.push_str(&policy.system_prompt);
    prompt.push_str("\n\nActive compliance framework: ");
    prompt.push_str(&policy.framework);
    if decision == Decision::Overridden {
        prompt.push_str(
            "\nNote: this message carries an authorized override recorded in the audit trail.",
        );
    }
    prompt.push_str("\n\nUser query: ");
    prompt.push_str(&sanitized);
    prompt
}
