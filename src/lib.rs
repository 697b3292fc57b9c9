//! Redline — a policy-aware guardrail layer for chat frontends.
//!
//! Sits between an interactive text client and a generative-model backend.
//! Every outbound user message is classified against the active policy's
//! red lines, blocked or overridden per the policy's evidence tier, and the
//! whole turn is written to an append-only audit trail.
//!
//! See `DESIGN.md` for architecture notes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod guard;
pub mod logging;
pub mod providers;
