//! Guardrail core: policy registry, classifier, authorization, prompt
//! composition, audit recording, and the per-turn pipeline tying them
//! together.

pub mod audit;
pub mod authorize;
pub mod classifier;
pub mod compose;
pub mod policy;
pub mod session;
