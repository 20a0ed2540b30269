//! promptwarden: a three-branch prompt-injection / PII firewall for
//! third-party LLM chat endpoints.
//!
//! A request passes through lexical heuristics (Branch A), a semantic
//! two-phase classifier over a dual attack/safe corpus (Branch B), and a
//! safety NLP classifier (Branch C). The [`arbiter`] fuses the three
//! into one verdict; on a non-blocked verdict the [`pii`] detector may
//! additionally redact the response.

pub mod arbiter;
pub mod branch_a;
pub mod branch_b;
pub mod branch_c;
pub mod config;
pub mod error;
pub mod normalizer;
pub mod observability;
pub mod orchestrator;
pub mod pii;
pub mod types;
pub mod util;
