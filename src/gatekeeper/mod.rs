//! Gatekeeper module: login decisions and their evidence
//!
//! - Gate: allow/deny per login attempt, first-contact registration
//! - Audit trail: append-only record of denials
//! - Access history: bounded per-identity ring of recent attempts

pub mod access_history;
pub mod audit_trail;
pub mod gate;

pub use access_history::{AccessEntry, AccessHistory, AccessOutcome};
pub use audit_trail::{AuditLog, DenialQuery, DenialRecord};
pub use gate::{AccessGate, Decision, GatePolicy, GateState};
