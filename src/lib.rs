//! originbind - per-player IP binding for game servers
//!
//! Each player identity may only log in from a small set of approved
//! origins (IP addresses). The first origin a new identity connects from is
//! registered automatically; later origins are added by an operator.
//!
//! - `identity`: validated identity and origin types
//! - `persistence`: durable identity → origins table
//! - `gatekeeper`: allow/deny decisions, denial trail, access history
//! - `geo`: optional country-code enrichment, never on the decision path
//! - `admin`: operator queries and mutations

pub mod admin;
pub mod gatekeeper;
pub mod geo;
pub mod identity;
pub mod persistence;
