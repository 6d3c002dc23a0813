//! Durable state for origin bindings.
//!
//! Every file is a TOML document written through `file::write_toml`, which
//! replaces the target atomically. The registration store is the only writer
//! of `player-origins.toml`; the audit trail and access history own their own
//! files (see `gatekeeper`).

pub mod file;
pub mod registry;

pub use file::{read_toml, write_toml, StoreError};
pub use registry::{AddOutcome, RegistrationStore, RemoveOutcome};

/// File name of the identity → origins table inside the data directory.
pub const REGISTRATIONS_FILE: &str = "player-origins.toml";

/// File name of the denial trail inside the data directory.
pub const FAILED_LOGINS_FILE: &str = "failed-logins.toml";

/// File name of the per-identity access history inside the data directory.
pub const ACCESS_HISTORY_FILE: &str = "access-history.toml";
