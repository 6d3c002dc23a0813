//! Identity and origin value types
//!
//! Both types are validated at construction. Nothing downstream of the login
//! boundary ever handles a raw, unchecked string.
//!
//! - `Identity` wraps a 128-bit account token (`Uuid`)
//! - `Origin` holds an IPv4/IPv6 address in canonical textual form

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use uuid::Uuid;

/// Sentinel country code for loopback and private-range origins.
pub const LOCAL_COUNTRY: &str = "LOCAL";

/// Validation failures raised at the login/admin boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid IP format: {0}")]
    InvalidOrigin(String),

    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),
}

/// Stable account token distinguishing one player from another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(Uuid);

impl Identity {
    /// Wrap an already-parsed UUID.
    pub fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Fresh random identity (tests and tooling).
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse the hyphenated (or simple) UUID form.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        Uuid::parse_str(input.trim())
            .map(Self)
            .map_err(|_| ValidationError::InvalidIdentity(input.to_string()))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for Identity {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A network address a login attempt arrives from.
///
/// The inner string is always the canonical rendering of a parsed `IpAddr`,
/// so `"::0001"` and `"::1"` compare equal once wrapped.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Origin {
    text: String,
    addr: IpAddr,
}

impl Origin {
    /// Validate and canonicalise a textual address.
    ///
    /// Hostnames (including `localhost`) are rejected; only literal IPv4 and
    /// IPv6 addresses are accepted.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let addr: IpAddr = input
            .trim()
            .parse()
            .map_err(|_| ValidationError::InvalidOrigin(input.to_string()))?;
        Ok(Self::from(addr))
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    /// True for loopback and private-range addresses, which never leave the
    /// local network and so have no meaningful geolocation.
    pub fn is_local(&self) -> bool {
        match self.addr {
            IpAddr::V4(v4) => v4.is_loopback() || v4.is_private(),
            IpAddr::V6(v6) => {
                if let Some(mapped) = v6.to_ipv4_mapped() {
                    return mapped.is_loopback() || mapped.is_private();
                }
                v6.is_loopback() || v6.is_unique_local()
            }
        }
    }
}

impl From<IpAddr> for Origin {
    fn from(addr: IpAddr) -> Self {
        Self {
            text: addr.to_string(),
            addr,
        }
    }
}

impl FromStr for Origin {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl Serialize for Origin {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.text)
    }
}

impl<'de> Deserialize<'de> for Origin {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Origin::parse(&raw).map_err(serde::de::Error::custom)
    }
}
