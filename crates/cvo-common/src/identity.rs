//! ---
//! cvo_section: "01-core-functionality"
//! cvo_subsection: "module"
//! cvo_type: "source"
//! cvo_scope: "code"
//! cvo_description: "Shared primitives and utilities for the core runtime."
//! cvo_version: "v0.0.0-prealpha"
//! cvo_owner: "tbd"
//! ---
//! Startup preconditions: the operator-supplied cluster identifier and the
//! replica identity written into the shared lease record.
//!
//! Both are validated before any client is built so a malformed value can
//! never reach the coordination store.
use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use uuid::{Uuid, Variant};

/// Environment variable naming this replica.
pub const POD_NAME_ENV: &str = "POD_NAME";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("invalid cluster id {raw:?}, must be a UUID: {reason}")]
    NotUuid { raw: String, reason: String },
    #[error("invalid cluster id {raw:?}, must be an RFC4122-variant UUID: found {variant}")]
    WrongVariant { raw: String, variant: String },
    #[error("invalid cluster id {raw:?}, must be a version-4 UUID: found {version}")]
    WrongVersion { raw: String, version: usize },
    #[error("failed to find {0} in environment")]
    MissingIdentity(&'static str),
}

/// Random (version 4, RFC 4122 variant) UUID identifying the managed cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClusterId(Uuid);

impl ClusterId {
    /// Parse and validate an operator-supplied cluster identifier.
    pub fn parse(raw: &str) -> Result<Self, IdentityError> {
        let id = Uuid::parse_str(raw).map_err(|err| IdentityError::NotUuid {
            raw: raw.to_owned(),
            reason: err.to_string(),
        })?;
        let variant = id.get_variant();
        if variant != Variant::RFC4122 {
            return Err(IdentityError::WrongVariant {
                raw: raw.to_owned(),
                variant: format!("{variant:?}"),
            });
        }
        let version = id.get_version_num();
        if version != 4 {
            return Err(IdentityError::WrongVersion {
                raw: raw.to_owned(),
                version,
            });
        }
        Ok(Self(id))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl FromStr for ClusterId {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.hyphenated().fmt(f)
    }
}

/// Opaque, non-empty name of this replica.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProcessIdentity(String);

impl ProcessIdentity {
    /// Resolve the identity from `POD_NAME`.
    pub fn from_env() -> Result<Self, IdentityError> {
        Self::from_value(std::env::var(POD_NAME_ENV).ok())
    }

    /// Resolve the identity from an already looked-up environment value.
    pub fn from_value(value: Option<String>) -> Result<Self, IdentityError> {
        match value {
            Some(name) if !name.trim().is_empty() => Ok(Self(name)),
            _ => Err(IdentityError::MissingIdentity(POD_NAME_ENV)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProcessIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ProcessIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_lowercase_hyphenated() {
        let id = ClusterId::parse("9F2C1B7E-5A4D-4C3B-8E2F-1A0B9C8D7E6F").unwrap();
        assert_eq!(id.to_string(), "9f2c1b7e-5a4d-4c3b-8e2f-1a0b9c8d7e6f");
    }

    #[test]
    fn whitespace_identity_is_rejected() {
        assert_eq!(
            ProcessIdentity::from_value(Some("   ".into())),
            Err(IdentityError::MissingIdentity(POD_NAME_ENV))
        );
    }
}
