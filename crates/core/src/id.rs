//! Strongly-typed identifiers used across the domain.
//!
//! All identifiers are string-backed: guids arrive from foreign originators
//! (disconnected clients minting their own ids) and must round-trip exactly
//! as received. Locally minted ids use UUIDv7 for time ordering.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Identifier of a tenant (multi-tenant boundary).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

/// Identifier of an event (form submission).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventGuid(String);

/// Identifier of a domain entity (individual or group).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityGuid(String);

/// Identifier of a user (actor identity).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

macro_rules! impl_string_id {
    ($t:ty, $name:literal) => {
        impl $t {
            /// Wrap an externally supplied identifier as-is.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Mint a fresh identifier.
            ///
            /// Uses UUIDv7 (time-ordered). Prefer passing ids explicitly in
            /// tests for determinism.
            pub fn generate() -> Self {
                Self(Uuid::now_v7().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }

            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<String> for $t {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $t {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl AsRef<str> for $t {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                if s.is_empty() {
                    return Err(DomainError::invalid_id(concat!($name, ": empty")));
                }
                Ok(Self(s.to_string()))
            }
        }
    };
}

impl_string_id!(TenantId, "TenantId");
impl_string_id!(EventGuid, "EventGuid");
impl_string_id!(EntityGuid, "EntityGuid");
impl_string_id!(UserId, "UserId");

impl Default for TenantId {
    /// The unscoped tenant used by single-tenant (embedded) deployments.
    fn default() -> Self {
        Self("default".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_guids_are_unique() {
        assert_ne!(EventGuid::generate(), EventGuid::generate());
    }

    #[test]
    fn default_tenant_is_default() {
        assert_eq!(TenantId::default().as_str(), "default");
    }

    #[test]
    fn from_str_rejects_empty() {
        assert!("".parse::<EntityGuid>().is_err());
        assert!("abc".parse::<EntityGuid>().is_ok());
    }

    #[test]
    fn serde_is_transparent() {
        let guid = EntityGuid::new("e-1");
        let json = serde_json::to_string(&guid).unwrap();
        assert_eq!(json, "\"e-1\"");
        let back: EntityGuid = serde_json::from_str(&json).unwrap();
        assert_eq!(back, guid);
    }
}
