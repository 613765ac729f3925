//! Registry roles.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A role label that is not one of the four recognized roles.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

/// The role an account holds in the registry.
///
/// Every account holds exactly one role. Accounts that were never assigned
/// one are treated as [`Role::User`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// May assign roles and read every credential.
    Admin,
    /// May issue and revoke credentials.
    Issuer,
    /// A recognized label with no registry privilege of its own. Verifiers
    /// read private credentials through per-credential grants.
    Verifier,
    /// The default role.
    #[default]
    User,
}

impl Role {
    /// All roles, in privilege order.
    pub const ALL: [Role; 4] = [Role::Admin, Role::Issuer, Role::Verifier, Role::User];

    /// Lowercase label used on the wire and in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Issuer => "issuer",
            Role::Verifier => "verifier",
            Role::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "issuer" => Ok(Role::Issuer),
            "verifier" => Ok(Role::Verifier),
            "user" => Ok(Role::User),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}
