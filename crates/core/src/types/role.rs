//! Authorization roles.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Error returned when a role string is not recognised.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid role: {0}")]
pub struct RoleParseError(pub String);

/// Authorization tier controlling which dashboards and actions are permitted.
///
/// Roles are owned by the backend; the web layer only holds a cached copy.
/// There is no `Default`: an unresolved role is its own state, never
/// [`Role::User`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Approves vendors, products and advertisements; manages user roles.
    Admin,
    /// Lists products and advertisements for their market stall.
    Vendor,
    /// Browses, keeps a wishlist, buys.
    User,
}

impl Role {
    /// Every role, most privileged first.
    pub const ALL: [Self; 3] = [Self::Admin, Self::Vendor, Self::User];

    const fn bit(self) -> u8 {
        match self {
            Self::Admin => 0b001,
            Self::Vendor => 0b010,
            Self::User => 0b100,
        }
    }

    /// Lowercase name as used on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Vendor => "vendor",
            Self::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = RoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "vendor" => Ok(Self::Vendor),
            "user" => Ok(Self::User),
            _ => Err(RoleParseError(s.to_owned())),
        }
    }
}

/// A set of permitted roles.
///
/// ```
/// use market_pulse_core::{Role, RoleSet};
///
/// let staff = RoleSet::ADMIN.with(Role::Vendor);
/// assert!(staff.contains(Role::Vendor));
/// assert!(!staff.contains(Role::User));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RoleSet(u8);

impl RoleSet {
    /// No roles.
    pub const EMPTY: Self = Self(0);
    /// Admins only.
    pub const ADMIN: Self = Self(Role::Admin.bit());
    /// Vendors only.
    pub const VENDOR: Self = Self(Role::Vendor.bit());
    /// Users only.
    pub const USER: Self = Self(Role::User.bit());
    /// Any authenticated role.
    pub const ALL: Self = Self(0b111);

    /// This set plus `role`.
    #[must_use]
    pub const fn with(self, role: Role) -> Self {
        Self(self.0 | role.bit())
    }

    /// Whether `role` is permitted.
    #[must_use]
    pub const fn contains(self, role: Role) -> bool {
        self.0 & role.bit() != 0
    }

    /// Whether no role is permitted.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterate the permitted roles.
    pub fn iter(self) -> impl Iterator<Item = Role> {
        Role::ALL.into_iter().filter(move |role| self.contains(*role))
    }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<I: IntoIterator<Item = Role>>(iter: I) -> Self {
        iter.into_iter().fold(Self::EMPTY, Self::with)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trips_through_str() {
        for role in Role::ALL {
            assert_eq!(role.to_string().parse::<Role>().unwrap(), role);
        }
        assert!("superuser".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Vendor).unwrap(), "\"vendor\"");
        let role: Role = serde_json::from_str("\"admin\"").unwrap();
        assert_eq!(role, Role::Admin);
    }

    #[test]
    fn test_role_set_membership() {
        assert!(RoleSet::ADMIN.contains(Role::Admin));
        assert!(!RoleSet::ADMIN.contains(Role::User));
        assert!(RoleSet::EMPTY.is_empty());
        assert!(Role::ALL.into_iter().all(|role| RoleSet::ALL.contains(role)));
    }

    #[test]
    fn test_role_set_from_iter() {
        let set: RoleSet = [Role::Vendor, Role::User].into_iter().collect();
        assert_eq!(set, RoleSet::VENDOR.with(Role::User));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![Role::Vendor, Role::User]);
    }
}
