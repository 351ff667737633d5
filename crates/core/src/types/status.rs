//! Status enums for moderated entities.

use serde::{Deserialize, Serialize};

/// Error returned when a status string is not recognised.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid status: {0}")]
pub struct StatusParseError(pub String);

/// Moderation state of products, advertisements and vendor applications.
///
/// Everything a vendor (or would-be vendor) submits starts out `Pending` and
/// is moved to `Approved` or `Rejected` by an admin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    /// Lowercase name as used on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ApprovalStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            _ => Err(StatusParseError(s.to_owned())),
        }
    }
}
