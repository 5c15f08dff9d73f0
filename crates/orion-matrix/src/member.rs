//! Member model - identity within the referral graph.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric member identifier, assigned sequentially by the store.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MemberId(pub u64);

impl MemberId {
    /// The admin member every matrix hangs from.
    pub const ROOT: Self = Self(1);
}

impl From<u64> for MemberId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Human-readable member code: `BO` followed by at least six digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberCode(String);

impl MemberCode {
    /// Prefix shared by every code.
    pub const PREFIX: &'static str = "BO";

    /// Derive the code for a member id, e.g. `BO000042`.
    pub fn for_id(id: MemberId) -> Self {
        Self(format!("{}{:06}", Self::PREFIX, id.0))
    }

    /// Parse a user-supplied code, case-insensitively.
    pub fn parse(input: &str) -> Option<Self> {
        let upper = input.trim().to_ascii_uppercase();
        let digits = upper.strip_prefix(Self::PREFIX)?;
        if digits.len() < 6 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some(Self(upper))
    }

    /// The code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemberCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Activation status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberStatus {
    #[default]
    Pending,
    Active,
}

/// Platform role. Only admins approve commissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    #[default]
    Member,
}

/// A member of the platform.
///
/// `sponsor_id` records recruitment credit and never changes. `upline_id` is
/// the matrix parent: it starts as the requested upline and is rewritten to the
/// actual parent when placement spills over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Unique identifier
    pub id: MemberId,

    /// Human-readable code
    pub code: MemberCode,

    /// Who recruited this member (`None` only for the root)
    pub sponsor_id: Option<MemberId>,

    /// Matrix parent (`None` only for the root)
    pub upline_id: Option<MemberId>,

    /// Activation status
    pub status: MemberStatus,

    /// Platform role
    #[serde(default)]
    pub role: Role,

    /// Activation time in milliseconds since the Unix epoch
    pub activated_at: Option<u64>,

    /// Enrollment time in milliseconds since the Unix epoch
    pub created_at: u64,
}

impl Member {
    /// The active admin root with no sponsor and no upline.
    pub fn root(id: MemberId, created_at: u64) -> Self {
        Self {
            id,
            code: MemberCode::for_id(id),
            sponsor_id: None,
            upline_id: None,
            status: MemberStatus::Active,
            role: Role::Admin,
            activated_at: Some(created_at),
            created_at,
        }
    }

    /// A freshly enrolled member awaiting activation.
    pub fn pending(id: MemberId, sponsor: MemberId, upline: MemberId, created_at: u64) -> Self {
        Self {
            id,
            code: MemberCode::for_id(id),
            sponsor_id: Some(sponsor),
            upline_id: Some(upline),
            status: MemberStatus::Pending,
            role: Role::Member,
            activated_at: None,
            created_at,
        }
    }

    /// The root has no sponsor.
    pub fn is_root(&self) -> bool {
        self.sponsor_id.is_none()
    }

    pub fn is_active(&self) -> bool {
        self.status == MemberStatus::Active
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}
