//! Level commission computation and the approval state machine.
//!
//! [`distribute`] is a pure computation: it resolves the upline chain of the
//! activated member and prices each ancestor with the flat rate for its
//! distance. Exactly-once posting is enforced where entries are stored, keyed
//! by [`CommissionKey`].
//!
//! # Approval
//!
//! ```text
//! pending --approve--> approved   (counts toward available balance)
//!    \
//!     `---reject-----> rejected   (excluded permanently)
//! ```
//!
//! Both outcomes are terminal.

use crate::ancestry::resolve_ancestors;
use crate::error::{Error, Result};
use crate::member::MemberId;
use crate::settings::SettingsSnapshot;
use crate::view::MatrixView;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a commission entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommissionStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl CommissionStatus {
    pub const ALL: [Self; 3] = [Self::Pending, Self::Approved, Self::Rejected];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for CommissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Natural key of a commission entry. At most one entry exists per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CommissionKey {
    pub beneficiary_id: MemberId,
    pub originator_id: MemberId,
    pub level: u32,
}

impl fmt::Display for CommissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} <- {} (level {})",
            self.beneficiary_id, self.originator_id, self.level
        )
    }
}

/// A commission ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionEntry {
    /// Ancestor receiving the credit
    pub beneficiary_id: MemberId,

    /// Member whose activation generated the credit
    pub originator_id: MemberId,

    /// Distance from beneficiary to originator
    pub level: u32,

    /// Flat amount for the level at the time of the run
    pub amount: u64,

    pub status: CommissionStatus,

    /// Creation time in milliseconds since the Unix epoch
    pub created_at: u64,

    /// Admin who approved or rejected the entry
    pub resolved_by: Option<MemberId>,

    /// Resolution time in milliseconds since the Unix epoch
    pub resolved_at: Option<u64>,
}

impl CommissionEntry {
    /// A new pending entry.
    pub fn pending(
        beneficiary_id: MemberId,
        originator_id: MemberId,
        level: u32,
        amount: u64,
        created_at: u64,
    ) -> Self {
        Self {
            beneficiary_id,
            originator_id,
            level,
            amount,
            status: CommissionStatus::Pending,
            created_at,
            resolved_by: None,
            resolved_at: None,
        }
    }

    pub fn key(&self) -> CommissionKey {
        CommissionKey {
            beneficiary_id: self.beneficiary_id,
            originator_id: self.originator_id,
            level: self.level,
        }
    }

    /// Move a pending entry to `approved`.
    pub fn approve(&mut self, approver: MemberId, at: u64) -> Result<()> {
        self.resolve(CommissionStatus::Approved, approver, at)
    }

    /// Move a pending entry to `rejected`.
    pub fn reject(&mut self, approver: MemberId, at: u64) -> Result<()> {
        self.resolve(CommissionStatus::Rejected, approver, at)
    }

    /// Apply a resolution. Only `pending` entries move, and only to a terminal
    /// status.
    pub fn resolve(&mut self, to: CommissionStatus, approver: MemberId, at: u64) -> Result<()> {
        if self.status.is_terminal() || !to.is_terminal() {
            return Err(Error::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.resolved_by = Some(approver);
        self.resolved_at = Some(at);
        Ok(())
    }
}

/// Compute the commission entries owed for the activation of `originator`.
///
/// One pending entry per ancestor present on the upline chain, up to
/// `max_matrix_levels`, nearest first. Levels without a configured rate
/// produce zero-amount entries. Nothing is persisted.
pub fn distribute<V: MatrixView + ?Sized>(
    view: &V,
    originator: MemberId,
    settings: &SettingsSnapshot,
    created_at: u64,
) -> Result<Vec<CommissionEntry>> {
    let ancestors = resolve_ancestors(view, originator, settings.max_matrix_levels())?;

    let entries: Vec<CommissionEntry> = ancestors
        .into_iter()
        .map(|ancestor| {
            CommissionEntry::pending(
                ancestor.member_id,
                originator,
                ancestor.distance,
                settings.level_commission(ancestor.distance),
                created_at,
            )
        })
        .collect();

    tracing::debug!(
        %originator,
        entries = entries.len(),
        total = entries.iter().map(|e| e.amount).sum::<u64>(),
        "commissions computed"
    );

    Ok(entries)
}
