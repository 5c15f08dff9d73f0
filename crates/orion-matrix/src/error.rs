//! Error types for the matrix engine.

use crate::commission::{CommissionKey, CommissionStatus};
use crate::member::MemberId;
use thiserror::Error;

/// Result type for matrix engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while placing members or distributing commissions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The member already holds a matrix position. The activation was
    /// processed before and must not be retried.
    #[error("member {member} is already placed in the matrix")]
    AlreadyPlaced { member: MemberId },

    /// No open slot exists within the depth bound below the requested upline.
    #[error("matrix below member {upline} is full to depth {depth}")]
    MatrixFull { upline: MemberId, depth: u32 },

    /// The upline or matrix relation loops back on itself.
    #[error("cycle detected: member {member} leads back to {ancestor}")]
    CycleDetected { member: MemberId, ancestor: MemberId },

    /// The settings provider could not produce a snapshot.
    #[error("settings unavailable: {0}")]
    SettingsUnavailable(String),

    /// Write contention did not resolve within the retry budget.
    #[error("store conflict persisted after {attempts} attempts")]
    StoreConflict { attempts: u32 },

    /// A referenced member does not exist.
    #[error("unknown member {0}")]
    UnknownMember(MemberId),

    /// No commission entry exists under the key.
    #[error("unknown commission {0}")]
    UnknownCommission(CommissionKey),

    /// The member exists but is not active, so it cannot host children.
    #[error("member {0} is not active in the matrix")]
    NotInMatrix(MemberId),

    /// A settings value is missing, malformed, or out of range.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// Commission entries only move out of `pending`, and only once.
    #[error("invalid commission transition from {from} to {to}")]
    InvalidTransition {
        from: CommissionStatus,
        to: CommissionStatus,
    },

    /// The backing store failed transiently while serving a read.
    #[error("store error: {0}")]
    Store(String),

    /// Stored matrix data is unreadable or contradicts itself.
    #[error("corrupt matrix data: {0}")]
    Corrupt(String),
}

impl Error {
    /// Whether the caller may retry the same activation later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::SettingsUnavailable(_) | Error::StoreConflict { .. } | Error::Store(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(Error::StoreConflict { attempts: 5 }.is_retryable());
        assert!(Error::SettingsUnavailable("down".into()).is_retryable());
        assert!(!Error::AlreadyPlaced { member: MemberId(2) }.is_retryable());
        assert!(!Error::MatrixFull {
            upline: MemberId(1),
            depth: 3
        }
        .is_retryable());
        assert!(!Error::CycleDetected {
            member: MemberId(2),
            ancestor: MemberId(3)
        }
        .is_retryable());
        assert!(Error::Store("busy".into()).is_retryable());
        assert!(!Error::Corrupt("child 4 of 2 has no position".into()).is_retryable());
    }

    #[test]
    fn messages_name_members() {
        let err = Error::AlreadyPlaced { member: MemberId(7) };
        assert_eq!(err.to_string(), "member 7 is already placed in the matrix");
    }
}
