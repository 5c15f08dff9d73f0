//! Bright Orion Matrix Engine
//!
//! Deterministic matrix placement and level commission distribution.
//!
//! # Model
//!
//! Members are recruited by a **sponsor** and placed under an **upline** in a
//! bounded-width tree (the matrix). The two relations are kept apart: sponsor
//! is recruitment credit, upline is tree ancestry, and they diverge whenever a
//! placement spills over.
//!
//! # Activation
//!
//! 1. Capture a [`SettingsSnapshot`] once
//! 2. [`place`] the member: directly under the upline while it has room,
//!    otherwise breadth-first spillover to the earliest-placed open node
//! 3. [`distribute`] commissions: one flat-rate entry per ancestor on the
//!    upline chain, up to `max_matrix_levels`
//!
//! Everything here is a pure function of a [`MatrixView`]. Persistence,
//! transactions and exactly-once posting belong to the store.
//!
//! # Example
//!
//! ```
//! use orion_matrix::{Member, MemberId, MatrixState, SettingsSnapshot};
//!
//! let settings = SettingsSnapshot::new(36_000, 5_000, 3, 5, vec![4_000, 2_000, 2_000]).unwrap();
//! let mut state = MatrixState::with_root(Member::root(MemberId::ROOT, 0));
//! state.insert_member(Member::pending(MemberId(2), MemberId::ROOT, MemberId::ROOT, 0));
//!
//! let activation = state.activate(MemberId(2), None, &settings, 1).unwrap();
//! assert_eq!(activation.position.parent_id, MemberId::ROOT);
//! assert_eq!(activation.posted[0].amount, 4_000);
//! ```

mod ancestry;
mod commission;
mod error;
mod member;
mod placement;
mod position;
mod settings;
mod state;
mod view;

pub use ancestry::{resolve_ancestors, Ancestor};
pub use commission::{distribute, CommissionEntry, CommissionKey, CommissionStatus};
pub use error::{Error, Result};
pub use member::{Member, MemberCode, MemberId, MemberStatus, Role};
pub use placement::{open_slots, place};
pub use position::MatrixPosition;
pub use settings::{
    keys as setting_keys, SettingsProvider, SettingsSnapshot, DEFAULT_LEVEL_COMMISSION,
    DEFAULT_MAX_MATRIX_LEVELS, DEFAULT_MIN_WITHDRAWAL, DEFAULT_PACKAGE_PRICE,
    DEFAULT_REFERRALS_PER_LEVEL, MAX_SUPPORTED_LEVELS,
};
pub use state::{Activation, MatrixState};
pub use view::MatrixView;
