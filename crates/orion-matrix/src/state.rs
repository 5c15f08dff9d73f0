//! In-memory matrix state.
//!
//! Holds members, positions and the commission ledger in ordered maps and
//! applies activations atomically: the whole activation is staged on a copy
//! and swapped in only when placement and distribution both succeed.

use crate::commission::{distribute, CommissionEntry, CommissionKey, CommissionStatus};
use crate::error::{Error, Result};
use crate::member::{Member, MemberId, MemberStatus};
use crate::placement::place;
use crate::position::MatrixPosition;
use crate::settings::SettingsSnapshot;
use crate::view::MatrixView;
use std::collections::BTreeMap;

/// Result of a successful activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
    /// The position the member was placed at
    pub position: MatrixPosition,

    /// Commission entries newly written by this activation
    pub posted: Vec<CommissionEntry>,
}

/// Local matrix state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatrixState {
    members: BTreeMap<MemberId, Member>,
    positions: BTreeMap<MemberId, MatrixPosition>,
    /// Children per parent, in position order.
    children: BTreeMap<MemberId, Vec<MemberId>>,
    commissions: BTreeMap<CommissionKey, CommissionEntry>,
}

impl MatrixState {
    /// Create empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create state containing only the root member.
    pub fn with_root(root: Member) -> Self {
        let mut state = Self::new();
        state.insert_member(root);
        state
    }

    /// Insert or replace a member record.
    pub fn insert_member(&mut self, member: Member) -> Option<Member> {
        self.members.insert(member.id, member)
    }

    /// Place `member`, mark it active and post its commissions.
    ///
    /// `upline` overrides the upline stored on the member record. On error the
    /// state is unchanged.
    pub fn activate(
        &mut self,
        member: MemberId,
        upline: Option<MemberId>,
        settings: &SettingsSnapshot,
        at: u64,
    ) -> Result<Activation> {
        let record = self
            .members
            .get(&member)
            .ok_or(Error::UnknownMember(member))?;
        let sponsor = record.sponsor_id.ok_or(Error::AlreadyPlaced { member })?;
        let upline = upline.or(record.upline_id);

        let position = place(&*self, member, sponsor, upline, settings, at)?;

        let mut staged = self.clone();
        staged.apply_position(position)?;
        let entries = distribute(&staged, member, settings, at)?;
        let posted = staged.post(entries);
        *self = staged;

        Ok(Activation { position, posted })
    }

    /// Record a position and mark its member active under the actual parent.
    fn apply_position(&mut self, position: MatrixPosition) -> Result<()> {
        if self.positions.contains_key(&position.member_id) {
            return Err(Error::AlreadyPlaced {
                member: position.member_id,
            });
        }
        let member = self
            .members
            .get_mut(&position.member_id)
            .ok_or(Error::UnknownMember(position.member_id))?;

        member.status = MemberStatus::Active;
        member.upline_id = Some(position.parent_id);
        member.activated_at = Some(position.placed_at);

        self.positions.insert(position.member_id, position);
        self.children
            .entry(position.parent_id)
            .or_default()
            .push(position.member_id);
        Ok(())
    }

    /// Insert entries whose natural key is not present yet. Returns the ones
    /// actually inserted.
    pub fn post(&mut self, entries: Vec<CommissionEntry>) -> Vec<CommissionEntry> {
        let mut posted = Vec::with_capacity(entries.len());
        for entry in entries {
            let key = entry.key();
            if self.commissions.contains_key(&key) {
                continue;
            }
            self.commissions.insert(key, entry.clone());
            posted.push(entry);
        }
        posted
    }

    /// Approve or reject a pending commission.
    pub fn resolve_commission(
        &mut self,
        key: &CommissionKey,
        to: CommissionStatus,
        approver: MemberId,
        at: u64,
    ) -> Result<&CommissionEntry> {
        let entry = self
            .commissions
            .get_mut(key)
            .ok_or(Error::UnknownCommission(*key))?;
        entry.resolve(to, approver, at)?;
        Ok(&*entry)
    }

    /// Get a commission by natural key.
    pub fn commission(&self, key: &CommissionKey) -> Option<&CommissionEntry> {
        self.commissions.get(key)
    }

    /// All commission entries, ordered by natural key.
    pub fn commissions(&self) -> impl Iterator<Item = &CommissionEntry> {
        self.commissions.values()
    }
}

impl MatrixView for MatrixState {
    fn member(&self, id: MemberId) -> Result<Option<Member>> {
        Ok(self.members.get(&id).cloned())
    }

    fn position(&self, id: MemberId) -> Result<Option<MatrixPosition>> {
        Ok(self.positions.get(&id).copied())
    }

    fn children(&self, parent: MemberId) -> Result<Vec<MatrixPosition>> {
        let Some(ids) = self.children.get(&parent) else {
            return Ok(Vec::new());
        };
        ids.iter()
            .map(|id| {
                self.positions
                    .get(id)
                    .copied()
                    .ok_or_else(|| Error::Corrupt(format!("child {} of {} has no position", id, parent)))
            })
            .collect()
    }
}
