//! Activation orchestration: placement plus commission posting in one
//! optimistic transaction.

use crate::error::{Error, Result};
use crate::keys;
use crate::storage::{now_millis, Storage};
use crate::txn::{self, Txn, TxnView};
use orion_matrix::{
    distribute, place, CommissionEntry, MatrixPosition, Member, MemberId, MemberStatus,
    SettingsProvider, SettingsSnapshot,
};

/// Request to activate an eligible member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivationRequest {
    /// Member being activated
    pub member: MemberId,

    /// Recruiter; must match the member record
    pub sponsor: MemberId,

    /// Requested placement node. `None` uses the upline recorded at enrollment.
    pub upline: Option<MemberId>,
}

impl ActivationRequest {
    pub fn new(member: MemberId, sponsor: MemberId, upline: Option<MemberId>) -> Self {
        Self {
            member,
            sponsor,
            upline,
        }
    }

    /// Build a request from an enrolled member record.
    pub fn for_member(member: &Member) -> Result<Self> {
        let sponsor = member
            .sponsor_id
            .ok_or(orion_matrix::Error::AlreadyPlaced { member: member.id })?;
        Ok(Self::new(member.id, sponsor, None))
    }
}

/// Result of a committed activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationOutcome {
    pub position: MatrixPosition,
    /// Entries inserted by this activation, nearest ancestor first
    pub posted: Vec<CommissionEntry>,
}

impl Storage {
    /// Place an eligible member and post its commissions atomically.
    ///
    /// Settings are captured once; conflicting commits re-run placement
    /// against fresh state with the same snapshot. Either the position, the
    /// member's active status and every commission entry commit together or
    /// nothing does.
    pub fn activate(&self, request: ActivationRequest) -> Result<ActivationOutcome> {
        let settings = self.snapshot()?;
        let outcome = self.run_txn("activate", |txn| activate_in(txn, &request, &settings))?;

        tracing::info!(
            member = %request.member,
            sponsor = %request.sponsor,
            parent = %outcome.position.parent_id,
            position = outcome.position.position,
            spillover_depth = outcome.position.spillover_depth,
            entries = outcome.posted.len(),
            "member activated"
        );
        Ok(outcome)
    }

    /// Re-run distribution for an already placed member, inserting only
    /// entries that are missing. Returns the newly inserted entries.
    pub fn post_commissions(&self, originator: MemberId) -> Result<Vec<CommissionEntry>> {
        let settings = self.snapshot()?;
        let posted = self.run_txn("post_commissions", |txn| {
            if txn::read::<MatrixPosition>(txn, keys::position(originator))?.is_none() {
                return Err(orion_matrix::Error::NotInMatrix(originator).into());
            }
            post_in(txn, originator, &settings, now_millis())
        })?;

        tracing::debug!(%originator, posted = posted.len(), "commissions reposted");
        Ok(posted)
    }
}

fn activate_in(
    txn: &Txn<'_>,
    request: &ActivationRequest,
    settings: &SettingsSnapshot,
) -> Result<ActivationOutcome> {
    let mut member: Member = txn::read(txn, keys::member(request.member))?
        .ok_or(orion_matrix::Error::UnknownMember(request.member))?;
    match member.sponsor_id {
        None => {
            return Err(orion_matrix::Error::AlreadyPlaced {
                member: request.member,
            }
            .into())
        }
        Some(sponsor) if sponsor != request.sponsor => {
            return Err(Error::InvalidInput(format!(
                "member {} was sponsored by {}, not {}",
                member.code, sponsor, request.sponsor
            )))
        }
        Some(_) => {}
    }

    let at = now_millis();
    let upline = request.upline.or(member.upline_id);
    let position = place(
        &TxnView::new(txn),
        request.member,
        request.sponsor,
        upline,
        settings,
        at,
    )?;

    txn::write(txn, keys::position(request.member), &position)?;
    txn::write(txn, keys::child(position.parent_id, position.position), &request.member)?;
    txn::write(txn, keys::slots(position.parent_id), &position.position)?;

    member.status = MemberStatus::Active;
    member.upline_id = Some(position.parent_id);
    member.activated_at = Some(at);
    txn::write(txn, keys::member(request.member), &member)?;

    let posted = post_in(txn, request.member, settings, at)?;
    Ok(ActivationOutcome { position, posted })
}

/// Distribute and insert entries whose natural key is absent.
fn post_in(
    txn: &Txn<'_>,
    originator: MemberId,
    settings: &SettingsSnapshot,
    at: u64,
) -> Result<Vec<CommissionEntry>> {
    let entries = distribute(&TxnView::new(txn), originator, settings, at)?;

    let mut posted = Vec::with_capacity(entries.len());
    for entry in entries {
        let key = entry.key();
        if txn::read::<CommissionEntry>(txn, keys::commission(&key))?.is_some() {
            continue;
        }
        txn::write(txn, keys::commission(&key), &entry)?;
        txn::write(txn, keys::earning(&key, entry.status), &entry.amount)?;
        posted.push(entry);
    }
    Ok(posted)
}
