//! RocksDB key layout.
//!
//! Numeric ids are zero-padded so that lexicographic key order matches
//! numeric order and prefix scans stay contiguous.

use orion_matrix::{CommissionKey, CommissionStatus, MemberCode, MemberId};

/// All settings, stored as one JSON object so a snapshot is a single read.
pub const SETTINGS: &[u8] = b"settings";

/// Last assigned member id.
pub const MEMBER_SEQ: &[u8] = b"seq:member";

pub fn member(id: MemberId) -> String {
    format!("member:{:020}", id.0)
}

pub fn code(code: &MemberCode) -> String {
    format!("code:{}", code)
}

/// Recruitment index: members sponsored by `sponsor`.
pub fn sponsored(sponsor: MemberId, member: MemberId) -> String {
    format!("{}{:020}", sponsored_prefix(sponsor), member.0)
}

pub fn sponsored_prefix(sponsor: MemberId) -> String {
    format!("sponsored:{:020}:", sponsor.0)
}

pub fn position(id: MemberId) -> String {
    format!("position:{:020}", id.0)
}

/// Direct child count of `parent`. Every placement under `parent` rewrites
/// it, so concurrent claims on the same slot conflict here.
pub fn slots(parent: MemberId) -> String {
    format!("slots:{:020}", parent.0)
}

pub fn child(parent: MemberId, position: u32) -> String {
    format!("child:{:020}:{:05}", parent.0, position)
}

pub fn commission(key: &CommissionKey) -> String {
    format!(
        "commission:{:020}:{:020}:{:03}",
        key.beneficiary_id.0, key.originator_id.0, key.level
    )
}

pub fn commission_prefix(beneficiary: MemberId) -> String {
    format!("commission:{:020}:", beneficiary.0)
}

/// Balance index by beneficiary and status; the value is the amount.
pub fn earning(key: &CommissionKey, status: CommissionStatus) -> String {
    format!(
        "{}{}:{:020}:{:03}",
        earning_prefix(key.beneficiary_id),
        status,
        key.originator_id.0,
        key.level
    )
}

pub fn earning_prefix(beneficiary: MemberId) -> String {
    format!("earning:{:020}:", beneficiary.0)
}

/// Parse the status segment out of an `earning:` key.
pub fn earning_status(key: &[u8], beneficiary: MemberId) -> Option<CommissionStatus> {
    let prefix = earning_prefix(beneficiary);
    let rest = key.strip_prefix(prefix.as_bytes())?;
    let end = rest.iter().position(|b| *b == b':')?;
    CommissionStatus::parse(std::str::from_utf8(&rest[..end]).ok()?)
}
