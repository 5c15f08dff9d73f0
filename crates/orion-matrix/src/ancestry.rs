//! Upline ancestry resolution.
//!
//! Walks `upline_id` links (matrix ancestry), never `sponsor_id`. The walk
//! stops at the root or at `max_depth`, whichever comes first.

use crate::error::{Error, Result};
use crate::member::MemberId;
use crate::view::MatrixView;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// An ancestor and its distance from the starting member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ancestor {
    pub member_id: MemberId,
    /// 1 for the direct upline
    pub distance: u32,
}

/// Resolve up to `max_depth` ancestors of `member`, nearest first.
///
/// Returns fewer entries when the root is reached early. Fails with
/// [`Error::CycleDetected`] if a member appears twice on the chain.
pub fn resolve_ancestors<V: MatrixView + ?Sized>(
    view: &V,
    member: MemberId,
    max_depth: u32,
) -> Result<Vec<Ancestor>> {
    let mut chain = Vec::with_capacity(max_depth as usize);
    let mut seen = HashSet::from([member]);
    let mut current = view.member(member)?.ok_or(Error::UnknownMember(member))?;

    for distance in 1..=max_depth {
        let Some(upline) = current.upline_id else {
            break;
        };

        if !seen.insert(upline) {
            tracing::error!(%member, %upline, distance, "cycle in upline chain");
            return Err(Error::CycleDetected {
                member,
                ancestor: upline,
            });
        }

        chain.push(Ancestor {
            member_id: upline,
            distance,
        });

        if distance < max_depth {
            current = view.member(upline)?.ok_or(Error::UnknownMember(upline))?;
        }
    }

    Ok(chain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::member::Member;
    use crate::MatrixState;

    /// root(1) <- 2 <- 3 <- 4 <- 5
    fn chain_state() -> MatrixState {
        let mut state = MatrixState::with_root(Member::root(MemberId::ROOT, 0));
        for id in 2..=5 {
            let mut m = Member::pending(MemberId(id), MemberId(id - 1), MemberId(id - 1), 0);
            m.status = crate::MemberStatus::Active;
            state.insert_member(m);
        }
        state
    }

    fn ids(chain: &[Ancestor]) -> Vec<(u64, u32)> {
        chain.iter().map(|a| (a.member_id.0, a.distance)).collect()
    }

    #[test]
    fn nearest_first() {
        let state = chain_state();
        let chain = resolve_ancestors(&state, MemberId(5), 3).unwrap();
        assert_eq!(ids(&chain), vec![(4, 1), (3, 2), (2, 3)]);
    }

    #[test]
    fn stops_at_root() {
        let state = chain_state();
        let chain = resolve_ancestors(&state, MemberId(3), 6).unwrap();
        assert_eq!(ids(&chain), vec![(2, 1), (1, 2)]);
    }

    #[test]
    fn root_has_no_ancestors() {
        let state = chain_state();
        assert!(resolve_ancestors(&state, MemberId::ROOT, 6).unwrap().is_empty());
    }

    #[test]
    fn unknown_member() {
        let state = chain_state();
        assert_eq!(
            resolve_ancestors(&state, MemberId(99), 3).unwrap_err(),
            Error::UnknownMember(MemberId(99))
        );
    }

    #[test]
    fn follows_upline_not_sponsor() {
        let mut state = chain_state();
        // Sponsored by 2 but placed under 4.
        let mut m = Member::pending(MemberId(6), MemberId(2), MemberId(4), 0);
        m.status = crate::MemberStatus::Active;
        state.insert_member(m);

        let chain = resolve_ancestors(&state, MemberId(6), 2).unwrap();
        assert_eq!(ids(&chain), vec![(4, 1), (3, 2)]);
    }

    #[test]
    fn detects_cycle() {
        let mut state = chain_state();
        // Corrupt: 2's upline points at 4, closing 4 -> 3 -> 2 -> 4.
        let mut m = state.member(MemberId(2)).unwrap().unwrap();
        m.upline_id = Some(MemberId(4));
        state.insert_member(m);

        let err = resolve_ancestors(&state, MemberId(4), 6).unwrap_err();
        assert!(matches!(err, Error::CycleDetected { .. }));
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let mut state = chain_state();
        let mut m = state.member(MemberId(3)).unwrap().unwrap();
        m.upline_id = Some(MemberId(3));
        state.insert_member(m);

        assert_eq!(
            resolve_ancestors(&state, MemberId(3), 6).unwrap_err(),
            Error::CycleDetected {
                member: MemberId(3),
                ancestor: MemberId(3)
            }
        );
    }
}
