//! Matrix placement with breadth-first spillover.
//!
//! A new member goes directly under the requested upline while it has fewer
//! than `referrals_per_level` children. Once it is full, the search moves
//! outward one generation at a time. Inside a generation the open node placed
//! earliest wins, ties broken by lowest member id, so the result is a pure
//! function of the matrix state.
//!
//! ```text
//! generation 0:            U (full)
//!                    /   /   |   \   \
//! generation 1:     a    b   c    d   e      <- earliest open node here wins
//!                  /|\  ...
//! generation 2:   ...                        <- only searched if 1 is full
//! ```
//!
//! Positions are always recorded relative to the parent they land under
//! (`level = 1`). A parent found `d` generations below the upline is kept as
//! `spillover_depth = d`; only depths below `max_matrix_levels` are searched.

use crate::error::{Error, Result};
use crate::member::MemberId;
use crate::position::MatrixPosition;
use crate::settings::SettingsSnapshot;
use crate::view::MatrixView;
use std::collections::HashSet;

/// An open slot found by the search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OpenSlot {
    parent: MemberId,
    /// Generations below the requested upline (0 = the upline itself)
    depth: u32,
    /// Children the parent already has
    filled: u32,
}

/// Compute the position for `new_member`.
///
/// The upline defaults to the sponsor. Nothing is written; the caller
/// persists the returned position inside the same unit of work that read
/// `view`.
pub fn place<V: MatrixView + ?Sized>(
    view: &V,
    new_member: MemberId,
    sponsor: MemberId,
    requested_upline: Option<MemberId>,
    settings: &SettingsSnapshot,
    placed_at: u64,
) -> Result<MatrixPosition> {
    let member = view
        .member(new_member)?
        .ok_or(Error::UnknownMember(new_member))?;
    if member.is_root() || view.position(new_member)?.is_some() {
        return Err(Error::AlreadyPlaced { member: new_member });
    }

    let upline = requested_upline.unwrap_or(sponsor);
    let slot = find_open_slot(view, upline, settings)?;

    tracing::debug!(
        member = %new_member,
        %upline,
        parent = %slot.parent,
        depth = slot.depth,
        position = slot.filled + 1,
        "placement resolved"
    );

    Ok(MatrixPosition {
        member_id: new_member,
        parent_id: slot.parent,
        level: 1,
        position: slot.filled + 1,
        spillover_depth: slot.depth,
        placed_at,
    })
}

/// Number of open slots within `max_matrix_levels` generations of `upline`,
/// i.e. how many more activations `place` can still fit below it.
pub fn open_slots<V: MatrixView + ?Sized>(
    view: &V,
    upline: MemberId,
    settings: &SettingsSnapshot,
) -> Result<u64> {
    require_active(view, upline)?;

    let width = settings.referrals_per_level();
    let mut open = 0u64;
    let mut generation = vec![upline];
    let mut seen = HashSet::from([upline]);

    for _ in 0..settings.max_matrix_levels() {
        let mut next = Vec::new();
        for node in generation {
            let children = visit_children(view, node, &mut seen)?;
            open += u64::from(width.saturating_sub(children.len() as u32));
            next.extend(children.iter().map(|c| c.member_id));
        }
        generation = next;
    }

    Ok(open)
}

fn require_active<V: MatrixView + ?Sized>(view: &V, upline: MemberId) -> Result<()> {
    let anchor = view.member(upline)?.ok_or(Error::UnknownMember(upline))?;
    if !anchor.is_active() {
        return Err(Error::NotInMatrix(upline));
    }
    Ok(())
}

/// Children of `node`, failing if any of them was already visited.
fn visit_children<V: MatrixView + ?Sized>(
    view: &V,
    node: MemberId,
    seen: &mut HashSet<MemberId>,
) -> Result<Vec<MatrixPosition>> {
    let children = view.children(node)?;
    for child in &children {
        if !seen.insert(child.member_id) {
            tracing::error!(parent = %node, child = %child.member_id, "cycle in matrix");
            return Err(Error::CycleDetected {
                member: node,
                ancestor: child.member_id,
            });
        }
    }
    Ok(children)
}

fn find_open_slot<V: MatrixView + ?Sized>(
    view: &V,
    upline: MemberId,
    settings: &SettingsSnapshot,
) -> Result<OpenSlot> {
    require_active(view, upline)?;

    let width = settings.referrals_per_level();
    let max_levels = settings.max_matrix_levels();

    // (placed_at, id) orders a generation; the upline itself sorts first.
    let mut generation: Vec<(u64, MemberId)> = vec![(0, upline)];
    let mut seen = HashSet::from([upline]);

    for depth in 0..max_levels {
        let mut best: Option<((u64, MemberId), u32)> = None;
        let mut next = Vec::new();

        for &(placed_at, node) in &generation {
            let children = visit_children(view, node, &mut seen)?;
            let filled = children.len() as u32;

            if filled < width && best.map_or(true, |(key, _)| (placed_at, node) < key) {
                best = Some(((placed_at, node), filled));
            }

            next.extend(children.iter().map(|c| (c.placed_at, c.member_id)));
        }

        if let Some(((_, parent), filled)) = best {
            return Ok(OpenSlot {
                parent,
                depth,
                filled,
            });
        }
        if next.is_empty() {
            break;
        }
        generation = next;
    }

    Err(Error::MatrixFull {
        upline,
        depth: max_levels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::member::Member;
    use crate::MatrixState;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn settings(width: u32, levels: u32) -> SettingsSnapshot {
        SettingsSnapshot::new(36_000, 5_000, levels, width, vec![]).unwrap()
    }

    fn state() -> MatrixState {
        MatrixState::with_root(Member::root(MemberId::ROOT, 0))
    }

    /// Enroll and activate `id` under `upline`, returning its position.
    fn join(state: &mut MatrixState, id: u64, upline: u64, s: &SettingsSnapshot) -> MatrixPosition {
        state.insert_member(Member::pending(MemberId(id), MemberId(upline), MemberId(upline), id));
        state.activate(MemberId(id), None, s, id).unwrap().position
    }

    #[test]
    fn direct_placement_fills_in_order() {
        let s = settings(3, 3);
        let mut st = state();
        for (i, id) in (2..=4).enumerate() {
            let pos = join(&mut st, id, 1, &s);
            assert_eq!(pos.parent_id, MemberId::ROOT);
            assert_eq!(pos.level, 1);
            assert_eq!(pos.position, i as u32 + 1);
            assert!(!pos.spilled_over());
        }
    }

    #[test]
    fn spillover_goes_to_earliest_open_child() {
        let s = settings(2, 3);
        let mut st = state();
        join(&mut st, 2, 1, &s);
        join(&mut st, 3, 1, &s);

        let pos = join(&mut st, 4, 1, &s);
        assert_eq!(pos.parent_id, MemberId(2));
        assert_eq!(pos.level, 1);
        assert_eq!(pos.spillover_depth, 1);
        assert_eq!(pos.position, 1);

        let pos = join(&mut st, 5, 1, &s);
        assert_eq!(pos.parent_id, MemberId(2));
        assert_eq!(pos.position, 2);

        // 2 is full now, 3 is next in its generation.
        let pos = join(&mut st, 6, 1, &s);
        assert_eq!(pos.parent_id, MemberId(3));
        assert_eq!(pos.position, 1);
    }

    #[test]
    fn shallower_generation_wins_over_earlier_deep_node() {
        let s = settings(2, 4);
        let mut st = state();
        join(&mut st, 2, 1, &s);
        // 3 and 4 sit one generation deeper but are placed before 9.
        join(&mut st, 3, 2, &s);
        join(&mut st, 4, 2, &s);
        join(&mut st, 9, 1, &s);

        let pos = join(&mut st, 10, 1, &s);
        assert_eq!(pos.parent_id, MemberId(9));
        assert_eq!(pos.spillover_depth, 1);
    }

    #[test]
    fn placement_order_breaks_ties_before_member_id() {
        let s = settings(2, 3);
        let mut st = state();
        st.insert_member(Member::pending(MemberId(9), MemberId::ROOT, MemberId::ROOT, 0));
        st.insert_member(Member::pending(MemberId(3), MemberId::ROOT, MemberId::ROOT, 0));
        // 9 is placed before 3, so 9 is preferred for spillover.
        st.activate(MemberId(9), None, &s, 10).unwrap();
        st.activate(MemberId(3), None, &s, 20).unwrap();

        let pos = join(&mut st, 11, 1, &s);
        assert_eq!(pos.parent_id, MemberId(9));
    }

    #[test]
    fn equal_placement_time_falls_back_to_lowest_id() {
        let s = settings(2, 3);
        let mut st = state();
        st.insert_member(Member::pending(MemberId(9), MemberId::ROOT, MemberId::ROOT, 0));
        st.insert_member(Member::pending(MemberId(3), MemberId::ROOT, MemberId::ROOT, 0));
        st.activate(MemberId(9), None, &s, 10).unwrap();
        st.activate(MemberId(3), None, &s, 10).unwrap();

        let pos = join(&mut st, 11, 1, &s);
        assert_eq!(pos.parent_id, MemberId(3));
    }

    #[test]
    fn direct_and_spilled_children_share_one_numbering() {
        let s = settings(2, 3);
        let mut st = state();
        join(&mut st, 2, 1, &s);
        join(&mut st, 3, 1, &s);
        join(&mut st, 4, 2, &s);
        // Root is full, so 5 spills under 2 next to 4.
        let spilled = join(&mut st, 5, 1, &s);
        assert!(spilled.spilled_over());

        let rows: Vec<(MemberId, u32, u32)> = st
            .children(MemberId(2))
            .unwrap()
            .iter()
            .map(|c| (c.member_id, c.level, c.position))
            .collect();
        assert_eq!(rows, vec![(MemberId(4), 1, 1), (MemberId(5), 1, 2)]);
    }

    #[test]
    fn matrix_full_within_depth() {
        let s = settings(1, 2);
        let mut st = state();
        join(&mut st, 2, 1, &s);
        join(&mut st, 3, 1, &s); // spills under 2

        st.insert_member(Member::pending(MemberId(4), MemberId::ROOT, MemberId::ROOT, 4));
        let before = st.clone();
        let err = st.activate(MemberId(4), None, &s, 4).unwrap_err();
        assert_eq!(
            err,
            Error::MatrixFull {
                upline: MemberId::ROOT,
                depth: 2
            }
        );
        assert_eq!(st, before);
    }

    #[test]
    fn already_placed_leaves_state_untouched() {
        let s = settings(3, 3);
        let mut st = state();
        join(&mut st, 2, 1, &s);

        let before = st.clone();
        let err = st.activate(MemberId(2), None, &s, 99).unwrap_err();
        assert_eq!(err, Error::AlreadyPlaced { member: MemberId(2) });
        assert_eq!(st, before);
    }

    #[test]
    fn root_cannot_be_placed() {
        let s = settings(3, 3);
        let st = state();
        let err = place(&st, MemberId::ROOT, MemberId::ROOT, None, &s, 0).unwrap_err();
        assert_eq!(err, Error::AlreadyPlaced { member: MemberId::ROOT });
    }

    #[test]
    fn pending_upline_is_rejected() {
        let s = settings(3, 3);
        let mut st = state();
        st.insert_member(Member::pending(MemberId(2), MemberId::ROOT, MemberId::ROOT, 0));
        st.insert_member(Member::pending(MemberId(3), MemberId::ROOT, MemberId(2), 0));

        let err = place(&st, MemberId(3), MemberId::ROOT, Some(MemberId(2)), &s, 0).unwrap_err();
        assert_eq!(err, Error::NotInMatrix(MemberId(2)));
    }

    #[test]
    fn upline_defaults_to_sponsor() {
        let s = settings(3, 3);
        let mut st = state();
        join(&mut st, 2, 1, &s);
        st.insert_member(Member::pending(MemberId(3), MemberId(2), MemberId::ROOT, 3));

        let pos = place(&st, MemberId(3), MemberId(2), None, &s, 3).unwrap();
        assert_eq!(pos.parent_id, MemberId(2));
    }

    #[test]
    fn open_slots_counts_subtree_capacity() {
        let s = settings(2, 2);
        let mut st = state();
        assert_eq!(open_slots(&st, MemberId::ROOT, &s).unwrap(), 2);
        join(&mut st, 2, 1, &s);
        join(&mut st, 3, 1, &s);
        // Root full, 2 and 3 each have 2 open.
        assert_eq!(open_slots(&st, MemberId::ROOT, &s).unwrap(), 4);

        st.insert_member(Member::pending(MemberId(4), MemberId::ROOT, MemberId::ROOT, 4));
        assert_eq!(
            open_slots(&st, MemberId(4), &s).unwrap_err(),
            Error::NotInMatrix(MemberId(4))
        );
    }

    proptest! {
        #[test]
        fn slots_are_dense_per_parent_and_level(
            width in 1u32..5,
            levels in 1u32..4,
            uplines in proptest::collection::vec(0usize..64, 1..60),
        ) {
            let s = settings(width, levels);
            let mut st = state();
            let mut active = vec![MemberId::ROOT];

            for (i, pick) in uplines.into_iter().enumerate() {
                let id = MemberId(i as u64 + 2);
                let upline = active[pick % active.len()];
                st.insert_member(Member::pending(id, upline, upline, i as u64));
                match st.activate(id, None, &s, i as u64) {
                    Ok(outcome) => {
                        prop_assert_eq!(outcome.position.level, 1);
                        prop_assert!(outcome.position.spillover_depth < levels);
                        active.push(id);
                    }
                    Err(Error::MatrixFull { .. }) => {}
                    Err(other) => return Err(TestCaseError::fail(other.to_string())),
                }
            }

            for parent in &active {
                let children = st.children(*parent).unwrap();
                prop_assert!(children.len() as u32 <= width);

                let mut by_level: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
                for child in &children {
                    by_level.entry(child.level).or_default().push(child.position);
                }
                for (_, positions) in by_level {
                    let expected: Vec<u32> = (1..=positions.len() as u32).collect();
                    prop_assert_eq!(positions, expected);
                }
            }
        }

        #[test]
        fn placement_is_deterministic(
            width in 1u32..4,
            joins in 1usize..30,
        ) {
            let s = settings(width, 4);
            let mut st = state();
            for i in 0..joins {
                let id = MemberId(i as u64 + 2);
                st.insert_member(Member::pending(id, MemberId::ROOT, MemberId::ROOT, i as u64));
                if st.activate(id, None, &s, i as u64).is_err() {
                    break;
                }
            }
            let next = MemberId(1_000);
            st.insert_member(Member::pending(next, MemberId::ROOT, MemberId::ROOT, 0));

            let first = place(&st, next, MemberId::ROOT, None, &s, 5);
            let second = place(&st, next, MemberId::ROOT, None, &s, 5);
            prop_assert_eq!(first, second);
        }
    }
}
