//! Read access to matrix state.
//!
//! Placement and distribution are pure functions over a [`MatrixView`]. The
//! store implements it on top of a transaction so that every read takes part
//! in conflict detection; tests use the in-memory [`crate::MatrixState`].

use crate::error::Result;
use crate::member::{Member, MemberId};
use crate::position::MatrixPosition;

/// Read-only view of members and matrix positions.
pub trait MatrixView {
    /// Look up a member record.
    fn member(&self, id: MemberId) -> Result<Option<Member>>;

    /// Look up the matrix position of a member.
    fn position(&self, id: MemberId) -> Result<Option<MatrixPosition>>;

    /// Direct matrix children of `parent`, ordered by position index.
    fn children(&self, parent: MemberId) -> Result<Vec<MatrixPosition>>;
}

impl<T: MatrixView + ?Sized> MatrixView for &T {
    fn member(&self, id: MemberId) -> Result<Option<Member>> {
        (**self).member(id)
    }

    fn position(&self, id: MemberId) -> Result<Option<MatrixPosition>> {
        (**self).position(id)
    }

    fn children(&self, parent: MemberId) -> Result<Vec<MatrixPosition>> {
        (**self).children(parent)
    }
}
