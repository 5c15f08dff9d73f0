//! Matrix position records.

use crate::member::MemberId;
use serde::{Deserialize, Serialize};

/// Where an activated member sits in the matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixPosition {
    /// The placed member (one position per member)
    pub member_id: MemberId,

    /// Direct matrix parent
    pub parent_id: MemberId,

    /// 1-based depth below `parent_id`. Every row is a direct child, so
    /// this is always 1 and `(parent_id, level)` numbers the parent's slots.
    pub level: u32,

    /// 1-based slot among the parent's direct children, dense in
    /// activation order
    pub position: u32,

    /// Generations between the requested upline and `parent_id`: 0 for a
    /// direct placement, deeper when the placement spilled over
    #[serde(default)]
    pub spillover_depth: u32,

    /// Placement time in milliseconds since the Unix epoch
    pub placed_at: u64,
}

impl MatrixPosition {
    /// Whether the member landed under someone other than the requested upline.
    pub fn spilled_over(&self) -> bool {
        self.spillover_depth > 0
    }
}
