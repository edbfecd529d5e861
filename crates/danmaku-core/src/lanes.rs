//! Round-robin lane assignment.

/// Process-wide cursor that spreads accepted messages across lanes.
///
/// The cursor is reduced modulo the lane count at assignment time, so a
/// change to `lanes` takes effect on the very next message without resetting
/// the rotation.
#[derive(Clone, Debug, Default)]
pub struct LaneAllocator {
    cursor: u64,
}

impl LaneAllocator {
    /// Create an allocator at cursor 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `cursor % lane_count` and advance the cursor.
    ///
    /// A zero lane count is treated as one lane.
    pub fn next_lane(&mut self, lane_count: u32) -> u32 {
        let modulus = u64::from(lane_count.max(1));
        let lane = self.cursor % modulus;
        self.cursor = self.cursor.wrapping_add(1);
        // lane < modulus <= u32::MAX
        u32::try_from(lane).unwrap_or_default()
    }
}
