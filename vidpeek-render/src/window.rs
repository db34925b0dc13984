use std::ops::RangeInclusive;

/// Default number of previews kept on each side of the focused one.
pub const DEFAULT_RETENTION_RADIUS: usize = 3;

/// The contiguous range of preview indices kept around the focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionWindow {
    pub center: usize,
    pub radius: usize,
    /// Number of previews in the source; bounds the window on the right.
    pub count: usize,
}

impl RetentionWindow {
    pub fn new(center: usize, radius: usize, count: usize) -> Self {
        Self {
            center,
            radius,
            count,
        }
    }

    pub fn contains(&self, index: usize) -> bool {
        index < self.count && index.abs_diff(self.center) <= self.radius
    }

    /// Valid indices inside the window, in ascending order. Empty when the
    /// source has no previews.
    pub fn range(&self) -> RangeInclusive<usize> {
        if self.count == 0 {
            return RangeInclusive::new(1, 0);
        }
        let start = self.center.saturating_sub(self.radius);
        let end = self
            .center
            .saturating_add(self.radius)
            .min(self.count - 1);
        start..=end
    }

    /// Indices in the order they should be rendered: the center first, then
    /// alternating left/right at increasing distance, skipping anything
    /// outside `[0, count)`.
    pub fn fill_order(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.radius * 2 + 1);
        if self.center < self.count {
            order.push(self.center);
        }
        for offset in 1..=self.radius {
            if let Some(left) = self.center.checked_sub(offset) {
                if left < self.count {
                    order.push(left);
                }
            }
            let right = self.center + offset;
            if right < self.count {
                order.push(right);
            }
        }
        order
    }
}
