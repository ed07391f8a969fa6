use crate::{Error, Result};

/// A cursor over one reserved, contiguous block of ids.
///
/// A freshly created range is empty; ids only become available after
/// [`Range::reset`]. Once `capacity` ids have been drawn the range is
/// exhausted again and [`Range::next`] returns `None` until the next reset.
///
/// `Range` performs no I/O and no synchronization. The owning
/// [`TenantAllocator`] keeps each range behind its own mutex.
///
/// # Example
/// ```
/// use ferroseq::Range;
///
/// let mut range = Range::new(3).unwrap();
/// assert_eq!(range.next(), None);
///
/// range.reset(100);
/// assert_eq!(range.next(), Some(100));
/// assert_eq!(range.next(), Some(101));
/// assert_eq!(range.next(), Some(102));
/// assert_eq!(range.next(), None);
/// ```
///
/// [`TenantAllocator`]: crate::TenantAllocator
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Range {
    capacity: i64,
    cursor: Option<i64>,
    end: i64,
}

impl Range {
    /// Creates an empty range that reserves `capacity` ids per reset.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `capacity` is not positive.
    pub fn new(capacity: i64) -> Result<Self> {
        if capacity <= 0 {
            return Err(Error::invalid_config(format!(
                "range capacity must be positive, got {capacity}"
            )));
        }
        Ok(Self {
            capacity,
            cursor: None,
            end: 0,
        })
    }

    pub const fn capacity(&self) -> i64 {
        self.capacity
    }

    /// Makes `[start, start + capacity)` available, discarding whatever was
    /// left of the previous block.
    ///
    /// A block that would run past `i64::MAX` is truncated at it; the refill
    /// path rejects such counters before getting here.
    pub fn reset(&mut self, start: i64) {
        self.end = start.saturating_add(self.capacity);
        self.cursor = (start < self.end).then_some(start);
    }

    /// Draws the next id, or `None` if the block is exhausted or was never
    /// reset.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<i64> {
        let id = self.cursor?;
        let following = id + 1;
        self.cursor = (following < self.end).then_some(following);
        Some(id)
    }

    /// Number of ids still available in the current block.
    pub fn remaining(&self) -> i64 {
        self.cursor.map_or(0, |cursor| self.end - cursor)
    }

    pub const fn is_exhausted(&self) -> bool {
        self.cursor.is_none()
    }
}
