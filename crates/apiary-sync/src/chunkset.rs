/// Received-batch tracking for one bulk transfer, using a compact bitfield.
///
/// Batch indices are 1-based and contiguous from `1..=total`, but batches
/// may arrive in any order. "Missing" is defined purely by set difference,
/// independent of arrival order.

/// Compact set of received batch indices for a transfer of known size.
#[derive(Debug, Clone)]
pub struct BatchSet {
    bits: Vec<u64>,
    total: u32,
    received: u32,
}

impl BatchSet {
    /// Create an empty set for a transfer of `total` batches.
    pub fn new(total: u32) -> Self {
        let words = (total as usize).div_ceil(64);
        Self {
            bits: vec![0u64; words],
            total,
            received: 0,
        }
    }

    /// Mark a 1-based batch index as received.
    ///
    /// Returns `false` for duplicates and out-of-range indices, so
    /// reapplying an index is idempotent.
    pub fn mark(&mut self, index: u32) -> bool {
        if index == 0 || index > self.total {
            return false;
        }
        let idx = (index - 1) as usize;
        let (word, bit) = (idx / 64, idx % 64);
        let mask = 1u64 << bit;
        if self.bits[word] & mask != 0 {
            return false; // already seen
        }
        self.bits[word] |= mask;
        self.received += 1;
        true
    }

    /// Check whether a 1-based batch index has been received.
    pub fn contains(&self, index: u32) -> bool {
        if index == 0 || index > self.total {
            return false;
        }
        let idx = (index - 1) as usize;
        self.bits[idx / 64] & (1u64 << (idx % 64)) != 0
    }

    /// Number of distinct batches received.
    #[inline]
    pub fn received(&self) -> u32 {
        self.received
    }

    /// Expected batch count.
    #[inline]
    pub fn total(&self) -> u32 {
        self.total
    }

    /// Returns true once every expected batch has been received.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.received >= self.total
    }

    /// Collect the 1-based indices of all missing batches, ascending.
    pub fn missing(&self) -> Vec<u32> {
        (1..=self.total).filter(|i| !self.contains(*i)).collect()
    }
}
