/// Counters collected by a full index rebuild
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RebuildStats {
    pub blocks_read: u64,
    /// Blocks that failed to decompress
    pub blocks_corrupt: u64,
    /// Blocks that decompressed but were not well-formed XML
    pub blocks_unparsable: u64,
    pub pages_seen: u64,
    pub redirects_skipped: u64,
    pub excluded_skipped: u64,
    /// Entries written to the index
    pub entries: u64,
    /// Archive bytes covered by successfully decompressed blocks
    pub bytes_consumed: u64,
}

impl RebuildStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blocks_skipped(&self) -> u64 {
        self.blocks_corrupt + self.blocks_unparsable
    }
}

/// Counters collected by a link-graph exploration
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExploreStats {
    pub accepted: u64,
    pub redirects_followed: u64,
    pub not_found: u64,
    /// Queue entries dropped because their title was already visited
    pub revisits_skipped: u64,
    pub max_depth_reached: u32,
    /// Entries written to the derived index
    pub entries: u64,
}

impl ExploreStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visited(&self) -> u64 {
        self.accepted + self.redirects_followed + self.not_found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values_are_zero() {
        let stats = RebuildStats::new();
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.blocks_skipped(), 0);
        assert_eq!(ExploreStats::new().visited(), 0);
    }

    #[test]
    fn skipped_sums_both_kinds() {
        let stats = RebuildStats {
            blocks_corrupt: 2,
            blocks_unparsable: 3,
            ..RebuildStats::default()
        };
        assert_eq!(stats.blocks_skipped(), 5);
    }

    #[test]
    fn visited_sums_outcomes() {
        let stats = ExploreStats {
            accepted: 4,
            redirects_followed: 1,
            not_found: 2,
            ..ExploreStats::default()
        };
        assert_eq!(stats.visited(), 7);
    }
}
