/// Events emitted by long-running scans. Callers decide how (or whether) to report them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    /// A block was decompressed and its accepted pages written.
    BlockIndexed {
        offset: u64,
        accepted: u64,
        entries_total: u64,
    },
    /// A block was skipped; the scan carries on from `resume_at` if there is one.
    BlockSkipped {
        offset: u64,
        reason: String,
        resume_at: Option<u64>,
    },
    /// The explorer finished with a title.
    TitleVisited {
        title: String,
        depth: u32,
        outcome: VisitOutcome,
        accepted_total: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitOutcome {
    Accepted,
    Redirected,
    NotFound,
}

/// Progress callback that discards every event.
pub fn silent(_: &Progress) {}
