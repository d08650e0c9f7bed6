/// Bytes read from the archive per decompressor feed
pub const CHUNK_SIZE: usize = 256 * 1024;

/// Size of the decompressor's output window
pub const OUTPUT_BUFFER_SIZE: usize = 1024 * 1024;

/// One binary index record: block_offset, position_in_block, record_id (u64 each, big-endian)
pub const RECORD_SIZE: u64 = 24;

/// Title prefixes (lowercase) never written to a rebuilt index
pub const EXCLUDED_PREFIXES: &[&str] = &[
    "template:",
    "module:",
    "file:",
    "talk:",
    "user:",
    "mediawiki:",
];

/// Progress update interval (report every N entries written)
pub const PROGRESS_INTERVAL: u64 = 1000;

/// BFS depth used by `explore` when none is given
pub const DEFAULT_EXPLORE_DEPTH: u32 = 2;

/// Upper bound on titles accepted by `explore` when none is given
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Bump when the title cache layout changes
pub const CACHE_VERSION: u32 = 1;

/// Buffer size for index and text-index readers/writers
pub const IO_BUFFER_SIZE: usize = 256 * 1024;
