//! Wikiseek: random access into Wikipedia multistream bzip2 dumps
//!
//! A multistream dump is one `.xml.bz2` file made of many independently
//! compressed bzip2 streams ("blocks"), each holding a run of `<page>`
//! records. Given the byte offset of a block, any page can be reached by
//! decompressing just that block. This crate keeps a compact binary index of
//! `(block_offset, position_in_block, record_id)` records and builds on it:
//!
//! 1. **Rebuild** -- Scan the whole archive block by block and write an index
//!    of every non-redirect page outside the excluded namespaces
//! 2. **Read** -- List index entries, or fetch pages for a range of index
//!    positions, decompressing each distinct block once per call
//! 3. **Explore** -- Walk the wikilink graph breadth-first from a seed title,
//!    following redirects for free, and write the visited pages as a smaller
//!    derived index
//!
//! # Key Modules
//!
//! - [`block`] -- Decompress exactly one bzip2 stream at a byte offset
//! - [`store`] -- Binary index file and the legacy `offset:id:title` text index
//! - [`parser`] -- Page extraction from a decompressed XML fragment
//! - [`reader`] -- Group-by-block paging over an index and its archive
//! - [`indexer`] -- Full-archive rebuild with namespace filters
//! - [`explore`] -- Bounded BFS over wikilinks with redirect resolution
//! - [`index`] -- Title lookup built from the text index
//! - [`content`] -- Wikilinks, redirects, title normalization, plain-text rendering
//! - [`cache`] -- Bincode snapshot of the title lookup
//! - [`progress`] -- Progress events for long scans
//! - [`stats`] -- Rebuild and explore counters
//! - [`config`] -- Constants
//!
//! # Example Usage
//!
//! ```bash
//! # Build the binary index
//! wikiseek rebuild -i enwiki-multistream.xml.bz2 -o enwiki.idx
//!
//! # Show the first ten articles as JSON lines
//! wikiseek show -i enwiki-multistream.xml.bz2 --index enwiki.idx --count 10
//!
//! # Derive an index of everything within two links of "Cat"
//! wikiseek explore -i enwiki-multistream.xml.bz2 \
//!     --text-index enwiki-multistream-index.txt.bz2 -o cat.idx --seed Cat
//! ```

pub mod block;
pub mod cache;
pub mod config;
pub mod content;
pub mod error;
pub mod explore;
pub mod index;
pub mod indexer;
pub mod models;
pub mod parser;
pub mod progress;
pub mod reader;
pub mod stats;
pub mod store;
