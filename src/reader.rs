//! Paging and lookup over an index plus its multistream archive.
//!
//! Requested positions are resolved to `(block_offset, record_id)` pairs and
//! grouped by block, distinct offsets kept in first-seen order, so every
//! block is decompressed at most once per call. Inside a block the pages are
//! scanned in order against the ids wanted from it; anything else in the
//! block is skipped. Matches are handed back in the order the positions were
//! requested, and a record that cannot be matched is simply left out.

use crate::block::{BlockOutcome, BlockSource, Bz2Archive};
use crate::content::{PlainTextRenderer, Renderer};
use crate::error::{Result, StreamError};
use crate::models::{Article, IndexEntry, Lookup, PageRecord, TitleIndexRow};
use crate::parser::extract_pages;
use crate::store::{IndexStore, TextIndexRows};
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Which index the reader pages through.
#[derive(Debug, Clone)]
pub enum IndexSource {
    Binary(IndexStore),
    /// Legacy `offset:id:title` file, plain or bzip2. Positions count
    /// well-formed rows only; blank and malformed lines take no position.
    Text(PathBuf),
}

impl IndexSource {
    pub fn binary(path: impl AsRef<Path>) -> Result<Self> {
        Ok(IndexSource::Binary(IndexStore::open(path)?))
    }

    pub fn text(path: impl AsRef<Path>) -> Self {
        IndexSource::Text(path.as_ref().to_path_buf())
    }

    /// Index rows `[start, start + count)` without touching any archive.
    pub fn list(&self, start: u64, count: usize) -> Result<Listing> {
        Ok(match self {
            IndexSource::Binary(store) => Listing::Binary(store.read_range(start, count)?),
            IndexSource::Text(path) => Listing::Text(read_text_rows(path, start, count)?),
        })
    }

    fn locations(&self, start: u64, count: usize) -> Result<Vec<Location>> {
        Ok(match self {
            IndexSource::Binary(store) => store
                .read_range(start, count)?
                .into_iter()
                .map(|e| Location {
                    block_offset: e.block_offset,
                    record_id: e.record_id,
                })
                .collect(),
            IndexSource::Text(path) => read_text_rows(path, start, count)?
                .into_iter()
                .map(|r| Location {
                    block_offset: r.block_offset,
                    record_id: r.record_id,
                })
                .collect(),
        })
    }
}

/// Raw index rows, in the shape of whichever index backs the reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Listing {
    Binary(Vec<IndexEntry>),
    Text(Vec<TitleIndexRow>),
}

impl Listing {
    pub fn len(&self) -> usize {
        match self {
            Listing::Binary(entries) => entries.len(),
            Listing::Text(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy)]
struct Location {
    block_offset: u64,
    record_id: u64,
}

struct BlockGroup {
    offset: u64,
    /// Indices into the requested locations, in request order
    slots: Vec<usize>,
}

enum Slot {
    Pending,
    Missing,
    Ready(PageRecord),
}

fn group_by_block(locations: &[Location]) -> Vec<BlockGroup> {
    let mut groups: Vec<BlockGroup> = Vec::new();
    let mut by_offset: FxHashMap<u64, usize> = FxHashMap::default();
    for (slot, loc) in locations.iter().enumerate() {
        let group = *by_offset.entry(loc.block_offset).or_insert_with(|| {
            groups.push(BlockGroup {
                offset: loc.block_offset,
                slots: Vec::new(),
            });
            groups.len() - 1
        });
        groups[group].slots.push(slot);
    }
    groups
}

fn read_text_rows(path: &Path, start: u64, count: usize) -> Result<Vec<TitleIndexRow>> {
    let mut rows = Vec::new();
    for (position, row) in TextIndexRows::open(path)?.enumerate() {
        let row = row?;
        if (position as u64) < start {
            continue;
        }
        if rows.len() >= count {
            break;
        }
        rows.push(row);
    }
    Ok(rows)
}

pub struct MultistreamReader<S = Bz2Archive, R = PlainTextRenderer> {
    source: S,
    index: IndexSource,
    renderer: R,
}

impl MultistreamReader {
    pub fn open(archive: impl AsRef<Path>, index: IndexSource) -> Self {
        Self::with_parts(Bz2Archive::new(archive), index, PlainTextRenderer)
    }
}

impl<S: BlockSource, R: Renderer> MultistreamReader<S, R> {
    pub fn with_parts(source: S, index: IndexSource, renderer: R) -> Self {
        Self {
            source,
            index,
            renderer,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn index(&self) -> &IndexSource {
        &self.index
    }

    /// Index rows `[start, start + count)` without touching the archive.
    pub fn list_entries(&self, start: u64, count: usize) -> Result<Listing> {
        self.index.list(start, count)
    }

    /// Raw pages for positions `[start, start + count)`, in request order.
    pub fn fetch_pages(&self, start: u64, count: usize) -> Result<Vec<PageRecord>> {
        let locations = self.index.locations(start, count)?;
        let mut pages = Vec::with_capacity(locations.len());
        self.for_each_match(&locations, |page| pages.push(page))?;
        Ok(pages)
    }

    /// Rendered `(title, text)` for positions `[start, start + count)`.
    /// Past the end of the index this is empty, not an error.
    pub fn fetch_records(&self, start: u64, count: usize) -> Result<Vec<Article>> {
        Ok(self
            .fetch_pages(start, count)?
            .into_iter()
            .map(|page| Article {
                text: self.renderer.render(&page.raw_text),
                title: page.title,
            })
            .collect())
    }

    /// Calls `callback(title, text)` for each of the first `limit` positions
    /// that can be matched, in index order. Returns the number of calls.
    pub fn foreach<F>(&self, limit: usize, mut callback: F) -> Result<u64>
    where
        F: FnMut(&str, &str),
    {
        let locations = self.index.locations(0, limit)?;
        let mut matched = 0u64;
        self.for_each_match(&locations, |page| {
            let text = self.renderer.render(&page.raw_text);
            callback(&page.title, &text);
            matched += 1;
        })?;
        Ok(matched)
    }

    /// The raw page with `record_id` from the block at `block_offset`.
    pub fn fetch_page(&self, block_offset: u64, record_id: u64) -> Result<Lookup<PageRecord>> {
        let Some(pages) = self.block_pages(block_offset)? else {
            return Ok(Lookup::NotFound);
        };
        Ok(match pages.into_iter().find(|p| p.id == record_id) {
            Some(page) => Lookup::Found(page),
            None => Lookup::NotFound,
        })
    }

    fn for_each_match<F>(&self, locations: &[Location], mut emit: F) -> Result<()>
    where
        F: FnMut(PageRecord),
    {
        if locations.is_empty() {
            return Ok(());
        }

        let groups = group_by_block(locations);
        let mut slots: Vec<Slot> = (0..locations.len()).map(|_| Slot::Pending).collect();
        let mut cursor = 0;

        for group in &groups {
            if let Some(pages) = self.block_pages(group.offset)? {
                let mut wanted = group.slots.iter().copied().peekable();
                for page in pages {
                    let Some(&slot) = wanted.peek() else {
                        break;
                    };
                    if page.id == locations[slot].record_id {
                        slots[slot] = Slot::Ready(page);
                        wanted.next();
                    }
                }
            }

            for &slot in &group.slots {
                if matches!(slots[slot], Slot::Pending) {
                    debug!(
                        offset = group.offset,
                        record_id = locations[slot].record_id,
                        "Record not found in block"
                    );
                    slots[slot] = Slot::Missing;
                }
            }

            while cursor < slots.len() && !matches!(slots[cursor], Slot::Pending) {
                if let Slot::Ready(page) = std::mem::replace(&mut slots[cursor], Slot::Missing) {
                    emit(page);
                }
                cursor += 1;
            }
        }

        debug!(
            requested = locations.len(),
            blocks = groups.len(),
            "Fetched records"
        );
        Ok(())
    }

    /// Pages of one block, or `None` when the block cannot be used.
    fn block_pages(&self, offset: u64) -> Result<Option<Vec<PageRecord>>> {
        let block = match self.source.read_block(offset) {
            Ok(BlockOutcome::Block(block)) => block,
            Ok(BlockOutcome::EndOfArchive) => {
                warn!(offset, "Index points past the end of the archive");
                return Ok(None);
            }
            Err(e @ StreamError::Block { .. }) => {
                warn!(error = %e, "Skipping block");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        match extract_pages(&block.data) {
            Ok(pages) => Ok(Some(pages)),
            Err(e) => {
                warn!(offset, error = %e, "Skipping unparsable block");
                Ok(None)
            }
        }
    }
}
