use serde::{Deserialize, Serialize};

/// One record of the binary index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexEntry {
    pub block_offset: u64,
    pub position_in_block: u64,
    pub record_id: u64,
}

/// A page pulled out of a decompressed block. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRecord {
    pub id: u64,
    pub title: String,
    pub is_redirect: bool,
    /// `title` attribute of the `<redirect>` marker, when the dump carries one
    pub redirect_target: Option<String>,
    pub raw_text: String,
}

/// A page as handed to callers of `fetch_records`: title plus rendered text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub text: String,
}

/// One line of the legacy `offset:id:title` text index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleIndexRow {
    pub block_offset: u64,
    pub record_id: u64,
    pub title: String,
}

/// Outcome of a lookup where absence is expected control flow rather than failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
    EndOfRange,
}

impl<T> Lookup<T> {
    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::NotFound | Lookup::EndOfRange => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }
}
