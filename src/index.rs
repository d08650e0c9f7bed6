use crate::config::PROGRESS_INTERVAL;
use crate::content::normalize_title;
use crate::error::Result;
use crate::models::{Lookup, TitleIndexRow};
use crate::store::TextIndexRows;
use indicatif::ProgressBar;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Where a title lives: its block, its id, and its positions in the text index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleEntry {
    pub block_offset: u64,
    pub record_id: u64,
    /// Ordinal among well-formed rows of the text index
    pub index_position: u64,
    /// Ordinal among rows sharing `block_offset`
    pub position_in_block: u64,
}

/// Normalized title → location, built from the legacy text index.
pub struct TitleIndex {
    by_title: FxHashMap<String, TitleEntry>,
}

impl TitleIndex {
    pub fn build(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let pb = ProgressBar::new_spinner();
        info!("Building title index from: {}", path.display());

        let mut rows_seen = 0u64;
        let rows = TextIndexRows::open(path)?.inspect(|_| {
            rows_seen += 1;
            if rows_seen % PROGRESS_INTERVAL == 0 {
                pb.tick();
            }
        });
        let index = Self::from_rows(rows)?;
        pb.finish_and_clear();

        info!(titles = index.len(), "Title index built successfully");
        Ok(index)
    }

    /// First occurrence of a normalized title wins.
    pub fn from_rows<I>(rows: I) -> Result<Self>
    where
        I: IntoIterator<Item = Result<TitleIndexRow>>,
    {
        let mut by_title = FxHashMap::default();
        let mut per_block: FxHashMap<u64, u64> = FxHashMap::default();

        for (index_position, row) in rows.into_iter().enumerate() {
            let row = row?;
            let slot = per_block.entry(row.block_offset).or_insert(0);
            let position_in_block = *slot;
            *slot += 1;

            by_title
                .entry(normalize_title(&row.title))
                .or_insert(TitleEntry {
                    block_offset: row.block_offset,
                    record_id: row.record_id,
                    index_position: index_position as u64,
                    position_in_block,
                });
        }

        Ok(Self { by_title })
    }

    pub fn from_map(by_title: FxHashMap<String, TitleEntry>) -> Self {
        Self { by_title }
    }

    pub fn map(&self) -> &FxHashMap<String, TitleEntry> {
        &self.by_title
    }

    pub fn lookup(&self, title: &str) -> Lookup<TitleEntry> {
        match self.by_title.get(&normalize_title(title)) {
            Some(entry) => Lookup::Found(*entry),
            None => Lookup::NotFound,
        }
    }

    pub fn contains(&self, title: &str) -> bool {
        self.lookup(title).is_found()
    }

    pub fn len(&self) -> usize {
        self.by_title.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_title.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(block_offset: u64, record_id: u64, title: &str) -> Result<TitleIndexRow> {
        Ok(TitleIndexRow {
            block_offset,
            record_id,
            title: title.to_string(),
        })
    }

    fn make_index(rows: Vec<Result<TitleIndexRow>>) -> TitleIndex {
        TitleIndex::from_rows(rows).unwrap()
    }

    #[test]
    fn lookup_direct_title() {
        let index = make_index(vec![row(0, 1, "Rust"), row(0, 2, "Python")]);
        let rust = index.lookup("Rust").found().unwrap();
        assert_eq!(rust.record_id, 1);
        assert_eq!(rust.index_position, 0);
        assert_eq!(index.lookup("Python").found().unwrap().record_id, 2);
    }

    #[test]
    fn lookup_normalizes_underscores_and_whitespace() {
        let index = make_index(vec![row(0, 1, "New York City")]);
        assert!(index.contains("New_York_City"));
        assert!(index.contains("  New York City "));
    }

    #[test]
    fn lookup_is_case_sensitive() {
        let index = make_index(vec![row(0, 1, "Rust")]);
        assert!(index.contains("Rust"));
        assert_eq!(index.lookup("rust"), Lookup::NotFound);
        assert_eq!(index.lookup("RUST"), Lookup::NotFound);
    }

    #[test]
    fn positions_per_block() {
        let index = make_index(vec![
            row(0, 1, "A"),
            row(0, 2, "B"),
            row(900, 3, "C"),
            row(900, 4, "D"),
            row(900, 5, "E"),
        ]);
        let e = index.lookup("E").found().unwrap();
        assert_eq!(e.block_offset, 900);
        assert_eq!(e.index_position, 4);
        assert_eq!(e.position_in_block, 2);
        assert_eq!(index.lookup("B").found().unwrap().position_in_block, 1);
    }

    #[test]
    fn duplicate_titles_keep_first() {
        let index = make_index(vec![row(0, 1, "Dup"), row(50, 2, "Dup")]);
        assert_eq!(index.len(), 1);
        assert_eq!(index.lookup("Dup").found().unwrap().record_id, 1);
    }

    #[test]
    fn empty_index() {
        let index = make_index(vec![]);
        assert!(index.is_empty());
        assert_eq!(index.lookup("Anything"), Lookup::NotFound);
    }

    #[test]
    fn row_error_propagates() {
        let rows = vec![
            row(0, 1, "A"),
            Err(crate::error::StreamError::io(
                Path::new("index.txt"),
                std::io::Error::other("boom"),
            )),
        ];
        assert!(TitleIndex::from_rows(rows).is_err());
    }
}
