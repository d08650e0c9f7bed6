use crate::block::{BlockOutcome, BlockSource, Bz2Archive};
use crate::config::{EXCLUDED_PREFIXES, PROGRESS_INTERVAL};
use crate::content::normalize_title;
use crate::error::{Result, StreamError};
use crate::models::{IndexEntry, PageRecord};
use crate::parser::extract_pages;
use crate::progress::Progress;
use crate::stats::RebuildStats;
use crate::store::IndexWriter;
use std::path::Path;
use tracing::{debug, info, warn};

/// Which pages make it into a rebuilt index.
#[derive(Debug, Clone)]
pub struct IndexFilter {
    /// Lowercase title prefixes to leave out
    pub excluded_prefixes: Vec<String>,
}

impl Default for IndexFilter {
    fn default() -> Self {
        Self {
            excluded_prefixes: EXCLUDED_PREFIXES.iter().map(|p| p.to_string()).collect(),
        }
    }
}

pub enum Verdict {
    Accept,
    Redirect,
    Excluded,
}

impl IndexFilter {
    pub fn with_prefixes<I, P>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        Self {
            excluded_prefixes: prefixes
                .into_iter()
                .map(|p| p.as_ref().to_lowercase())
                .collect(),
        }
    }

    pub fn judge(&self, page: &PageRecord) -> Verdict {
        if page.is_redirect {
            return Verdict::Redirect;
        }
        let title = normalize_title(&page.title).to_lowercase();
        if self
            .excluded_prefixes
            .iter()
            .any(|prefix| title.starts_with(prefix.as_str()))
        {
            return Verdict::Excluded;
        }
        Verdict::Accept
    }
}

/// Rebuilds the binary index for `archive` into `output`.
pub fn rebuild(
    archive: &Bz2Archive,
    output: impl AsRef<Path>,
    filter: &IndexFilter,
    progress: &mut dyn FnMut(&Progress),
) -> Result<RebuildStats> {
    let mut writer = IndexWriter::create(output.as_ref())?;
    info!("Rebuilding index from: {}", archive.path().display());
    let stats = scan(
        archive,
        |from| archive.find_next_stream(from),
        &mut writer,
        filter,
        progress,
    )?;
    writer.finish()?;

    info!(
        entries = stats.entries,
        blocks = stats.blocks_read,
        skipped = stats.blocks_skipped(),
        "Index rebuilt successfully"
    );
    Ok(stats)
}

/// The scan loop behind [`rebuild`], over any block source.
///
/// `resync` maps a byte offset to the next plausible block start; it is
/// consulted only after a block fails to decompress.
pub fn scan<S, F>(
    source: &S,
    mut resync: F,
    writer: &mut IndexWriter,
    filter: &IndexFilter,
    progress: &mut dyn FnMut(&Progress),
) -> Result<RebuildStats>
where
    S: BlockSource,
    F: FnMut(u64) -> Result<Option<u64>>,
{
    let mut stats = RebuildStats::new();
    let mut offset = 0u64;

    loop {
        let block = match source.read_block(offset) {
            Ok(BlockOutcome::Block(block)) => block,
            Ok(BlockOutcome::EndOfArchive) => break,
            Err(e @ StreamError::Block { .. }) => {
                stats.blocks_corrupt += 1;
                let resume_at = resync(offset + 1)?;
                warn!(offset, error = %e, resume_at = ?resume_at, "Skipping corrupt block");
                progress(&Progress::BlockSkipped {
                    offset,
                    reason: e.to_string(),
                    resume_at,
                });
                match resume_at {
                    Some(next) => {
                        offset = next;
                        continue;
                    }
                    None => break,
                }
            }
            Err(e) => return Err(e),
        };

        if block.data.is_empty() {
            debug!(offset, "Empty block, end of archive");
            break;
        }
        stats.blocks_read += 1;
        stats.bytes_consumed += block.consumed;

        match extract_pages(&block.data) {
            Ok(pages) => {
                let mut accepted = 0u64;
                for page in pages {
                    stats.pages_seen += 1;
                    match filter.judge(&page) {
                        Verdict::Redirect => stats.redirects_skipped += 1,
                        Verdict::Excluded => stats.excluded_skipped += 1,
                        Verdict::Accept => {
                            writer.append(&IndexEntry {
                                block_offset: offset,
                                position_in_block: accepted,
                                record_id: page.id,
                            })?;
                            accepted += 1;
                            stats.entries += 1;
                            if stats.entries % PROGRESS_INTERVAL == 0 {
                                debug!(entries = stats.entries, "Indexing progress");
                            }
                        }
                    }
                }
                progress(&Progress::BlockIndexed {
                    offset,
                    accepted,
                    entries_total: stats.entries,
                });
            }
            Err(e) => {
                stats.blocks_unparsable += 1;
                warn!(offset, error = %e, "Skipping pages of unparsable block");
                progress(&Progress::BlockSkipped {
                    offset,
                    reason: e.to_string(),
                    resume_at: Some(block.next_offset()),
                });
            }
        }

        offset = block.next_offset();
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(title: &str, is_redirect: bool) -> PageRecord {
        PageRecord {
            id: 1,
            title: title.to_string(),
            is_redirect,
            redirect_target: None,
            raw_text: String::new(),
        }
    }

    fn accepted(filter: &IndexFilter, title: &str) -> bool {
        matches!(filter.judge(&page(title, false)), Verdict::Accept)
    }

    #[test]
    fn default_filter_excludes_namespaces_case_insensitively() {
        let filter = IndexFilter::default();
        assert!(!accepted(&filter, "Talk:Foo"));
        assert!(!accepted(&filter, "TEMPLATE:Infobox"));
        assert!(!accepted(&filter, "module:Citation"));
        assert!(!accepted(&filter, "File:Logo.svg"));
        assert!(!accepted(&filter, "User:Someone"));
        assert!(!accepted(&filter, "MediaWiki:Sitenotice"));
        assert!(!accepted(&filter, "  talk:Padded"));
    }

    #[test]
    fn default_filter_accepts_articles() {
        let filter = IndexFilter::default();
        assert!(accepted(&filter, "Cat"));
        assert!(accepted(&filter, "Talking heads"));
        assert!(accepted(&filter, "Category:Cats"));
        assert!(accepted(&filter, "User talk page etiquette"));
    }

    #[test]
    fn redirects_are_rejected() {
        let filter = IndexFilter::default();
        assert!(matches!(filter.judge(&page("Kitty", true)), Verdict::Redirect));
    }

    #[test]
    fn custom_prefixes_are_lowercased() {
        let filter = IndexFilter::with_prefixes(["Category:"]);
        assert!(!accepted(&filter, "Category:Cats"));
        assert!(accepted(&filter, "Talk:Foo"));
    }
}
