//! Bounded breadth-first walk over the wikilink graph.
//!
//! Nodes are normalized titles present in the title index. Redirect pages
//! are followed transparently: the target is pushed to the *front* of the
//! queue at the redirect's own depth, so a redirect never costs a hop and
//! its target is handled before anything queued behind the redirect.
//! A title reached by two paths keeps whichever visit happened first.

use crate::block::BlockSource;
use crate::content::{extract_links, normalize_title, redirect_target, Renderer};
use crate::error::{Result, StreamError};
use crate::index::{TitleEntry, TitleIndex};
use crate::models::{IndexEntry, Lookup, PageRecord};
use crate::progress::{Progress, VisitOutcome};
use crate::reader::MultistreamReader;
use crate::stats::ExploreStats;
use crate::store;
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::path::Path;
use tracing::{debug, info, warn};

/// How a title got into the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hop {
    /// Linked from an accepted page, one level deeper
    Direct,
    /// Target of a redirect, same depth as the redirect
    Redirect,
}

#[derive(Debug, Clone)]
struct QueueItem {
    title: String,
    depth: u32,
    hop: Hop,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedTitle {
    pub title: String,
    pub depth: u32,
    pub via: Hop,
    pub entry: TitleEntry,
}

#[derive(Debug, Clone)]
pub struct Exploration {
    /// Accepted titles in visit order
    pub accepted: Vec<AcceptedTitle>,
    pub stats: ExploreStats,
}

impl Exploration {
    /// Index entries for the accepted titles, sorted by block offset then index position.
    pub fn derived_entries(&self) -> Vec<IndexEntry> {
        let mut located: Vec<&TitleEntry> = self.accepted.iter().map(|a| &a.entry).collect();
        located.sort_by_key(|e| (e.block_offset, e.index_position));
        located
            .into_iter()
            .map(|e| IndexEntry {
                block_offset: e.block_offset,
                position_in_block: e.position_in_block,
                record_id: e.record_id,
            })
            .collect()
    }

    pub fn titles(&self) -> Vec<&str> {
        self.accepted.iter().map(|a| a.title.as_str()).collect()
    }
}

pub struct Explorer<'a, S, R> {
    reader: &'a MultistreamReader<S, R>,
    titles: &'a TitleIndex,
}

impl<'a, S: BlockSource, R: Renderer> Explorer<'a, S, R> {
    pub fn new(reader: &'a MultistreamReader<S, R>, titles: &'a TitleIndex) -> Self {
        Self { reader, titles }
    }

    /// Walks from `seed` and writes the accepted titles as a new binary index.
    pub fn explore(
        &self,
        seed: &str,
        max_depth: u32,
        max_entries: usize,
        output: impl AsRef<Path>,
        progress: &mut dyn FnMut(&Progress),
    ) -> Result<ExploreStats> {
        let exploration = self.traverse(seed, max_depth, max_entries, progress)?;
        let entries = exploration.derived_entries();
        let written = store::write_all(output.as_ref(), &entries)?;

        let mut stats = exploration.stats;
        stats.entries = written;
        info!(
            seed,
            accepted = stats.accepted,
            redirects = stats.redirects_followed,
            entries = written,
            "Exploration complete"
        );
        Ok(stats)
    }

    /// The traversal alone, without writing anything.
    pub fn traverse(
        &self,
        seed: &str,
        max_depth: u32,
        max_entries: usize,
        progress: &mut dyn FnMut(&Progress),
    ) -> Result<Exploration> {
        let seed = normalize_title(seed);
        if !self.titles.contains(&seed) {
            return Err(StreamError::NotFound(seed));
        }

        let mut queue = VecDeque::new();
        queue.push_back(QueueItem {
            title: seed,
            depth: 0,
            hop: Hop::Direct,
        });
        let mut visited: FxHashMap<String, VisitOutcome> = FxHashMap::default();
        let mut accepted = Vec::new();
        let mut stats = ExploreStats::new();

        while let Some(item) = queue.pop_front() {
            if accepted.len() >= max_entries {
                break;
            }
            if visited.contains_key(&item.title) {
                stats.revisits_skipped += 1;
                continue;
            }

            let located = self.locate(&item.title)?;
            let (entry, page) = match located {
                Some(found) => found,
                None => {
                    stats.not_found += 1;
                    visited.insert(item.title.clone(), VisitOutcome::NotFound);
                    report(progress, &item, VisitOutcome::NotFound, accepted.len());
                    continue;
                }
            };

            if let Some(target) = redirect_of(&page) {
                stats.redirects_followed += 1;
                visited.insert(item.title.clone(), VisitOutcome::Redirected);
                match target {
                    Some(target)
                        if !visited.contains_key(&target) && self.titles.contains(&target) =>
                    {
                        debug!(from = %item.title, to = %target, "Following redirect");
                        queue.push_front(QueueItem {
                            title: target,
                            depth: item.depth,
                            hop: Hop::Redirect,
                        });
                    }
                    target => {
                        debug!(
                            from = %item.title,
                            to = ?target,
                            "Redirect target unknown or already visited"
                        );
                    }
                }
                report(progress, &item, VisitOutcome::Redirected, accepted.len());
                continue;
            }

            visited.insert(item.title.clone(), VisitOutcome::Accepted);
            stats.accepted += 1;
            stats.max_depth_reached = stats.max_depth_reached.max(item.depth);

            if item.depth < max_depth {
                for link in extract_links(&page.raw_text) {
                    if !visited.contains_key(&link) && self.titles.contains(&link) {
                        queue.push_back(QueueItem {
                            title: link,
                            depth: item.depth + 1,
                            hop: Hop::Direct,
                        });
                    }
                }
            }

            accepted.push(AcceptedTitle {
                title: item.title.clone(),
                depth: item.depth,
                via: item.hop,
                entry,
            });
            report(progress, &item, VisitOutcome::Accepted, accepted.len());
        }

        Ok(Exploration { accepted, stats })
    }

    /// The title's index entry and raw page, or `None` if either is missing.
    fn locate(&self, title: &str) -> Result<Option<(TitleEntry, PageRecord)>> {
        let entry = match self.titles.lookup(title) {
            Lookup::Found(entry) => entry,
            Lookup::NotFound | Lookup::EndOfRange => return Ok(None),
        };
        match self.reader.fetch_page(entry.block_offset, entry.record_id)? {
            Lookup::Found(page) => Ok(Some((entry, page))),
            Lookup::NotFound | Lookup::EndOfRange => {
                warn!(
                    title,
                    offset = entry.block_offset,
                    record_id = entry.record_id,
                    "Indexed page missing from its block"
                );
                Ok(None)
            }
        }
    }
}

/// `Some(target)` when the page is a redirect; the target itself may be unresolvable.
fn redirect_of(page: &PageRecord) -> Option<Option<String>> {
    let from_text = redirect_target(&page.raw_text);
    if !page.is_redirect && from_text.is_none() {
        return None;
    }
    let from_marker = page
        .redirect_target
        .as_deref()
        .map(normalize_title)
        .filter(|t| !t.is_empty());
    Some(from_marker.or(from_text))
}

fn report(
    progress: &mut dyn FnMut(&Progress),
    item: &QueueItem,
    outcome: VisitOutcome,
    accepted_total: usize,
) {
    progress(&Progress::TitleVisited {
        title: item.title.clone(),
        depth: item.depth,
        outcome,
        accepted_total,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(is_redirect: bool, marker: Option<&str>, text: &str) -> PageRecord {
        PageRecord {
            id: 1,
            title: "X".to_string(),
            is_redirect,
            redirect_target: marker.map(str::to_string),
            raw_text: text.to_string(),
        }
    }

    #[test]
    fn redirect_from_marker_wins() {
        let p = page(true, Some("Big_Cat"), "#REDIRECT [[Other]]");
        assert_eq!(redirect_of(&p), Some(Some("Big Cat".to_string())));
    }

    #[test]
    fn redirect_from_leading_line() {
        let p = page(false, None, "#REDIRECT [[Dog]]");
        assert_eq!(redirect_of(&p), Some(Some("Dog".to_string())));
    }

    #[test]
    fn flagged_redirect_without_target() {
        let p = page(true, None, "");
        assert_eq!(redirect_of(&p), Some(None));
    }

    #[test]
    fn regular_page_is_not_redirect() {
        let p = page(false, None, "Links to [[Dog]].");
        assert_eq!(redirect_of(&p), None);
    }

    #[test]
    fn derived_entries_sorted_by_offset_then_position() {
        let accepted = |title: &str, block_offset, index_position, position_in_block, record_id| {
            AcceptedTitle {
                title: title.to_string(),
                depth: 0,
                via: Hop::Direct,
                entry: TitleEntry {
                    block_offset,
                    record_id,
                    index_position,
                    position_in_block,
                },
            }
        };
        let exploration = Exploration {
            accepted: vec![
                accepted("C", 900, 5, 1, 30),
                accepted("A", 0, 1, 1, 10),
                accepted("B", 900, 4, 0, 20),
            ],
            stats: ExploreStats::new(),
        };
        let ids: Vec<u64> = exploration
            .derived_entries()
            .iter()
            .map(|e| e.record_id)
            .collect();
        assert_eq!(ids, vec![10, 20, 30]);
        assert_eq!(exploration.titles(), vec!["C", "A", "B"]);
    }
}
