//! Presence filter over precomputed index coverage.
//!
//! A stencil is the set of ranges in one document known to carry navigable
//! index data. Checking it locally lets a navigation operation answer
//! "nothing here" without a remote round trip.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use tokio::sync::Mutex;
use tower_lsp::lsp_types::{Position, Range};

use super::query::{DocumentSpec, IndexClient};

/// Outcome of a presence check.
///
/// `Unknown` means the check could not be answered (stencils unsupported,
/// or the fetch failed) and the caller must fall through to the
/// authoritative path. It is never a substitute for `Present` or `Absent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Present,
    Absent,
    Unknown,
}

#[derive(Debug)]
enum StencilEntry {
    /// The service answered but carries no presence data for this document.
    Unsupported,
    /// Coverage ranges, sorted ascending by `end.line`.
    Ranges(Vec<Range>),
}

/// Process-wide stencil cache, bounded by an LRU over documents.
///
/// Entries are immutable once created. A successful fetch (including the
/// "unsupported" answer) is cached; a failed fetch is not, so a transient
/// transport error never becomes a permanent `Unknown`.
pub struct StencilIndex {
    client: IndexClient,
    cache: Mutex<LruCache<DocumentSpec, Arc<StencilEntry>>>,
}

impl StencilIndex {
    pub fn new(client: IndexClient, capacity: NonZeroUsize) -> Self {
        Self {
            client,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Is there index data overlapping `position`?
    pub async fn presence(&self, doc: &DocumentSpec, position: Position) -> Presence {
        let cached = {
            let mut cache = self.cache.lock().await;
            cache.get(doc).cloned()
        };

        let entry = match cached {
            Some(entry) => entry,
            None => match self.client.stencil(doc).await {
                Ok(Some(mut ranges)) => {
                    // The gallop search depends on end.line order; normalize
                    // once before the entry becomes immutable.
                    ranges.sort_by_key(|range| range.end.line);
                    let entry = Arc::new(StencilEntry::Ranges(ranges));
                    self.cache.lock().await.put(doc.clone(), Arc::clone(&entry));
                    entry
                }
                Ok(None) => {
                    let entry = Arc::new(StencilEntry::Unsupported);
                    self.cache.lock().await.put(doc.clone(), Arc::clone(&entry));
                    entry
                }
                Err(err) => {
                    tracing::debug!(path = %doc.path, error = %err, "stencil fetch failed");
                    return Presence::Unknown;
                }
            },
        };

        match entry.as_ref() {
            StencilEntry::Unsupported => Presence::Unknown,
            StencilEntry::Ranges(ranges) => presence_in(ranges, position),
        }
    }
}

/// Search `ranges` (sorted ascending by `end.line`) for one overlapping
/// `position`.
///
/// Gallop phase: exponential skip-ahead while the probed range ends before
/// the query line, resetting the step on overshoot. Linear phase: scan
/// forward from the last confirmed index until a range starts past the
/// query line; end.line order guarantees nothing later can match once that
/// holds. Sub-linear in the common case of positions queried in increasing
/// order, O(n) worst case.
pub(crate) fn presence_in(ranges: &[Range], position: Position) -> Presence {
    let mut index = 0;
    let mut step = 1;
    loop {
        match ranges.get(index + step) {
            Some(range) if range.end.line < position.line => {
                index += step;
                step *= 2;
            }
            _ if step > 1 => step = 1,
            _ => break,
        }
    }

    for range in &ranges[index..] {
        if range.start.line > position.line {
            return Presence::Absent;
        }
        if contains(range, position) {
            return Presence::Present;
        }
    }
    Presence::Absent
}

/// Half-open containment: `start <= position < end`, comparing (line,
/// character) lexicographically.
fn contains(range: &Range, position: Position) -> bool {
    let pos = (position.line, position.character);
    let start = (range.start.line, range.start.character);
    let end = (range.end.line, range.end.character);
    start <= pos && pos < end
}
