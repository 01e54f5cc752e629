//! Bounded memoization of in-flight and settled point queries.

use std::collections::VecDeque;
use std::sync::Mutex;

use futures::future::{BoxFuture, FutureExt, Shared};
use tower_lsp::lsp_types::Position;

use super::query::DocumentSpec;

type SharedResult<R> = Shared<BoxFuture<'static, R>>;

struct MemoEntry<R: Clone> {
    key: (DocumentSpec, Position),
    result: SharedResult<R>,
}

/// Fixed-capacity recency list of query results keyed by document and
/// position.
///
/// The stored value is a shared future, so two identical queries issued
/// before the first resolves collapse into a single underlying invocation
/// and observe the same outcome — including a failed one, which is replayed
/// to later identical callers until the entry is evicted. Callers that need
/// retry-on-failure wrap this with their own logic.
///
/// Keys are (document, position) only; any further context a query carries
/// is deliberately ignored, so e.g. reference queries differing only in an
/// include-declaration flag share one entry.
pub struct RequestMemoizer<R: Clone> {
    capacity: usize,
    entries: Mutex<VecDeque<MemoEntry<R>>>,
}

impl<R> RequestMemoizer<R>
where
    R: Clone + Send + Sync + 'static,
{
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::new()),
        }
    }

    /// Return the memoized result for `(doc, position)`, invoking `compute`
    /// on a miss.
    ///
    /// A hit promotes the entry to the head of the recency list; a miss
    /// inserts at the head and evicts from the tail past capacity. The lock
    /// is never held across an await: the future is created here but only
    /// driven by the returned handle.
    pub fn get_or_insert<F>(
        &self,
        doc: &DocumentSpec,
        position: Position,
        compute: F,
    ) -> SharedResult<R>
    where
        F: FnOnce() -> BoxFuture<'static, R>,
    {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(found) = entries
            .iter()
            .position(|entry| entry.key.0 == *doc && entry.key.1 == position)
        {
            if found != 0 {
                if let Some(entry) = entries.remove(found) {
                    entries.push_front(entry);
                }
            }
            return entries[0].result.clone();
        }

        let result = compute().shared();
        entries.push_front(MemoEntry {
            key: (doc.clone(), position),
            result: result.clone(),
        });
        while entries.len() > self.capacity {
            entries.pop_back();
        }
        result
    }

    #[cfg(test)]
    fn keys(&self) -> Vec<(String, Position)> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|entry| (entry.key.0.path.clone(), entry.key.1))
            .collect()
    }
}
