//! Navigation operations composed from the index components.
//!
//! This module provides:
//! - `NavigationOrchestrator`, the entry point for the four navigation
//!   operations (definition + hover, references, highlights,
//!   implementations)
//! - `NavigationCapabilities`, the seam hosts program against
//! - The `WindowCache` and `HighlightFilter` collaborator boundaries

mod highlight;
mod window;

pub use highlight::{HighlightFilter, SameDocumentFilter};
pub use window::{NavigationWindow, NoPrefetch, WindowCache};

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::FutureExt;
use futures::stream::{self, BoxStream, StreamExt};
use tower_lsp::lsp_types::{DocumentHighlight, Hover, Location, Position};

use crate::index::{
    paginate, race_with_fallback, DefinitionAndHover, DocumentSpec, IndexClient, Presence,
    QueryError, QueryExecutor, RequestMemoizer, StencilIndex,
};

/// Tuning knobs shared by every navigation operation.
#[derive(Debug, Clone)]
pub struct NavigationTuning {
    /// How long the window fast path may run before the authoritative
    /// query starts.
    pub race_delay: Duration,
    /// Page budget for one paginated sequence.
    pub max_pages: usize,
    /// Documents kept in the stencil cache.
    pub stencil_capacity: NonZeroUsize,
    /// Point-query results kept in the memoizer.
    pub memo_capacity: usize,
}

impl Default for NavigationTuning {
    fn default() -> Self {
        Self {
            race_delay: Duration::from_millis(25),
            max_pages: 10,
            stencil_capacity: NonZeroUsize::new(10).unwrap(),
            memo_capacity: 5,
        }
    }
}

/// The navigation surface hosts program against.
///
/// Keeps the hosting registration layer decoupled from orchestrator
/// internals; streaming results emit the full accumulated list each time,
/// so consumers replace rather than append.
#[async_trait]
pub trait NavigationCapabilities: Send + Sync {
    async fn resolve_definition(
        &self,
        doc: &DocumentSpec,
        position: Position,
    ) -> Result<Vec<Location>, QueryError>;

    async fn resolve_hover(
        &self,
        doc: &DocumentSpec,
        position: Position,
    ) -> Result<Option<Hover>, QueryError>;

    async fn resolve_references(
        &self,
        doc: &DocumentSpec,
        position: Position,
    ) -> BoxStream<'static, Result<Vec<Location>, QueryError>>;

    async fn resolve_highlights(
        &self,
        doc: &DocumentSpec,
        position: Position,
    ) -> Result<Option<Vec<DocumentHighlight>>, QueryError>;

    async fn resolve_implementations(
        &self,
        doc: &DocumentSpec,
        position: Position,
    ) -> BoxStream<'static, Result<Vec<Location>, QueryError>>;
}

/// Composes the stencil gate, the memoizer, the window race, and the
/// pagination engine into the public navigation operations.
///
/// Constructed once per process; the stencil cache and memoizer inside are
/// the only shared mutable state, and only this type touches them.
pub struct NavigationOrchestrator {
    client: IndexClient,
    stencil: StencilIndex,
    memo: RequestMemoizer<Result<Option<DefinitionAndHover>, QueryError>>,
    window: Arc<dyn WindowCache>,
    highlight: Arc<dyn HighlightFilter>,
    race_delay: Duration,
    max_pages: usize,
}

impl NavigationOrchestrator {
    pub fn new(
        executor: Arc<dyn QueryExecutor>,
        window: Arc<dyn WindowCache>,
        highlight: Arc<dyn HighlightFilter>,
        tuning: NavigationTuning,
    ) -> Self {
        let client = IndexClient::new(executor);
        Self {
            stencil: StencilIndex::new(client.clone(), tuning.stencil_capacity),
            memo: RequestMemoizer::new(tuning.memo_capacity),
            client,
            window,
            highlight,
            race_delay: tuning.race_delay,
            max_pages: tuning.max_pages,
        }
    }

    /// `Absent` short-circuits the whole operation; `Unknown` must fall
    /// through to the authoritative path.
    async fn gated_out(&self, doc: &DocumentSpec, position: Position) -> bool {
        self.stencil.presence(doc, position).await == Presence::Absent
    }

    /// Definition locations and hover text for one position.
    ///
    /// Memoized by (document, position); a window hit with a non-empty
    /// definition set wins the race, otherwise the point query answers.
    pub async fn definition_and_hover(
        &self,
        doc: &DocumentSpec,
        position: Position,
    ) -> Result<Option<DefinitionAndHover>, QueryError> {
        if self.gated_out(doc, position).await {
            return Ok(None);
        }

        let shared = self.memo.get_or_insert(doc, position, || {
            let client = self.client.clone();
            let window = Arc::clone(&self.window);
            let delay = self.race_delay;
            let fast_doc = doc.clone();
            let slow_doc = doc.clone();
            async move {
                let fast = async move {
                    Ok(window.window(&fast_doc, position).await.and_then(|w| {
                        if w.definitions.is_empty() {
                            None
                        } else {
                            Some(DefinitionAndHover {
                                definitions: w.definitions,
                                hover: w.hover,
                            })
                        }
                    }))
                };
                race_with_fallback(
                    fast,
                    move || async move { client.definition_and_hover(&slow_doc, position).await },
                    delay,
                    |answer: &Option<DefinitionAndHover>| {
                        answer.as_ref().is_some_and(|a| !a.definitions.is_empty())
                    },
                )
                .await
            }
            .boxed()
        });
        shared.await
    }

    /// All references to the symbol at one position, as a stream of
    /// accumulated lists.
    ///
    /// A non-empty window reference list is emitted first as a head start,
    /// but it never substitutes for completeness: the paginated
    /// authoritative sequence always runs and its emissions replace the
    /// advisory one.
    pub async fn references(
        &self,
        doc: &DocumentSpec,
        position: Position,
    ) -> BoxStream<'static, Result<Vec<Location>, QueryError>> {
        if self.gated_out(doc, position).await {
            return stream::empty().boxed();
        }

        let window = Arc::clone(&self.window);
        let fast_doc = doc.clone();
        let fast = async move {
            Ok(window
                .window(&fast_doc, position)
                .await
                .map(|w| w.references)
                .filter(|refs| !refs.is_empty()))
        };
        // The slow side is a resolved "nothing": the paginated walk below
        // is the real authoritative path and must not be queried twice.
        let advisory = race_with_fallback(
            fast,
            || futures::future::ready(Ok(None)),
            self.race_delay,
            |refs: &Option<Vec<Location>>| refs.as_ref().is_some_and(|r| !r.is_empty()),
        )
        .await
        .ok()
        .flatten();

        let paged = self.paginated_references(doc, position);
        match advisory {
            Some(references) => {
                tracing::debug!(path = %doc.path, count = references.len(), "window references head start");
                stream::once(futures::future::ready(Ok(references)))
                    .chain(paged)
                    .boxed()
            }
            None => paged.boxed(),
        }
    }

    /// Same-symbol highlights for one position.
    ///
    /// Prefers the window reference list; otherwise spends exactly one
    /// page of the authoritative references. Highlighting is best effort
    /// and never walks the full pagination.
    pub async fn highlights(
        &self,
        doc: &DocumentSpec,
        position: Position,
    ) -> Result<Option<Vec<DocumentHighlight>>, QueryError> {
        if self.gated_out(doc, position).await {
            return Ok(None);
        }

        if let Some(window) = self.window.window(doc, position).await {
            if !window.references.is_empty() {
                return Ok(Some(
                    self.highlight.filter_for_highlights(doc, &window.references),
                ));
            }
        }

        let page = self.client.references_page(doc, position, None).await?;
        Ok(page.map(|p| self.highlight.filter_for_highlights(doc, &p.items)))
    }

    /// All implementations of the symbol at one position, as a stream of
    /// accumulated lists. No bulk-prefetch signal exists for
    /// implementations, so there is no fast path.
    pub async fn implementations(
        &self,
        doc: &DocumentSpec,
        position: Position,
    ) -> BoxStream<'static, Result<Vec<Location>, QueryError>> {
        if self.gated_out(doc, position).await {
            return stream::empty().boxed();
        }

        let client = self.client.clone();
        let doc = doc.clone();
        paginate(
            move |cursor| {
                let client = client.clone();
                let doc = doc.clone();
                async move {
                    client
                        .implementations_page(&doc, position, cursor.as_ref())
                        .await
                }
            },
            self.max_pages,
        )
        .boxed()
    }

    fn paginated_references(
        &self,
        doc: &DocumentSpec,
        position: Position,
    ) -> BoxStream<'static, Result<Vec<Location>, QueryError>> {
        let client = self.client.clone();
        let doc = doc.clone();
        paginate(
            move |cursor| {
                let client = client.clone();
                let doc = doc.clone();
                async move { client.references_page(&doc, position, cursor.as_ref()).await }
            },
            self.max_pages,
        )
        .boxed()
    }
}

#[async_trait]
impl NavigationCapabilities for NavigationOrchestrator {
    async fn resolve_definition(
        &self,
        doc: &DocumentSpec,
        position: Position,
    ) -> Result<Vec<Location>, QueryError> {
        Ok(self
            .definition_and_hover(doc, position)
            .await?
            .map(|answer| answer.definitions)
            .unwrap_or_default())
    }

    async fn resolve_hover(
        &self,
        doc: &DocumentSpec,
        position: Position,
    ) -> Result<Option<Hover>, QueryError> {
        Ok(self
            .definition_and_hover(doc, position)
            .await?
            .and_then(|answer| answer.hover))
    }

    async fn resolve_references(
        &self,
        doc: &DocumentSpec,
        position: Position,
    ) -> BoxStream<'static, Result<Vec<Location>, QueryError>> {
        self.references(doc, position).await
    }

    async fn resolve_highlights(
        &self,
        doc: &DocumentSpec,
        position: Position,
    ) -> Result<Option<Vec<DocumentHighlight>>, QueryError> {
        self.highlights(doc, position).await
    }

    async fn resolve_implementations(
        &self,
        doc: &DocumentSpec,
        position: Position,
    ) -> BoxStream<'static, Result<Vec<Location>, QueryError>> {
        self.implementations(doc, position).await
    }
}
