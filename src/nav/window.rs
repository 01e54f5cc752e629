//! Bulk-prefetch window boundary.

use async_trait::async_trait;
use tower_lsp::lsp_types::{Hover, Location, Position};

use crate::index::DocumentSpec;

/// Navigation answers prefetched for a region of a document.
#[derive(Debug, Clone, Default)]
pub struct NavigationWindow {
    pub definitions: Vec<Location>,
    pub references: Vec<Location>,
    pub hover: Option<Hover>,
}

/// A bulk-prefetch facility maintained outside this crate.
///
/// The orchestrator only consumes the returned future; `None` and empty
/// collections both mean "no usable fast answer", and the authoritative
/// path covers the query instead.
#[async_trait]
pub trait WindowCache: Send + Sync {
    async fn window(&self, doc: &DocumentSpec, position: Position) -> Option<NavigationWindow>;
}

/// Stock implementation for hosts without bulk prefetch: never answers.
pub struct NoPrefetch;

#[async_trait]
impl WindowCache for NoPrefetch {
    async fn window(&self, _doc: &DocumentSpec, _position: Position) -> Option<NavigationWindow> {
        None
    }
}
