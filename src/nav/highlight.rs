//! Highlight eligibility filtering.

use tower_lsp::lsp_types::{DocumentHighlight, DocumentHighlightKind, Location};

use crate::index::DocumentSpec;

/// Decides which reference locations qualify as same-symbol highlights.
///
/// Pure and synchronous from the orchestrator's perspective.
pub trait HighlightFilter: Send + Sync {
    fn filter_for_highlights(
        &self,
        doc: &DocumentSpec,
        locations: &[Location],
    ) -> Vec<DocumentHighlight>;
}

/// Keeps only locations inside the queried document; highlights never span
/// files.
pub struct SameDocumentFilter;

impl HighlightFilter for SameDocumentFilter {
    fn filter_for_highlights(
        &self,
        doc: &DocumentSpec,
        locations: &[Location],
    ) -> Vec<DocumentHighlight> {
        locations
            .iter()
            .filter(|location| location.uri == doc.uri)
            .map(|location| DocumentHighlight {
                range: location.range,
                kind: Some(DocumentHighlightKind::TEXT),
            })
            .collect()
    }
}
