//! Remote precomputed-index plumbing.
//!
//! This module provides:
//! - `QueryExecutor`/`IndexClient` for the wire-query boundary
//! - `StencilIndex` for cheap local presence checks
//! - `RequestMemoizer` for deduplicating identical point queries
//! - `paginate` for cursor-driven result streaming
//! - `race_with_fallback` for latency-biased source arbitration

mod memo;
mod page;
mod query;
mod race;
mod stencil;

pub use memo::RequestMemoizer;
pub use page::paginate;
pub use query::{
    DefinitionAndHover, DocumentSpec, IndexClient, Page, PageCursor, QueryError, QueryExecutor,
};
pub use race::race_with_fallback;
pub use stencil::{Presence, StencilIndex};
