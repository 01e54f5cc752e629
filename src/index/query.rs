//! Remote index query boundary.
//!
//! The wire transport is injected by the host as a [`QueryExecutor`]; this
//! module owns the query documents, the variable payloads, and the decoding
//! of the response envelope. Index responses address data under
//! `repository → commit → blob → index`, and any level may be `null` to
//! signal "no index data" — that is an empty answer, never an error.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tower_lsp::lsp_types::{
    Hover, HoverContents, Location, MarkupContent, MarkupKind, Position, Range, Url,
};

/// Failure of a single remote query.
///
/// `Clone` so a memoized failure can be replayed to every caller sharing the
/// same in-flight request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    /// The transport rejected the request (network, auth, server error).
    #[error("index query transport failed: {0}")]
    Transport(String),
    /// The response arrived but did not match the expected payload shape.
    #[error("malformed index response: {0}")]
    Malformed(String),
}

/// Executes one index query and returns the raw response body.
///
/// Implementations live outside this crate (HTTP client, test double); the
/// crate only depends on this seam.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, query: &'static str, variables: Value) -> Result<Value, QueryError>;
}

/// Identity of the versioned file a query position is relative to.
///
/// `uri` is the editor-local name; `repository`/`commit`/`path` address the
/// same file in the remote index. Two queries are "the same" iff their
/// `DocumentSpec`s and positions are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentSpec {
    pub uri: Url,
    pub repository: String,
    pub commit: String,
    pub path: String,
}

/// Opaque continuation token for one pagination sequence.
///
/// Scoped to the sequence that produced it; not stable across unrelated
/// queries.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PageCursor(pub String);

/// One fetched slice of a paginated result set.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Present iff more pages exist.
    pub next: Option<PageCursor>,
}

/// Combined answer for the definition + hover point query.
#[derive(Debug, Clone, PartialEq)]
pub struct DefinitionAndHover {
    pub definitions: Vec<Location>,
    pub hover: Option<Hover>,
}

const STENCIL_QUERY: &str = r#"
query Stencil($repository: String!, $commit: String!, $path: String!) {
    repository(name: $repository) {
        commit(rev: $commit) {
            blob(path: $path) {
                index {
                    stencil {
                        start { line character }
                        end { line character }
                    }
                }
            }
        }
    }
}
"#;

const DEFINITION_AND_HOVER_QUERY: &str = r#"
query DefinitionAndHover($repository: String!, $commit: String!, $path: String!, $line: Int!, $character: Int!) {
    repository(name: $repository) {
        commit(rev: $commit) {
            blob(path: $path) {
                index {
                    definitions(line: $line, character: $character) {
                        nodes { uri range { start { line character } end { line character } } }
                    }
                    hover(line: $line, character: $character) {
                        markdown { text }
                    }
                }
            }
        }
    }
}
"#;

const REFERENCES_QUERY: &str = r#"
query References($repository: String!, $commit: String!, $path: String!, $line: Int!, $character: Int!, $after: String) {
    repository(name: $repository) {
        commit(rev: $commit) {
            blob(path: $path) {
                index {
                    references(line: $line, character: $character, after: $after) {
                        nodes { uri range { start { line character } end { line character } } }
                        pageInfo { endCursor }
                    }
                }
            }
        }
    }
}
"#;

const IMPLEMENTATIONS_QUERY: &str = r#"
query Implementations($repository: String!, $commit: String!, $path: String!, $line: Int!, $character: Int!, $after: String) {
    repository(name: $repository) {
        commit(rev: $commit) {
            blob(path: $path) {
                index {
                    implementations(line: $line, character: $character, after: $after) {
                        nodes { uri range { start { line character } end { line character } } }
                        pageInfo { endCursor }
                    }
                }
            }
        }
    }
}
"#;

// Response envelope. Every level is optional: a null repository, commit,
// blob, or index all mean the same thing — no data for this coordinate.

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    repository: Option<RepositoryNode<T>>,
}

#[derive(Debug, Deserialize)]
struct RepositoryNode<T> {
    commit: Option<CommitNode<T>>,
}

#[derive(Debug, Deserialize)]
struct CommitNode<T> {
    blob: Option<BlobNode<T>>,
}

#[derive(Debug, Deserialize)]
struct BlobNode<T> {
    index: Option<T>,
}

#[derive(Debug, Deserialize)]
struct StencilPayload {
    stencil: Option<Vec<Range>>,
}

#[derive(Debug, Deserialize)]
struct DefinitionHoverPayload {
    definitions: Option<LocationConnection>,
    hover: Option<HoverPayload>,
}

#[derive(Debug, Deserialize)]
struct ReferencesPayload {
    references: Option<LocationConnection>,
}

#[derive(Debug, Deserialize)]
struct ImplementationsPayload {
    implementations: Option<LocationConnection>,
}

#[derive(Debug, Deserialize)]
struct LocationConnection {
    nodes: Vec<WireLocation>,
    #[serde(rename = "pageInfo")]
    page_info: Option<PageInfo>,
}

#[derive(Debug, Deserialize)]
struct PageInfo {
    #[serde(rename = "endCursor")]
    end_cursor: Option<PageCursor>,
}

#[derive(Debug, Deserialize)]
struct WireLocation {
    uri: Url,
    range: Range,
}

#[derive(Debug, Deserialize)]
struct HoverPayload {
    markdown: MarkdownText,
}

#[derive(Debug, Deserialize)]
struct MarkdownText {
    text: String,
}

fn decode_payload<T: DeserializeOwned>(value: Value) -> Result<Option<T>, QueryError> {
    let envelope: Envelope<T> =
        serde_json::from_value(value).map_err(|err| QueryError::Malformed(err.to_string()))?;
    Ok(envelope
        .repository
        .and_then(|r| r.commit)
        .and_then(|c| c.blob)
        .and_then(|b| b.index))
}

impl LocationConnection {
    fn into_page(self) -> Page<Location> {
        Page {
            items: self.nodes.into_iter().map(WireLocation::into_location).collect(),
            next: self.page_info.and_then(|info| info.end_cursor),
        }
    }
}

impl WireLocation {
    fn into_location(self) -> Location {
        Location {
            uri: self.uri,
            range: self.range,
        }
    }
}

impl HoverPayload {
    fn into_hover(self) -> Hover {
        Hover {
            contents: HoverContents::Markup(MarkupContent {
                kind: MarkupKind::Markdown,
                value: self.markdown.text,
            }),
            range: None,
        }
    }
}

/// Typed façade over the [`QueryExecutor`].
///
/// Cheap to clone; clones share the executor.
#[derive(Clone)]
pub struct IndexClient {
    executor: Arc<dyn QueryExecutor>,
}

impl IndexClient {
    pub fn new(executor: Arc<dyn QueryExecutor>) -> Self {
        Self { executor }
    }

    fn document_variables(doc: &DocumentSpec) -> Value {
        json!({
            "repository": doc.repository,
            "commit": doc.commit,
            "path": doc.path,
        })
    }

    fn position_variables(doc: &DocumentSpec, position: Position) -> Value {
        json!({
            "repository": doc.repository,
            "commit": doc.commit,
            "path": doc.path,
            "line": position.line,
            "character": position.character,
        })
    }

    /// Fetch the stencil for one document.
    ///
    /// `Ok(None)` means the service carries no presence data for this
    /// document (or does not support stencils at all).
    pub async fn stencil(&self, doc: &DocumentSpec) -> Result<Option<Vec<Range>>, QueryError> {
        let response = self
            .executor
            .execute(STENCIL_QUERY, Self::document_variables(doc))
            .await?;
        let payload: Option<StencilPayload> = decode_payload(response)?;
        Ok(payload.and_then(|p| p.stencil))
    }

    /// Authoritative point query for definitions and hover text.
    pub async fn definition_and_hover(
        &self,
        doc: &DocumentSpec,
        position: Position,
    ) -> Result<Option<DefinitionAndHover>, QueryError> {
        let response = self
            .executor
            .execute(
                DEFINITION_AND_HOVER_QUERY,
                Self::position_variables(doc, position),
            )
            .await?;
        let payload: Option<DefinitionHoverPayload> = decode_payload(response)?;
        Ok(payload.map(|p| DefinitionAndHover {
            definitions: p
                .definitions
                .map(|c| c.into_page().items)
                .unwrap_or_default(),
            hover: p.hover.map(HoverPayload::into_hover),
        }))
    }

    /// Fetch one page of references; `cursor` is `None` for the first page.
    pub async fn references_page(
        &self,
        doc: &DocumentSpec,
        position: Position,
        cursor: Option<&PageCursor>,
    ) -> Result<Option<Page<Location>>, QueryError> {
        let mut variables = Self::position_variables(doc, position);
        variables["after"] = cursor.map(|c| json!(c.0)).unwrap_or(Value::Null);
        let response = self.executor.execute(REFERENCES_QUERY, variables).await?;
        let payload: Option<ReferencesPayload> = decode_payload(response)?;
        Ok(payload
            .and_then(|p| p.references)
            .map(LocationConnection::into_page))
    }

    /// Fetch one page of implementations; `cursor` is `None` for the first page.
    pub async fn implementations_page(
        &self,
        doc: &DocumentSpec,
        position: Position,
        cursor: Option<&PageCursor>,
    ) -> Result<Option<Page<Location>>, QueryError> {
        let mut variables = Self::position_variables(doc, position);
        variables["after"] = cursor.map(|c| json!(c.0)).unwrap_or(Value::Null);
        let response = self
            .executor
            .execute(IMPLEMENTATIONS_QUERY, variables)
            .await?;
        let payload: Option<ImplementationsPayload> = decode_payload(response)?;
        Ok(payload
            .and_then(|p| p.implementations)
            .map(LocationConnection::into_page))
    }
}
