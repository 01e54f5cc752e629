//! Remote-index-backed code navigation language server.
//!
//! Navigation answers (go to definition, find references, hover, document
//! highlights, go to implementation) come from a remote, paginated,
//! precomputed index service. A local stencil rules out "no data here"
//! without a network call, a bulk-prefetch window races the authoritative
//! point query for latency, and large reference sets stream in page by
//! page.

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use futures::stream::{BoxStream, StreamExt};
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::request::{GotoImplementationParams, GotoImplementationResponse};
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer, LspService};

mod index;
mod nav;
pub(crate) mod settings;

pub use index::{
    paginate, race_with_fallback, DefinitionAndHover, DocumentSpec, IndexClient, Page, PageCursor,
    Presence, QueryError, QueryExecutor, RequestMemoizer, StencilIndex,
};
pub use nav::{
    HighlightFilter, NavigationCapabilities, NavigationOrchestrator, NavigationTuning,
    NavigationWindow, NoPrefetch, SameDocumentFilter, WindowCache,
};
pub use settings::{discover_settings, load_settings, Settings};

pub struct Backend {
    client: Client,
    executor: Arc<dyn QueryExecutor>,
    window: Arc<dyn WindowCache>,
    documents: DashMap<Url, DocumentSpec>,
    workspace_root: OnceLock<PathBuf>,
    remote: OnceLock<Option<(String, String)>>,
    orchestrator: OnceLock<Arc<NavigationOrchestrator>>,
}

impl Backend {
    pub(crate) fn new(
        client: Client,
        executor: Arc<dyn QueryExecutor>,
        window: Arc<dyn WindowCache>,
    ) -> Self {
        Self {
            client,
            executor,
            window,
            documents: DashMap::new(),
            workspace_root: OnceLock::new(),
            remote: OnceLock::new(),
            orchestrator: OnceLock::new(),
        }
    }

    /// Remote address for a document, once settings are known.
    ///
    /// Returns `None` while no repository is configured: every navigation
    /// request for such a document answers empty instead of querying.
    fn document_spec(&self, uri: &Url) -> Option<DocumentSpec> {
        let (repository, commit) = self.remote.get()?.clone()?;
        let path = match (self.workspace_root.get(), uri.to_file_path()) {
            (Some(root), Ok(file)) => {
                let rel = file.strip_prefix(root).unwrap_or(file.as_path());
                rel.to_string_lossy().replace('\\', "/")
            }
            _ => uri.path().trim_start_matches('/').to_string(),
        };
        Some(DocumentSpec {
            uri: uri.clone(),
            repository,
            commit,
            path,
        })
    }

    fn navigation_target(&self, uri: &Url) -> Option<(Arc<NavigationOrchestrator>, DocumentSpec)> {
        let orchestrator = Arc::clone(self.orchestrator.get()?);
        let doc = self.documents.get(uri).map(|entry| entry.clone())?;
        Some((orchestrator, doc))
    }
}

/// Drain an accumulated-list stream to its final emission.
///
/// LSP responses carry one list, so intermediate emissions are superseded;
/// an error mid-stream keeps what was accumulated before it.
async fn final_accumulated(
    mut stream: BoxStream<'static, std::result::Result<Vec<Location>, QueryError>>,
) -> Option<Vec<Location>> {
    let mut last = None;
    while let Some(step) = stream.next().await {
        match step {
            Ok(locations) => last = Some(locations),
            Err(err) => {
                tracing::warn!(error = %err, "paginated navigation query aborted");
                break;
            }
        }
    }
    last
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        // Extract workspace root from params
        let workspace_root = params
            .workspace_folders
            .as_ref()
            .and_then(|folders| folders.first())
            .and_then(|f| f.uri.to_file_path().ok())
            .or_else(|| {
                #[allow(deprecated)]
                params.root_uri.as_ref()?.to_file_path().ok()
            });

        let settings = if let Some(root) = workspace_root {
            let _ = self.workspace_root.set(root.clone());
            let (settings, _settings_dir) = settings::discover_settings(&root);
            settings
        } else {
            Settings::default()
        };

        let _ = self.remote.set(settings.remote_coordinates());
        let _ = self.orchestrator.set(Arc::new(NavigationOrchestrator::new(
            Arc::clone(&self.executor),
            Arc::clone(&self.window),
            Arc::new(SameDocumentFilter),
            settings.tuning(),
        )));

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Options(
                    TextDocumentSyncOptions {
                        open_close: Some(true),
                        // Positions are resolved against the indexed commit,
                        // not the edited buffer.
                        change: Some(TextDocumentSyncKind::NONE),
                        ..Default::default()
                    },
                )),
                hover_provider: Some(HoverProviderCapability::Simple(true)),
                definition_provider: Some(OneOf::Left(true)),
                references_provider: Some(OneOf::Left(true)),
                document_highlight_provider: Some(OneOf::Left(true)),
                implementation_provider: Some(ImplementationProviderCapability::Simple(true)),
                ..Default::default()
            },
            ..Default::default()
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        let message = match self.remote.get() {
            Some(Some((repository, commit))) => {
                format!("codenav ready: {repository}@{commit}")
            }
            _ => "codenav idle: no index repository configured".to_string(),
        };
        self.client.log_message(MessageType::INFO, message).await;
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let uri = params.text_document.uri;
        if let Some(spec) = self.document_spec(&uri) {
            self.documents.insert(uri, spec);
        }
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        self.documents.remove(&params.text_document.uri);
    }

    async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> Result<Option<GotoDefinitionResponse>> {
        let position_params = params.text_document_position_params;
        let Some((orchestrator, doc)) =
            self.navigation_target(&position_params.text_document.uri)
        else {
            return Ok(None);
        };

        match orchestrator
            .resolve_definition(&doc, position_params.position)
            .await
        {
            Ok(definitions) if definitions.is_empty() => Ok(None),
            Ok(definitions) => Ok(Some(GotoDefinitionResponse::Array(definitions))),
            Err(err) => {
                tracing::warn!(error = %err, "definition query failed");
                Ok(None)
            }
        }
    }

    async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
        let position_params = params.text_document_position_params;
        let Some((orchestrator, doc)) =
            self.navigation_target(&position_params.text_document.uri)
        else {
            return Ok(None);
        };

        match orchestrator
            .resolve_hover(&doc, position_params.position)
            .await
        {
            Ok(hover) => Ok(hover),
            Err(err) => {
                tracing::warn!(error = %err, "hover query failed");
                Ok(None)
            }
        }
    }

    async fn references(&self, params: ReferenceParams) -> Result<Option<Vec<Location>>> {
        // The include-declaration context does not change the indexed
        // answer, so identical positions share one memoized query.
        let position_params = params.text_document_position;
        let Some((orchestrator, doc)) = self.navigation_target(&position_params.text_document.uri)
        else {
            return Ok(None);
        };

        let stream = orchestrator
            .resolve_references(&doc, position_params.position)
            .await;
        Ok(final_accumulated(stream).await)
    }

    async fn document_highlight(
        &self,
        params: DocumentHighlightParams,
    ) -> Result<Option<Vec<DocumentHighlight>>> {
        let position_params = params.text_document_position_params;
        let Some((orchestrator, doc)) =
            self.navigation_target(&position_params.text_document.uri)
        else {
            return Ok(None);
        };

        match orchestrator
            .resolve_highlights(&doc, position_params.position)
            .await
        {
            Ok(highlights) => Ok(highlights),
            Err(err) => {
                tracing::warn!(error = %err, "highlight query failed");
                Ok(None)
            }
        }
    }

    async fn goto_implementation(
        &self,
        params: GotoImplementationParams,
    ) -> Result<Option<GotoImplementationResponse>> {
        let position_params = params.text_document_position_params;
        let Some((orchestrator, doc)) =
            self.navigation_target(&position_params.text_document.uri)
        else {
            return Ok(None);
        };

        let stream = orchestrator
            .resolve_implementations(&doc, position_params.position)
            .await;
        Ok(final_accumulated(stream)
            .await
            .filter(|implementations| !implementations.is_empty())
            .map(GotoImplementationResponse::Array))
    }
}

pub fn create_service(
    executor: Arc<dyn QueryExecutor>,
    window: Arc<dyn WindowCache>,
) -> (LspService<Backend>, tower_lsp::ClientSocket) {
    LspService::new(move |client| {
        Backend::new(client, Arc::clone(&executor), Arc::clone(&window))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct OfflineExecutor;

    #[async_trait::async_trait]
    impl QueryExecutor for OfflineExecutor {
        async fn execute(
            &self,
            _query: &'static str,
            _variables: serde_json::Value,
        ) -> std::result::Result<serde_json::Value, QueryError> {
            Err(QueryError::Transport("offline".into()))
        }
    }

    #[test]
    fn service_can_be_created() {
        let (_service, _socket) = create_service(Arc::new(OfflineExecutor), Arc::new(NoPrefetch));
    }
}
