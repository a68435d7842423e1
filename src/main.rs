//! pdf-ingest - OCR documents into image-inlined Markdown and heading-aligned chunks.

mod chunker;
mod config;
mod document;
mod inline;
mod ocr;
mod parser;
mod store;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use clap::Parser as _;
use chunker::{Chunk, ChunkNumbering, MarkdownChunker, Metadata};
use config::AppConfig;
use document::Document;
use ocr::OcrProviderKind;
use parser::{ParseError, ParsedDocument, Parser};
use store::{DocumentStore, MarkdownPage};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Turn PDFs into chunked Markdown for indexing.
#[derive(clap::Parser, Debug)]
#[command(name = "pdf-ingest", version, about)]
struct Cli {
    /// OCR provider: mistral_ocr or local (overrides OCR_PROVIDER)
    #[arg(long, global = true)]
    provider: Option<String>,

    /// Chunk id numbering: dense or positional (overrides CHUNK_NUMBERING)
    #[arg(long, global = true)]
    numbering: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Parse one or more local documents.
    Parse {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Directory for the combined Markdown dump (overrides DOCS_DIR)
        #[arg(long)]
        docs_dir: Option<PathBuf>,
        /// Do not write the Markdown dump
        #[arg(long)]
        no_save: bool,
        /// Print chunks as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },
    /// Chunk a previously saved Markdown file without running OCR.
    Chunk {
        markdown: PathBuf,
        /// Original document, used for its id and metadata
        #[arg(long)]
        source: Option<PathBuf>,
        /// Override the chunk id prefix
        #[arg(long)]
        doc_id: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Run the HTTP API.
    Serve {
        /// Listen address (overrides BIND_ADDR)
        #[arg(long)]
        bind: Option<String>,
    },
}

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    documents: DocumentStore,
    config: Arc<AppConfig>,
    chunker: MarkdownChunker,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pdf_ingest=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::from_env().context("Invalid configuration")?;
    if let Some(name) = &cli.provider {
        config.provider = OcrProviderKind::from_str(name)
            .with_context(|| format!("Unknown OCR provider: {}", name))?;
    }
    if let Some(numbering) = &cli.numbering {
        config.chunk_numbering = ChunkNumbering::from_str(numbering)
            .with_context(|| format!("Unknown chunk numbering: {}", numbering))?;
    }
    info!("Configuration: {:?}", config);

    match cli.command {
        Command::Parse {
            files,
            docs_dir,
            no_save,
            json,
        } => {
            if let Some(dir) = docs_dir {
                config.docs_dir = dir;
            }
            if no_save {
                config.save_markdown = false;
            }
            run_parse(&config, &files, json).await
        }
        Command::Chunk {
            markdown,
            source,
            doc_id,
            json,
        } => run_chunk(&config, markdown, source, doc_id, json),
        Command::Serve { bind } => {
            if let Some(addr) = bind {
                config.bind_addr = addr;
            }
            serve(config).await
        }
    }
}

fn build_parser(config: &AppConfig, kind: OcrProviderKind) -> anyhow::Result<Parser> {
    let provider = ocr::build_provider(kind, &config.ocr)?;
    let docs_dir = config.save_markdown.then(|| config.docs_dir.clone());
    let chunker = MarkdownChunker::new(config.chunk_numbering);
    Ok(Parser::new(provider, chunker).with_docs_dir(docs_dir))
}

async fn run_parse(config: &AppConfig, files: &[PathBuf], json: bool) -> anyhow::Result<()> {
    let parser = build_parser(config, config.provider)?;
    info!("Parsing {} file(s) with {}", files.len(), parser.provider_name());

    let parsed = parser.parse_files(files).await?;

    if json {
        let chunks: Vec<&Chunk> = parsed.iter().flat_map(|p| &p.chunks).collect();
        println!("{}", serde_json::to_string_pretty(&chunks)?);
        return Ok(());
    }

    for doc in &parsed {
        print_summary(doc);
    }
    Ok(())
}

fn run_chunk(
    config: &AppConfig,
    markdown: PathBuf,
    source: Option<PathBuf>,
    doc_id: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let mut doc = Document::open(source.as_deref().unwrap_or(markdown.as_path()))?;
    if let Some(id) = doc_id {
        doc = doc.with_doc_id(id);
    }
    doc.load_markdown(&markdown)?;

    let chunks = doc.chunk_text(&MarkdownChunker::new(config.chunk_numbering))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&chunks)?);
    } else {
        print_chunks(&doc.doc_id, &chunks);
    }
    Ok(())
}

fn print_summary(doc: &ParsedDocument) {
    println!(
        "{} ({}, {} pages, via {})",
        doc.doc_id,
        doc.format.as_str(),
        doc.total_pages.map(|p| p.to_string()).unwrap_or_else(|| "?".to_string()),
        doc.provider.as_deref().unwrap_or("-")
    );
    if let Some(path) = &doc.saved_to {
        println!("  markdown saved to {}", path.display());
    }
    print_chunks(&doc.doc_id, &doc.chunks);
}

fn print_chunks(doc_id: &str, chunks: &[Chunk]) {
    println!("  {} chunks for {}", chunks.len(), doc_id);
    for chunk in chunks {
        println!(
            "  {:<24} {:<52} {:>8} chars",
            chunk.chunk_id,
            chunk.section_title,
            chunk.content.chars().count()
        );
    }
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    let bind_addr = config.bind_addr.clone();
    let state = AppState {
        documents: DocumentStore::new(),
        chunker: MarkdownChunker::new(config.chunk_numbering),
        config: Arc::new(config),
    };

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Server listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/documents", get(list_documents).post(upload_document))
        .route("/documents/:id", get(get_document).delete(delete_document))
        .route("/documents/:id/chunks", get(get_chunks))
        .route("/documents/:id/markdown", get(get_markdown))
        .route("/chunk", post(chunk_markdown))
        .layer(DefaultBodyLimit::max(100 * 1024 * 1024)) // 100MB
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

async fn list_documents(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.documents.list())
}

#[derive(serde::Deserialize)]
struct UploadQuery {
    provider: Option<String>,
}

/// Upload a document, extract its Markdown and chunk it.
async fn upload_document(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    mut multipart: Multipart,
) -> Result<Json<ParsedDocument>, (StatusCode, String)> {
    let kind = match query.provider.as_deref() {
        Some(name) => OcrProviderKind::from_str(name).ok_or_else(|| {
            (StatusCode::BAD_REQUEST, format!("Unknown OCR provider: {}", name))
        })?,
        None => state.config.provider,
    };

    // Read the uploaded file
    let mut filename = String::new();
    let mut file_data = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Multipart error: {}", e)))?
    {
        if field.name() == Some("file") {
            filename = field.file_name().unwrap_or("document.pdf").to_string();
            file_data = field
                .bytes()
                .await
                .map_err(|e| (StatusCode::BAD_REQUEST, format!("Failed to read file: {}", e)))?
                .to_vec();
            break;
        }
    }

    if file_data.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "No file uploaded".to_string()));
    }

    info!(
        "Received file: {} ({} bytes) with provider: {}",
        filename,
        file_data.len(),
        kind.as_str()
    );

    let document = Document::from_bytes(&filename, file_data).map_err(parse_error_response)?;

    let provider = ocr::build_provider(kind, &state.config.ocr).map_err(|e| {
        error!("OCR provider unavailable: {:#}", e);
        (StatusCode::SERVICE_UNAVAILABLE, format!("OCR provider unavailable: {}", e))
    })?;
    let docs_dir = state
        .config
        .save_markdown
        .then(|| state.config.docs_dir.clone());
    let parser = Parser::new(provider, state.chunker.clone()).with_docs_dir(docs_dir);

    let parsed = parser.parse_document(document).await.map_err(|e| {
        error!("Parsing {} failed: {}", filename, e);
        parse_error_response(e)
    })?;

    if state.documents.insert(parsed.clone()).is_some() {
        info!("Replaced existing document: {}", parsed.doc_id);
    }

    info!("Ingestion complete: {} ({} chunks)", parsed.doc_id, parsed.chunks.len());
    Ok(Json(parsed))
}

async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ParsedDocument>, StatusCode> {
    state.documents.get(&id).map(Json).ok_or(StatusCode::NOT_FOUND)
}

async fn delete_document(State(state): State<AppState>, Path(id): Path<String>) -> StatusCode {
    if state.documents.remove(&id) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn get_chunks(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Chunk>>, StatusCode> {
    state.documents.chunks(&id).map(Json).ok_or(StatusCode::NOT_FOUND)
}

#[derive(serde::Deserialize)]
struct MarkdownQuery {
    offset: Option<usize>,
    limit: Option<usize>,
}

/// Get a document's combined Markdown with pagination.
async fn get_markdown(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<MarkdownQuery>,
) -> Result<Json<MarkdownPage>, StatusCode> {
    let offset = query.offset.unwrap_or(0);
    let limit = query.limit.unwrap_or(4000);

    state
        .documents
        .markdown(&id, offset, limit)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

#[derive(serde::Deserialize)]
struct ChunkRequest {
    doc_id: String,
    markdown: String,
    #[serde(default)]
    metadata: Metadata,
    #[serde(default)]
    numbering: Option<ChunkNumbering>,
}

/// Chunk Markdown supplied directly in the request body.
async fn chunk_markdown(
    State(state): State<AppState>,
    Json(req): Json<ChunkRequest>,
) -> Json<Vec<Chunk>> {
    let chunks = match req.numbering {
        Some(numbering) => {
            MarkdownChunker::new(numbering).chunk(&req.markdown, &req.doc_id, &req.metadata)
        }
        None => state.chunker.chunk(&req.markdown, &req.doc_id, &req.metadata),
    };
    Json(chunks)
}

fn parse_error_response(e: ParseError) -> (StatusCode, String) {
    let status = match &e {
        ParseError::UnsupportedFileType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        ParseError::InvalidUtf8(_) | ParseError::NotAFile(_) => StatusCode::BAD_REQUEST,
        ParseError::Ocr(_) => StatusCode::BAD_GATEWAY,
        ParseError::NotExtracted(_) | ParseError::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser as _;

    fn state() -> AppState {
        AppState {
            documents: DocumentStore::new(),
            config: Arc::new(AppConfig::default()),
            chunker: MarkdownChunker::default(),
        }
    }

    #[tokio::test]
    async fn test_chunk_endpoint() {
        let req: ChunkRequest = serde_json::from_value(serde_json::json!({
            "doc_id": "paper",
            "markdown": "\n\n# A\ntext\n# B\nmore",
            "metadata": {"source": "upload"},
            "numbering": "positional"
        }))
        .unwrap();

        let Json(chunks) = chunk_markdown(State(state()), Json(req)).await;
        let ids: Vec<_> = chunks.iter().map(|c| c.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["paper-1", "paper-2"]);
        assert_eq!(chunks[0].metadata["source"], "upload");
    }

    #[tokio::test]
    async fn test_chunk_endpoint_defaults() {
        let req: ChunkRequest = serde_json::from_value(serde_json::json!({
            "doc_id": "d",
            "markdown": "plain text"
        }))
        .unwrap();

        let Json(chunks) = chunk_markdown(State(state()), Json(req)).await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_id, "d-0");
        assert!(chunks[0].metadata.is_empty());
    }

    #[tokio::test]
    async fn test_missing_document_is_not_found() {
        let result = get_chunks(State(state()), Path("nope".to_string())).await;
        assert_eq!(result.unwrap_err(), StatusCode::NOT_FOUND);
        assert_eq!(
            delete_document(State(state()), Path("nope".to_string())).await,
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_parse_error_status() {
        let (status, _) = parse_error_response(ParseError::UnsupportedFileType("docx".into()));
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
        let (status, body) = parse_error_response(ParseError::Ocr(anyhow::anyhow!("timeout")));
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body.contains("timeout"));
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from([
            "pdf-ingest",
            "--provider",
            "local",
            "parse",
            "a.pdf",
            "--no-save",
        ])
        .unwrap();
        assert_eq!(cli.provider.as_deref(), Some("local"));
        assert!(matches!(cli.command, Command::Parse { no_save: true, .. }));

        assert!(Cli::try_parse_from(["pdf-ingest", "parse"]).is_err());
    }
}
