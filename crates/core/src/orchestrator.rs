use crate::chunking::{split_into_chunks, ChunkingConfig};
use crate::config::IndexConfig;
use crate::embeddings::{EmbeddingClient, HttpEmbeddingService};
use crate::error::IndexError;
use crate::extractor::{FileTextExtractor, TextExtractor};
use crate::ingest::{describe_file, FileWalker, SeenFiles};
use crate::models::{ChunkRecord, FailedFile, FileDescriptor, FileOutcome, IndexReport, SearchHit};
use crate::preprocess::Preprocessor;
use crate::store::ChunkStore;
use crate::traits::EmbeddingService;
use crate::vector::normalize;
use std::path::Path;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Drives the write pipeline one file at a time:
/// fingerprint check, extraction, preprocessing, chunking, embedding,
/// normalization and a single replacing write per file.
///
/// A file's rows are written only after every one of its chunks has a
/// normalized embedding, so a failure leaves whatever was stored before.
pub struct Indexer<S, X = FileTextExtractor>
where
    S: EmbeddingService,
    X: TextExtractor,
{
    config: IndexConfig,
    store: ChunkStore,
    client: EmbeddingClient<S>,
    extractor: X,
    preprocessor: Preprocessor,
}

impl Indexer<HttpEmbeddingService> {
    /// Opens the configured database and HTTP embedding service.
    pub fn from_config(config: IndexConfig) -> Result<Self, IndexError> {
        let store = ChunkStore::open(&config.database_path)?;
        let service = HttpEmbeddingService::from_config(&config.embedding)?;
        Self::new(config, store, service)
    }
}

impl<S: EmbeddingService> Indexer<S> {
    pub fn new(config: IndexConfig, store: ChunkStore, service: S) -> Result<Self, IndexError> {
        Self::with_extractor(config, store, service, FileTextExtractor::default())
    }
}

impl<S, X> Indexer<S, X>
where
    S: EmbeddingService,
    X: TextExtractor,
{
    pub fn with_extractor(
        config: IndexConfig,
        store: ChunkStore,
        service: S,
        extractor: X,
    ) -> Result<Self, IndexError> {
        let client = EmbeddingClient::new(service, config.embedding.retry_policy())
            .with_max_concurrent_requests(config.embedding.max_concurrent_requests);
        Ok(Self {
            config,
            store,
            client,
            extractor,
            preprocessor: Preprocessor::new()?,
        })
    }

    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    pub fn into_store(self) -> ChunkStore {
        self.store
    }

    /// Indexes every configured root. Individual failures are logged and
    /// collected in the report; nothing here aborts the run.
    pub async fn run(&mut self) -> IndexReport {
        let run_id = Uuid::new_v4();
        let span = info_span!("index_run", run_id = %run_id);
        self.run_inner(run_id).instrument(span).await
    }

    async fn run_inner(&mut self, run_id: Uuid) -> IndexReport {
        let mut report = IndexReport::new(run_id);
        let mut seen = SeenFiles::default();
        let mut all_roots_walked = true;

        info!(
            roots = self.config.directories.len(),
            model = self.client.service().model_name(),
            "index run started"
        );

        for root in self.config.directories.clone() {
            if !root.is_dir() {
                warn!(root = %root.display(), "root is not a readable directory, skipping");
                all_roots_walked = false;
                continue;
            }
            self.index_root(&root, &mut report, &mut seen).await;
        }

        if self.config.prune_missing {
            if all_roots_walked && report.walk_errors == 0 {
                match self.prune_missing(&seen) {
                    Ok(pruned) => report.pruned = pruned,
                    Err(error) => error!(%error, "pruning missing files failed"),
                }
            } else {
                warn!(
                    walk_errors = report.walk_errors,
                    "not pruning: at least one root or subtree could not be walked"
                );
            }
        }

        info!(
            files_seen = report.files_seen,
            indexed = report.indexed,
            chunks = report.chunks_written,
            unchanged = report.unchanged,
            tracked = report.tracked_unsupported,
            failed = report.failed.len(),
            walk_errors = report.walk_errors,
            pruned = report.pruned,
            "index run finished"
        );
        report
    }

    async fn index_root(&mut self, root: &Path, report: &mut IndexReport, seen: &mut SeenFiles) {
        info!(root = %root.display(), "walking root");
        let before = report.files_seen;
        let extensions = self.config.extensions.clone();
        let mut walker = FileWalker::new(root, &extensions, self.config.follow_symlinks);

        for path in walker.by_ref() {
            report.files_seen += 1;

            if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
                if let Some(previous) = seen.register(name, &path) {
                    warn!(
                        file = name,
                        previous = %previous.display(),
                        current = %path.display(),
                        "file name already indexed from another path; rows will be overwritten"
                    );
                }
            }

            match self.index_file(&path).await {
                Ok(outcome) => report.record(outcome),
                Err(error) => {
                    error!(file = %path.display(), %error, "file failed this pass");
                    report.failed.push(FailedFile {
                        path,
                        reason: error.to_string(),
                    });
                }
            }
        }

        report.walk_errors += walker.errors();
        info!(
            root = %root.display(),
            files = report.files_seen - before,
            walk_errors = walker.errors(),
            "root done"
        );
    }

    /// Runs the full pipeline for one file.
    pub async fn index_file(&mut self, path: &Path) -> Result<FileOutcome, IndexError> {
        let descriptor = describe_file(path)?;

        let stored = self.store.stored_fingerprint(&descriptor.name)?;
        if stored.as_deref() == Some(descriptor.fingerprint.as_str()) {
            debug!(file = %descriptor.name, "fingerprint unchanged, skipping");
            return Ok(FileOutcome::Unchanged);
        }

        let Some(raw_text) = self.extractor.extract(path, descriptor.kind)? else {
            return self.track_without_text(&descriptor);
        };

        let prepared = self.preprocessor.preprocess(&descriptor.name, &raw_text);
        let chunks = split_into_chunks(
            &prepared,
            ChunkingConfig {
                max_chars: self.config.chunk_size,
            },
        )?;
        if chunks.is_empty() {
            return self.track_without_text(&descriptor);
        }

        let raw_vectors = self.client.embed_all(&chunks).await?;
        let vectors = raw_vectors
            .iter()
            .map(|vector| normalize(vector))
            .collect::<Result<Vec<_>, _>>()?;

        let records = chunks
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(index, (content, embedding))| {
                ChunkRecord::new(&descriptor, index as u32, content, embedding)
            })
            .collect::<Vec<_>>();

        let written = self.store.replace_file_chunks(&descriptor.name, &records)?;
        info!(file = %descriptor.name, chunks = written, "indexed");
        Ok(FileOutcome::Indexed { chunks: written })
    }

    fn track_without_text(&mut self, descriptor: &FileDescriptor) -> Result<FileOutcome, IndexError> {
        self.store
            .replace_file_chunks(&descriptor.name, &[ChunkRecord::placeholder(descriptor)])?;
        info!(file = %descriptor.name, file_type = %descriptor.file_type, "tracked without text");
        Ok(FileOutcome::Tracked)
    }

    fn prune_missing(&mut self, seen: &SeenFiles) -> Result<usize, IndexError> {
        let mut pruned = 0;
        for name in self.store.file_names()? {
            if !seen.contains(&name) {
                let rows = self.store.remove_file(&name)?;
                info!(file = %name, rows, "pruned file no longer on disk");
                pruned += 1;
            }
        }
        Ok(pruned)
    }

    /// Embeds free text the way chunks are embedded and returns a unit vector.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>, IndexError> {
        let prepared = self.preprocessor.preprocess("", text);
        if prepared.is_empty() {
            return Err(IndexError::InvalidArgument(
                "query has no searchable terms".to_string(),
            ));
        }
        let raw = self.client.embed(&prepared).await?;
        Ok(normalize(&raw)?)
    }

    pub async fn search(&self, text: &str, top_k: usize) -> Result<Vec<SearchHit>, IndexError> {
        let query = self.embed_query(text).await?;
        self.store.search_similar(&query, top_k)
    }
}
