pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod fingerprint;
pub mod ingest;
pub mod models;
pub mod orchestrator;
pub mod preprocess;
pub mod search;
pub mod store;
pub mod traits;
pub mod vector;

pub use chunking::{split_into_chunks, ChunkingConfig, DEFAULT_CHUNK_SIZE};
pub use config::{EmbeddingConfig, IndexConfig};
pub use embeddings::{EmbeddingClient, HttpEmbeddingService, RetryPolicy};
pub use error::{ConfigError, EmbedError, IndexError};
pub use extractor::{extract_text, FileTextExtractor, LopdfExtractor, PageText, PdfExtractor, TextExtractor};
pub use fingerprint::metadata_fingerprint;
pub use ingest::{describe_file, walk_files, FileWalker, SeenFiles};
pub use models::{
    human_readable_size, ChunkRecord, FailedFile, FileDescriptor, FileKind, FileOutcome,
    IndexReport, SearchHit,
};
pub use orchestrator::Indexer;
pub use preprocess::Preprocessor;
pub use search::rank_top_k;
pub use store::{ChunkStore, StoredVector};
pub use traits::EmbeddingService;
pub use vector::normalize;
