use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Extensions whose bytes are read directly as UTF-8 text.
const PLAIN_TEXT_EXTENSIONS: [&str; 16] = [
    "txt", "md", "markdown", "csv", "tsv", "json", "yaml", "yml", "toml", "xml", "html", "htm",
    "log", "rst", "ini", "tex",
];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum FileKind {
    Pdf,
    PlainText,
    Unsupported,
}

impl FileKind {
    pub fn from_extension(extension: &str) -> Self {
        let lowered = extension.trim_start_matches('.').to_ascii_lowercase();
        if lowered == "pdf" {
            FileKind::Pdf
        } else if PLAIN_TEXT_EXTENSIONS.contains(&lowered.as_str()) {
            FileKind::PlainText
        } else {
            FileKind::Unsupported
        }
    }
}

/// Live stat data for one file, recomputed on every pass.
///
/// `name` is the bare file name and is the store key: two files with the same
/// name under different directories share one set of rows, and the last one
/// indexed wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    pub path: PathBuf,
    pub name: String,
    pub file_type: String,
    pub kind: FileKind,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub size: u64,
    pub fingerprint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkRecord {
    pub file_name: String,
    pub file_type: String,
    pub created_at: String,
    pub modified_at: String,
    pub size: String,
    pub fingerprint: String,
    pub chunk_index: u32,
    pub embedding: Vec<f32>,
    pub content: String,
}

impl ChunkRecord {
    pub fn new(descriptor: &FileDescriptor, chunk_index: u32, content: String, embedding: Vec<f32>) -> Self {
        Self {
            file_name: descriptor.name.clone(),
            file_type: descriptor.file_type.clone(),
            created_at: descriptor.created_at.to_rfc3339(),
            modified_at: descriptor.modified_at.to_rfc3339(),
            size: human_readable_size(descriptor.size),
            fingerprint: descriptor.fingerprint.clone(),
            chunk_index,
            embedding,
            content,
        }
    }

    /// Row stored for files with no text, so they are tracked and not retried.
    pub fn placeholder(descriptor: &FileDescriptor) -> Self {
        Self::new(descriptor, 0, String::new(), Vec::new())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub file_name: String,
    pub chunk_index: u32,
    pub score: f32,
    pub content: String,
}

/// How a single file left the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    Unchanged,
    Indexed { chunks: usize },
    Tracked,
}

#[derive(Debug, Clone)]
pub struct FailedFile {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct IndexReport {
    pub run_id: Uuid,
    pub files_seen: usize,
    pub indexed: usize,
    pub chunks_written: usize,
    pub unchanged: usize,
    pub tracked_unsupported: usize,
    pub failed: Vec<FailedFile>,
    pub walk_errors: usize,
    pub pruned: usize,
}

impl IndexReport {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            files_seen: 0,
            indexed: 0,
            chunks_written: 0,
            unchanged: 0,
            tracked_unsupported: 0,
            failed: Vec::new(),
            walk_errors: 0,
            pruned: 0,
        }
    }

    pub fn record(&mut self, outcome: FileOutcome) {
        match outcome {
            FileOutcome::Unchanged => self.unchanged += 1,
            FileOutcome::Indexed { chunks } => {
                self.indexed += 1;
                self.chunks_written += chunks;
            }
            FileOutcome::Tracked => self.tracked_unsupported += 1,
        }
    }
}

pub fn human_readable_size(bytes: u64) -> String {
    const UNITS: [&str; 3] = ["KB", "MB", "GB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }

    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}
