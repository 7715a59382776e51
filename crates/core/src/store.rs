//! SQLite persistence for chunk records.
//!
//! One table keyed by `(file_name, chunk_index)`. Embeddings and chunk text
//! are stored as text columns, embeddings as a JSON array.

use crate::error::IndexError;
use crate::models::ChunkRecord;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use tracing::debug;

const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS chunks (
    file_name TEXT NOT NULL,
    file_type TEXT NOT NULL,
    created_at TEXT NOT NULL,
    modified_at TEXT NOT NULL,
    size TEXT NOT NULL,
    fingerprint TEXT NOT NULL,
    chunk_index INTEGER NOT NULL,
    embedding TEXT NOT NULL,
    content TEXT NOT NULL,
    PRIMARY KEY (file_name, chunk_index)
);
"#;

const SELECT_RECORD: &str = "SELECT file_name, file_type, created_at, modified_at, size,
        fingerprint, chunk_index, embedding, content
 FROM chunks";

/// A stored vector with the key it belongs to, in stored order.
#[derive(Debug, Clone)]
pub struct StoredVector {
    pub file_name: String,
    pub chunk_index: u32,
    pub embedding: Vec<f32>,
    pub content: String,
}

pub struct ChunkStore {
    conn: Connection,
}

impl ChunkStore {
    pub fn open(path: &Path) -> Result<Self, IndexError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let store = Self {
            conn: Connection::open(path)?,
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, IndexError> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create-if-absent; safe to call any number of times.
    pub fn init_schema(&self) -> Result<(), IndexError> {
        self.conn.execute_batch(CREATE_TABLES)?;
        Ok(())
    }

    /// Row-level insert-or-replace on `(file_name, chunk_index)`.
    pub fn upsert_chunk(&self, record: &ChunkRecord) -> Result<(), IndexError> {
        upsert(&self.conn, record)
    }

    /// Replaces the complete chunk set of one file in a single transaction.
    ///
    /// Rows of the file whose index is not in `records` are deleted, so the
    /// stored set always matches the latest content.
    pub fn replace_file_chunks(
        &mut self,
        file_name: &str,
        records: &[ChunkRecord],
    ) -> Result<usize, IndexError> {
        if records.is_empty() {
            return Err(IndexError::InvalidArgument(format!(
                "refusing to store an empty chunk set for {file_name}"
            )));
        }
        if let Some(stray) = records.iter().find(|record| record.file_name != file_name) {
            return Err(IndexError::InvalidArgument(format!(
                "chunk for {} passed while replacing {file_name}",
                stray.file_name
            )));
        }
        let fingerprint = &records[0].fingerprint;
        if records.iter().any(|record| &record.fingerprint != fingerprint) {
            return Err(IndexError::InvalidArgument(format!(
                "mixed fingerprints in chunk set for {file_name}"
            )));
        }

        let tx = self.conn.transaction()?;
        let removed = tx.execute("DELETE FROM chunks WHERE file_name = ?1", params![file_name])?;
        for record in records {
            upsert(&tx, record)?;
        }
        tx.commit()?;

        debug!(file = file_name, removed, written = records.len(), "replaced chunk set");
        Ok(records.len())
    }

    /// Fingerprint shared by all rows of `file_name`.
    ///
    /// `None` when the file has no rows, or when its rows disagree, which is
    /// treated as stale.
    pub fn stored_fingerprint(&self, file_name: &str) -> Result<Option<String>, IndexError> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT fingerprint FROM chunks WHERE file_name = ?1 LIMIT 2")?;
        let fingerprints = stmt
            .query_map(params![file_name], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        match fingerprints.as_slice() {
            [only] => Ok(Some(only.clone())),
            _ => Ok(None),
        }
    }

    pub fn chunks_for_file(&self, file_name: &str) -> Result<Vec<ChunkRecord>, IndexError> {
        let mut stmt = self.conn.prepare(&format!(
            "{SELECT_RECORD} WHERE file_name = ?1 ORDER BY chunk_index"
        ))?;
        let records = stmt
            .query_map(params![file_name], record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    pub fn file_names(&self) -> Result<Vec<String>, IndexError> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT file_name FROM chunks ORDER BY file_name")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    pub fn count_chunks(&self) -> Result<usize, IndexError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn remove_file(&self, file_name: &str) -> Result<usize, IndexError> {
        Ok(self
            .conn
            .execute("DELETE FROM chunks WHERE file_name = ?1", params![file_name])?)
    }

    pub fn chunk(&self, file_name: &str, chunk_index: u32) -> Result<Option<ChunkRecord>, IndexError> {
        Ok(self
            .conn
            .query_row(
                &format!("{SELECT_RECORD} WHERE file_name = ?1 AND chunk_index = ?2"),
                params![file_name, chunk_index],
                record_from_row,
            )
            .optional()?)
    }

    /// Every stored vector, in insertion order.
    pub fn stored_vectors(&self) -> Result<Vec<StoredVector>, IndexError> {
        let mut stmt = self.conn.prepare(
            "SELECT file_name, chunk_index, embedding, content FROM chunks ORDER BY rowid",
        )?;
        let vectors = stmt
            .query_map([], |row| {
                Ok(StoredVector {
                    file_name: row.get(0)?,
                    chunk_index: row.get(1)?,
                    embedding: embedding_from_column(row, 2)?,
                    content: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(vectors)
    }
}

fn upsert(conn: &Connection, record: &ChunkRecord) -> Result<(), IndexError> {
    let embedding = serde_json::to_string(&record.embedding)?;
    conn.execute(
        "INSERT OR REPLACE INTO chunks
            (file_name, file_type, created_at, modified_at, size, fingerprint,
             chunk_index, embedding, content)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            record.file_name,
            record.file_type,
            record.created_at,
            record.modified_at,
            record.size,
            record.fingerprint,
            record.chunk_index,
            embedding,
            record.content,
        ],
    )?;
    Ok(())
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<ChunkRecord> {
    Ok(ChunkRecord {
        file_name: row.get(0)?,
        file_type: row.get(1)?,
        created_at: row.get(2)?,
        modified_at: row.get(3)?,
        size: row.get(4)?,
        fingerprint: row.get(5)?,
        chunk_index: row.get(6)?,
        embedding: embedding_from_column(row, 7)?,
        content: row.get(8)?,
    })
}

fn embedding_from_column(row: &Row<'_>, column: usize) -> rusqlite::Result<Vec<f32>> {
    let raw: String = row.get(column)?;
    serde_json::from_str(&raw)
        .map_err(|error| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(error)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(file_name: &str, fingerprint: &str, chunk_index: u32, embedding: Vec<f32>) -> ChunkRecord {
        ChunkRecord {
            file_name: file_name.to_string(),
            file_type: "txt".to_string(),
            created_at: "2024-01-01T00:00:00+00:00".to_string(),
            modified_at: "2024-01-02T00:00:00+00:00".to_string(),
            size: "2.44 KB".to_string(),
            fingerprint: fingerprint.to_string(),
            chunk_index,
            embedding,
            content: format!("{file_name} chunk {chunk_index}"),
        }
    }

    #[test]
    fn schema_init_is_idempotent() -> Result<(), IndexError> {
        let store = ChunkStore::open_in_memory()?;
        store.init_schema()?;
        store.init_schema()?;
        assert_eq!(store.count_chunks()?, 0);
        Ok(())
    }

    #[test]
    fn upsert_replaces_on_same_key() -> Result<(), IndexError> {
        let store = ChunkStore::open_in_memory()?;
        store.upsert_chunk(&record("a.txt", "f1", 0, vec![1.0, 0.0]))?;
        store.upsert_chunk(&record("a.txt", "f2", 0, vec![0.0, 1.0]))?;

        assert_eq!(store.count_chunks()?, 1);
        let stored = store.chunk("a.txt", 0)?.expect("row exists");
        assert_eq!(stored.fingerprint, "f2");
        assert_eq!(stored.embedding, vec![0.0, 1.0]);
        Ok(())
    }

    #[test]
    fn replacing_a_shrunk_file_leaves_no_orphans() -> Result<(), IndexError> {
        let mut store = ChunkStore::open_in_memory()?;
        let old = (0..3).map(|i| record("a.txt", "old", i, vec![1.0])).collect::<Vec<_>>();
        store.replace_file_chunks("a.txt", &old)?;

        let new = vec![record("a.txt", "new", 0, vec![0.5])];
        store.replace_file_chunks("a.txt", &new)?;

        let chunks = store.chunks_for_file("a.txt")?;
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].fingerprint, "new");
        assert_eq!(store.stored_fingerprint("a.txt")?.as_deref(), Some("new"));
        Ok(())
    }

    #[test]
    fn replace_rejects_foreign_or_mixed_records() -> Result<(), IndexError> {
        let mut store = ChunkStore::open_in_memory()?;

        let foreign = vec![record("b.txt", "f", 0, vec![1.0])];
        assert!(store.replace_file_chunks("a.txt", &foreign).is_err());

        let mixed = vec![record("a.txt", "f1", 0, vec![1.0]), record("a.txt", "f2", 1, vec![1.0])];
        assert!(store.replace_file_chunks("a.txt", &mixed).is_err());

        assert!(store.replace_file_chunks("a.txt", &[]).is_err());
        assert_eq!(store.count_chunks()?, 0);
        Ok(())
    }

    #[test]
    fn inconsistent_rows_report_no_fingerprint() -> Result<(), IndexError> {
        let store = ChunkStore::open_in_memory()?;
        assert_eq!(store.stored_fingerprint("a.txt")?, None);

        store.upsert_chunk(&record("a.txt", "f1", 0, vec![1.0]))?;
        store.upsert_chunk(&record("a.txt", "f2", 1, vec![1.0]))?;
        assert_eq!(store.stored_fingerprint("a.txt")?, None);
        Ok(())
    }

    #[test]
    fn listing_and_removal() -> Result<(), IndexError> {
        let mut store = ChunkStore::open_in_memory()?;
        store.replace_file_chunks("b.txt", &[record("b.txt", "f", 0, vec![1.0])])?;
        store.replace_file_chunks(
            "a.txt",
            &[record("a.txt", "f", 0, vec![1.0]), record("a.txt", "f", 1, vec![1.0])],
        )?;

        assert_eq!(store.file_names()?, vec!["a.txt".to_string(), "b.txt".to_string()]);
        assert_eq!(store.remove_file("a.txt")?, 2);
        assert_eq!(store.count_chunks()?, 1);
        Ok(())
    }

    #[test]
    fn stored_vectors_follow_insertion_order() -> Result<(), IndexError> {
        let mut store = ChunkStore::open_in_memory()?;
        store.replace_file_chunks("z.txt", &[record("z.txt", "f", 0, vec![1.0, 0.0])])?;
        store.replace_file_chunks("a.txt", &[record("a.txt", "f", 0, vec![0.0, 1.0])])?;

        let vectors = store.stored_vectors()?;
        let names: Vec<&str> = vectors.iter().map(|v| v.file_name.as_str()).collect();
        assert_eq!(names, vec!["z.txt", "a.txt"]);
        assert_eq!(vectors[1].embedding, vec![0.0, 1.0]);
        Ok(())
    }

    #[test]
    fn on_disk_store_survives_reopen() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested").join("index.sqlite");
        {
            let mut store = ChunkStore::open(&path)?;
            store.replace_file_chunks("a.txt", &[record("a.txt", "f", 0, vec![1.0])])?;
        }

        let reopened = ChunkStore::open(&path)?;
        assert_eq!(reopened.stored_fingerprint("a.txt")?.as_deref(), Some("f"));
        Ok(())
    }
}
