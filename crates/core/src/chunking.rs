use crate::error::IndexError;

pub const DEFAULT_CHUNK_SIZE: usize = 1_000;

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub max_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Splits `text` into consecutive pieces of at most `max_chars` characters.
///
/// Concatenating the result yields `text` exactly; a chunk's position in the
/// returned vector is its stored chunk index. Boundaries fall on `char`
/// boundaries, never inside a UTF-8 sequence.
pub fn split_into_chunks(text: &str, config: ChunkingConfig) -> Result<Vec<String>, IndexError> {
    if config.max_chars == 0 {
        return Err(IndexError::InvalidChunkConfig(
            "max_chars must be greater than zero".to_string(),
        ));
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0usize;

    for ch in text.chars() {
        if current_chars == config.max_chars {
            chunks.push(std::mem::take(&mut current));
            current_chars = 0;
        }
        current.push(ch);
        current_chars += 1;
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    Ok(chunks)
}
