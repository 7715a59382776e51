use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// Hex SHA-256 over the file's name and stat data.
///
/// File content is never read, so this is the only change signal: an edit
/// that keeps both size and modification time is not detected.
pub fn metadata_fingerprint(
    name: &str,
    created_at: DateTime<Utc>,
    modified_at: DateTime<Utc>,
    size: u64,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update([0u8]);
    for at in [created_at, modified_at] {
        hasher.update(at.timestamp().to_le_bytes());
        hasher.update(at.timestamp_subsec_nanos().to_le_bytes());
    }
    hasher.update(size.to_le_bytes());
    format!("{:x}", hasher.finalize())
}
