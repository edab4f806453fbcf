//! Document fingerprints used purely for change detection.

use std::path::Path;

use sha2::{Digest, Sha256};

use schemacat_shared::{Result, SchemacatError};

/// Compute the lowercase hex SHA-256 digest of `bytes`.
pub fn digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Read the file at `path` and digest its raw bytes.
pub fn digest_file(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|e| SchemacatError::io(path, e))?;
    Ok(digest(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_sha256_hex() {
        let hash = digest(b"hello world");
        assert_eq!(hash.len(), 64);
        assert_eq!(
            hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn single_byte_change_alters_digest() {
        assert_ne!(digest(b"<td>id</td>"), digest(b"<td>Id</td>"));
        assert_eq!(digest(b"same"), digest(b"same"));
    }

    #[test]
    fn digest_file_missing_is_io_error() {
        let path = std::env::temp_dir().join(format!("sc-missing-{}.html", uuid::Uuid::now_v7()));
        let err = digest_file(&path).unwrap_err();
        assert!(matches!(err, SchemacatError::Io { .. }));
    }

    #[test]
    fn digest_file_matches_bytes() {
        let path = std::env::temp_dir().join(format!("sc-digest-{}.html", uuid::Uuid::now_v7()));
        std::fs::write(&path, b"<html></html>").unwrap();
        assert_eq!(digest_file(&path).unwrap(), digest(b"<html></html>"));
        let _ = std::fs::remove_file(&path);
    }
}
