//! Encoding detection and UTF-8 normalization.

use std::path::{Path, PathBuf};

use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_8};
use tracing::{debug, info, instrument, warn};

use schemacat_shared::{Result, SchemacatError};

/// Best-effort guess of a document's byte encoding.
#[derive(Debug, Clone, Copy)]
pub struct Detection {
    /// Detected encoding. UTF-8 when nothing better could be decided.
    pub encoding: &'static Encoding,
    /// `false` when the sniffer was unsure and UTF-8 was assumed.
    pub confident: bool,
}

impl Detection {
    /// Whether the document is (or is assumed to be) UTF-8 already.
    pub fn is_utf8(&self) -> bool {
        self.encoding == UTF_8
    }

    /// WHATWG name of the detected encoding, e.g. `GBK`.
    pub fn name(&self) -> &'static str {
        self.encoding.name()
    }
}

/// Outcome of [`normalize`].
#[derive(Debug, Clone)]
pub struct Normalized {
    /// The document was rewritten as UTF-8.
    pub converted: bool,
    /// Encoding the document was decoded from.
    pub encoding: &'static Encoding,
    /// Where the original bytes were copied, when converted.
    pub backup: Option<PathBuf>,
    /// Malformed byte sequences were replaced with U+FFFD while decoding.
    pub had_replacements: bool,
    /// Decoded document text (BOM removed).
    pub text: String,
}

/// Detect the encoding of `bytes`.
///
/// A byte-order mark wins outright; bytes that validate as UTF-8 (including
/// plain ASCII) are UTF-8. Anything else goes to `chardetng`, whose guess is
/// kept when it reports confidence, even if some bytes will not decode. A
/// low-confidence guess falls back to UTF-8.
pub fn detect_encoding(bytes: &[u8]) -> Detection {
    if let Some((encoding, _bom_len)) = Encoding::for_bom(bytes) {
        return Detection {
            encoding,
            confident: true,
        };
    }

    if std::str::from_utf8(bytes).is_ok() {
        return Detection {
            encoding: UTF_8,
            confident: true,
        };
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let (guess, confident) = detector.guess_assess(None, false);

    if !confident {
        debug!(guess = guess.name(), "low-confidence encoding guess, assuming UTF-8");
        return Detection {
            encoding: UTF_8,
            confident: false,
        };
    }

    Detection {
        encoding: guess,
        confident: true,
    }
}

/// Backup location for the original bytes of `path` decoded as `encoding`.
///
/// The file name records the original encoding: `users.html` → `<dir>/users.html.GBK`.
pub fn backup_path_for(path: &Path, backup_dir: &Path, encoding: &'static Encoding) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    backup_dir.join(format!("{file_name}.{}", encoding.name()))
}

/// Ensure the document at `path` is stored as UTF-8.
///
/// Already-UTF-8 documents are left untouched unless `force` is set. Otherwise
/// the original bytes are copied into `backup_dir` and the document is
/// rewritten (temp file + rename) with its UTF-8 text.
#[instrument(skip_all, fields(path = %path.display(), force))]
pub fn normalize(path: &Path, backup_dir: &Path, force: bool) -> Result<Normalized> {
    let bytes = std::fs::read(path).map_err(|e| SchemacatError::io(path, e))?;
    let detection = detect_encoding(&bytes);
    let (text, _, had_replacements) = detection.encoding.decode(&bytes);

    if detection.is_utf8() && !force {
        if had_replacements {
            warn!("document is not valid UTF-8; undecodable bytes replaced");
        }
        return Ok(Normalized {
            converted: false,
            encoding: detection.encoding,
            backup: None,
            had_replacements,
            text: text.into_owned(),
        });
    }

    info!(from = detection.name(), confident = detection.confident, "converting to UTF-8");
    if had_replacements {
        warn!(encoding = detection.name(), "undecodable byte sequences replaced");
    }

    std::fs::create_dir_all(backup_dir).map_err(|e| SchemacatError::io(backup_dir, e))?;
    let backup = backup_path_for(path, backup_dir, detection.encoding);
    std::fs::write(&backup, &bytes).map_err(|e| SchemacatError::io(&backup, e))?;
    debug!(backup = %backup.display(), "original bytes backed up");

    let text = text.into_owned();
    write_replacing(path, text.as_bytes())?;

    Ok(Normalized {
        converted: true,
        encoding: detection.encoding,
        backup: Some(backup),
        had_replacements,
        text,
    })
}

/// Overwrite `path` via a sibling temp file and rename.
fn write_replacing(path: &Path, contents: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| SchemacatError::Encoding(format!("not a file path: {}", path.display())))?;
    let temp = path.with_file_name(format!(".{file_name}.tmp"));

    std::fs::write(&temp, contents).map_err(|e| SchemacatError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| SchemacatError::io(path, e))?;
    Ok(())
}
