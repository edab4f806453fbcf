//! Content digests and text-encoding normalization for source documents.
//!
//! This crate provides:
//! - [`digest`] / [`digest_file`]: SHA-256 change-detection fingerprints
//! - [`detect_encoding`]: BOM, UTF-8 validation, then statistical sniffing
//! - [`normalize`]: rewrite a document as UTF-8, backing up the original bytes

mod detect;
mod hash;

pub use detect::{Detection, Normalized, backup_path_for, detect_encoding, normalize};
pub use hash::{digest, digest_file};
