//! Error kinds surfaced by the reader, indexer and explorer.
//!
//! Per-block and per-page variants ([`StreamError::Block`],
//! [`StreamError::Parse`], [`StreamError::MalformedEntry`]) are recovered
//! locally by the scanning code. [`StreamError::NotFound`] and
//! [`StreamError::Io`] are fatal for the call that produced them.
//! Reading past the end of an index is never an error: callers get a short
//! result or [`crate::models::Lookup::EndOfRange`].

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamError {
    /// A bzip2 stream could not be decompressed (corrupt or truncated).
    #[error("block at offset {offset} failed to decompress: {reason}")]
    Block { offset: u64, reason: String },

    /// A decompressed block is not well-formed XML once wrapped in a root element.
    #[error("block XML is malformed at byte {position}: {reason}")]
    Parse { position: usize, reason: String },

    /// A page lacks a parsable integer id.
    #[error("page has no parsable id: {0:?}")]
    MalformedEntry(String),

    /// The requested title is absent from the title index.
    #[error("title not found in index: {0}")]
    NotFound(String),

    #[error("{path}: I/O error: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StreamError {
    pub fn io(path: &Path, source: io::Error) -> Self {
        StreamError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, StreamError>;
