//! Byte-exact access to the independently compressed bzip2 streams of a
//! multistream archive.
//!
//! A multistream dump is a plain concatenation of bzip2 streams with no
//! framing of its own. [`decompress_block`] feeds fixed-size chunks to a
//! streaming decompressor until the stream ends and reports exactly how many
//! archive bytes belonged to it, so the next stream starts at
//! `offset + consumed` even when the last chunk over-read into it.

use crate::config::{CHUNK_SIZE, OUTPUT_BUFFER_SIZE};
use crate::error::{Result, StreamError};
use bzip2::{Decompress, Status};
use memchr::memmem;
use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::trace;

/// `BZh` followed by the block size digit.
const STREAM_MAGIC: &[u8] = b"BZh";
/// First compressed block header of a non-empty stream.
const BLOCK_MAGIC: [u8; 6] = [0x31, 0x41, 0x59, 0x26, 0x53, 0x59];
/// End-of-stream marker, directly after the header for an empty stream.
const EOS_MAGIC: [u8; 6] = [0x17, 0x72, 0x45, 0x38, 0x50, 0x90];
const STREAM_HEADER_LEN: usize = 10;

/// The decompressed contents of one stream plus the archive bytes it occupied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecompressedBlock {
    pub offset: u64,
    pub data: Vec<u8>,
    pub consumed: u64,
}

impl DecompressedBlock {
    pub fn next_offset(&self) -> u64 {
        self.offset + self.consumed
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockOutcome {
    Block(DecompressedBlock),
    /// Nothing left to read at the requested offset.
    EndOfArchive,
}

/// Anything that can hand out whole decompressed streams by archive offset.
pub trait BlockSource {
    fn read_block(&self, offset: u64) -> Result<BlockOutcome>;
}

/// A multistream bzip2 archive on disk. The file is opened per call.
#[derive(Debug, Clone)]
pub struct Bz2Archive {
    path: PathBuf,
    chunk_size: usize,
}

impl Bz2Archive {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            chunk_size: CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_at(&self, offset: u64) -> Result<File> {
        let mut file = File::open(&self.path).map_err(|e| StreamError::io(&self.path, e))?;
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| StreamError::io(&self.path, e))?;
        Ok(file)
    }

    /// Offset of the first stream header at or after `from`, if any.
    ///
    /// Used to resynchronize after a corrupt stream: a header is `BZh`, a
    /// level digit, then either a block magic or the end-of-stream magic.
    pub fn find_next_stream(&self, from: u64) -> Result<Option<u64>> {
        let mut file = self.open_at(from)?;
        let finder = memmem::Finder::new(STREAM_MAGIC);
        let mut chunk = vec![0u8; self.chunk_size.max(STREAM_HEADER_LEN)];
        let mut window: Vec<u8> = Vec::new();
        let mut window_start = from;

        loop {
            let n = read_some(&mut file, &mut chunk).map_err(|e| StreamError::io(&self.path, e))?;
            let eof = n == 0;
            window.extend_from_slice(&chunk[..n]);

            for at in finder.find_iter(&window) {
                if at + STREAM_HEADER_LEN > window.len() {
                    // Partial candidate at the tail; retried after the next read.
                    break;
                }
                if is_stream_header(&window[at..at + STREAM_HEADER_LEN]) {
                    return Ok(Some(window_start + at as u64));
                }
            }

            if eof {
                return Ok(None);
            }

            let keep = STREAM_HEADER_LEN - 1;
            if window.len() > keep {
                let drop = window.len() - keep;
                window.drain(..drop);
                window_start += drop as u64;
            }
        }
    }
}

impl BlockSource for Bz2Archive {
    fn read_block(&self, offset: u64) -> Result<BlockOutcome> {
        let mut file = self.open_at(offset)?;
        decompress_block(&mut file, offset, self.chunk_size).map_err(|e| match e {
            StreamError::Io { source, .. } => StreamError::io(&self.path, source),
            other => other,
        })
    }
}

fn is_stream_header(bytes: &[u8]) -> bool {
    bytes.len() >= STREAM_HEADER_LEN
        && bytes.starts_with(STREAM_MAGIC)
        && (b'1'..=b'9').contains(&bytes[3])
        && (bytes[4..10] == BLOCK_MAGIC || bytes[4..10] == EOS_MAGIC)
}

fn read_some(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    loop {
        match reader.read(buf) {
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

/// Decompresses the single bzip2 stream starting at the reader's current
/// position, which the caller reports as `offset`.
///
/// Reads `chunk_size` bytes at a time. Bytes of the final chunk that belong
/// to the following stream are left unaccounted: `consumed` counts only
/// input the decompressor actually took.
pub fn decompress_block<R: Read>(
    reader: &mut R,
    offset: u64,
    chunk_size: usize,
) -> Result<BlockOutcome> {
    let mut decompressor = Decompress::new(false);
    let mut chunk = vec![0u8; chunk_size.max(1)];
    let mut window = vec![0u8; OUTPUT_BUFFER_SIZE];
    let mut data = Vec::new();

    loop {
        let n = read_some(reader, &mut chunk).map_err(|e| StreamError::Io {
            path: PathBuf::new(),
            source: e,
        })?;
        if n == 0 {
            if decompressor.total_in() == 0 {
                return Ok(BlockOutcome::EndOfArchive);
            }
            return Err(StreamError::Block {
                offset,
                reason: format!(
                    "stream truncated after {} bytes",
                    decompressor.total_in()
                ),
            });
        }

        let mut input = &chunk[..n];
        loop {
            let in_before = decompressor.total_in();
            let out_before = decompressor.total_out();
            let status = decompressor
                .decompress(input, &mut window)
                .map_err(|e| StreamError::Block {
                    offset,
                    reason: e.to_string(),
                })?;
            let used = (decompressor.total_in() - in_before) as usize;
            let produced = (decompressor.total_out() - out_before) as usize;
            data.extend_from_slice(&window[..produced]);
            input = &input[used..];

            if matches!(status, Status::StreamEnd) {
                let consumed = decompressor.total_in();
                trace!(offset, consumed, bytes = data.len(), "Decompressed block");
                return Ok(BlockOutcome::Block(DecompressedBlock {
                    offset,
                    data,
                    consumed,
                }));
            }

            if used == 0 && produced == 0 {
                if input.is_empty() {
                    break;
                }
                return Err(StreamError::Block {
                    offset,
                    reason: "decompressor made no progress".to_string(),
                });
            }

            // Output window full means more may be pending even with no input left.
            if input.is_empty() && produced < window.len() {
                break;
            }
        }
    }
}
