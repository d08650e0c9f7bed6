//! The on-disk indexes.
//!
//! The binary index is a headerless run of 24-byte records, three big-endian
//! `u64`s each: `(block_offset, position_in_block, record_id)`. Fixed width
//! gives O(1) seeks by index position without loading the file.
//!
//! The legacy text index (`offset:record_id:title` per line, optionally
//! bzip2-compressed as shipped with the dumps) is only read, for title
//! lookups and text-index paging.

use crate::config::{IO_BUFFER_SIZE, RECORD_SIZE};
use crate::error::{Result, StreamError};
use crate::models::{IndexEntry, Lookup, TitleIndexRow};
use bzip2::read::MultiBzDecoder;
use quick_xml::escape::unescape;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const RECORD_LEN: usize = RECORD_SIZE as usize;

impl IndexEntry {
    pub fn to_bytes(&self) -> [u8; RECORD_LEN] {
        let mut buf = [0u8; RECORD_LEN];
        buf[0..8].copy_from_slice(&self.block_offset.to_be_bytes());
        buf[8..16].copy_from_slice(&self.position_in_block.to_be_bytes());
        buf[16..24].copy_from_slice(&self.record_id.to_be_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8; RECORD_LEN]) -> Self {
        let field = |i: usize| {
            let mut word = [0u8; 8];
            word.copy_from_slice(&buf[i * 8..i * 8 + 8]);
            u64::from_be_bytes(word)
        };
        Self {
            block_offset: field(0),
            position_in_block: field(1),
            record_id: field(2),
        }
    }
}

/// Read-only handle on a binary index file.
#[derive(Debug, Clone)]
pub struct IndexStore {
    path: PathBuf,
}

impl IndexStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let meta = fs::metadata(&path).map_err(|e| StreamError::io(&path, e))?;
        if meta.len() % RECORD_SIZE != 0 {
            warn!(
                path = ?path,
                trailing = meta.len() % RECORD_SIZE,
                "Index ends with a partial record, ignoring it"
            );
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of complete records.
    pub fn len(&self) -> Result<u64> {
        let meta = fs::metadata(&self.path).map_err(|e| StreamError::io(&self.path, e))?;
        Ok(meta.len() / RECORD_SIZE)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Records `[start, start + count)`, fewer if the file ends first.
    pub fn read_range(&self, start: u64, count: usize) -> Result<Vec<IndexEntry>> {
        let io = |e| StreamError::io(&self.path, e);
        let mut file = File::open(&self.path).map_err(io)?;
        let len = file.metadata().map_err(io)?.len() / RECORD_SIZE;
        if start >= len || count == 0 {
            return Ok(Vec::new());
        }

        let available = (len - start).min(count as u64) as usize;
        file.seek(SeekFrom::Start(start * RECORD_SIZE)).map_err(io)?;
        let mut reader = BufReader::with_capacity(IO_BUFFER_SIZE, file);
        let mut entries = Vec::with_capacity(available);
        let mut buf = [0u8; RECORD_LEN];
        for _ in 0..available {
            match reader.read_exact(&mut buf) {
                Ok(()) => entries.push(IndexEntry::from_bytes(&buf)),
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(io(e)),
            }
        }
        Ok(entries)
    }

    pub fn entry_at(&self, position: u64) -> Result<Lookup<IndexEntry>> {
        Ok(match self.read_range(position, 1)?.pop() {
            Some(entry) => Lookup::Found(entry),
            None => Lookup::EndOfRange,
        })
    }
}

/// Append-only writer for a fresh binary index.
///
/// Records go to a sibling temp file that replaces the target on
/// [`IndexWriter::finish`]; dropping the writer unfinished leaves the
/// target untouched.
pub struct IndexWriter {
    path: PathBuf,
    tmp_path: PathBuf,
    writer: Option<BufWriter<File>>,
    written: u64,
}

impl IndexWriter {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StreamError::io(parent, e))?;
        }
        let tmp_path = tmp_path_for(&path);
        let file = File::create(&tmp_path).map_err(|e| StreamError::io(&tmp_path, e))?;
        Ok(Self {
            path,
            tmp_path,
            writer: Some(BufWriter::with_capacity(IO_BUFFER_SIZE, file)),
            written: 0,
        })
    }

    pub fn append(&mut self, entry: &IndexEntry) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer
                .write_all(&entry.to_bytes())
                .map_err(|e| StreamError::io(&self.tmp_path, e))?;
        }
        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flushes and moves the index into place. Returns the record count.
    pub fn finish(mut self) -> Result<u64> {
        if let Some(mut writer) = self.writer.take() {
            writer
                .flush()
                .map_err(|e| StreamError::io(&self.tmp_path, e))?;
        }
        fs::rename(&self.tmp_path, &self.path).map_err(|e| StreamError::io(&self.path, e))?;
        debug!(path = ?self.path, entries = self.written, "Index written");
        Ok(self.written)
    }
}

impl Drop for IndexWriter {
    fn drop(&mut self) {
        self.writer.take();
        if self.tmp_path.exists() {
            let _ = fs::remove_file(&self.tmp_path);
        }
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Writes `entries` in order as a new index at `path`.
pub fn write_all<'a>(
    path: impl AsRef<Path>,
    entries: impl IntoIterator<Item = &'a IndexEntry>,
) -> Result<u64> {
    let mut writer = IndexWriter::create(path)?;
    for entry in entries {
        writer.append(entry)?;
    }
    writer.finish()
}

/// Streams well-formed rows of a text index; malformed lines are skipped.
pub struct TextIndexRows {
    path: PathBuf,
    reader: Box<dyn BufRead>,
    line: Vec<u8>,
    line_no: u64,
}

impl TextIndexRows {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let io = |e| StreamError::io(&path, e);
        let mut file = File::open(&path).map_err(io)?;
        let mut magic = [0u8; 3];
        let is_bz2 = match file.read_exact(&mut magic) {
            Ok(()) => &magic == b"BZh",
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => false,
            Err(e) => return Err(io(e)),
        };
        file.seek(SeekFrom::Start(0)).map_err(io)?;

        let reader: Box<dyn BufRead> = if is_bz2 {
            Box::new(BufReader::with_capacity(
                IO_BUFFER_SIZE,
                MultiBzDecoder::new(BufReader::new(file)),
            ))
        } else {
            Box::new(BufReader::with_capacity(IO_BUFFER_SIZE, file))
        };

        Ok(Self {
            path,
            reader,
            line: Vec::new(),
            line_no: 0,
        })
    }
}

impl Iterator for TextIndexRows {
    type Item = Result<TitleIndexRow>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.line.clear();
            match self.reader.read_until(b'\n', &mut self.line) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(StreamError::io(&self.path, e))),
            }
            self.line_no += 1;
            let line = String::from_utf8_lossy(&self.line);
            match parse_text_line(&line) {
                Some(row) => return Some(Ok(row)),
                None => {
                    if !line.trim().is_empty() {
                        debug!(line = self.line_no, "Skipping malformed text index line");
                    }
                }
            }
        }
    }
}

/// Parses `offset:record_id:title`. The title may itself contain colons.
pub fn parse_text_line(line: &str) -> Option<TitleIndexRow> {
    let line = line.trim_end_matches(['\n', '\r']);
    let mut parts = line.splitn(3, ':');
    let block_offset = parts.next()?.trim().parse::<u64>().ok()?;
    let record_id = parts.next()?.trim().parse::<u64>().ok()?;
    let raw_title = parts.next()?;
    if raw_title.trim().is_empty() {
        return None;
    }
    // Dumps entity-encode & and " in this file.
    let title = unescape(raw_title)
        .map(|t| t.into_owned())
        .unwrap_or_else(|_| raw_title.to_string());
    Some(TitleIndexRow {
        block_offset,
        record_id,
        title,
    })
}

/// Reads every well-formed row of a text index into memory.
pub fn read_text_format(path: impl AsRef<Path>) -> Result<Vec<TitleIndexRow>> {
    TextIndexRows::open(path)?.collect()
}
