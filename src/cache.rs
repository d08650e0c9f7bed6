use crate::config::CACHE_VERSION;
use crate::index::{TitleEntry, TitleIndex};
use anyhow::{Context, Result};
use bincode::Options;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{info, warn};

#[derive(Serialize, Deserialize)]
pub struct CacheMetadata {
    pub version: u32,
    pub source_path: String,
    pub source_mtime: u64,
    pub source_size: u64,
    pub title_count: usize,
}

#[derive(Deserialize)]
struct TitleCacheDe {
    metadata: CacheMetadata,
    titles: FxHashMap<String, TitleEntry>,
}

/// Borrows the title map to avoid cloning millions of strings during serialization.
#[derive(Serialize)]
struct TitleCacheSer<'a> {
    metadata: CacheMetadata,
    titles: &'a FxHashMap<String, TitleEntry>,
}

/// The cache sits next to the text index it was built from:
/// `index.txt.bz2` → `index.txt.bz2.titles.cache`.
pub fn cache_path(source_path: &Path) -> PathBuf {
    let mut name = source_path.file_name().unwrap_or_default().to_os_string();
    name.push(".titles.cache");
    source_path.with_file_name(name)
}

fn get_source_metadata(source_path: &Path) -> Result<(u64, u64)> {
    let metadata = fs::metadata(source_path)
        .with_context(|| format!("Failed to get metadata for: {}", source_path.display()))?;
    let mtime = metadata
        .modified()
        .context("Failed to get modification time")?
        .duration_since(SystemTime::UNIX_EPOCH)
        .context("Invalid modification time")?
        .as_secs();
    let size = metadata.len();
    Ok((mtime, size))
}

fn read_cache(cache_path: &Path) -> Result<TitleCacheDe> {
    let file_size = fs::metadata(cache_path).map(|m| m.len()).unwrap_or(0);
    let file = File::open(cache_path)
        .with_context(|| format!("Failed to open cache file: {}", cache_path.display()))?;
    let reader = BufReader::with_capacity(256 * 1024, file);
    let options = bincode::options().with_limit(file_size.saturating_add(1024));
    options
        .deserialize_from(reader)
        .context("Failed to deserialize title cache")
}

/// Returns `Ok(Some(index))` if the cache is valid, `Ok(None)` if missing or stale.
pub fn try_load_titles(cache_path: &Path, source_path: &Path) -> Result<Option<TitleIndex>> {
    if !cache_path.exists() {
        return Ok(None);
    }

    let cache = match read_cache(cache_path) {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "Cache file is corrupt or unreadable");
            return Ok(None);
        }
    };

    if cache.metadata.version != CACHE_VERSION {
        info!(
            cached = cache.metadata.version,
            current = CACHE_VERSION,
            "Cache version mismatch"
        );
        return Ok(None);
    }

    let source = source_path.to_string_lossy();
    if cache.metadata.source_path != source {
        info!(
            cached = cache.metadata.source_path,
            current = %source,
            "Cache source path mismatch"
        );
        return Ok(None);
    }

    let (mtime, size) = get_source_metadata(source_path)?;
    if cache.metadata.source_mtime != mtime || cache.metadata.source_size != size {
        info!(
            cached_mtime = cache.metadata.source_mtime,
            current_mtime = mtime,
            cached_size = cache.metadata.source_size,
            current_size = size,
            "Text index has changed since cache was created"
        );
        return Ok(None);
    }

    info!(titles = cache.metadata.title_count, "Title index loaded from cache");
    Ok(Some(TitleIndex::from_map(cache.titles)))
}

/// Serializes the title map by reference and writes atomically via rename.
pub fn save_titles(index: &TitleIndex, source_path: &Path, cache_path: &Path) -> Result<()> {
    if let Some(parent) = cache_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }

    let (mtime, size) = get_source_metadata(source_path)?;
    let cache = TitleCacheSer {
        metadata: CacheMetadata {
            version: CACHE_VERSION,
            source_path: source_path.to_string_lossy().into_owned(),
            source_mtime: mtime,
            source_size: size,
            title_count: index.len(),
        },
        titles: index.map(),
    };

    let tmp_path = cache_path.with_extension("cache.tmp");
    let file = File::create(&tmp_path)
        .with_context(|| format!("Failed to create temp cache file: {:?}", tmp_path))?;
    let writer = BufWriter::new(file);

    bincode::DefaultOptions::new()
        .serialize_into(writer, &cache)
        .context("Failed to serialize title cache")?;

    fs::rename(&tmp_path, cache_path)
        .with_context(|| format!("Failed to rename temp cache file to: {:?}", cache_path))?;

    info!(
        titles = index.len(),
        path = ?cache_path,
        "Title cache saved"
    );

    Ok(())
}

/// Cached title index when valid, otherwise a fresh build from the text index
/// (saved back to the cache unless `use_cache` is off).
pub fn load_or_build(source_path: &Path, use_cache: bool) -> Result<TitleIndex> {
    let path = cache_path(source_path);
    if use_cache {
        if let Some(index) = try_load_titles(&path, source_path)? {
            return Ok(index);
        }
        info!("Building title index (cache miss or invalid)");
    } else {
        info!("Cache disabled, building fresh title index");
    }

    let index = TitleIndex::build(source_path)
        .with_context(|| format!("Failed to read text index: {}", source_path.display()))?;
    if use_cache {
        if let Err(e) = save_titles(&index, source_path, &path) {
            warn!(error = %e, "Failed to save title cache");
        }
    }
    Ok(index)
}
