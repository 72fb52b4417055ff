//! On-disk cache of submitted jobs so identical requests are not resubmitted.
//!
//! The store is a single JSON object keyed by request fingerprint plus the
//! delivery format, since a job only ever produces files of one format:
//!
//! ```json
//! { "CE02SHSM|RID27|...|2023-01-08T00:00:00.000Z|application/netcdf": { "url": "...", "async_url": "...", "timestamp": 1700000000.0 } }
//! ```
//!
//! Writes go through a temp file in the same directory followed by an atomic
//! rename, so readers never see a half-written store.

use std::{
    collections::HashMap,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::{
    error::Result,
    job::{now, JobHandle},
    request::{Format, RequestDescriptor, FINGERPRINT_SEPARATOR},
};

const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Catalog URL of the job.
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub async_url: Option<String>,
    pub timestamp: f64,
}

impl CacheEntry {
    /// Rebuilds the job handle. Entries written without an async URL have none.
    pub fn handle(&self) -> Option<JobHandle> {
        let async_url = self.async_url.clone()?;
        Some(JobHandle::new(self.url.clone(), async_url, self.timestamp))
    }
}

type Store = HashMap<String, CacheEntry>;

pub struct JobCache {
    path: PathBuf,
    expiry_days: u32,
    entries: Store,
}

impl JobCache {
    /// Loads the store at `path`, dropping expired entries.
    ///
    /// A missing, empty or malformed file yields an empty cache. The filtered
    /// result is written back straight away.
    pub fn load(path: impl Into<PathBuf>, expiry_days: u32) -> Self {
        let path = path.into();
        let now = now();
        let entries: Store = read_store(&path)
            .into_iter()
            .filter(|(_, entry)| is_live(entry, now, expiry_days))
            .collect();
        debug!(path = %path.display(), entries = entries.len(), "job cache loaded");

        let cache = JobCache {
            path,
            expiry_days,
            entries,
        };
        if let Err(e) = cache.persist() {
            warn!(error = %e, "could not rewrite job cache");
        }

        cache
    }

    pub fn lookup(&self, descriptor: &RequestDescriptor, format: Format) -> Option<&CacheEntry> {
        self.entries.get(&cache_key(descriptor, format))
    }

    pub fn store(&mut self, descriptor: &RequestDescriptor, format: Format, handle: &JobHandle) {
        let entry = CacheEntry {
            url: handle.catalog_url.clone(),
            async_url: Some(handle.async_result_url.clone()),
            timestamp: now(),
        };
        self.entries.insert(cache_key(descriptor, format), entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the union of the on-disk store and memory, memory winning.
    ///
    /// Either the whole union lands or the previous file stays untouched.
    pub fn persist(&self) -> Result<()> {
        let now = now();
        let mut merged: Store = read_store(&self.path)
            .into_iter()
            .filter(|(_, entry)| is_live(entry, now, self.expiry_days))
            .collect();
        merged.extend(self.entries.iter().map(|(k, v)| (k.clone(), v.clone())));

        write_atomic(&self.path, &merged)
    }
}

fn cache_key(descriptor: &RequestDescriptor, format: Format) -> String {
    format!(
        "{}{}{}",
        cache_key(&descriptor, Format::NetCdf),
        FINGERPRINT_SEPARATOR,
        format.mime()
    )
}

fn is_live(entry: &CacheEntry, now: f64, expiry_days: u32) -> bool {
    now - entry.timestamp <= f64::from(expiry_days) * SECONDS_PER_DAY
}

fn read_store(path: &Path) -> Store {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Store::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not read job cache");
            return Store::new();
        }
    };

    if contents.trim().is_empty() {
        return Store::new();
    }

    serde_json::from_str(&contents).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "malformed job cache, starting empty");
        Store::new()
    })
}

fn write_atomic(path: &Path, store: &Store) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)?;

    // Dropping the temp file on any early return removes it.
    let mut tmp = NamedTempFile::new_in(&dir)?;
    serde_json::to_writer_pretty(&mut tmp, store)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;

    Ok(())
}

// -- Tests -------------------------------------------------------------------
