//! Durable record of which image URLs have already been downloaded.
//!
//! The tracking file is a single JSON object keyed by URL. It is rewritten in
//! full after every successful download, so a crash can lose at most the
//! entry for the download that was in flight.

use crate::error::TrackingError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Metadata kept for one downloaded image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingEntry {
    pub local_path: String,
    /// ICAO code from the source row, empty if the row had none.
    #[serde(default)]
    pub icao: String,
    pub column: String,
    pub csv_file: String,
    pub filename: String,
}

/// URL to entry, in download order.
pub type TrackingMapping = IndexMap<String, TrackingEntry>;

pub struct TrackingStore {
    path: PathBuf,
}

impl TrackingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling written by `save` before it replaces the tracking file.
    pub fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// Whether `path` is one of the files this store writes.
    pub fn owns(&self, path: &Path) -> bool {
        path == self.path || path == self.tmp_path()
    }

    /// Read the whole mapping. A missing file is an empty mapping.
    pub fn load(&self) -> Result<TrackingMapping, TrackingError> {
        let content = match fs::read(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(TrackingMapping::new()),
            Err(source) => {
                return Err(TrackingError::Io {
                    operation: "Failed to read",
                    path: self.path.clone(),
                    source,
                })
            }
        };

        serde_json::from_slice(&content).map_err(|source| TrackingError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    /// Replace the stored mapping with `mapping`.
    ///
    /// Writes a sibling temp file and renames it over the tracking file, so a
    /// reader never sees a half-written store.
    pub fn save(&self, mapping: &TrackingMapping) -> Result<(), TrackingError> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        mapping.serialize(&mut ser)?;

        let tmp_path = self.tmp_path();
        fs::write(&tmp_path, &buf).map_err(|source| TrackingError::Io {
            operation: "Failed to write",
            path: tmp_path.clone(),
            source,
        })?;
        fs::rename(&tmp_path, &self.path).map_err(|source| TrackingError::Io {
            operation: "Failed to replace",
            path: self.path.clone(),
            source,
        })
    }

    /// Record a single download: load, insert, save.
    pub fn append(&self, url: &str, entry: TrackingEntry) -> Result<(), TrackingError> {
        let mut mapping = self.load()?;
        mapping.insert(url.to_string(), entry);
        self.save(&mapping)
    }
}

/// Counts of tracked images, for the `status` command.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TrackingStats {
    pub total: usize,
    pub by_source: BTreeMap<String, usize>,
    pub by_column: BTreeMap<String, usize>,
}

pub fn summarize(mapping: &TrackingMapping) -> TrackingStats {
    let mut stats = TrackingStats {
        total: mapping.len(),
        ..Default::default()
    };

    for entry in mapping.values() {
        *stats.by_source.entry(entry.csv_file.clone()).or_default() += 1;
        *stats.by_column.entry(entry.column.clone()).or_default() += 1;
    }

    stats
}
