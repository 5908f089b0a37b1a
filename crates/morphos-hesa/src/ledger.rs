//! Append-only discovery ledger
//!
//! One JSON object per line. Lines are only ever appended; a cycle id may
//! appear at most once. Duplicates are checked against a bounded window of
//! the most recent ids, which is enough for time-ordered UUIDv7 cycle ids.

use std::collections::{HashSet, VecDeque};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use morphos_common::{HesaError, SweetSpot};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Ledger line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub cycle_id: String,
    #[serde(flatten)]
    pub spot: SweetSpot,
}

/// Recent cycle ids checked for duplicates
pub const RECENT_WINDOW: usize = 1024;

/// Insertion-ordered id set that forgets its oldest entries
#[derive(Debug)]
struct RecentIds {
    order: VecDeque<String>,
    ids: HashSet<String>,
    capacity: usize,
    /// Entries ever recorded, including evicted ones
    total: usize,
}

impl RecentIds {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity),
            ids: HashSet::with_capacity(capacity),
            capacity: capacity.max(1),
            total: 0,
        }
    }

    fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    fn push(&mut self, id: String) {
        self.total += 1;
        if !self.ids.insert(id.clone()) {
            return;
        }
        self.order.push_back(id);
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.ids.remove(&evicted);
            }
        }
    }
}

pub struct DiscoveryLedger {
    path: PathBuf,
    /// Held for the duration of a record; contention means a concurrent search
    writer: Mutex<()>,
    recent: Mutex<RecentIds>,
}

impl DiscoveryLedger {
    /// Open (or lazily create) the ledger at `path`
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, HesaError> {
        Self::with_window(path, RECENT_WINDOW)
    }

    /// As [`open`](Self::open), remembering the last `window` cycle ids
    pub fn with_window(path: impl Into<PathBuf>, window: usize) -> Result<Self, HesaError> {
        let path = path.into();
        let mut recent = RecentIds::new(window);
        for_each_entry(&path, |entry| recent.push(entry.cycle_id))?;
        Ok(Self {
            path,
            writer: Mutex::new(()),
            recent: Mutex::new(recent),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `spot` for `cycle_id`
    ///
    /// Returns `Ok(false)` when the spot is invalid and was discarded.
    pub fn record(&self, cycle_id: &str, spot: &SweetSpot) -> Result<bool, HesaError> {
        let _guard = self.writer.try_lock().ok_or(HesaError::LedgerBusy)?;

        if !spot.valid {
            return Ok(false);
        }
        if self.recent.lock().contains(cycle_id) {
            return Err(HesaError::DuplicateCycle(cycle_id.to_string()));
        }

        let entry = LedgerEntry {
            cycle_id: cycle_id.to_string(),
            spot: spot.clone(),
        };
        let line =
            serde_json::to_string(&entry).map_err(|e| HesaError::Ledger(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| HesaError::Ledger(e.to_string()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| HesaError::Ledger(e.to_string()))?;
        writeln!(file, "{line}").map_err(|e| HesaError::Ledger(e.to_string()))?;

        self.recent.lock().push(cycle_id.to_string());
        info!(cycle_id, value = spot.value, radius = spot.stability_radius, "Sweet spot recorded");
        Ok(true)
    }

    /// Every entry currently on disk
    pub fn entries(&self) -> Result<Vec<LedgerEntry>, HesaError> {
        let mut entries = Vec::new();
        for_each_entry(&self.path, |entry| entries.push(entry))?;
        Ok(entries)
    }

    /// Entries recorded over the ledger's lifetime
    pub fn len(&self) -> usize {
        self.recent.lock().total
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Stream readable entries without holding the whole ledger in memory
fn for_each_entry(path: &Path, mut visit: impl FnMut(LedgerEntry)) -> Result<(), HesaError> {
    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(HesaError::Ledger(e.to_string())),
    };
    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| HesaError::Ledger(e.to_string()))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<LedgerEntry>(&line) {
            Ok(entry) => visit(entry),
            Err(err) => warn!(line = lineno + 1, error = %err, "Skipping unreadable ledger line"),
        }
    }
    Ok(())
}
