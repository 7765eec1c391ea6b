use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike};
use serde::Serialize;

use crate::error::{FaciesError, FaciesResult};

/// `YYYYMMDD_HHMMSSmmm`, millisecond resolution.
const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S%3f";
const DISPLAY_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";
const MAX_CREATE_ATTEMPTS: u32 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    /// File name inside the store; doubles as the entry id.
    pub id: String,
    pub original_filename: String,
    pub recorded_at: Option<String>,
    pub size: u64,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClearFailure {
    pub id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ClearReport {
    pub removed: Vec<String>,
    pub failed: Vec<ClearFailure>,
}

impl ClearReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn into_error(self) -> Option<FaciesError> {
        if self.is_complete() {
            return None;
        }
        Some(FaciesError::PartialClear {
            removed: self.removed.len(),
            failed: self.failed.into_iter().map(|f| f.id).collect(),
        })
    }
}

/// Flat directory of `{stamp}_{original}` files with an in-memory index.
///
/// The index is built once on open and updated on every record/clear.
/// Entries are append-only; the only removal is a full clear.
#[derive(Debug)]
pub struct HistoryStore {
    dir: PathBuf,
    index: BTreeMap<String, HistoryEntry>,
    last_stamp: Option<NaiveDateTime>,
}

impl HistoryStore {
    pub fn open(dir: impl Into<PathBuf>) -> FaciesResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|err| FaciesError::io("failed to create history directory", &dir, err))?;
        let mut store = Self {
            dir,
            index: BTreeMap::new(),
            last_stamp: None,
        };
        store.refresh()?;
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Rebuilds the index from the directory contents.
    pub fn refresh(&mut self) -> FaciesResult<()> {
        let entries = fs::read_dir(&self.dir)
            .map_err(|err| FaciesError::io("failed to list history", &self.dir, err))?;
        let mut index = BTreeMap::new();
        let mut newest: Option<NaiveDateTime> = None;
        for entry in entries {
            let entry =
                entry.map_err(|err| FaciesError::io("failed to list history", &self.dir, err))?;
            let Ok(id) = entry.file_name().into_string() else {
                tracing::warn!(name = ?entry.file_name(), "skipping non UTF-8 history entry");
                continue;
            };
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            let parsed = split_entry_name(&id);
            if let Some((stamp, _)) = parsed {
                newest = newest.max(Some(stamp));
            }
            let original_filename = parsed.map(|(_, orig)| orig).unwrap_or(&id).to_string();
            let history_entry = HistoryEntry {
                path: entry.path(),
                recorded_at: parsed.map(|(stamp, _)| stamp.format(DISPLAY_FORMAT).to_string()),
                original_filename,
                size,
                id: id.clone(),
            };
            index.insert(id, history_entry);
        }
        tracing::debug!(dir = %self.dir.display(), entries = index.len(), "history index rebuilt");
        self.index = index;
        self.last_stamp = self.last_stamp.max(newest);
        Ok(())
    }

    /// Newest first: file names in descending order.
    pub fn list(&self) -> Vec<HistoryEntry> {
        self.index.values().rev().cloned().collect()
    }

    pub fn read(&self, id: &str) -> FaciesResult<Vec<u8>> {
        let entry = self
            .index
            .get(id)
            .ok_or_else(|| FaciesError::EntryNotFound(id.to_string()))?;
        fs::read(&entry.path)
            .map_err(|err| FaciesError::io("failed to read history entry", &entry.path, err))
    }

    pub fn record(&mut self, bytes: &[u8], original_filename: &str) -> FaciesResult<HistoryEntry> {
        self.record_at(bytes, original_filename, Local::now().naive_local())
    }

    pub(crate) fn record_at(
        &mut self,
        bytes: &[u8],
        original_filename: &str,
        now: NaiveDateTime,
    ) -> FaciesResult<HistoryEntry> {
        let original = base_name(original_filename);
        let mut stamp = self.next_stamp(now);
        if let Some(lead) = stamp_lead(now, stamp) {
            tracing::warn!(
                ahead_ms = lead.num_milliseconds(),
                stamp = %stamp.format(DISPLAY_FORMAT),
                "history stamp is ahead of the clock; an existing entry is dated in the future"
            );
        }
        let mut attempts = 0;
        loop {
            let id = format!("{}_{original}", stamp.format(STAMP_FORMAT));
            let path = self.dir.join(&id);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    if let Err(source) = file.write_all(bytes).and_then(|_| file.sync_all()) {
                        drop(file);
                        let _ = fs::remove_file(&path);
                        return Err(FaciesError::StoreWrite { path, source });
                    }
                    let entry = HistoryEntry {
                        id: id.clone(),
                        original_filename: original.clone(),
                        recorded_at: Some(stamp.format(DISPLAY_FORMAT).to_string()),
                        size: bytes.len() as u64,
                        path,
                    };
                    tracing::debug!(entry = %id, bytes = bytes.len(), "recorded history entry");
                    self.index.insert(id, entry.clone());
                    return Ok(entry);
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists && attempts < MAX_CREATE_ATTEMPTS => {
                    attempts += 1;
                    stamp = self.next_stamp(stamp);
                }
                Err(source) => return Err(FaciesError::StoreWrite { path, source }),
            }
        }
    }

    /// Best-effort removal of every entry; failures are reported, not fatal.
    pub fn clear(&mut self) -> FaciesResult<ClearReport> {
        self.refresh()?;
        let mut report = ClearReport::default();
        let ids: Vec<String> = self.index.keys().cloned().collect();
        for id in ids {
            let path = self.dir.join(&id);
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    tracing::warn!(entry = %id, error = %err, "failed to remove history entry");
                    report.failed.push(ClearFailure {
                        id,
                        reason: err.to_string(),
                    });
                    continue;
                }
            }
            self.index.remove(&id);
            report.removed.push(id);
        }
        tracing::debug!(
            removed = report.removed.len(),
            failed = report.failed.len(),
            "history cleared"
        );
        Ok(report)
    }

    fn next_stamp(&mut self, now: NaiveDateTime) -> NaiveDateTime {
        let mut stamp = truncate_to_millis(now);
        if let Some(last) = self.last_stamp {
            if stamp <= last {
                stamp = last + TimeDelta::milliseconds(1);
            }
        }
        self.last_stamp = Some(stamp);
        stamp
    }
}

/// How far `stamp` runs ahead of `now`, when that is more than a second.
fn stamp_lead(now: NaiveDateTime, stamp: NaiveDateTime) -> Option<TimeDelta> {
    let lead = stamp - truncate_to_millis(now);
    (lead > TimeDelta::seconds(1)).then_some(lead)
}

fn truncate_to_millis(t: NaiveDateTime) -> NaiveDateTime {
    t.with_nanosecond(t.nanosecond() / 1_000_000 * 1_000_000)
        .unwrap_or(t)
}

fn base_name(name: &str) -> String {
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .unwrap_or("image.png")
        .to_string()
}

/// Splits `YYYYMMDD_HHMMSS[mmm]_original` into its stamp and original name.
/// Accepts both the second-resolution and millisecond-resolution layouts.
fn split_entry_name(name: &str) -> Option<(NaiveDateTime, &str)> {
    let bytes = name.as_bytes();
    let digits = |range: std::ops::Range<usize>| {
        bytes.get(range.clone())?.iter().all(u8::is_ascii_digit).then(|| &name[range])
    };
    let date = digits(0..8)?;
    if bytes.get(8) != Some(&b'_') {
        return None;
    }
    let time = digits(9..15)?;
    let (millis, rest_at) = match bytes.get(15) {
        Some(b'_') => (0, 16),
        Some(_) => {
            let ms = digits(15..18)?;
            if bytes.get(18) != Some(&b'_') {
                return None;
            }
            (ms.parse::<u32>().ok()?, 19)
        }
        None => return None,
    };
    let date = NaiveDate::parse_from_str(date, "%Y%m%d").ok()?;
    let time = NaiveTime::parse_from_str(time, "%H%M%S").ok()?;
    let stamp = date.and_time(time).with_nanosecond(millis * 1_000_000)?;
    Some((stamp, &name[rest_at..]))
}
