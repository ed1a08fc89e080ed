//! Recording store: channel descriptions, per-sample signal, label codes,
//! optional attention probabilities and timestamps.
//!
//! The model only needs random-slice reads and an in-place label write path;
//! [`RecordingStore`] is that contract. [`RecordingFile`] keeps a recording as
//! a JSON document on disk, [`MemoryRecording`] backs live streams and tests.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{EditorError, Result};

/// Raw recording content.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordingData {
    /// Channel names, one per signal column
    pub channels: Vec<String>,
    /// Gesture class names; index = code in `target`
    #[serde(default)]
    pub classes: Vec<String>,
    /// Attention class names; index = column in `attention`
    #[serde(default)]
    pub attention_classes: Vec<String>,
    /// One row per sample, one column per channel
    pub signal: Vec<Vec<f64>>,
    /// Gesture code per sample (0 = no label)
    #[serde(default)]
    pub target: Vec<u16>,
    /// Attention class probabilities per sample
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attention: Option<Vec<Vec<f32>>>,
    /// Capture timestamp per sample, used to sync image frames
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Vec<i64>>,
}

impl RecordingData {
    pub fn sample_count(&self) -> usize {
        self.signal.len()
    }

    /// Fill defaults and check per-sample arrays agree on length.
    pub fn normalize(&mut self) -> Result<()> {
        let n = self.signal.len();
        let width = self.channels.len();
        if let Some(row) = self.signal.iter().position(|r| r.len() != width) {
            return Err(EditorError::InvalidRecording(format!(
                "signal row {} has {} values, expected {}",
                row,
                self.signal[row].len(),
                width
            )));
        }
        if self.target.is_empty() {
            self.target = vec![0; n];
        }
        if self.target.len() != n {
            return Err(EditorError::InvalidRecording(format!(
                "target has {} samples, signal has {}",
                self.target.len(),
                n
            )));
        }
        if let Some(att) = &self.attention {
            if att.len() != n {
                return Err(EditorError::InvalidRecording(format!(
                    "attention has {} samples, signal has {}",
                    att.len(),
                    n
                )));
            }
        }
        if let Some(ts) = &self.timestamp {
            if ts.len() != n {
                return Err(EditorError::InvalidRecording(format!(
                    "timestamp has {} samples, signal has {}",
                    ts.len(),
                    n
                )));
            }
        }
        Ok(())
    }

    /// One channel's values for samples `[begin, end)`, clamped to the data.
    pub fn column(&self, channel: usize, begin: usize, end: usize) -> Vec<f64> {
        let end = end.min(self.signal.len());
        let begin = begin.min(end);
        self.signal[begin..end]
            .iter()
            .filter_map(|row| row.get(channel).copied())
            .collect()
    }

    /// Signal rows `[begin, end)`, clamped to the data.
    pub fn rows(&self, begin: usize, end: usize) -> &[Vec<f64>] {
        let end = end.min(self.signal.len());
        &self.signal[begin.min(end)..end]
    }
}

/// Backing store for one recording, exclusively owned by the model.
pub trait RecordingStore: Send {
    /// File this recording persists to, if any.
    fn path(&self) -> Option<&Path>;

    fn data(&self) -> &RecordingData;

    fn sample_count(&self) -> usize {
        self.data().sample_count()
    }

    /// Overwrite `target[offset..offset + codes.len()]`.
    fn write_target(&mut self, offset: usize, codes: &[u16]) -> Result<()>;

    /// Overwrite attention rows starting at `offset`, creating the matrix if absent.
    fn write_attention(&mut self, offset: usize, rows: &[Vec<f32>]) -> Result<()>;

    /// Append samples (live capture). Labels of new samples are 0.
    fn append(&mut self, rows: Vec<Vec<f64>>) -> Result<()>;

    /// Persist pending writes.
    fn flush(&mut self) -> Result<()>;
}

fn check_range(what: &str, offset: usize, len: usize, total: usize) -> Result<()> {
    if offset + len > total {
        return Err(EditorError::InvalidRecording(format!(
            "{} write [{}, {}) exceeds {} samples",
            what,
            offset,
            offset + len,
            total
        )));
    }
    Ok(())
}

fn write_target_into(data: &mut RecordingData, offset: usize, codes: &[u16]) -> Result<()> {
    check_range("target", offset, codes.len(), data.target.len())?;
    data.target[offset..offset + codes.len()].copy_from_slice(codes);
    Ok(())
}

fn write_attention_into(data: &mut RecordingData, offset: usize, rows: &[Vec<f32>]) -> Result<()> {
    let n = data.sample_count();
    check_range("attention", offset, rows.len(), n)?;
    let width = rows.first().map(Vec::len).unwrap_or(data.attention_classes.len());
    let attention = data.attention.get_or_insert_with(|| vec![vec![0.0; width]; n]);
    for (dst, src) in attention[offset..offset + rows.len()].iter_mut().zip(rows) {
        dst.clone_from(src);
    }
    Ok(())
}

fn append_into(data: &mut RecordingData, rows: Vec<Vec<f64>>) -> Result<()> {
    let width = data.channels.len();
    if let Some(bad) = rows.iter().find(|r| r.len() != width) {
        return Err(EditorError::InvalidRecording(format!(
            "appended row has {} values, expected {}",
            bad.len(),
            width
        )));
    }
    let added = rows.len();
    data.signal.extend(rows);
    data.target.extend(std::iter::repeat_n(0, added));
    if let Some(att) = &mut data.attention {
        let w = data.attention_classes.len();
        att.extend(std::iter::repeat_n(vec![0.0; w], added));
    }
    if let Some(ts) = &mut data.timestamp {
        let last = ts.last().copied().unwrap_or(0);
        ts.extend((1..=added as i64).map(|k| last + k));
    }
    Ok(())
}

/// Recording persisted as a JSON document.
#[derive(Debug)]
pub struct RecordingFile {
    path: PathBuf,
    data: RecordingData,
    dirty: bool,
}

impl RecordingFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let text = fs::read_to_string(&path)?;
        let mut data: RecordingData = serde_json::from_str(&text)?;
        data.normalize()?;
        info!(
            "opened recording {} ({} samples, {} channels)",
            path.display(),
            data.sample_count(),
            data.channels.len()
        );
        Ok(Self {
            path,
            data,
            dirty: false,
        })
    }

    /// Write `data` to `path` and return the opened store.
    pub fn create(path: impl AsRef<Path>, mut data: RecordingData) -> Result<Self> {
        data.normalize()?;
        let mut file = Self {
            path: path.as_ref().to_path_buf(),
            data,
            dirty: true,
        };
        file.flush()?;
        Ok(file)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

impl RecordingStore for RecordingFile {
    fn path(&self) -> Option<&Path> {
        Some(&self.path)
    }

    fn data(&self) -> &RecordingData {
        &self.data
    }

    fn write_target(&mut self, offset: usize, codes: &[u16]) -> Result<()> {
        write_target_into(&mut self.data, offset, codes)?;
        self.dirty = true;
        Ok(())
    }

    fn write_attention(&mut self, offset: usize, rows: &[Vec<f32>]) -> Result<()> {
        write_attention_into(&mut self.data, offset, rows)?;
        self.dirty = true;
        Ok(())
    }

    fn append(&mut self, rows: Vec<Vec<f64>>) -> Result<()> {
        append_into(&mut self.data, rows)?;
        self.dirty = true;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        // Write beside the target, then rename over it
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(&self.data)?)?;
        fs::rename(&tmp, &self.path)?;
        self.dirty = false;
        debug!("flushed recording {}", self.path.display());
        Ok(())
    }
}

/// In-memory recording without a backing file.
#[derive(Clone, Debug, Default)]
pub struct MemoryRecording {
    data: RecordingData,
}

impl MemoryRecording {
    pub fn new(mut data: RecordingData) -> Result<Self> {
        data.normalize()?;
        Ok(Self { data })
    }

    /// Empty stream with the given channel layout.
    pub fn stream(channels: Vec<String>, classes: Vec<String>) -> Self {
        Self {
            data: RecordingData {
                channels,
                classes,
                ..Default::default()
            },
        }
    }
}

impl RecordingStore for MemoryRecording {
    fn path(&self) -> Option<&Path> {
        None
    }

    fn data(&self) -> &RecordingData {
        &self.data
    }

    fn write_target(&mut self, offset: usize, codes: &[u16]) -> Result<()> {
        write_target_into(&mut self.data, offset, codes)
    }

    fn write_attention(&mut self, offset: usize, rows: &[Vec<f32>]) -> Result<()> {
        write_attention_into(&mut self.data, offset, rows)
    }

    fn append(&mut self, rows: Vec<Vec<f64>>) -> Result<()> {
        append_into(&mut self.data, rows)
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
