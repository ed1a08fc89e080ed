//! Image frame index: maps sample indices to camera frame files.
//!
//! Frames are PNG files whose stem ends in a capture timestamp
//! (`cam0_1700000123.png`, `000042.png`). Each added directory is one stream.
//! Without per-sample timestamps, sample `i` maps to the `i`-th frame.

use std::path::{Path, PathBuf};

use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::Result;

static FRAME_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)$").expect("valid regex"));

/// Frames of one camera stream, sorted by number.
#[derive(Clone, Debug, Default)]
pub struct FrameStream {
    dir: PathBuf,
    frames: Vec<(i64, PathBuf)>,
    /// Frame index per sample after `sync`
    by_sample: Vec<usize>,
}

impl FrameStream {
    pub fn scan(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let pattern = format!("{}/*.png", glob::Pattern::escape(&dir.to_string_lossy()));
        let mut frames = Vec::new();
        let paths = glob::glob(&pattern).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
        })?;
        for entry in paths {
            let path = match entry {
                Ok(p) => p,
                Err(e) => {
                    warn!("skipping unreadable frame entry: {}", e);
                    continue;
                }
            };
            let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
            match FRAME_NUMBER.captures(stem).and_then(|c| c[1].parse::<i64>().ok()) {
                Some(n) => frames.push((n, path)),
                None => debug!("ignoring frame without number: {}", path.display()),
            }
        }
        frames.sort_by_key(|(n, _)| *n);
        debug!("scanned {} frames in {}", frames.len(), dir.display());
        Ok(Self {
            dir,
            frames,
            by_sample: Vec::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Assign each sample the latest frame whose number does not exceed the
    /// sample timestamp. Samples before the first frame get the first frame.
    /// All-zero timestamps mean "not recorded" and leave positional mapping.
    pub fn sync(&mut self, timestamps: &[i64]) {
        self.by_sample.clear();
        if self.frames.is_empty() || timestamps.iter().all(|&t| t == 0) {
            return;
        }
        let mut j = 0;
        for &ts in timestamps {
            while j + 1 < self.frames.len() && self.frames[j + 1].0 <= ts {
                j += 1;
            }
            self.by_sample.push(j);
        }
    }

    pub fn is_synced(&self) -> bool {
        !self.by_sample.is_empty()
    }

    pub fn frame_for(&self, sample: usize) -> Option<&Path> {
        let idx = if self.by_sample.is_empty() {
            sample
        } else {
            *self.by_sample.get(sample)?
        };
        self.frames.get(idx).map(|(_, p)| p.as_path())
    }
}

/// All camera streams attached to the session.
#[derive(Clone, Debug, Default)]
pub struct FrameIndex {
    streams: Vec<FrameStream>,
}

impl FrameIndex {
    /// Scan `dir` as a new stream; returns the stream index.
    pub fn add_dir(&mut self, dir: impl AsRef<Path>) -> Result<usize> {
        self.streams.push(FrameStream::scan(dir)?);
        Ok(self.streams.len() - 1)
    }

    pub fn sync(&mut self, timestamps: &[i64]) {
        for stream in &mut self.streams {
            stream.sync(timestamps);
        }
    }

    pub fn streams(&self) -> &[FrameStream] {
        &self.streams
    }

    pub fn frame_for(&self, stream: usize, sample: usize) -> Option<&Path> {
        self.streams.get(stream)?.frame_for(sample)
    }

    /// Current frame of every stream for `sample`.
    pub fn frames_at(&self, sample: usize) -> Vec<Option<&Path>> {
        self.streams.iter().map(|s| s.frame_for(sample)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, names: &[&str]) {
        for n in names {
            std::fs::write(dir.join(n), b"").unwrap();
        }
    }

    #[test]
    fn test_scan_sorts_numerically_and_skips_unnumbered() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), &["cam_100.png", "cam_20.png", "cam_3.png", "cover.png", "notes.txt"]);
        let stream = FrameStream::scan(dir.path()).unwrap();
        assert_eq!(stream.len(), 3);
        assert!(stream.frame_for(0).unwrap().ends_with("cam_3.png"));
        assert!(stream.frame_for(2).unwrap().ends_with("cam_100.png"));
        assert!(stream.frame_for(3).is_none());
    }

    #[test]
    fn test_sync_picks_latest_frame_not_after_sample() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), &["10.png", "20.png", "30.png"]);
        let mut index = FrameIndex::default();
        let s = index.add_dir(dir.path()).unwrap();
        index.sync(&[5, 10, 15, 29, 30, 99]);
        let got: Vec<String> = (0..6)
            .map(|i| {
                index.frame_for(s, i).unwrap().file_name().unwrap().to_string_lossy().into_owned()
            })
            .collect();
        assert_eq!(got, vec!["10.png", "10.png", "10.png", "20.png", "30.png", "30.png"]);
    }

    #[test]
    fn test_zero_timestamps_keep_positional_mapping() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), &["1.png", "2.png"]);
        let mut stream = FrameStream::scan(dir.path()).unwrap();
        stream.sync(&[0, 0, 0]);
        assert!(!stream.is_synced());
        assert!(stream.frame_for(1).unwrap().ends_with("2.png"));
    }
}
