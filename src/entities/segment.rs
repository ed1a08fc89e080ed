//! Labeled `[start, end)` intervals owned by the sensor data model.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Name given to segments created by user interaction before labeling.
pub const UNLABELED: &str = "NONE";

/// Label set a segment belongs to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LabelMode {
    #[default]
    Gestures,
    Attention,
}

impl LabelMode {
    pub const ALL: [LabelMode; 2] = [LabelMode::Gestures, LabelMode::Attention];

    pub fn index(&self) -> usize {
        match self {
            LabelMode::Gestures => 0,
            LabelMode::Attention => 1,
        }
    }

    pub fn from_index(idx: usize) -> Option<Self> {
        Self::ALL.get(idx).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LabelMode::Gestures => "gestures",
            LabelMode::Attention => "attention",
        }
    }
}

impl fmt::Display for LabelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LabelMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gestures" | "gesture" | "0" => Ok(LabelMode::Gestures),
            "attention" | "1" => Ok(LabelMode::Attention),
            other => Err(format!("unknown label mode '{other}' (expected gestures|attention)")),
        }
    }
}

/// Segment id, unique within its label mode only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SegmentId(pub u64);

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub mode: LabelMode,
    pub id: SegmentId,
    pub start: i64,
    pub end: i64,
    pub name: String,
}

impl Segment {
    pub fn new(mode: LabelMode, id: SegmentId, start: i64, end: i64, name: impl Into<String>) -> Self {
        Self {
            mode,
            id,
            start,
            end,
            name: name.into(),
        }
    }

    pub fn bounds(&self) -> (i64, i64) {
        (self.start, self.end)
    }

    pub fn len(&self) -> i64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Inclusive containment in `[begin, end]`.
    pub fn is_inside(&self, begin: i64, end: i64) -> bool {
        self.start >= begin && self.end <= end
    }

    /// `(start, end, name)` triple used by label export.
    pub fn triple(&self) -> (i64, i64, String) {
        (self.start, self.end, self.name.clone())
    }
}

/// What a single segment mutation touched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SegmentChange {
    Start(i64),
    End(i64),
    Bounds(i64, i64),
    Name(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_mode_parsing() {
        assert_eq!("Attention".parse::<LabelMode>(), Ok(LabelMode::Attention));
        assert_eq!("0".parse::<LabelMode>(), Ok(LabelMode::Gestures));
        assert!("speech".parse::<LabelMode>().is_err());
        assert_eq!(LabelMode::from_index(1), Some(LabelMode::Attention));
        assert_eq!(LabelMode::from_index(2), None);
    }

    #[test]
    fn test_containment_is_inclusive() {
        let s = Segment::new(LabelMode::Gestures, SegmentId(0), 60, 70, "wave");
        assert!(s.is_inside(50, 150));
        assert!(s.is_inside(60, 70));
        assert!(!s.is_inside(61, 150));
        assert_eq!(s.len(), 10);
    }
}
