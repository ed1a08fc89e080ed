//! Change notifications emitted by the sensor data model.

use crate::entities::segment::{LabelMode, SegmentChange, SegmentId};

// === Dataset ===

/// A new recording replaced the previous one (channels, length, labels).
#[derive(Clone, Debug)]
pub struct DatasetReplacedEvent {
    pub len: usize,
}

/// The in-memory window or the stream content changed.
#[derive(Clone, Debug)]
pub struct DatasetChangedEvent {
    pub begin: usize,
    pub end: usize,
}

/// Channel visibility or layout changed.
#[derive(Clone, Debug)]
pub struct ChannelsChangedEvent;

// === Segments ===

/// All segments of `mode` were replaced at once (restore, crop, import).
#[derive(Clone, Debug)]
pub struct SegmentsReplacedEvent {
    pub mode: LabelMode,
}

#[derive(Clone, Debug)]
pub struct SegmentAddedEvent {
    pub mode: LabelMode,
    pub id: SegmentId,
}

#[derive(Clone, Debug)]
pub struct SegmentRemovedEvent {
    pub mode: LabelMode,
    pub id: SegmentId,
}

/// Carries only the field(s) the mutation touched.
#[derive(Clone, Debug)]
pub struct SegmentChangedEvent {
    pub mode: LabelMode,
    pub id: SegmentId,
    pub change: SegmentChange,
}

#[derive(Clone, Debug)]
pub struct LabelModeChangedEvent {
    pub mode: LabelMode,
}

// === Animation ===

#[derive(Clone, Debug)]
pub struct AnimationStepEvent {
    pub step: i64,
}

#[derive(Clone, Debug)]
pub struct AnimationStoppedEvent;
