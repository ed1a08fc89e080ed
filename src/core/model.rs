//! Sensor data model: the single source of truth for channels, labeled
//! segments and the animation cursor.
//!
//! **Ownership**: the model exclusively owns the recording store, segments
//! and the cursor. The timeline controller and the plot layer receive
//! `&SensorDataModel` / `&mut SensorDataModel` per call and learn about
//! changes through events on the bus.
//!
//! # Coordinates
//!
//! Segment bounds and the cursor are sample indices relative to the model's
//! origin in the recording. The origin is 0 after loading and moves when
//! `load_into_memory` crops the model to a sub-range; `store_labels` writes
//! back at `origin + start`.
//!
//! # Events
//!
//! Every mutation emits typed events (see `model_events`). Segment events are
//! scoped to `(mode, id)`; mutations on unknown ids are silent no-ops.

use std::time::{Duration, Instant};

use indexmap::IndexMap;
use log::{debug, error, info, trace, warn};

use super::event_bus::EventEmitter;
use super::model_events::*;
use super::playback::Playback;
use crate::config::EditorSettings;
use crate::entities::channel::Channel;
use crate::entities::channel_tree::{ChannelTree, NodeId};
use crate::entities::color::{Rgb, channel_colors};
use crate::entities::recording::RecordingStore;
use crate::entities::segment::{LabelMode, Segment, SegmentChange, SegmentId, UNLABELED};
use crate::entities::taxonomy::{LabelTaxonomy, NO_LABEL};
use crate::error::{EditorError, Result};

/// Segments of one label mode, in creation order.
#[derive(Debug, Default)]
struct SegmentTable {
    items: IndexMap<SegmentId, Segment>,
    next_id: u64,
}

impl SegmentTable {
    fn insert(&mut self, mode: LabelMode, start: i64, end: i64, name: &str) -> SegmentId {
        let id = SegmentId(self.next_id);
        self.next_id += 1;
        self.items.insert(id, Segment::new(mode, id, start, end, name));
        id
    }

    fn clear(&mut self) {
        self.items.clear();
        self.next_id = 0;
    }
}

pub struct SensorDataModel {
    emitter: EventEmitter,
    store: Option<Box<dyn RecordingStore>>,
    taxonomy: LabelTaxonomy,
    channels: Vec<Channel>,
    tree: ChannelTree,
    /// Recording index of model sample 0
    origin: usize,
    /// Model sample count
    len: usize,
    /// In-memory window `[begin, end)` in model coordinates
    window: (usize, usize),
    segments: [SegmentTable; 2],
    mode: LabelMode,
    cursor: i64,
    playback: Playback,
    live_interval: Duration,
    live_last_update: Option<Instant>,
}

impl std::fmt::Debug for SensorDataModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorDataModel")
            .field("origin", &self.origin)
            .field("len", &self.len)
            .field("window", &self.window)
            .field("mode", &self.mode)
            .field("cursor", &self.cursor)
            .field("segments", &[self.segments[0].items.len(), self.segments[1].items.len()])
            .finish()
    }
}

impl SensorDataModel {
    pub fn new(emitter: EventEmitter, settings: &EditorSettings) -> Self {
        Self {
            emitter,
            store: None,
            taxonomy: LabelTaxonomy::default(),
            channels: Vec::new(),
            tree: ChannelTree::default(),
            origin: 0,
            len: 0,
            window: (0, 0),
            segments: Default::default(),
            mode: LabelMode::Gestures,
            cursor: 0,
            playback: Playback::new(settings.animation_rate, settings.animation_interval()),
            live_interval: settings.live_update_interval(),
            live_last_update: None,
        }
    }

    // === Recording ===

    /// Replace the recording wholesale. The previous store is dropped before
    /// the new one is installed, so no two handles on one file coexist.
    pub fn set_sensor_data(&mut self, store: Box<dyn RecordingStore>, taxonomy: LabelTaxonomy) {
        self.stop_animation(false);
        if let Some(old) = self.store.take() {
            debug!("closing recording {:?}", old.path());
        }
        self.taxonomy = taxonomy;
        self.origin = 0;
        self.len = store.sample_count();
        self.window = (0, self.len);
        self.store = Some(store);
        self.cursor = 0;
        self.live_last_update = None;
        self.rebuild_channels();
        self.restore_segments();
        info!(
            "recording loaded: {} samples, {} channels, {} gesture / {} attention segments",
            self.len,
            self.channels.len(),
            self.segments[0].items.len(),
            self.segments[1].items.len()
        );
        self.emitter.emit(DatasetReplacedEvent { len: self.len });
        self.emitter.emit(ChannelsChangedEvent);
        for mode in LabelMode::ALL {
            self.emitter.emit(SegmentsReplacedEvent { mode });
        }
        self.emitter.emit(AnimationStepEvent { step: self.cursor });
    }

    /// Release the recording store, returning it to the caller.
    pub fn close(&mut self) -> Option<Box<dyn RecordingStore>> {
        self.stop_animation(false);
        self.store.take()
    }

    pub fn has_recording(&self) -> bool {
        self.store.is_some()
    }

    pub fn store(&self) -> Option<&dyn RecordingStore> {
        self.store.as_deref()
    }

    pub fn taxonomy(&self) -> &LabelTaxonomy {
        &self.taxonomy
    }

    /// Model sample count.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn origin(&self) -> usize {
        self.origin
    }

    /// In-memory window `[begin, end)`.
    pub fn window(&self) -> (usize, usize) {
        self.window
    }

    pub fn data_offset(&self) -> usize {
        self.window.0
    }

    fn rebuild_channels(&mut self) {
        let Some(store) = &self.store else {
            self.channels.clear();
            self.tree = ChannelTree::default();
            return;
        };
        let names = &store.data().channels;
        let colors = channel_colors(names.len());
        self.channels = names
            .iter()
            .zip(colors)
            .enumerate()
            .map(|(i, (name, color))| Channel::new(name.clone(), i + 1, i, color))
            .collect();
        self.tree = ChannelTree::build(&self.channels);
        self.reset_channel_windows();
    }

    fn reset_channel_windows(&mut self) {
        let (begin, end) = self.window;
        for ch in &mut self.channels {
            ch.reset_window(begin, end, self.len);
        }
    }

    // === Channels ===

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Channels with data; empty when no recording is loaded.
    pub fn active_channels(&self) -> &[Channel] {
        if self.store.is_some() { &self.channels } else { &[] }
    }

    pub fn visible_channels(&self) -> impl Iterator<Item = &Channel> {
        self.active_channels().iter().filter(|c| c.is_visible())
    }

    /// Window data of channel `idx`, read on first access.
    pub fn channel_data(&self, idx: usize) -> Option<&[f64]> {
        let store = self.store.as_deref()?;
        Some(self.channels.get(idx)?.data(store.data(), self.origin))
    }

    pub fn channel_tree(&self) -> &ChannelTree {
        &self.tree
    }

    /// Toggle a channel-tree node and mirror the result onto channel visibility.
    pub fn toggle_channel_node(&mut self, node: NodeId) {
        let changed = self.tree.toggle(node);
        if changed.is_empty() {
            return;
        }
        for (idx, visible) in changed {
            if let Some(ch) = self.channels.get_mut(idx) {
                ch.set_visible(visible);
            }
        }
        self.emitter.emit(ChannelsChangedEvent);
    }

    /// Min/max of cached y-limits over visible channels.
    pub fn visible_yspan(&self) -> (f64, f64) {
        self.visible_channels()
            .map(Channel::ylim)
            .reduce(|a, b| (a.0.min(b.0), a.1.max(b.1)))
            .unwrap_or((-1.0, 1.0))
    }

    // === Label mode ===

    pub fn label_mode(&self) -> LabelMode {
        self.mode
    }

    pub fn set_label_mode(&mut self, mode: LabelMode) {
        if self.mode == mode {
            return;
        }
        self.mode = mode;
        debug!("label mode -> {}", mode);
        self.emitter.emit(LabelModeChangedEvent { mode });
    }

    // === Segments ===

    fn table(&self, mode: LabelMode) -> &SegmentTable {
        &self.segments[mode.index()]
    }

    fn table_mut(&mut self, mode: LabelMode) -> &mut SegmentTable {
        &mut self.segments[mode.index()]
    }

    /// Add a segment; callers are responsible for `start < end`.
    pub fn add_segment(&mut self, start: i64, end: i64, name: &str, mode: LabelMode) -> SegmentId {
        let id = self.table_mut(mode).insert(mode, start, end, name);
        trace!("segment {} {} added [{}, {}) '{}'", mode, id, start, end, name);
        self.emitter.emit(SegmentAddedEvent { mode, id });
        id
    }

    pub fn remove_segment(&mut self, mode: LabelMode, id: SegmentId) {
        if self.table_mut(mode).items.shift_remove(&id).is_some() {
            trace!("segment {} {} removed", mode, id);
            self.emitter.emit(SegmentRemovedEvent { mode, id });
        }
    }

    pub fn relabel_segment(&mut self, mode: LabelMode, id: SegmentId, name: &str) {
        let Some(seg) = self.table_mut(mode).items.get_mut(&id) else {
            return;
        };
        seg.name = name.to_string();
        self.emitter.emit(SegmentChangedEvent {
            mode,
            id,
            change: SegmentChange::Name(name.to_string()),
        });
    }

    /// Move one or both bounds. Emits a single event carrying only what was
    /// given; nothing is emitted when neither bound is given.
    pub fn move_segment(&mut self, mode: LabelMode, id: SegmentId, start: Option<i64>, end: Option<i64>) {
        let Some(seg) = self.table_mut(mode).items.get_mut(&id) else {
            return;
        };
        let change = match (start, end) {
            (Some(s), Some(e)) => {
                seg.start = s;
                seg.end = e;
                SegmentChange::Bounds(s, e)
            }
            (Some(s), None) => {
                seg.start = s;
                SegmentChange::Start(s)
            }
            (None, Some(e)) => {
                seg.end = e;
                SegmentChange::End(e)
            }
            (None, None) => return,
        };
        self.emitter.emit(SegmentChangedEvent { mode, id, change });
    }

    pub fn get_label(&self, mode: LabelMode, id: SegmentId) -> Option<&Segment> {
        self.table(mode).items.get(&id)
    }

    /// Segments of `mode` in creation order.
    pub fn get_labels(&self, mode: LabelMode) -> Vec<Segment> {
        self.table(mode).items.values().cloned().collect()
    }

    pub fn labels(&self, mode: LabelMode) -> impl Iterator<Item = &Segment> {
        self.table(mode).items.values()
    }

    /// `(start, end, name)` triples of `mode`, the label export contract.
    pub fn label_triples(&self, mode: LabelMode) -> Vec<(i64, i64, String)> {
        self.labels(mode).map(Segment::triple).collect()
    }

    /// Replace every segment of `mode` (label import).
    pub fn set_labels(&mut self, mode: LabelMode, labels: &[(i64, i64, String)]) {
        let table = self.table_mut(mode);
        table.clear();
        for (start, end, name) in labels {
            if start >= end {
                warn!("skipping degenerate label [{}, {}) '{}'", start, end, name);
                continue;
            }
            table.insert(mode, *start, *end, name);
        }
        self.emitter.emit(SegmentsReplacedEvent { mode });
    }

    pub fn label_color(&self, mode: LabelMode, id: SegmentId) -> Rgb {
        self.get_label(mode, id)
            .map(|s| self.taxonomy.labels(mode).color_of(&s.name))
            .unwrap_or(Rgb::GREY)
    }

    /// Signal rows under a segment.
    pub fn get_segment_data(&self, mode: LabelMode, id: SegmentId) -> Option<&[Vec<f64>]> {
        let store = self.store.as_deref()?;
        let seg = self.get_label(mode, id)?;
        let begin = self.origin + seg.start.max(0) as usize;
        let end = self.origin + seg.end.max(0) as usize;
        Some(store.data().rows(begin, end))
    }

    /// Rebuild segments from the recording's label arrays.
    fn restore_segments(&mut self) {
        for table in &mut self.segments {
            table.clear();
        }
        let Some(store) = self.store.as_deref() else {
            return;
        };
        let data = store.data();
        let gestures = runs(data.target.iter().copied());
        let attention = data
            .attention
            .as_ref()
            .map(|att| runs(att.iter().map(|row| argmax(row) as u16)))
            .unwrap_or_default();

        for (mode, found) in [(LabelMode::Gestures, gestures), (LabelMode::Attention, attention)] {
            let labels = self.taxonomy.labels(mode).clone();
            let table = &mut self.segments[mode.index()];
            for (start, end, code) in found {
                let name = match labels.name_of(code) {
                    Some(n) => n.to_string(),
                    None => {
                        warn!("{} code {} has no name in taxonomy", mode, code);
                        format!("{code}")
                    }
                };
                table.insert(mode, start as i64, end as i64, &name);
            }
        }
    }

    /// Write the active mode's segments into the recording's per-sample
    /// label array and persist it.
    ///
    /// Samples not covered by a segment become "no label". Overlaps resolve
    /// in creation order: the later-created segment wins. I/O failures are
    /// logged and reported as `false`; the model stays usable.
    pub fn store_labels(&mut self) -> bool {
        let mode = self.mode;
        let codes = self.label_codes(mode);
        let Some(store) = self.store.as_deref_mut() else {
            debug!("store_labels: no recording");
            return false;
        };
        let result = match mode {
            LabelMode::Gestures => store.write_target(self.origin, &codes),
            LabelMode::Attention => {
                let width = self.taxonomy.labels(mode).len();
                let rows: Vec<Vec<f32>> = codes
                    .iter()
                    .map(|&c| {
                        let mut row = vec![0.0; width];
                        if let Some(slot) = row.get_mut(c as usize) {
                            *slot = 1.0;
                        }
                        row
                    })
                    .collect();
                store.write_attention(self.origin, &rows)
            }
        }
        .and_then(|_| store.flush());

        match result {
            Ok(()) => {
                info!("stored {} {} labels", self.segments[mode.index()].items.len(), mode);
                true
            }
            Err(e) => {
                error!("failed to store labels: {}", e);
                false
            }
        }
    }

    /// Per-sample codes for `mode` over the model range.
    fn label_codes(&self, mode: LabelMode) -> Vec<u16> {
        let mut codes = vec![NO_LABEL; self.len];
        let labels = self.taxonomy.labels(mode);
        for seg in self.labels(mode) {
            let code = match labels.code_of(&seg.name) {
                Some(c) => c,
                None => {
                    if seg.name != UNLABELED {
                        warn!("label '{}' not in {} taxonomy, stored as no label", seg.name, mode);
                    }
                    NO_LABEL
                }
            };
            let start = seg.start.clamp(0, self.len as i64) as usize;
            let end = seg.end.clamp(0, self.len as i64) as usize;
            if start < end {
                codes[start..end].fill(code);
            }
        }
        codes
    }

    // === Memory window ===

    /// Crop the model to `[begin, end)`.
    ///
    /// Segments of every mode not fully inside the range are dropped; the rest
    /// are re-based so `begin` becomes sample 0. The cursor follows.
    pub fn load_into_memory(&mut self, begin: usize, end: usize) {
        let end = end.min(self.len);
        let begin = begin.min(end);
        self.stop_animation(false);

        for (i, table) in self.segments.iter_mut().enumerate() {
            let before = table.items.len();
            table.items.retain(|_, s| s.is_inside(begin as i64, end as i64));
            for seg in table.items.values_mut() {
                seg.start -= begin as i64;
                seg.end -= begin as i64;
            }
            if before != table.items.len() {
                debug!("crop dropped {} segments in mode {}", before - table.items.len(), i);
            }
        }

        self.origin += begin;
        self.len = end - begin;
        self.window = (0, self.len);
        self.reset_channel_windows();
        self.cursor = (self.cursor - begin as i64).clamp(0, (self.len as i64 - 1).max(0));
        info!("cropped to [{}, {}), origin now {}", begin, end, self.origin);

        self.emitter.emit(DatasetChangedEvent {
            begin: self.window.0,
            end: self.window.1,
        });
        for mode in LabelMode::ALL {
            self.emitter.emit(SegmentsReplacedEvent { mode });
        }
        self.emitter.emit(AnimationStepEvent { step: self.cursor });
    }

    /// Move the in-memory window without touching segments.
    pub fn load_window(&mut self, begin: usize, end: usize) {
        let end = end.min(self.len);
        let begin = begin.min(end);
        if self.window == (begin, end) {
            return;
        }
        self.window = (begin, end);
        self.reset_channel_windows();
        debug!("window -> [{}, {})", begin, end);
        self.emitter.emit(DatasetChangedEvent { begin, end });
    }

    // === Animation ===

    pub fn animation_step(&self) -> i64 {
        self.cursor
    }

    pub fn is_in_animation(&self) -> bool {
        self.playback.is_running()
    }

    pub fn start_animation(&mut self) {
        self.start_animation_at(Instant::now());
    }

    /// Start playback from the current cursor. No-op when already running or
    /// when there is no channel data.
    pub fn start_animation_at(&mut self, now: Instant) {
        if self.active_channels().is_empty() {
            debug!("start_animation: no channel data");
            return;
        }
        self.playback.start(now, self.cursor);
    }

    /// Advance playback; stops at the end of the in-memory window.
    /// Returns the new cursor when it moved.
    pub fn tick_animation(&mut self, now: Instant) -> Option<i64> {
        let step = self.playback.tick(now)?;
        if step < self.window.1 as i64 {
            if step == self.cursor {
                return None;
            }
            self.cursor = step;
            self.emitter.emit(AnimationStepEvent { step });
            Some(step)
        } else {
            self.playback.stop();
            self.emitter.emit(AnimationStoppedEvent);
            None
        }
    }

    /// Jump the cursor. Negative values count from the end (clamped at 0);
    /// positive values pass through unclamped. Stops playback first.
    pub fn set_animation_step(&mut self, i: i64) {
        self.stop_animation(false);
        self.cursor = if i >= 0 { i } else { (self.len as i64 + i).max(0) };
        self.emitter.emit(AnimationStepEvent { step: self.cursor });
    }

    pub fn stop_animation(&mut self, reset: bool) {
        if self.playback.stop() {
            self.emitter.emit(AnimationStoppedEvent);
        }
        if reset {
            self.cursor = 0;
            self.emitter.emit(AnimationStepEvent { step: 0 });
        }
    }

    // === Live data ===

    /// Append samples to a streaming recording.
    ///
    /// Dataset notifications and the jump-to-end are throttled to one per
    /// live update interval.
    pub fn append_samples(&mut self, rows: Vec<Vec<f64>>, now: Instant) -> Result<()> {
        let store = self.store.as_deref_mut().ok_or(EditorError::NoRecording)?;
        let following = self.window.1 == self.len;
        let first = self.len == 0;
        let added = rows.len();
        let observed: Vec<(usize, f64)> = rows
            .iter()
            .flat_map(|r| r.iter().copied().enumerate())
            .collect();
        store.append(rows)?;
        self.len += added;
        if following {
            self.window.1 = self.len;
        }
        if first || self.channels.is_empty() {
            self.rebuild_channels();
            self.emitter.emit(ChannelsChangedEvent);
        } else {
            self.reset_channel_windows();
        }
        for (col, value) in observed {
            if let Some(ch) = self.channels.get_mut(col) {
                ch.observe(value);
            }
        }

        let due = self
            .live_last_update
            .is_none_or(|last| now.saturating_duration_since(last) >= self.live_interval);
        if due {
            self.set_animation_step(-1);
            self.emitter.emit(DatasetChangedEvent {
                begin: self.window.0,
                end: self.window.1,
            });
            self.live_last_update = Some(now);
        }
        Ok(())
    }
}

/// Maximal runs of a non-zero code: `(start, end, code)`.
pub(crate) fn runs(codes: impl Iterator<Item = u16>) -> Vec<(usize, usize, u16)> {
    let mut out = Vec::new();
    let mut open: Option<(usize, u16)> = None;
    let mut n = 0;
    for (i, code) in codes.enumerate() {
        n = i + 1;
        match open {
            Some((_, c)) if c == code => {}
            Some((start, c)) => {
                out.push((start, i, c));
                open = (code != NO_LABEL).then_some((i, code));
            }
            None if code != NO_LABEL => open = Some((i, code)),
            None => {}
        }
    }
    if let Some((start, c)) = open {
        out.push((start, n, c));
    }
    out
}

fn argmax(row: &[f32]) -> usize {
    row.iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
        .0
}
