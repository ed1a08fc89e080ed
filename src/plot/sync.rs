//! Plot synchronization: mirrors segments, control spans and the cursor onto
//! the channel plot.
//!
//! The layer keeps its own span table keyed by id and never owns model data;
//! it looks segments up by `(mode, id)` when a notification arrives. All
//! updates only request a redraw. The host collects a [`PlotFrame`] from
//! `tick()` when the rate limiter says one is due, so a burst of drag
//! notifications costs a single redraw per interval.

use std::time::{Duration, Instant};

use indexmap::IndexMap;
use log::{trace, warn};

use crate::core::event_bus::{BoxedEvent, downcast_event};
use crate::core::model::SensorDataModel;
use crate::core::model_events::*;
use crate::core::redraw::RedrawLimiter;
use crate::entities::color::Rgb;
use crate::entities::segment::{LabelMode, SegmentId};
use crate::timeline::events::{SpanVisualEvent, ViewRangeChangedEvent};
use crate::timeline::registry::EntryId;

/// Id of a drawn span.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum VisualKey {
    Label(LabelMode, SegmentId),
    Control(EntryId),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Span {
    pub start: i64,
    pub end: i64,
    pub color: Rgb,
}

/// One visible channel line.
#[derive(Clone, Debug, PartialEq)]
pub struct Trace {
    pub name: String,
    pub color: Rgb,
    /// Recording sample of the first value
    pub offset: usize,
    pub len: usize,
}

/// Snapshot handed to the renderer.
#[derive(Clone, Debug, PartialEq)]
pub struct PlotFrame {
    pub xlim: (i64, i64),
    pub ylim: (f64, f64),
    pub cursor: i64,
    pub spans: Vec<(VisualKey, Span)>,
    pub traces: Vec<Trace>,
}

#[derive(Debug)]
pub struct PlotSync {
    spans: IndexMap<VisualKey, Span>,
    cursor: i64,
    xlim: (i64, i64),
    limiter: RedrawLimiter,
    frames: u64,
}

impl Default for PlotSync {
    fn default() -> Self {
        Self::new(RedrawLimiter::default().interval())
    }
}

impl PlotSync {
    pub fn new(redraw_interval: Duration) -> Self {
        Self {
            spans: IndexMap::new(),
            cursor: 0,
            xlim: (0, 0),
            limiter: RedrawLimiter::new(redraw_interval),
            frames: 0,
        }
    }

    pub fn spans(&self) -> impl Iterator<Item = (&VisualKey, &Span)> {
        self.spans.iter()
    }

    pub fn span(&self, key: &VisualKey) -> Option<&Span> {
        self.spans.get(key)
    }

    pub fn cursor(&self) -> i64 {
        self.cursor
    }

    pub fn xlim(&self) -> (i64, i64) {
        self.xlim
    }

    /// Frames produced so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn is_redraw_pending(&self) -> bool {
        self.limiter.is_pending()
    }

    // === Idempotent span table ===

    /// Insert or replace a span. Re-sending the same span is harmless.
    pub fn upsert_span(&mut self, key: VisualKey, span: Span, now: Instant) {
        if self.spans.get(&key) == Some(&span) {
            return;
        }
        self.spans.insert(key, span);
        self.limiter.request(now);
    }

    pub fn remove_span(&mut self, key: &VisualKey, now: Instant) {
        if self.spans.shift_remove(key).is_some() {
            self.limiter.request(now);
        }
    }

    pub fn set_cursor(&mut self, step: i64, now: Instant) {
        if self.cursor != step {
            self.cursor = step;
            self.limiter.request(now);
        }
    }

    /// Set the visible x range. A range outside the in-memory window is
    /// displayed anyway; the plot just has nothing to show there.
    pub fn set_xlim(&mut self, xmin: i64, xmax: i64, window: (usize, usize), now: Instant) {
        let (begin, end) = (window.0 as i64, window.1 as i64);
        if xmin < begin || xmax > end {
            warn!("x range [{}, {}) outside loaded window [{}, {})", xmin, xmax, begin, end);
        }
        if self.xlim != (xmin, xmax) {
            self.xlim = (xmin, xmax);
            self.limiter.request(now);
        }
    }

    // === Notifications ===

    fn label_span(model: &SensorDataModel, mode: LabelMode, id: SegmentId) -> Option<Span> {
        let seg = model.get_label(mode, id)?;
        Some(Span {
            start: seg.start,
            end: seg.end,
            color: model.label_color(mode, id).visualization(),
        })
    }

    /// Replace every label span with the active mode's segments.
    fn rebuild_labels(&mut self, model: &SensorDataModel, now: Instant) {
        self.spans.retain(|k, _| matches!(k, VisualKey::Control(_)));
        let mode = model.label_mode();
        for seg in model.labels(mode) {
            if let Some(span) = Self::label_span(model, mode, seg.id) {
                self.spans.insert(VisualKey::Label(mode, seg.id), span);
            }
        }
        self.limiter.request(now);
    }

    pub fn handle_event(&mut self, event: &BoxedEvent, model: &SensorDataModel, now: Instant) {
        if downcast_event::<DatasetReplacedEvent>(event).is_some() {
            self.spans.clear();
            self.cursor = model.animation_step();
            let (begin, end) = model.window();
            self.xlim = (begin as i64, end as i64);
            self.rebuild_labels(model, now);
        } else if downcast_event::<DatasetChangedEvent>(event).is_some()
            || downcast_event::<ChannelsChangedEvent>(event).is_some()
        {
            self.limiter.request(now);
        } else if let Some(e) = downcast_event::<SegmentsReplacedEvent>(event) {
            if e.mode == model.label_mode() {
                self.rebuild_labels(model, now);
            }
        } else if downcast_event::<LabelModeChangedEvent>(event).is_some() {
            self.rebuild_labels(model, now);
        } else if let Some(e) = downcast_event::<SegmentAddedEvent>(event) {
            self.sync_label(model, e.mode, e.id, now);
        } else if let Some(e) = downcast_event::<SegmentChangedEvent>(event) {
            self.sync_label(model, e.mode, e.id, now);
        } else if let Some(e) = downcast_event::<SegmentRemovedEvent>(event) {
            self.remove_span(&VisualKey::Label(e.mode, e.id), now);
        } else if let Some(e) = downcast_event::<AnimationStepEvent>(event) {
            self.set_cursor(e.step, now);
        } else if let Some(e) = downcast_event::<ViewRangeChangedEvent>(event) {
            self.set_xlim(e.xmin, e.xmax, model.window(), now);
        } else if let Some(e) = downcast_event::<SpanVisualEvent>(event) {
            match e {
                SpanVisualEvent::Upsert { id, start, end, color } => self.upsert_span(
                    VisualKey::Control(id.clone()),
                    Span {
                        start: *start,
                        end: *end,
                        color: *color,
                    },
                    now,
                ),
                SpanVisualEvent::Remove { id } => self.remove_span(&VisualKey::Control(id.clone()), now),
            }
        }
    }

    fn sync_label(&mut self, model: &SensorDataModel, mode: LabelMode, id: SegmentId, now: Instant) {
        if mode != model.label_mode() {
            return;
        }
        match Self::label_span(model, mode, id) {
            Some(span) => self.upsert_span(VisualKey::Label(mode, id), span, now),
            // Gone by the time the notification arrived
            None => trace!("plot: stale notification for {} {}", mode, id),
        }
    }

    /// Produce a frame if a redraw is due.
    pub fn tick(&mut self, model: &SensorDataModel, now: Instant) -> Option<PlotFrame> {
        if !self.limiter.tick(now) {
            return None;
        }
        self.frames += 1;
        let origin = model.origin();
        let traces = model
            .visible_channels()
            .map(|ch| Trace {
                name: ch.name().to_string(),
                color: ch.color(),
                offset: origin + ch.offset(),
                len: ch.window_len(),
            })
            .collect();
        Some(PlotFrame {
            xlim: self.xlim,
            ylim: model.visible_yspan(),
            cursor: self.cursor,
            spans: self.spans.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            traces,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event_bus::EventBus;
    use crate::core::model::tests::model_with;
    use crate::entities::recording::tests::sample_data;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn route(bus: &EventBus, plot: &mut PlotSync, model: &SensorDataModel, now: Instant) {
        for e in bus.poll() {
            plot.handle_event(&e, model, now);
        }
    }

    #[test]
    fn test_duplicate_upsert_and_remove_are_idempotent() {
        let t0 = Instant::now();
        let mut plot = PlotSync::new(ms(40));
        let key = VisualKey::Control(EntryId::Named("sel".into()));
        let span = Span {
            start: 1,
            end: 4,
            color: Rgb::RED,
        };
        plot.upsert_span(key.clone(), span, t0);
        assert!(plot.tick(&model_with(sample_data(10)).1, t0).is_some());

        plot.upsert_span(key.clone(), span, t0 + ms(50));
        assert!(!plot.is_redraw_pending());
        plot.remove_span(&key, t0 + ms(60));
        plot.remove_span(&key, t0 + ms(61));
        assert_eq!(plot.spans().count(), 0);
    }

    #[test]
    fn test_label_changes_are_mirrored() {
        let (bus, mut model) = model_with(sample_data(100));
        let t0 = Instant::now();
        let mut plot = PlotSync::new(ms(40));
        let id = model.add_segment(10, 20, "wave", LabelMode::Gestures);
        model.move_segment(LabelMode::Gestures, id, None, Some(30));
        route(&bus, &mut plot, &model, t0);

        let span = plot.span(&VisualKey::Label(LabelMode::Gestures, id)).unwrap();
        assert_eq!((span.start, span.end), (10, 30));
        assert_eq!(span.color, model.label_color(LabelMode::Gestures, id).visualization());

        model.remove_segment(LabelMode::Gestures, id);
        route(&bus, &mut plot, &model, t0);
        assert!(plot.span(&VisualKey::Label(LabelMode::Gestures, id)).is_none());
    }

    #[test]
    fn test_inactive_mode_segments_are_not_drawn() {
        let (bus, mut model) = model_with(sample_data(100));
        let mut plot = PlotSync::default();
        model.add_segment(10, 20, "idle", LabelMode::Attention);
        route(&bus, &mut plot, &model, Instant::now());
        assert_eq!(plot.spans().count(), 0);
    }

    #[test]
    fn test_burst_of_moves_yields_one_frame() {
        let (bus, mut model) = model_with(sample_data(100));
        let t0 = Instant::now();
        let mut plot = PlotSync::new(ms(40));
        let id = model.add_segment(10, 20, "wave", LabelMode::Gestures);
        route(&bus, &mut plot, &model, t0);
        assert!(plot.tick(&model, t0).is_some());

        for i in 1..=10 {
            let now = t0 + ms(i);
            model.move_segment(LabelMode::Gestures, id, None, Some(20 + i as i64));
            model.set_animation_step(i as i64);
            route(&bus, &mut plot, &model, now);
            assert!(plot.tick(&model, now).is_none());
        }
        let frame = plot.tick(&model, t0 + ms(40)).unwrap();
        assert_eq!(plot.frames(), 2);
        assert_eq!(frame.cursor, 10);
        assert_eq!(frame.spans[0].1.end, 30);
        assert_eq!(frame.traces.len(), 2);
    }

    #[test]
    fn test_xlim_outside_window_still_applies() {
        let (_bus, model) = model_with(sample_data(100));
        let mut plot = PlotSync::default();
        plot.set_xlim(50, 500, model.window(), Instant::now());
        assert_eq!(plot.xlim(), (50, 500));
    }
}
