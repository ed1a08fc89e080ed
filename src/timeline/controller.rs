//! Timeline controller: pointer gestures on the two timelines and the plot.
//!
//! Owns the tab registry and mirrors the model's segments of the active
//! label mode onto the local timeline (with global shadows). The model is
//! passed in per call, like the player takes the project.
//!
//! # Drag lifecycle
//!
//! `Idle -> Pressed -> Dragging -> Idle`. Press latches the grabbed handle
//! and the cursor; every drag step re-applies the partner constraint and
//! pushes the result into the model; release commits, notifies and restores.
//!
//! Dragging a local segment endpoint makes the animation cursor follow the
//! pointer; the cursor snaps back on release. Dragging the animation tab
//! itself moves the cursor for good.

use std::collections::HashMap;

use log::{debug, trace, warn};

use super::events::{BoundaryChangedEvent, SpanVisualEvent, ViewRangeChangedEvent};
use super::registry::{
    ANIMATION_TAB, ControlSegment, Endpoint, EntryId, SELECTION, SegmentRole, SegmentSpec, TabRegistry, VIEW_WINDOW,
};
use crate::config::EditorSettings;
use crate::core::coords::{CoordinateMapper, Domain};
use crate::core::event_bus::{BoxedEvent, EventEmitter, downcast_event};
use crate::core::model::SensorDataModel;
use crate::core::model_events::*;
use crate::entities::color::Rgb;
use crate::entities::segment::{LabelMode, SegmentChange, SegmentId, UNLABELED};
use crate::entities::taxonomy::LabelSet;
use crate::error::{EditorError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Button {
    Left,
    Right,
}

/// Handed to release callbacks. Only the side that was dragged is set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SegmentRelease {
    pub start: Option<i64>,
    pub end: Option<i64>,
}

/// Asks the user for a label name; `None` declines and discards the segment.
pub type LabelPrompt = Box<dyn FnMut(&LabelSet, (i64, i64)) -> Option<String>>;
pub type ReleaseCallback = Box<dyn FnMut(SegmentRelease)>;

/// Handle latched at press time.
#[derive(Clone, Debug, PartialEq)]
pub struct Grab {
    pub domain: Domain,
    pub tab: EntryId,
    pub segment: Option<(EntryId, Endpoint)>,
    /// Tab position at press
    pub origin: i64,
    /// Animation cursor at press
    pub cursor: i64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum DragState {
    #[default]
    Idle,
    Pressed(Grab),
    Dragging(Grab),
    /// Right-button selection on a timeline
    Selecting { domain: Domain, anchor: i64 },
    /// Left-button segment creation on the plot
    Drawing {
        mode: LabelMode,
        id: SegmentId,
        anchor: i64,
        cursor: i64,
    },
}

pub struct TimelineController {
    emitter: EventEmitter,
    registry: TabRegistry,
    /// Recording length, the global domain
    len: usize,
    mode: LabelMode,
    max_span: i64,
    selection_width: i64,
    grab_tolerance: f64,
    drag: DragState,
    label_prompt: Option<LabelPrompt>,
    on_release: HashMap<(Domain, EntryId), ReleaseCallback>,
}

impl std::fmt::Debug for TimelineController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimelineController")
            .field("len", &self.len)
            .field("mode", &self.mode)
            .field("view", &self.view_range())
            .field("drag", &self.drag)
            .field("has_label_prompt", &self.label_prompt.is_some())
            .finish()
    }
}

impl TimelineController {
    pub fn new(emitter: EventEmitter, settings: &EditorSettings) -> Self {
        let mut ctl = Self {
            emitter,
            registry: TabRegistry::new(),
            len: 0,
            mode: LabelMode::default(),
            max_span: settings.max_view_span.max(1),
            selection_width: settings.selection_width.max(1),
            grab_tolerance: settings.grab_tolerance,
            drag: DragState::Idle,
            label_prompt: None,
            on_release: HashMap::new(),
        };
        ctl.install_defaults(0);
        ctl
    }

    /// Fresh registry holding only the animation tab and the view window.
    fn install_defaults(&mut self, cursor: i64) {
        self.registry.clear();
        let view_end = (self.len as i64).min(self.max_span);
        let anim = self.registry.add_tab(Domain::Local, Some(ANIMATION_TAB), cursor, Rgb::BLACK, false);
        let view = self.registry.add_segment(
            Domain::Global,
            Some(VIEW_WINDOW),
            SegmentSpec {
                start: 0,
                end: view_end,
                color: Rgb::GREY,
                role: SegmentRole::ViewWindow,
                visualize: false,
                global_shadow: false,
            },
        );
        if let Err(e) = anim.and(view) {
            warn!("timeline defaults not installed: {}", e);
        }
    }

    // === Accessors ===

    pub fn registry(&self) -> &TabRegistry {
        &self.registry
    }

    pub fn drag_state(&self) -> &DragState {
        &self.drag
    }

    pub fn label_mode(&self) -> LabelMode {
        self.mode
    }

    /// Visible range `[xmin, xmax)` held by the view-window segment.
    pub fn view_range(&self) -> (i64, i64) {
        self.registry
            .segment_bounds(Domain::Global, &VIEW_WINDOW)
            .unwrap_or((0, self.len as i64))
    }

    pub fn mapper(&self) -> CoordinateMapper {
        let (xmin, xmax) = self.view_range();
        CoordinateMapper::new(xmin, xmax, self.len)
    }

    fn clamp_to_view(&self, x: i64) -> i64 {
        let (xmin, xmax) = self.view_range();
        x.clamp(xmin, (xmax - 1).max(xmin))
    }

    // === Callbacks ===

    pub fn set_label_prompt<F>(&mut self, prompt: F)
    where
        F: FnMut(&LabelSet, (i64, i64)) -> Option<String> + 'static,
    {
        self.label_prompt = Some(Box::new(prompt));
    }

    /// Register a callback fired when a handle of segment `id` is released.
    pub fn on_release<F>(&mut self, domain: Domain, id: EntryId, callback: F)
    where
        F: FnMut(SegmentRelease) + 'static,
    {
        self.on_release.insert((domain, id), Box::new(callback));
    }

    // === Custom entries ===

    pub fn add_tab(&mut self, domain: Domain, id: Option<EntryId>, pos: i64, color: Rgb, global_shadow: bool) -> Result<EntryId> {
        let id = self.registry.add_tab(domain, id, pos, color, global_shadow)?;
        self.refresh_tab_visibility();
        Ok(id)
    }

    /// Add a user segment. The role is always `Custom`.
    pub fn add_segment(&mut self, domain: Domain, id: Option<EntryId>, spec: SegmentSpec) -> Result<EntryId> {
        let spec = SegmentSpec {
            role: SegmentRole::Custom,
            ..spec
        };
        let id = self.registry.add_segment(domain, id, spec)?;
        self.refresh_tab_visibility();
        self.emit_visual(domain, &id);
        Ok(id)
    }

    pub fn remove_tab(&mut self, domain: Domain, id: &EntryId) {
        self.registry.remove_tab(domain, id);
    }

    pub fn remove_segment(&mut self, domain: Domain, id: &EntryId) {
        let visual = self.registry.segment(domain, id).is_some_and(|s| s.visualize);
        self.registry.remove_segment(domain, id);
        self.on_release.remove(&(domain, id.clone()));
        if visual {
            self.emitter.emit(SpanVisualEvent::Remove { id: id.clone() });
        }
    }

    /// Nearest interactive tab within grab tolerance of `rel`.
    pub fn tab_at(&self, domain: Domain, rel: f64) -> Option<EntryId> {
        let mapper = self.mapper();
        self.registry
            .tabs(domain)
            .filter(|t| t.is_interactive())
            .map(|t| ((mapper.to_relative(t.pos, domain) - rel).abs(), t))
            .filter(|(dist, _)| *dist <= self.grab_tolerance)
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, t)| t.id.clone())
    }

    // === Timeline pointer ===

    /// Pointer press on a timeline. Returns true if a gesture started.
    pub fn press(&mut self, domain: Domain, rel: f64, button: Button, model: &SensorDataModel) -> bool {
        if !matches!(self.drag, DragState::Idle) {
            trace!("press ignored, gesture in progress");
            return false;
        }
        match button {
            Button::Left => match self.tab_at(domain, rel) {
                Some(id) => self.press_tab(domain, &id, model),
                None => false,
            },
            Button::Right => {
                if self.len == 0 {
                    return false;
                }
                self.begin_selection(domain, rel)
            }
        }
    }

    pub fn press_tab(&mut self, domain: Domain, id: &EntryId, model: &SensorDataModel) -> bool {
        let Some(tab) = self.registry.tab(domain, id) else {
            return false;
        };
        if !tab.is_interactive() {
            return false;
        }
        debug!("grab {} on {} at {}", id, domain, tab.pos);
        self.drag = DragState::Pressed(Grab {
            domain,
            tab: id.clone(),
            segment: tab.owner.clone(),
            origin: tab.pos,
            cursor: model.animation_step(),
        });
        true
    }

    pub fn drag(&mut self, rel: f64, model: &mut SensorDataModel) {
        match std::mem::take(&mut self.drag) {
            DragState::Pressed(grab) | DragState::Dragging(grab) => {
                let target = self.mapper().to_absolute(rel, grab.domain);
                self.drag_tab(&grab, target, model);
                self.drag = DragState::Dragging(grab);
            }
            DragState::Selecting { domain, anchor } => {
                let x = self.mapper().to_absolute(rel, domain);
                self.update_selection(domain, anchor, x);
                self.drag = DragState::Selecting { domain, anchor };
            }
            other => self.drag = other,
        }
    }

    pub fn release(&mut self, rel: f64, model: &mut SensorDataModel) {
        match std::mem::take(&mut self.drag) {
            DragState::Pressed(grab) => self.finish_grab(grab, false, model),
            DragState::Dragging(grab) => {
                let target = self.mapper().to_absolute(rel, grab.domain);
                self.drag_tab(&grab, target, model);
                self.finish_grab(grab, true, model);
            }
            DragState::Selecting { domain, anchor } => {
                let x = self.mapper().to_absolute(rel, domain);
                self.finish_selection(domain, anchor, x, model);
            }
            other => self.drag = other,
        }
    }

    fn drag_tab(&mut self, grab: &Grab, target: i64, model: &mut SensorDataModel) {
        let domain = grab.domain;
        let Some((seg_id, endpoint)) = grab.segment.clone() else {
            if grab.tab == ANIMATION_TAB {
                let pos = self.clamp_to_view(target);
                self.registry.move_tab(domain, &grab.tab, pos);
                model.set_animation_step(pos);
            } else {
                self.registry.move_tab(domain, &grab.tab, target);
            }
            return;
        };

        let (pos, corrected) = self.registry.constrain(domain, &grab.tab, target);
        if corrected {
            warn!("{} {:?} corrected from {} to {} to keep the segment non-empty", seg_id, endpoint, target, pos);
        }
        self.registry.move_tab(domain, &grab.tab, pos);

        match self.registry.segment(domain, &seg_id).map(|s| s.role) {
            Some(SegmentRole::ViewWindow) => self.cap_view_span(endpoint),
            Some(SegmentRole::Label { mode, id }) => match endpoint {
                Endpoint::Start => model.move_segment(mode, id, Some(pos), None),
                Endpoint::End => model.move_segment(mode, id, None, Some(pos)),
            },
            _ => {}
        }
        self.emit_visual(domain, &seg_id);

        if domain == Domain::Local {
            model.set_animation_step(pos);
            self.registry.move_tab(Domain::Local, &ANIMATION_TAB, pos);
        }
        self.refresh_tab_visibility();
    }

    /// Drag the other view-window edge along when the span exceeds the cap.
    fn cap_view_span(&mut self, moved: Endpoint) {
        let Some((start, end)) = self.registry.segment_bounds(Domain::Global, &VIEW_WINDOW) else {
            return;
        };
        if end - start <= self.max_span {
            return;
        }
        match moved {
            Endpoint::End => {
                self.registry
                    .set_segment_bounds(Domain::Global, &VIEW_WINDOW, Some(end - self.max_span), None)
            }
            Endpoint::Start => {
                self.registry
                    .set_segment_bounds(Domain::Global, &VIEW_WINDOW, None, Some(start + self.max_span))
            }
        }
    }

    fn finish_grab(&mut self, grab: Grab, moved: bool, model: &mut SensorDataModel) {
        let Some(pos) = self.registry.tab(grab.domain, &grab.tab).map(|t| t.pos) else {
            return;
        };
        if pos != grab.origin {
            self.emitter.emit(BoundaryChangedEvent {
                domain: grab.domain,
                tab: grab.tab.clone(),
                segment: grab.segment.clone(),
                position: pos,
            });
        }
        let Some((seg_id, endpoint)) = grab.segment else {
            return;
        };

        let release = match endpoint {
            Endpoint::Start => SegmentRelease {
                start: Some(pos),
                end: None,
            },
            Endpoint::End => SegmentRelease {
                start: None,
                end: Some(pos),
            },
        };
        if let Some(callback) = self.on_release.get_mut(&(grab.domain, seg_id.clone())) {
            callback(release);
        }

        if grab.domain == Domain::Local && moved {
            model.set_animation_step(grab.cursor);
            self.registry.move_tab(Domain::Local, &ANIMATION_TAB, grab.cursor);
        }
        if self.registry.segment(grab.domain, &seg_id).map(|s| s.role) == Some(SegmentRole::ViewWindow) {
            self.commit_view_window(model);
        }
    }

    /// Apply the view window to the model: clamp the cursor into it and load
    /// the range into memory.
    pub fn commit_view_window(&mut self, model: &mut SensorDataModel) {
        let (xmin, xmax) = self.view_range();
        let cursor = model.animation_step();
        let clamped = self.clamp_to_view(cursor);
        if clamped != cursor {
            model.set_animation_step(clamped);
            self.registry.move_tab(Domain::Local, &ANIMATION_TAB, clamped);
        }
        model.load_window(xmin.max(0) as usize, xmax.max(0) as usize);
        self.refresh_tab_visibility();
        debug!("view window [{}, {})", xmin, xmax);
        self.emitter.emit(ViewRangeChangedEvent { xmin, xmax });
    }

    /// Local handles outside the view window cannot be grabbed.
    fn refresh_tab_visibility(&mut self) {
        let (xmin, xmax) = self.view_range();
        let updates: Vec<(EntryId, bool)> = self
            .registry
            .tabs(Domain::Local)
            .filter_map(|t| {
                let visible = (xmin..=xmax).contains(&t.pos);
                (t.visible != visible).then(|| (t.id.clone(), visible))
            })
            .collect();
        for (id, visible) in updates {
            trace!("tab {} {}", id, if visible { "shown" } else { "hidden" });
            self.registry.set_tab_visible(Domain::Local, &id, visible);
        }
    }

    // === Selection ===

    fn begin_selection(&mut self, domain: Domain, rel: f64) -> bool {
        let anchor = self.mapper().to_absolute(rel, domain);
        self.remove_selection();
        let spec = SegmentSpec {
            start: anchor,
            end: anchor + self.selection_width,
            color: Rgb::RED,
            role: SegmentRole::Selection,
            visualize: true,
            global_shadow: true,
        };
        match self.registry.add_segment(domain, Some(SELECTION), spec) {
            Ok(_) => {
                self.emit_visual(domain, &SELECTION);
                self.drag = DragState::Selecting { domain, anchor };
                true
            }
            Err(e) => {
                warn!("selection not started: {}", e);
                false
            }
        }
    }

    fn update_selection(&mut self, domain: Domain, anchor: i64, x: i64) {
        let (start, end) = ordered(anchor, x);
        self.registry.set_segment_bounds(domain, &SELECTION, Some(start), Some(end));
        self.emit_visual(domain, &SELECTION);
    }

    fn remove_selection(&mut self) {
        for domain in Domain::ALL {
            if self.registry.segment(domain, &SELECTION).is_some_and(|s| !s.is_shadow) {
                self.registry.remove_segment(domain, &SELECTION);
                self.emitter.emit(SpanVisualEvent::Remove { id: SELECTION });
            }
        }
    }

    /// The released selection becomes the new view window.
    fn finish_selection(&mut self, domain: Domain, anchor: i64, x: i64, model: &mut SensorDataModel) {
        self.update_selection(domain, anchor, x);
        let bounds = self.registry.segment_bounds(domain, &SELECTION);
        self.remove_selection();
        let Some((start, end)) = bounds else {
            return;
        };
        let len = self.len as i64;
        let start = start.clamp(0, len);
        let end = end.min(start + self.max_span).clamp(start, len);
        debug!("selection [{}, {}) becomes the view window", start, end);
        self.registry
            .set_segment_bounds(Domain::Global, &VIEW_WINDOW, Some(start), Some(end));
        self.commit_view_window(model);
    }

    // === Plot pointer ===

    /// Start drawing a new segment of the active mode at sample `x`.
    ///
    /// Fails with `MissingCallback` when no label prompt is registered, since
    /// the release could not name the segment.
    pub fn press_plot(&mut self, x: i64, button: Button, model: &mut SensorDataModel) -> Result<bool> {
        if button != Button::Left || !model.has_recording() || !matches!(self.drag, DragState::Idle) {
            return Ok(false);
        }
        if self.label_prompt.is_none() {
            return Err(EditorError::MissingCallback("label prompt"));
        }
        let mode = model.label_mode();
        let cursor = model.animation_step();
        let id = model.add_segment(x, x + 1, UNLABELED, mode);
        debug!("drawing {} segment {} from {}", mode, id, x);
        self.drag = DragState::Drawing {
            mode,
            id,
            anchor: x,
            cursor,
        };
        Ok(true)
    }

    pub fn drag_plot(&mut self, x: i64, model: &mut SensorDataModel) {
        let DragState::Drawing { mode, id, anchor, .. } = self.drag else {
            return;
        };
        if x == anchor {
            warn!("zero-length segment corrected to [{}, {})", anchor, anchor + 1);
        }
        let (start, end) = ordered(anchor, x);
        model.move_segment(mode, id, Some(start), Some(end));
        model.set_animation_step(x);
    }

    /// Finish drawing: ask for a label, keep or discard, restore the cursor.
    pub fn release_plot(&mut self, x: i64, model: &mut SensorDataModel) {
        if !matches!(self.drag, DragState::Drawing { .. }) {
            return;
        }
        self.drag_plot(x, model);
        let DragState::Drawing { mode, id, cursor, .. } = std::mem::take(&mut self.drag) else {
            return;
        };
        let Some(bounds) = model.get_label(mode, id).map(|s| s.bounds()) else {
            return;
        };
        let labels = model.taxonomy().labels(mode).clone();
        let answer = self.label_prompt.as_mut().and_then(|prompt| prompt(&labels, bounds));
        match answer {
            Some(name) => model.relabel_segment(mode, id, &name),
            None => {
                debug!("label prompt declined, dropping {}", id);
                model.remove_segment(mode, id);
            }
        }
        model.set_animation_step(self.clamp_to_view(cursor));
    }

    // === Model notifications ===

    /// Keep the registry in step with the model.
    pub fn handle_event(&mut self, event: &BoxedEvent, model: &mut SensorDataModel) {
        if downcast_event::<DatasetReplacedEvent>(event).is_some() {
            self.on_dataset_replaced(model);
        } else if downcast_event::<DatasetChangedEvent>(event).is_some() {
            self.on_dataset_changed(model);
        } else if let Some(e) = downcast_event::<SegmentsReplacedEvent>(event) {
            if e.mode == self.mode {
                self.mirror_labels(model);
            }
        } else if let Some(e) = downcast_event::<SegmentAddedEvent>(event) {
            if e.mode == self.mode {
                self.mirror_label(e.mode, e.id, model);
            }
        } else if let Some(e) = downcast_event::<SegmentRemovedEvent>(event) {
            self.registry.remove_segment(Domain::Local, &EntryId::Label(e.mode, e.id));
        } else if let Some(e) = downcast_event::<SegmentChangedEvent>(event) {
            self.sync_label(e.mode, e.id, &e.change, model);
        } else if let Some(e) = downcast_event::<LabelModeChangedEvent>(event) {
            self.mode = e.mode;
            self.mirror_labels(model);
        } else if let Some(e) = downcast_event::<AnimationStepEvent>(event) {
            self.registry.move_tab(Domain::Local, &ANIMATION_TAB, e.step);
            self.refresh_tab_visibility();
        }
    }

    fn on_dataset_replaced(&mut self, model: &mut SensorDataModel) {
        self.drag = DragState::Idle;
        self.len = model.len();
        self.mode = model.label_mode();
        self.install_defaults(model.animation_step());
        self.mirror_labels(model);
        self.commit_view_window(model);
    }

    /// Length changes come from a crop or a live append; plain window moves
    /// leave the length alone and need nothing here.
    fn on_dataset_changed(&mut self, model: &mut SensorDataModel) {
        let old = self.len as i64;
        let len = model.len() as i64;
        if len == old {
            return;
        }
        self.len = model.len();
        let (xmin, xmax) = self.view_range();
        let (start, end) = if len > old && xmax == old {
            // following a stream: keep the right edge on the newest sample
            ((len - self.max_span).max(xmin), len)
        } else {
            (0, len.min(self.max_span))
        };
        self.registry
            .set_segment_bounds(Domain::Global, &VIEW_WINDOW, Some(start), Some(end));
        self.commit_view_window(model);
    }

    fn is_label(seg: &ControlSegment) -> bool {
        matches!(seg.role, SegmentRole::Label { .. })
    }

    fn mirror_labels(&mut self, model: &SensorDataModel) {
        for id in self.registry.segment_ids_where(Domain::Local, Self::is_label) {
            self.registry.remove_segment(Domain::Local, &id);
        }
        let ids: Vec<SegmentId> = model.labels(self.mode).map(|s| s.id).collect();
        for id in ids {
            self.mirror_label(self.mode, id, model);
        }
    }

    fn mirror_label(&mut self, mode: LabelMode, id: SegmentId, model: &SensorDataModel) {
        let Some(seg) = model.get_label(mode, id) else {
            return;
        };
        let key = EntryId::Label(mode, id);
        if self.registry.segment(Domain::Local, &key).is_some() {
            self.registry
                .set_segment_bounds(Domain::Local, &key, Some(seg.start), Some(seg.end));
            self.refresh_tab_visibility();
            return;
        }
        let spec = SegmentSpec {
            start: seg.start,
            end: seg.end,
            color: model.label_color(mode, id),
            role: SegmentRole::Label { mode, id },
            visualize: false,
            global_shadow: true,
        };
        if let Err(e) = self.registry.add_segment(Domain::Local, Some(key), spec) {
            warn!("cannot mirror segment {}: {}", id, e);
        }
        self.refresh_tab_visibility();
    }

    fn sync_label(&mut self, mode: LabelMode, id: SegmentId, change: &SegmentChange, model: &SensorDataModel) {
        let Some(seg) = model.get_label(mode, id) else {
            return;
        };
        let key = EntryId::Label(mode, id);
        match change {
            SegmentChange::Name(_) => {
                self.registry
                    .set_segment_color(Domain::Local, &key, model.label_color(mode, id))
            }
            _ => {
                self.registry
                    .set_segment_bounds(Domain::Local, &key, Some(seg.start), Some(seg.end));
                self.refresh_tab_visibility();
            }
        }
    }

    fn emit_visual(&self, domain: Domain, id: &EntryId) {
        let Some(seg) = self.registry.segment(domain, id) else {
            return;
        };
        if !seg.visualize {
            return;
        }
        if let Some((start, end)) = self.registry.segment_bounds(domain, id) {
            self.emitter.emit(SpanVisualEvent::Upsert {
                id: id.clone(),
                start,
                end,
                color: seg.color.visualization(),
            });
        }
    }
}

/// Non-empty `[start, end)` spanned by two pointer positions.
fn ordered(a: i64, b: i64) -> (i64, i64) {
    if a == b { (a, a + 1) } else { (a.min(b), a.max(b)) }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::core::event_bus::EventBus;
    use crate::core::model::tests::taxonomy_for;
    use crate::entities::recording::MemoryRecording;
    use crate::entities::recording::tests::sample_data;

    fn settings() -> EditorSettings {
        EditorSettings {
            max_view_span: 100,
            ..Default::default()
        }
    }

    fn setup(n: usize) -> (EventBus, SensorDataModel, TimelineController) {
        setup_with(n, settings())
    }

    fn setup_with(n: usize, settings: EditorSettings) -> (EventBus, SensorDataModel, TimelineController) {
        let bus = EventBus::new();
        let mut model = SensorDataModel::new(bus.emitter(), &settings);
        let mut ctl = TimelineController::new(bus.emitter(), &settings);
        let data = sample_data(n);
        let tax = taxonomy_for(&data);
        model.set_sensor_data(Box::new(MemoryRecording::new(data).unwrap()), tax);
        pump(&bus, &mut ctl, &mut model);
        (bus, model, ctl)
    }

    fn pump(bus: &EventBus, ctl: &mut TimelineController, model: &mut SensorDataModel) -> Vec<BoxedEvent> {
        let mut seen = Vec::new();
        loop {
            let events = bus.poll();
            if events.is_empty() {
                return seen;
            }
            for e in &events {
                ctl.handle_event(e, model);
            }
            seen.extend(events);
        }
    }

    fn label_tabs(ctl: &TimelineController, id: SegmentId) -> (EntryId, EntryId) {
        let seg = ctl
            .registry()
            .segment(Domain::Local, &EntryId::Label(LabelMode::Gestures, id))
            .unwrap();
        (seg.start_tab.clone(), seg.end_tab.clone())
    }

    #[test]
    fn test_defaults_after_load() {
        let (_bus, model, ctl) = setup(1000);
        assert_eq!(ctl.view_range(), (0, 100));
        assert_eq!(model.window(), (0, 100));
        assert_eq!(ctl.registry().tab(Domain::Local, &ANIMATION_TAB).unwrap().pos, 0);
    }

    #[test]
    fn test_label_segments_are_mirrored_with_shadow() {
        let (bus, mut model, mut ctl) = setup(1000);
        let id = model.add_segment(10, 20, "wave", LabelMode::Gestures);
        pump(&bus, &mut ctl, &mut model);

        let key = EntryId::Label(LabelMode::Gestures, id);
        assert_eq!(ctl.registry().segment_bounds(Domain::Local, &key), Some((10, 20)));
        assert!(ctl.registry().segment(Domain::Global, &key).unwrap().is_shadow);

        model.remove_segment(LabelMode::Gestures, id);
        pump(&bus, &mut ctl, &mut model);
        assert!(ctl.registry().segment(Domain::Local, &key).is_none());
        assert!(ctl.registry().segment(Domain::Global, &key).is_none());
    }

    #[test]
    fn test_stale_add_after_remove_is_ignored() {
        let (bus, mut model, mut ctl) = setup(100);
        let id = model.add_segment(10, 20, "wave", LabelMode::Gestures);
        model.remove_segment(LabelMode::Gestures, id);
        pump(&bus, &mut ctl, &mut model);
        assert_eq!(ctl.registry().segments(Domain::Local).count(), 0);
    }

    #[test]
    fn test_drag_start_onto_end_nudges_and_restores_cursor() {
        let (bus, mut model, mut ctl) = setup(1000);
        let id = model.add_segment(10, 20, "wave", LabelMode::Gestures);
        model.set_animation_step(50);
        pump(&bus, &mut ctl, &mut model);

        let released = Rc::new(RefCell::new(Vec::new()));
        let sink = released.clone();
        ctl.on_release(Domain::Local, EntryId::Label(LabelMode::Gestures, id), move |r| {
            sink.borrow_mut().push(r)
        });

        assert!(ctl.press(Domain::Local, 0.1, Button::Left, &model));
        ctl.drag(0.2, &mut model);
        assert_eq!(model.get_label(LabelMode::Gestures, id).unwrap().bounds(), (19, 20));
        assert_eq!(model.animation_step(), 19);

        ctl.release(0.2, &mut model);
        let events = pump(&bus, &mut ctl, &mut model);
        assert_eq!(model.animation_step(), 50);
        assert_eq!(model.get_label(LabelMode::Gestures, id).unwrap().bounds(), (19, 20));

        let boundary: Vec<&BoundaryChangedEvent> = events
            .iter()
            .filter_map(|e| downcast_event::<BoundaryChangedEvent>(e))
            .collect();
        assert_eq!(boundary.len(), 1);
        assert_eq!(boundary[0].position, 19);
        assert_eq!(boundary[0].segment.as_ref().unwrap().1, Endpoint::Start);
        assert_eq!(
            *released.borrow(),
            vec![SegmentRelease {
                start: Some(19),
                end: None
            }]
        );
        assert!(matches!(ctl.drag_state(), DragState::Idle));
    }

    #[test]
    fn test_drag_end_past_start_nudges_forward() {
        let (bus, mut model, mut ctl) = setup(1000);
        let id = model.add_segment(10, 20, "wave", LabelMode::Gestures);
        pump(&bus, &mut ctl, &mut model);
        let (_, end_tab) = label_tabs(&ctl, id);

        assert!(ctl.press_tab(Domain::Local, &end_tab, &model));
        ctl.drag(0.05, &mut model);
        assert_eq!(model.get_label(LabelMode::Gestures, id).unwrap().bounds(), (10, 11));
        ctl.release(0.05, &mut model);
        pump(&bus, &mut ctl, &mut model);
        let (_, end_tab) = label_tabs(&ctl, id);
        assert_eq!(ctl.registry().tab(Domain::Local, &end_tab).unwrap().pos, 11);
    }

    fn assert_non_empty(ctl: &TimelineController, model: &SensorDataModel, id: SegmentId, rel: f64) {
        let (start, end) = model.get_label(LabelMode::Gestures, id).unwrap().bounds();
        assert!(end - start >= 1, "model [{start}, {end}) after drag to {rel}");
        let key = EntryId::Label(LabelMode::Gestures, id);
        let (start, end) = ctl.registry().segment_bounds(Domain::Local, &key).unwrap();
        assert!(end - start >= 1, "handles [{start}, {end}) after drag to {rel}");
    }

    #[test]
    fn test_segment_stays_non_empty_across_drag_sweep() {
        let (bus, mut model, mut ctl) = setup(1000);
        let id = model.add_segment(40, 60, "wave", LabelMode::Gestures);
        pump(&bus, &mut ctl, &mut model);

        for pick_end in [false, true] {
            let (start_tab, end_tab) = label_tabs(&ctl, id);
            let tab = if pick_end { end_tab } else { start_tab };
            assert!(ctl.press_tab(Domain::Local, &tab, &model));

            let up = (0..=100).map(|i| i as f64 / 100.0);
            let down = (0..=100).rev().map(|i| i as f64 / 100.0);
            let jumps = (0..20).map(|i| if i % 2 == 0 { 0.0 } else { 1.0 });
            for rel in up.chain(down).chain(jumps) {
                ctl.drag(rel, &mut model);
                assert_non_empty(&ctl, &model, id, rel);
            }
            ctl.release(0.5, &mut model);
            pump(&bus, &mut ctl, &mut model);
            assert_non_empty(&ctl, &model, id, 0.5);
        }
    }

    #[test]
    fn test_off_screen_handles_are_not_grabbable() {
        let settings = EditorSettings {
            grab_tolerance: 0.05,
            ..settings()
        };
        let (bus, mut model, mut ctl) = setup_with(2000, settings);
        let id = model.add_segment(103, 150, "wave", LabelMode::Gestures);
        pump(&bus, &mut ctl, &mut model);
        assert_eq!(ctl.view_range(), (0, 100));

        let (start_tab, end_tab) = label_tabs(&ctl, id);
        assert!(!ctl.registry().tab(Domain::Local, &start_tab).unwrap().visible);
        assert_eq!(ctl.tab_at(Domain::Local, 1.0), None);
        assert!(!ctl.press(Domain::Local, 1.0, Button::Left, &model));
        assert!(!ctl.press_tab(Domain::Local, &end_tab, &model));
        assert_eq!(model.get_label(LabelMode::Gestures, id).unwrap().bounds(), (103, 150));

        // Move the view over the segment: its handles come back
        assert!(ctl.press(Domain::Global, 0.05, Button::Right, &model));
        ctl.drag(0.1, &mut model);
        ctl.release(0.1, &mut model);
        pump(&bus, &mut ctl, &mut model);
        assert_eq!(ctl.view_range(), (100, 200));
        assert!(ctl.registry().tab(Domain::Local, &start_tab).unwrap().visible);
        assert_eq!(ctl.tab_at(Domain::Local, 0.03), Some(start_tab));
    }

    #[test]
    fn test_view_window_pan_keeps_segments() {
        let (bus, mut model, mut ctl) = setup(1000);
        let far = model.add_segment(500, 600, "wave", LabelMode::Gestures);
        let near = model.add_segment(10, 20, "point", LabelMode::Gestures);
        pump(&bus, &mut ctl, &mut model);

        assert!(ctl.press(Domain::Global, 0.3, Button::Right, &model));
        ctl.release(0.35, &mut model);
        pump(&bus, &mut ctl, &mut model);

        assert_eq!(model.window(), (300, 350));
        assert_eq!(model.len(), 1000);
        assert_eq!(model.get_label(LabelMode::Gestures, far).unwrap().bounds(), (500, 600));
        assert_eq!(model.get_label(LabelMode::Gestures, near).unwrap().bounds(), (10, 20));
    }

    #[test]
    fn test_shadow_tabs_are_not_grabbable() {
        let (bus, mut model, mut ctl) = setup(1000);
        model.add_segment(500, 600, "wave", LabelMode::Gestures);
        pump(&bus, &mut ctl, &mut model);
        // 0.5 on the global timeline is the shadow start tab
        assert_eq!(ctl.tab_at(Domain::Global, 0.5), None);
        assert!(!ctl.press(Domain::Global, 0.5, Button::Left, &model));
    }

    #[test]
    fn test_view_window_span_is_capped() {
        let (bus, mut model, mut ctl) = setup(1000);
        let end_tab = ctl.registry().segment(Domain::Global, &VIEW_WINDOW).unwrap().end_tab.clone();

        assert!(ctl.press_tab(Domain::Global, &end_tab, &model));
        ctl.drag(0.5, &mut model);
        assert_eq!(ctl.view_range(), (400, 500));
        ctl.release(0.5, &mut model);
        let events = pump(&bus, &mut ctl, &mut model);

        assert_eq!(model.window(), (400, 500));
        assert_eq!(model.animation_step(), 400);
        let range = events
            .iter()
            .find_map(|e| downcast_event::<ViewRangeChangedEvent>(e))
            .unwrap();
        assert_eq!((range.xmin, range.xmax), (400, 500));
        assert_eq!(ctl.registry().tab(Domain::Local, &ANIMATION_TAB).unwrap().pos, 400);
    }

    #[test]
    fn test_animation_tab_clamped_to_view() {
        let (bus, mut model, mut ctl) = setup(1000);
        assert!(ctl.press(Domain::Local, 0.0, Button::Left, &model));
        ctl.drag(1.0, &mut model);
        ctl.release(1.0, &mut model);
        pump(&bus, &mut ctl, &mut model);
        assert_eq!(model.animation_step(), 99);
        assert_eq!(ctl.registry().tab(Domain::Local, &ANIMATION_TAB).unwrap().pos, 99);
    }

    #[test]
    fn test_right_click_selection_becomes_view_window() {
        let (bus, mut model, mut ctl) = setup(1000);
        assert!(ctl.press(Domain::Global, 0.2, Button::Right, &model));
        assert_eq!(ctl.registry().segment_bounds(Domain::Global, &SELECTION), Some((200, 210)));
        ctl.drag(0.25, &mut model);
        assert_eq!(ctl.registry().segment_bounds(Domain::Global, &SELECTION), Some((200, 250)));
        ctl.release(0.25, &mut model);
        let events = pump(&bus, &mut ctl, &mut model);

        assert!(ctl.registry().segment(Domain::Global, &SELECTION).is_none());
        assert_eq!(ctl.view_range(), (200, 250));
        assert_eq!(model.window(), (200, 250));
        assert_eq!(model.animation_step(), 200);
        let removed = events
            .iter()
            .filter(|e| matches!(downcast_event::<SpanVisualEvent>(e), Some(SpanVisualEvent::Remove { .. })))
            .count();
        assert_eq!(removed, 1);
    }

    #[test]
    fn test_local_selection_is_shadowed() {
        let (_bus, model, mut ctl) = setup(1000);
        assert!(ctl.press(Domain::Local, 0.5, Button::Right, &model));
        assert_eq!(ctl.registry().segment_bounds(Domain::Local, &SELECTION), Some((50, 60)));
        assert!(ctl.registry().segment(Domain::Global, &SELECTION).unwrap().is_shadow);
    }

    #[test]
    fn test_plot_press_requires_label_prompt() {
        let (_bus, mut model, mut ctl) = setup(100);
        let err = ctl.press_plot(10, Button::Left, &mut model).unwrap_err();
        assert!(matches!(err, EditorError::MissingCallback(_)));
        assert!(model.get_labels(LabelMode::Gestures).is_empty());
    }

    #[test]
    fn test_plot_draw_and_accept_label() {
        let (bus, mut model, mut ctl) = setup(100);
        model.set_animation_step(5);
        let asked = Rc::new(RefCell::new(None));
        let seen = asked.clone();
        ctl.set_label_prompt(move |_labels, bounds| {
            *seen.borrow_mut() = Some(bounds);
            Some("wave".to_string())
        });

        assert!(ctl.press_plot(30, Button::Left, &mut model).unwrap());
        ctl.drag_plot(40, &mut model);
        assert_eq!(model.animation_step(), 40);
        ctl.release_plot(45, &mut model);
        pump(&bus, &mut ctl, &mut model);

        assert_eq!(model.label_triples(LabelMode::Gestures), vec![(30, 45, "wave".to_string())]);
        assert_eq!(*asked.borrow(), Some((30, 45)));
        assert_eq!(model.animation_step(), 5);
        assert_eq!(ctl.registry().segments(Domain::Local).filter(|s| TimelineController::is_label(s)).count(), 1);
    }

    #[test]
    fn test_plot_draw_backwards_and_degenerate() {
        let (_bus, mut model, mut ctl) = setup(100);
        ctl.set_label_prompt(|_, _| Some("point".to_string()));
        ctl.press_plot(30, Button::Left, &mut model).unwrap();
        ctl.drag_plot(20, &mut model);
        let id = model.labels(LabelMode::Gestures).next().unwrap().id;
        assert_eq!(model.get_label(LabelMode::Gestures, id).unwrap().bounds(), (20, 30));
        ctl.release_plot(30, &mut model);
        assert_eq!(model.get_label(LabelMode::Gestures, id).unwrap().bounds(), (30, 31));
    }

    #[test]
    fn test_plot_declined_label_discards_segment() {
        let (bus, mut model, mut ctl) = setup(100);
        ctl.set_label_prompt(|_, _| None);
        ctl.press_plot(10, Button::Left, &mut model).unwrap();
        ctl.release_plot(20, &mut model);
        pump(&bus, &mut ctl, &mut model);
        assert!(model.get_labels(LabelMode::Gestures).is_empty());
        assert_eq!(ctl.registry().segments(Domain::Local).count(), 0);
    }

    #[test]
    fn test_right_button_on_plot_is_ignored() {
        let (_bus, mut model, mut ctl) = setup(100);
        assert!(!ctl.press_plot(10, Button::Right, &mut model).unwrap());
    }

    #[test]
    fn test_duplicate_custom_segment_is_error() {
        let (_bus, _model, mut ctl) = setup(100);
        let spec = SegmentSpec {
            start: 1,
            end: 5,
            color: Rgb::RED,
            role: SegmentRole::ViewWindow,
            visualize: true,
            global_shadow: false,
        };
        let id = EntryId::Named("marker".into());
        ctl.add_segment(Domain::Local, Some(id.clone()), spec.clone()).unwrap();
        assert_eq!(ctl.registry().segment(Domain::Local, &id).unwrap().role, SegmentRole::Custom);
        let err = ctl.add_segment(Domain::Local, Some(id), spec).unwrap_err();
        assert!(matches!(err, EditorError::DuplicateId { .. }));
    }

    #[test]
    fn test_crop_resets_view_window() {
        let (bus, mut model, mut ctl) = setup(1000);
        model.load_into_memory(200, 260);
        pump(&bus, &mut ctl, &mut model);
        assert_eq!(ctl.view_range(), (0, 60));
        assert_eq!(ctl.mapper().len(), 60);
    }

    #[test]
    fn test_label_mode_switch_mirrors_other_mode() {
        let (bus, mut model, mut ctl) = setup(100);
        model.add_segment(1, 5, "wave", LabelMode::Gestures);
        let att = model.add_segment(10, 20, "focused", LabelMode::Attention);
        pump(&bus, &mut ctl, &mut model);
        assert_eq!(ctl.registry().segments(Domain::Local).count(), 1);

        model.set_label_mode(LabelMode::Attention);
        pump(&bus, &mut ctl, &mut model);
        let ids: Vec<EntryId> = ctl.registry().segments(Domain::Local).map(|s| s.id.clone()).collect();
        assert_eq!(ids, vec![EntryId::Label(LabelMode::Attention, att)]);
    }

    #[test]
    fn test_relabel_recolors_mirror() {
        let (bus, mut model, mut ctl) = setup(100);
        let id = model.add_segment(1, 5, "wave", LabelMode::Gestures);
        pump(&bus, &mut ctl, &mut model);
        model.relabel_segment(LabelMode::Gestures, id, "point");
        pump(&bus, &mut ctl, &mut model);
        let key = EntryId::Label(LabelMode::Gestures, id);
        assert_eq!(
            ctl.registry().segment(Domain::Local, &key).unwrap().color,
            model.label_color(LabelMode::Gestures, id)
        );
    }
}
