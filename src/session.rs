//! Editing session: wires the model, the timeline controller, the plot layer
//! and the frame index to one event bus.
//!
//! Single-threaded. The host calls `pump(now)` from its loop (or timer); each
//! pump advances playback, drains the bus until quiet and routes every event
//! to the views, then returns a plot frame if a redraw is due.

use std::path::{Path, PathBuf};
use std::time::Instant;

use log::{debug, info};

use crate::config::EditorSettings;
use crate::core::event_bus::{EventBus, downcast_event};
use crate::core::model::SensorDataModel;
use crate::core::model_events::{AnimationStepEvent, DatasetReplacedEvent};
use crate::entities::frames::FrameIndex;
use crate::entities::labels::{export_labels, import_labels};
use crate::entities::recording::{RecordingFile, RecordingStore};
use crate::error::Result;
use crate::plot::sync::{PlotFrame, PlotSync};
use crate::timeline::controller::TimelineController;

pub struct Session {
    bus: EventBus,
    settings: EditorSettings,
    model: SensorDataModel,
    timeline: TimelineController,
    plot: PlotSync,
    frames: FrameIndex,
    /// Frame per stream at the cursor
    shown: Vec<Option<PathBuf>>,
}

impl Session {
    pub fn new(settings: EditorSettings) -> Self {
        let bus = EventBus::new();
        let model = SensorDataModel::new(bus.emitter(), &settings);
        let timeline = TimelineController::new(bus.emitter(), &settings);
        let plot = PlotSync::new(settings.redraw_interval());
        Self {
            bus,
            settings,
            model,
            timeline,
            plot,
            frames: FrameIndex::default(),
            shown: Vec::new(),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn settings(&self) -> &EditorSettings {
        &self.settings
    }

    pub fn model(&self) -> &SensorDataModel {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut SensorDataModel {
        &mut self.model
    }

    pub fn timeline(&self) -> &TimelineController {
        &self.timeline
    }

    /// Controller and model together, for pointer handlers.
    pub fn timeline_mut(&mut self) -> (&mut TimelineController, &mut SensorDataModel) {
        (&mut self.timeline, &mut self.model)
    }

    pub fn plot(&self) -> &PlotSync {
        &self.plot
    }

    pub fn frames(&self) -> &FrameIndex {
        &self.frames
    }

    /// Frame per image stream at the current cursor.
    pub fn shown_frames(&self) -> &[Option<PathBuf>] {
        &self.shown
    }

    // === Recording ===

    /// Open a recording file. The previous recording is closed first.
    pub fn open_recording(&mut self, path: &Path) -> Result<()> {
        if let Some(old) = self.model.close() {
            debug!("released {:?}", old.path());
        }
        let file = RecordingFile::open(path)?;
        info!("opened {}", path.display());
        self.install(Box::new(file));
        Ok(())
    }

    /// Install any store, e.g. an in-memory stream.
    pub fn install(&mut self, store: Box<dyn RecordingStore>) {
        let data = store.data();
        let taxonomy = self.settings.taxonomy(&data.classes, &data.attention_classes);
        self.model.set_sensor_data(store, taxonomy);
        self.sync_frames();
    }

    /// Add a camera stream directory. Returns the number of frames found.
    pub fn add_image_dir(&mut self, dir: &Path) -> Result<usize> {
        let stream = self.frames.add_dir(dir)?;
        self.sync_frames();
        Ok(self.frames.streams().get(stream).map_or(0, |s| s.len()))
    }

    fn sync_frames(&mut self) {
        let timestamps = self
            .model
            .store()
            .and_then(|s| s.data().timestamp.clone())
            .unwrap_or_default();
        self.frames.sync(&timestamps);
        self.update_shown();
    }

    fn update_shown(&mut self) {
        let sample = self.model.origin() + self.model.animation_step().max(0) as usize;
        self.shown = self
            .frames
            .frames_at(sample)
            .into_iter()
            .map(|p| p.map(Path::to_path_buf))
            .collect();
    }

    // === Labels ===

    /// Replace the active mode's segments with a label CSV.
    pub fn import_labels(&mut self, path: &Path) -> Result<usize> {
        let labels = import_labels(path)?;
        let mode = self.model.label_mode();
        self.model.set_labels(mode, &labels);
        Ok(self.model.labels(mode).count())
    }

    /// Write the active mode's segments as a label CSV.
    pub fn export_labels(&self, path: &Path) -> Result<usize> {
        let labels = self.model.label_triples(self.model.label_mode());
        export_labels(path, &labels)?;
        Ok(labels.len())
    }

    // === Loop ===

    /// Advance playback, deliver pending events and return a due plot frame.
    pub fn pump(&mut self, now: Instant) -> Option<PlotFrame> {
        self.model.tick_animation(now);
        loop {
            let events = self.bus.poll();
            if events.is_empty() {
                break;
            }
            for event in &events {
                self.timeline.handle_event(event, &mut self.model);
                self.plot.handle_event(event, &self.model, now);
                if downcast_event::<AnimationStepEvent>(event).is_some()
                    || downcast_event::<DatasetReplacedEvent>(event).is_some()
                {
                    self.update_shown();
                }
            }
        }
        self.plot.tick(&self.model, now)
    }
}
