//! ANNOTRACK - segment/timeline editing engine for sensor recordings
//!
//! Re-exports all modules for use by binary targets.

// Core engine (coordinates, events, model, playback)
pub mod core;

// Editing surfaces
pub mod plot;
pub mod timeline;

// App modules
pub mod analysis;
pub mod cli;
pub mod config;
pub mod entities;
pub mod error;
pub mod session;

pub use error::{EditorError, Result};

// Re-export commonly used types from core
pub use crate::core::coords::{CoordinateMapper, Domain};
pub use crate::core::event_bus::{BoxedEvent, EventBus, EventEmitter, downcast_event};
pub use crate::core::model::SensorDataModel;

// Re-export entities
pub use entities::recording::{MemoryRecording, RecordingData, RecordingFile, RecordingStore};
pub use entities::segment::{LabelMode, Segment, SegmentId};
pub use session::Session;
