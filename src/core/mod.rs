//! Core engine modules - coordinates, events, model, playback
//!
//! These modules hold the editing state, independent of any view.

pub mod coords;
pub mod event_bus;
pub mod model;
pub mod model_events;
pub mod playback;
pub mod redraw;

// Re-exports for convenience
pub use coords::{CoordinateMapper, Domain};
pub use event_bus::EventBus;
pub use model::SensorDataModel;
pub use redraw::RedrawLimiter;
