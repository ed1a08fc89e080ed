//! Timeline: tab/segment registry and the pointer-driven controller.

pub mod controller;
pub mod events;
pub mod registry;

pub use controller::TimelineController;
pub use registry::{EntryId, TabRegistry};
