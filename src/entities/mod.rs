//! Entities module - recording data, channels, segments and their side files

pub mod channel;
pub mod channel_tree;
pub mod color;
pub mod frames;
pub mod labels;
pub mod recording;
pub mod segment;
pub mod taxonomy;

pub use channel::Channel;
pub use channel_tree::ChannelTree;
pub use color::Rgb;
pub use frames::FrameIndex;
pub use recording::{RecordingData, RecordingStore};
pub use segment::{LabelMode, Segment, SegmentId};
pub use taxonomy::LabelTaxonomy;
