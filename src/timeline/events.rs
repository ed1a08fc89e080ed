//! Notifications emitted by the timeline controller.

use super::registry::{Endpoint, EntryId};
use crate::core::coords::Domain;
use crate::entities::color::Rgb;

/// A dragged handle came to rest at a new position.
///
/// For segment endpoints only the endpoint that moved is reported.
#[derive(Clone, Debug)]
pub struct BoundaryChangedEvent {
    pub domain: Domain,
    pub tab: EntryId,
    pub segment: Option<(EntryId, Endpoint)>,
    pub position: i64,
}

/// The view window was committed; `[xmin, xmax)` is the new visible range.
#[derive(Clone, Debug)]
pub struct ViewRangeChangedEvent {
    pub xmin: i64,
    pub xmax: i64,
}

/// Plot highlight for a control segment with `visualize` set.
#[derive(Clone, Debug)]
pub enum SpanVisualEvent {
    Upsert {
        id: EntryId,
        start: i64,
        end: i64,
        color: Rgb,
    },
    Remove {
        id: EntryId,
    },
}
