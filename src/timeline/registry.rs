//! Tab/segment registry for the local and global timelines.
//!
//! Entries are keyed per (domain, kind): the same [`EntryId`] may name a tab
//! on the local timeline and another on the global one. A local entry created
//! with `global_shadow` gets a non-interactive twin under the same id on the
//! global timeline that follows every move.
//!
//! Lookups, moves and removals of unknown ids are silent no-ops; they happen
//! routinely while stale notifications drain after a teardown.

use std::fmt;

use indexmap::IndexMap;
use log::trace;

use crate::core::coords::Domain;
use crate::entities::color::Rgb;
use crate::entities::segment::{LabelMode, SegmentId};
use crate::error::{EditorError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Reserved {
    /// Local tab bound to the animation cursor
    Animation,
    /// Global segment selecting the in-memory/visible range
    ViewWindow,
    /// Transient right-click selection
    Selection,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum EntryId {
    Auto(u64),
    Reserved(Reserved),
    Named(String),
    /// Mirror of a model segment
    Label(LabelMode, SegmentId),
}

pub const ANIMATION_TAB: EntryId = EntryId::Reserved(Reserved::Animation);
pub const VIEW_WINDOW: EntryId = EntryId::Reserved(Reserved::ViewWindow);
pub const SELECTION: EntryId = EntryId::Reserved(Reserved::Selection);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryId::Auto(n) => write!(f, "auto:{n}"),
            EntryId::Reserved(r) => write!(f, "{r:?}"),
            EntryId::Named(s) => f.write_str(s),
            EntryId::Label(mode, id) => write!(f, "{mode}{id}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Tab,
    Segment,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Start,
    End,
}

/// Ordering constraint against a partner tab on the same timeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Constraint {
    LeftOf(EntryId),
    RightOf(EntryId),
}

/// What a control segment stands for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SegmentRole {
    ViewWindow,
    Label { mode: LabelMode, id: SegmentId },
    Selection,
    Custom,
}

#[derive(Clone, Debug)]
pub struct Tab {
    pub id: EntryId,
    pub domain: Domain,
    pub pos: i64,
    pub color: Rgb,
    pub visible: bool,
    pub constraint: Option<Constraint>,
    /// Segment this tab is an endpoint of
    pub owner: Option<(EntryId, Endpoint)>,
    /// Has a twin on the other timeline
    pub shadowed: bool,
    /// This tab is itself a twin
    pub is_shadow: bool,
}

impl Tab {
    pub fn is_interactive(&self) -> bool {
        !self.is_shadow && self.visible
    }
}

#[derive(Clone, Debug)]
pub struct ControlSegment {
    pub id: EntryId,
    pub domain: Domain,
    pub start_tab: EntryId,
    pub end_tab: EntryId,
    pub color: Rgb,
    pub role: SegmentRole,
    /// Drawn as a span on the channel plot
    pub visualize: bool,
    pub shadowed: bool,
    pub is_shadow: bool,
}

/// Parameters of a new control segment.
#[derive(Clone, Debug)]
pub struct SegmentSpec {
    pub start: i64,
    pub end: i64,
    pub color: Rgb,
    pub role: SegmentRole,
    pub visualize: bool,
    pub global_shadow: bool,
}

#[derive(Default, Debug)]
pub struct TabRegistry {
    tabs: [IndexMap<EntryId, Tab>; 2],
    segments: [IndexMap<EntryId, ControlSegment>; 2],
    next_tab: u64,
    next_segment: u64,
}

impl TabRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_taken(&self, kind: EntryKind, id: &EntryId) -> bool {
        match kind {
            EntryKind::Tab => self.tabs.iter().any(|m| m.contains_key(id)),
            EntryKind::Segment => self.segments.iter().any(|m| m.contains_key(id)),
        }
    }

    /// Next auto id of `kind` not in use on either timeline.
    ///
    /// Callers may pass `Auto` ids explicitly, so the counter skips keys
    /// that are already taken.
    fn next_id(&mut self, kind: EntryKind) -> EntryId {
        loop {
            let counter = match kind {
                EntryKind::Tab => &mut self.next_tab,
                EntryKind::Segment => &mut self.next_segment,
            };
            let id = EntryId::Auto(*counter);
            *counter += 1;
            if !self.is_taken(kind, &id) {
                return id;
            }
        }
    }

    fn check_free(&self, domain: Domain, kind: EntryKind, id: &EntryId) -> Result<()> {
        let taken = match kind {
            EntryKind::Tab => self.tabs[domain.index()].contains_key(id),
            EntryKind::Segment => self.segments[domain.index()].contains_key(id),
        };
        if taken {
            return Err(EditorError::DuplicateId {
                domain,
                kind,
                id: id.clone(),
            });
        }
        Ok(())
    }

    // === Tabs ===

    pub fn add_tab(
        &mut self,
        domain: Domain,
        id: Option<EntryId>,
        pos: i64,
        color: Rgb,
        global_shadow: bool,
    ) -> Result<EntryId> {
        let id = match id {
            Some(id) => id,
            None => self.next_id(EntryKind::Tab),
        };
        let shadowed = global_shadow && domain == Domain::Local;
        self.check_free(domain, EntryKind::Tab, &id)?;
        if shadowed {
            self.check_free(Domain::Global, EntryKind::Tab, &id)?;
        }
        self.insert_tab(domain, id.clone(), pos, color, None, shadowed);
        Ok(id)
    }

    fn insert_tab(
        &mut self,
        domain: Domain,
        id: EntryId,
        pos: i64,
        color: Rgb,
        owner: Option<(EntryId, Endpoint)>,
        shadowed: bool,
    ) {
        if shadowed {
            let twin = Tab {
                id: id.clone(),
                domain: domain.other(),
                pos,
                color: color.shadow(),
                visible: true,
                constraint: None,
                owner: owner.clone(),
                shadowed: false,
                is_shadow: true,
            };
            self.tabs[domain.other().index()].insert(id.clone(), twin);
        }
        let tab = Tab {
            id: id.clone(),
            domain,
            pos,
            color,
            visible: true,
            constraint: None,
            owner,
            shadowed,
            is_shadow: false,
        };
        trace!("tab {} added on {} at {}", id, domain, pos);
        self.tabs[domain.index()].insert(id, tab);
    }

    pub fn tab(&self, domain: Domain, id: &EntryId) -> Option<&Tab> {
        self.tabs[domain.index()].get(id)
    }

    pub fn tabs(&self, domain: Domain) -> impl Iterator<Item = &Tab> {
        self.tabs[domain.index()].values()
    }

    /// Move a tab and its shadow. Returns false for unknown ids.
    pub fn move_tab(&mut self, domain: Domain, id: &EntryId, pos: i64) -> bool {
        let Some(tab) = self.tabs[domain.index()].get_mut(id) else {
            return false;
        };
        tab.pos = pos;
        let shadowed = tab.shadowed;
        if shadowed {
            if let Some(twin) = self.tabs[domain.other().index()].get_mut(id) {
                twin.pos = pos;
            }
        }
        true
    }

    pub fn set_tab_visible(&mut self, domain: Domain, id: &EntryId, visible: bool) {
        if let Some(tab) = self.tabs[domain.index()].get_mut(id) {
            tab.visible = visible;
        }
    }

    pub fn remove_tab(&mut self, domain: Domain, id: &EntryId) {
        if let Some(tab) = self.tabs[domain.index()].shift_remove(id) {
            if tab.shadowed {
                self.tabs[domain.other().index()].shift_remove(id);
            }
            trace!("tab {} removed from {}", id, domain);
        }
    }

    /// Apply a tab's partner constraint to a requested position.
    ///
    /// Returns the allowed position and whether it had to be corrected. A
    /// position landing on the partner is pushed one sample away from it so
    /// the pair never spans zero samples.
    pub fn constrain(&self, domain: Domain, id: &EntryId, pos: i64) -> (i64, bool) {
        let Some(tab) = self.tab(domain, id) else {
            return (pos, false);
        };
        let partner = |pid: &EntryId| self.tab(domain, pid).map(|t| t.pos);
        match &tab.constraint {
            Some(Constraint::LeftOf(pid)) => match partner(pid) {
                Some(p) if pos >= p => (p - 1, true),
                _ => (pos, false),
            },
            Some(Constraint::RightOf(pid)) => match partner(pid) {
                Some(p) if pos <= p => (p + 1, true),
                _ => (pos, false),
            },
            None => (pos, false),
        }
    }

    // === Segments ===

    pub fn add_segment(&mut self, domain: Domain, id: Option<EntryId>, spec: SegmentSpec) -> Result<EntryId> {
        let id = match id {
            Some(id) => id,
            None => self.next_id(EntryKind::Segment),
        };
        let shadowed = spec.global_shadow && domain == Domain::Local;
        self.check_free(domain, EntryKind::Segment, &id)?;
        if shadowed {
            self.check_free(Domain::Global, EntryKind::Segment, &id)?;
        }

        let start_tab = self.next_id(EntryKind::Tab);
        let end_tab = self.next_id(EntryKind::Tab);
        self.insert_tab(
            domain,
            start_tab.clone(),
            spec.start,
            spec.color,
            Some((id.clone(), Endpoint::Start)),
            shadowed,
        );
        self.insert_tab(
            domain,
            end_tab.clone(),
            spec.end,
            spec.color,
            Some((id.clone(), Endpoint::End)),
            shadowed,
        );
        let tabs = &mut self.tabs[domain.index()];
        if let Some(t) = tabs.get_mut(&start_tab) {
            t.constraint = Some(Constraint::LeftOf(end_tab.clone()));
        }
        if let Some(t) = tabs.get_mut(&end_tab) {
            t.constraint = Some(Constraint::RightOf(start_tab.clone()));
        }

        let segment = ControlSegment {
            id: id.clone(),
            domain,
            start_tab,
            end_tab,
            color: spec.color,
            role: spec.role,
            visualize: spec.visualize,
            shadowed,
            is_shadow: false,
        };
        if shadowed {
            let twin = ControlSegment {
                domain: domain.other(),
                color: spec.color.shadow(),
                visualize: false,
                shadowed: false,
                is_shadow: true,
                ..segment.clone()
            };
            self.segments[domain.other().index()].insert(id.clone(), twin);
        }
        trace!("segment {} added on {} [{}, {})", id, domain, spec.start, spec.end);
        self.segments[domain.index()].insert(id.clone(), segment);
        Ok(id)
    }

    pub fn segment(&self, domain: Domain, id: &EntryId) -> Option<&ControlSegment> {
        self.segments[domain.index()].get(id)
    }

    pub fn segments(&self, domain: Domain) -> impl Iterator<Item = &ControlSegment> {
        self.segments[domain.index()].values()
    }

    pub fn segment_bounds(&self, domain: Domain, id: &EntryId) -> Option<(i64, i64)> {
        let seg = self.segment(domain, id)?;
        let start = self.tab(domain, &seg.start_tab)?.pos;
        let end = self.tab(domain, &seg.end_tab)?.pos;
        Some((start, end))
    }

    /// Move one or both endpoints (and shadows).
    pub fn set_segment_bounds(&mut self, domain: Domain, id: &EntryId, start: Option<i64>, end: Option<i64>) {
        let Some(seg) = self.segment(domain, id) else {
            return;
        };
        let (start_tab, end_tab) = (seg.start_tab.clone(), seg.end_tab.clone());
        if let Some(s) = start {
            self.move_tab(domain, &start_tab, s);
        }
        if let Some(e) = end {
            self.move_tab(domain, &end_tab, e);
        }
    }

    pub fn set_segment_color(&mut self, domain: Domain, id: &EntryId, color: Rgb) {
        let Some(seg) = self.segments[domain.index()].get_mut(id) else {
            return;
        };
        seg.color = color;
        let (start_tab, end_tab, shadowed) = (seg.start_tab.clone(), seg.end_tab.clone(), seg.shadowed);
        if shadowed {
            if let Some(twin) = self.segments[domain.other().index()].get_mut(id) {
                twin.color = color.shadow();
            }
        }
        for tab_id in [&start_tab, &end_tab] {
            if let Some(t) = self.tabs[domain.index()].get_mut(tab_id) {
                t.color = color;
            }
            if shadowed {
                if let Some(t) = self.tabs[domain.other().index()].get_mut(tab_id) {
                    t.color = color.shadow();
                }
            }
        }
    }

    pub fn remove_segment(&mut self, domain: Domain, id: &EntryId) {
        let Some(seg) = self.segments[domain.index()].shift_remove(id) else {
            return;
        };
        self.remove_tab(domain, &seg.start_tab);
        self.remove_tab(domain, &seg.end_tab);
        if seg.shadowed {
            self.segments[domain.other().index()].shift_remove(id);
        }
        trace!("segment {} removed from {}", id, domain);
    }

    /// Ids of segments matching `pred` on `domain`.
    pub fn segment_ids_where(&self, domain: Domain, pred: impl Fn(&ControlSegment) -> bool) -> Vec<EntryId> {
        self.segments(domain).filter(|s| pred(s)).map(|s| s.id.clone()).collect()
    }

    /// Drop everything on both timelines. Counters keep running.
    pub fn clear(&mut self) {
        for map in &mut self.tabs {
            map.clear();
        }
        for map in &mut self.segments {
            map.clear();
        }
    }
}
