//! Relative (0..1 screen) <-> absolute (sample index) coordinate mapping.
//!
//! Two domains:
//! - **Local**: the visible window `[xmin, xmax)` held by the view-window segment
//! - **Global**: the whole recording `[0, len)`
//!
//! The mapper is a value snapshot; the controller rebuilds it whenever the
//! view window or the recording length changes. It never touches model state.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EditorError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Domain {
    Local,
    Global,
}

impl Domain {
    pub const ALL: [Domain; 2] = [Domain::Local, Domain::Global];

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Local => "local",
            Domain::Global => "global",
        }
    }

    /// The timeline a shadow twin lives on.
    pub fn other(&self) -> Domain {
        match self {
            Domain::Local => Domain::Global,
            Domain::Global => Domain::Local,
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            Domain::Local => 0,
            Domain::Global => 1,
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = EditorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Domain::Local),
            "global" => Ok(Domain::Global),
            other => Err(EditorError::UnknownDomain(other.to_string())),
        }
    }
}

/// Coordinate mapper for one view-window/recording-length configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CoordinateMapper {
    xmin: i64,
    xmax: i64,
    len: i64,
}

impl CoordinateMapper {
    pub fn new(xmin: i64, xmax: i64, len: usize) -> Self {
        Self {
            xmin,
            xmax,
            len: len as i64,
        }
    }

    pub fn view(&self) -> (i64, i64) {
        (self.xmin, self.xmax)
    }

    pub fn len(&self) -> i64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Origin and span of a domain. Span is at least 1 so an empty window
    /// still maps to a finite coordinate.
    fn frame(&self, domain: Domain) -> (f64, f64) {
        match domain {
            Domain::Local => (self.xmin as f64, (self.xmax - self.xmin).max(1) as f64),
            Domain::Global => (0.0, self.len.max(1) as f64),
        }
    }

    pub fn to_absolute(&self, rel: f64, domain: Domain) -> i64 {
        let (origin, span) = self.frame(domain);
        (rel * span + origin).round() as i64
    }

    pub fn to_relative(&self, abs: i64, domain: Domain) -> f64 {
        let (origin, span) = self.frame(domain);
        (abs as f64 - origin) / span
    }

    /// String-domain entry point used by collaborators that store the domain
    /// by name. Unknown names fail with [`EditorError::UnknownDomain`].
    pub fn to_absolute_named(&self, rel: f64, domain: &str) -> crate::Result<i64> {
        Ok(self.to_absolute(rel, domain.parse()?))
    }

    pub fn to_relative_named(&self, abs: i64, domain: &str) -> crate::Result<f64> {
        Ok(self.to_relative(abs, domain.parse()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_maps_against_view_window() {
        let m = CoordinateMapper::new(100, 300, 1000);
        assert_eq!(m.to_absolute(0.0, Domain::Local), 100);
        assert_eq!(m.to_absolute(0.5, Domain::Local), 200);
        assert_eq!(m.to_absolute(1.0, Domain::Local), 300);
        assert!((m.to_relative(150, Domain::Local) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_global_maps_against_recording() {
        let m = CoordinateMapper::new(100, 300, 1000);
        assert_eq!(m.to_absolute(0.25, Domain::Global), 250);
        assert!((m.to_relative(500, Domain::Global) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_round_trip_within_rounding_error() {
        let m = CoordinateMapper::new(37, 1234, 98765);
        for domain in Domain::ALL {
            let (_, span) = m.frame(domain);
            for i in 0..=200 {
                let rel = i as f64 / 200.0;
                let back = m.to_relative(m.to_absolute(rel, domain), domain);
                assert!((back - rel).abs() <= 0.5 / span + 1e-12, "{domain} {rel} -> {back}");
            }
        }
    }

    #[test]
    fn test_empty_recording_does_not_divide_by_zero() {
        let m = CoordinateMapper::new(0, 0, 0);
        assert_eq!(m.to_absolute(0.7, Domain::Global), 1);
        assert!(m.to_relative(5, Domain::Local).is_finite());
    }

    #[test]
    fn test_unknown_domain_is_error() {
        let m = CoordinateMapper::new(0, 10, 10);
        assert_eq!(m.to_absolute_named(0.5, "global").unwrap(), 5);
        let err = m.to_absolute_named(0.5, "sideways").unwrap_err();
        assert!(matches!(err, EditorError::UnknownDomain(ref s) if s == "sideways"));
        assert!("LOCAL".parse::<Domain>().is_err());
    }
}
