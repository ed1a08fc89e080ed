//! Channel metadata and lazily read in-memory data window.

use once_cell::unsync::OnceCell;

use super::color::Rgb;
use super::recording::RecordingData;

/// One named time series of the loaded recording.
///
/// Data for the current in-memory window is read on first access and cached
/// until the window changes (`reset_window`).
#[derive(Debug)]
pub struct Channel {
    name: String,
    id: usize,
    column: usize,
    color: Rgb,
    visible: bool,
    ylim: (f64, f64),
    offset: usize,
    window_len: usize,
    data: OnceCell<Vec<f64>>,
}

impl Channel {
    /// `id` is 1-based and stable for the lifetime of the recording.
    pub fn new(name: impl Into<String>, id: usize, column: usize, color: Rgb) -> Self {
        Self {
            name: name.into(),
            id,
            column,
            color,
            visible: true,
            ylim: (-1.0, 1.0),
            offset: 0,
            window_len: 0,
            data: OnceCell::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Column in the recording's signal matrix.
    pub fn column(&self) -> usize {
        self.column
    }

    /// Key combining id and name, stable across reloads of the same layout.
    pub fn key(&self) -> String {
        format!("{}/{}", self.id, self.name)
    }

    pub fn color(&self) -> Rgb {
        self.color
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn ylim(&self) -> (f64, f64) {
        self.ylim
    }

    pub fn set_ylim(&mut self, ymin: Option<f64>, ymax: Option<f64>) {
        if let Some(v) = ymin {
            self.ylim.0 = v;
        }
        if let Some(v) = ymax {
            self.ylim.1 = v;
        }
    }

    /// Widen the cached y-limits to include `value`.
    pub fn observe(&mut self, value: f64) {
        if value > self.ylim.1 {
            self.ylim.1 = value;
        }
        if value < self.ylim.0 {
            self.ylim.0 = value;
        }
    }

    /// Sample index of the first in-memory value.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn window_len(&self) -> usize {
        self.window_len
    }

    /// Point the channel at a new in-memory window, clamped to `total`, and
    /// drop cached data.
    pub fn reset_window(&mut self, begin: usize, end: usize, total: usize) {
        let end = end.min(total);
        self.offset = begin.min(end);
        self.window_len = end - self.offset;
        self.data = OnceCell::new();
    }

    /// Values in the current window, read through `source` on first use.
    pub fn data(&self, source: &RecordingData, origin: usize) -> &[f64] {
        self.data.get_or_init(|| {
            let begin = origin + self.offset;
            source.column(self.column, begin, begin + self.window_len)
        })
    }

    pub fn is_loaded(&self) -> bool {
        self.data.get().is_some()
    }
}
