//! Label taxonomy: ordered label names per mode, built at recording-load time.
//!
//! Code 0 is always the "no label" entry. Names are looked up in both
//! directions; uniqueness is not validated (first match wins).

use std::collections::HashMap;
use std::path::Path;

use log::{debug, warn};

use super::color::{Rgb, display_colors};
use super::segment::{LabelMode, UNLABELED};

pub const NO_LABEL: u16 = 0;

#[derive(Clone, Debug, PartialEq)]
pub struct LabelSet {
    names: Vec<String>,
    codes: HashMap<String, u16>,
    colors: Vec<Rgb>,
}

impl LabelSet {
    /// Build from an ordered name list. An empty list becomes `[NONE]`.
    pub fn new(mut names: Vec<String>) -> Self {
        if names.is_empty() {
            names.push(UNLABELED.to_string());
        }
        let mut codes = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            codes.entry(name.clone()).or_insert(i as u16);
        }
        let colors = display_colors(names.len(), 100.0, 180.0);
        Self { names, codes, colors }
    }

    /// Recording names first, then configured names not already present.
    pub fn merged(recorded: &[String], configured: &[String]) -> Self {
        let mut names = recorded.to_vec();
        names.extend(configured.iter().filter(|c| !recorded.contains(c)).cloned());
        Self::new(names)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn code_of(&self, name: &str) -> Option<u16> {
        self.codes.get(name).copied()
    }

    pub fn name_of(&self, code: u16) -> Option<&str> {
        self.names.get(code as usize).map(String::as_str)
    }

    /// Display color for a label name; grey for unknown names.
    pub fn color_of(&self, name: &str) -> Rgb {
        self.code_of(name)
            .and_then(|c| self.colors.get(c as usize).copied())
            .unwrap_or(Rgb::GREY)
    }
}

impl Default for LabelSet {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

/// Label sets for every mode.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LabelTaxonomy {
    gestures: LabelSet,
    attention: LabelSet,
}

impl LabelTaxonomy {
    pub fn new(gestures: LabelSet, attention: LabelSet) -> Self {
        Self { gestures, attention }
    }

    pub fn labels(&self, mode: LabelMode) -> &LabelSet {
        match mode {
            LabelMode::Gestures => &self.gestures,
            LabelMode::Attention => &self.attention,
        }
    }

    pub fn code_of(&self, mode: LabelMode, name: &str) -> Option<u16> {
        self.labels(mode).code_of(name)
    }

    pub fn name_of(&self, mode: LabelMode, code: u16) -> Option<&str> {
        self.labels(mode).name_of(code)
    }
}

/// Read a line-per-name configuration file. Missing files yield no names.
pub fn read_conf(path: &Path) -> Vec<String> {
    match std::fs::read_to_string(path) {
        Ok(text) => {
            let names: Vec<String> = text
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect();
            debug!("read {} names from {}", names.len(), path.display());
            names
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(e) => {
            warn!("failed to read {}: {}", path.display(), e);
            Vec::new()
        }
    }
}
