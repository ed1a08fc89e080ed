//! Error type shared by the editing engine.
//!
//! Programmer errors (unknown domain, duplicate id, missing callback) are
//! returned as `Err` from the call that triggered them and are not meant to be
//! recovered from. Recording I/O errors are caught by the model where the
//! session has to keep running (see `SensorDataModel::store_labels`).

use thiserror::Error;

use crate::timeline::registry::{EntryId, EntryKind};
use crate::core::coords::Domain;

pub type Result<T> = std::result::Result<T, EditorError>;

#[derive(Error, Debug)]
pub enum EditorError {
    /// Coordinate domain string was neither "local" nor "global".
    #[error("unknown coordinate domain: {0:?}")]
    UnknownDomain(String),

    /// Explicit id already registered for this (domain, kind).
    #[error("duplicate id {id} for {kind:?} on {domain:?} timeline")]
    DuplicateId {
        domain: Domain,
        kind: EntryKind,
        id: EntryId,
    },

    /// An interaction needs a callback that was never registered.
    #[error("missing required callback: {0}")]
    MissingCallback(&'static str),

    #[error("no recording loaded")]
    NoRecording,

    #[error("invalid recording: {0}")]
    InvalidRecording(String),

    #[error("worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}
