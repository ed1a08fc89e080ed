//! Offline analysis over recording snapshots.

pub mod dtw;
pub mod report;
