pub mod sync;

pub use sync::{PlotFrame, PlotSync};
