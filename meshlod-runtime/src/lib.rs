//! Per-frame cluster selection
//!
//! GPU-free runtime half of the pipeline: a camera pose with the 90°
//! forward-cone visibility test, and the graph-cut selector that walks
//! each instance's live cut up and down the DAG under a hysteresis band.
//! Everything here is testable headless.

pub mod camera;
pub mod cut;

pub use camera::Camera;
pub use cut::{CutSelector, MARGIN, THRESHOLD};
