//! Fusion layer — per-source calibration and cross-source opinion pooling.

pub mod calibrate;
pub mod pool;

pub use calibrate::SourceCalibrator;
pub use pool::OpinionPool;
