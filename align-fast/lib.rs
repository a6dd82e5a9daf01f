//! Multi-scale oriented FAST keypoint detection.
//!
//! Corners are FAST-9 on a 16-pixel Bresenham circle, thinned by 3x3
//! non-maximum suppression on the FAST score and ranked by Harris response.
//! Each pyramid level receives a share of the feature budget proportional to
//! its area.

pub mod corner_detection;
pub mod detector;
pub mod error;
pub mod pyramid;
pub mod refinement;
pub mod types;
pub mod utils;

pub use detector::{Detection, FastDetector, rank_keypoints};
pub use error::{FastError, FastResult};
pub use types::{ScaleLevel, ScoredKeypoint};
