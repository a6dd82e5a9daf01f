//! Shared types for the open-align pipeline.
//!
//! Everything that crosses a crate boundary lives here: images, keypoints,
//! descriptors, correspondences, the similarity transform, overlap rectangles,
//! per-candidate diagnostics and the configuration tree.

pub mod config;
pub mod error;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod synthetic;

pub use config::{AlignConfig, MatchConfig, OrbConfig, OverlapConfig, RansacConfig};
pub use error::{AlignError, AlignResult};
pub use types::{
    AlignedImage, Correspondence, Descriptor, FeatureSet, GrayImage, Keypoint, OverlapRect,
    PairResult, PairStatus, RasterImage, SimilarityTransform, Stage, ValidityMask,
    DESCRIPTOR_BYTES, MIN_KEYPOINTS,
};

/// Build a dedicated Rayon pool with the requested number of workers.
///
/// The global Rayon pool is left untouched.
pub fn build_thread_pool(n_threads: usize) -> Result<rayon::ThreadPool, rayon::ThreadPoolBuildError> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(n_threads.max(1))
        .thread_name(|i| format!("align-worker-{i}"))
        .build()
}
