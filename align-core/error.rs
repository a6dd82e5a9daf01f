use thiserror::Error;

/// Errors produced by the alignment pipeline.
///
/// `InsufficientFeatures`, `EstimationFailed` and `DegenerateTransform` are
/// per-image failures: the orchestrator downgrades them to a skipped
/// candidate. On the reference, and for every other variant, the run stops.
#[derive(Debug, Error)]
pub enum AlignError {
    #[error("insufficient features: found {found}, need at least {required}")]
    InsufficientFeatures { found: usize, required: usize },

    #[error("similarity estimation failed: {0}")]
    EstimationFailed(String),

    #[error("no common overlap: {0}")]
    NoOverlap(String),

    #[error("none of the {attempted} candidate images could be aligned")]
    NoCandidatesAligned { attempted: usize },

    #[error("at least two images are required, got {0}")]
    TooFewImages(usize),

    #[error("dimension mismatch: expected {expected_width}x{expected_height}, got {width}x{height}")]
    DimensionMismatch {
        expected_width: u32,
        expected_height: u32,
        width: u32,
        height: u32,
    },

    #[error("degenerate transform: {0}")]
    DegenerateTransform(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl AlignError {
    /// Whether the error only disqualifies a single candidate image.
    pub fn is_candidate_local(&self) -> bool {
        matches!(
            self,
            AlignError::InsufficientFeatures { .. }
                | AlignError::EstimationFailed(_)
                | AlignError::DegenerateTransform(_)
        )
    }
}

pub type AlignResult<T> = Result<T, AlignError>;
