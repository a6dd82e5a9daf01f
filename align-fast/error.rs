use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FastError {
    #[error("Invalid image dimensions: {width}x{height} (must be > 0)")]
    InvalidImageSize { width: usize, height: usize },

    #[error("Image is {width}x{height} but the detector was built for {expected_width}x{expected_height}")]
    UnexpectedDimensions {
        expected_width: usize,
        expected_height: usize,
        width: usize,
        height: usize,
    },

    #[error("Invalid threshold: {0} (must be 1-127)")]
    InvalidThreshold(u8),

    #[error("Patch size {patch_size} invalid for minimum image dimension {min_image_dim}")]
    InvalidPatchSize { patch_size: usize, min_image_dim: usize },

    #[error("Image {width}x{height} too small (minimum {min_size}x{min_size})")]
    ImageTooSmall { width: usize, height: usize, min_size: usize },

    #[error("Invalid pyramid: {levels} levels with scale factor {scale_factor}")]
    InvalidPyramid { levels: usize, scale_factor: f32 },
}

pub type FastResult<T> = Result<T, FastError>;

impl FastError {
    /// The image itself cannot hold a descriptor patch, as opposed to a bad parameter.
    pub fn is_image_size(&self) -> bool {
        matches!(
            self,
            FastError::InvalidImageSize { .. } | FastError::UnexpectedDimensions { .. } | FastError::ImageTooSmall { .. }
        )
    }

    /// Convert to an `AlignError`, reporting image-size problems against `required` keypoints.
    pub fn into_align_error(self, required: usize) -> align_core::AlignError {
        if self.is_image_size() {
            log::debug!("no features: {self}");
            align_core::AlignError::InsufficientFeatures { found: 0, required }
        } else {
            align_core::AlignError::InvalidConfig(self.to_string())
        }
    }
}

impl From<FastError> for align_core::AlignError {
    /// An image that cannot hold a single descriptor patch yields no features.
    fn from(err: FastError) -> Self {
        err.into_align_error(align_core::MIN_KEYPOINTS)
    }
}
