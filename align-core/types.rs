use crate::error::{AlignError, AlignResult};
use image::{imageops, Luma};

pub use image::GrayImage;

/// 8-bit RGB image as decoded by the caller.
pub type RasterImage = image::RgbImage;

/// Canvas-sized bitmap: 255 where a pixel comes from real source data, 0 for border fill.
pub type ValidityMask = image::GrayImage;

/// 256-bit binary descriptor = 32 bytes
pub type Descriptor = [u8; DESCRIPTOR_BYTES];

pub const DESCRIPTOR_BYTES: usize = 32;

/// Fewest keypoints an image may yield and still take part in alignment.
pub const MIN_KEYPOINTS: usize = 8;

/// Oriented keypoint in level-0 image coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    /// Dominant orientation in radians.
    pub angle: f32,
    /// Detector response used for ranking (Harris score).
    pub response: f32,
    /// Pyramid level the keypoint was found on.
    pub octave: u8,
    /// Diameter of the described patch in level-0 pixels.
    pub size: f32,
}

impl Keypoint {
    pub fn position(&self) -> (f64, f64) {
        (self.x as f64, self.y as f64)
    }
}

/// Keypoints with their descriptors, index-aligned.
#[derive(Debug, Clone, Default)]
pub struct FeatureSet {
    keypoints: Vec<Keypoint>,
    descriptors: Vec<Descriptor>,
}

impl FeatureSet {
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (Keypoint, Descriptor)>,
    {
        let (keypoints, descriptors) = pairs.into_iter().unzip();
        Self {
            keypoints,
            descriptors,
        }
    }

    pub fn keypoints(&self) -> &[Keypoint] {
        &self.keypoints
    }

    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descriptors
    }

    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Keypoint, &Descriptor)> {
        self.keypoints.iter().zip(self.descriptors.iter())
    }

    /// Fail with `InsufficientFeatures` when fewer than `required` keypoints are present.
    pub fn require(self, required: usize) -> AlignResult<Self> {
        if self.len() < required {
            return Err(AlignError::InsufficientFeatures {
                found: self.len(),
                required,
            });
        }
        Ok(self)
    }
}

/// Accepted descriptor match between the reference and a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Correspondence {
    pub ref_idx: usize,
    pub cand_idx: usize,
    /// Hamming distance of the best match.
    pub distance: u32,
}

/// Rotation + uniform scale + translation, mapping candidate → reference coordinates.
///
/// Stored as `[a -b tx; b a ty]` with `a = s·cos θ`, `b = s·sin θ`. The
/// parameterisation cannot express shear or reflection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityTransform {
    a: f64,
    b: f64,
    tx: f64,
    ty: f64,
}

impl Default for SimilarityTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl SimilarityTransform {
    pub const fn identity() -> Self {
        Self {
            a: 1.0,
            b: 0.0,
            tx: 0.0,
            ty: 0.0,
        }
    }

    pub fn from_params(a: f64, b: f64, tx: f64, ty: f64) -> Self {
        Self { a, b, tx, ty }
    }

    pub fn new(scale: f64, angle: f64, tx: f64, ty: f64) -> Self {
        let (s, c) = angle.sin_cos();
        Self::from_params(scale * c, scale * s, tx, ty)
    }

    pub fn translation_only(tx: f64, ty: f64) -> Self {
        Self::from_params(1.0, 0.0, tx, ty)
    }

    pub fn scale(&self) -> f64 {
        self.a.hypot(self.b)
    }

    /// Rotation angle in radians, in (-π, π].
    pub fn rotation(&self) -> f64 {
        self.b.atan2(self.a)
    }

    pub fn translation(&self) -> (f64, f64) {
        (self.tx, self.ty)
    }

    pub fn params(&self) -> (f64, f64, f64, f64) {
        (self.a, self.b, self.tx, self.ty)
    }

    #[inline]
    pub fn apply(&self, (x, y): (f64, f64)) -> (f64, f64) {
        (
            self.a * x - self.b * y + self.tx,
            self.b * x + self.a * y + self.ty,
        )
    }

    /// Inverse mapping, `None` when the scale collapses to zero.
    pub fn inverse(&self) -> Option<Self> {
        let det = self.a * self.a + self.b * self.b;
        if det < 1e-12 || !det.is_finite() {
            return None;
        }
        let ia = self.a / det;
        let ib = -self.b / det;
        Some(Self {
            a: ia,
            b: ib,
            tx: -(ia * self.tx - ib * self.ty),
            ty: -(ib * self.tx + ia * self.ty),
        })
    }

    /// `self ∘ other`: apply `other` first.
    pub fn compose(&self, other: &Self) -> Self {
        let (tx, ty) = self.apply((other.tx, other.ty));
        Self {
            a: self.a * other.a - self.b * other.b,
            b: self.b * other.a + self.a * other.b,
            tx,
            ty,
        }
    }

    pub fn to_matrix2x3(&self) -> [[f64; 3]; 2] {
        [[self.a, -self.b, self.tx], [self.b, self.a, self.ty]]
    }

    pub fn to_matrix3(&self) -> [[f64; 3]; 3] {
        let [r0, r1] = self.to_matrix2x3();
        [r0, r1, [0.0, 0.0, 1.0]]
    }

    pub fn is_finite(&self) -> bool {
        self.a.is_finite() && self.b.is_finite() && self.tx.is_finite() && self.ty.is_finite()
    }
}

/// Axis-aligned rectangle that is valid in every aligned image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OverlapRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl OverlapRect {
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn crop(&self, image: &RasterImage) -> RasterImage {
        imageops::crop_imm(image, self.x, self.y, self.width, self.height).to_image()
    }

    pub fn crop_mask(&self, mask: &ValidityMask) -> ValidityMask {
        imageops::crop_imm(mask, self.x, self.y, self.width, self.height).to_image()
    }
}

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Loading,
    ReferenceFeatureExtraction,
    FeatureExtraction,
    Matching,
    TransformEstimation,
    Warping,
    OverlapComputation,
    Cropping,
    Done,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PairStatus {
    Aligned,
    Skipped { stage: Stage, reason: String },
}

/// Per-candidate diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct PairResult {
    /// Position of the candidate in the input list (the reference is 0).
    pub index: usize,
    pub ref_keypoints: usize,
    pub cand_keypoints: usize,
    pub correspondences: usize,
    pub inliers: usize,
    pub transform: Option<SimilarityTransform>,
    pub status: PairStatus,
}

impl PairResult {
    pub fn is_aligned(&self) -> bool {
        self.status == PairStatus::Aligned
    }
}

/// An image resampled into the reference frame together with its validity
/// mask and the transform that produced both.
#[derive(Debug, Clone)]
pub struct AlignedImage {
    index: usize,
    image: RasterImage,
    mask: ValidityMask,
    transform: SimilarityTransform,
}

impl AlignedImage {
    pub fn new(
        index: usize,
        image: RasterImage,
        mask: ValidityMask,
        transform: SimilarityTransform,
    ) -> AlignResult<Self> {
        if image.dimensions() != mask.dimensions() {
            return Err(AlignError::DimensionMismatch {
                expected_width: image.width(),
                expected_height: image.height(),
                width: mask.width(),
                height: mask.height(),
            });
        }
        Ok(Self {
            index,
            image,
            mask,
            transform,
        })
    }

    /// The reference keeps its pixels, an all-valid mask and the identity.
    pub fn reference(image: RasterImage) -> Self {
        let mask = GrayImage::from_pixel(image.width(), image.height(), Luma([255]));
        Self {
            index: 0,
            image,
            mask,
            transform: SimilarityTransform::identity(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn image(&self) -> &RasterImage {
        &self.image
    }

    pub fn mask(&self) -> &ValidityMask {
        &self.mask
    }

    pub fn transform(&self) -> &SimilarityTransform {
        &self.transform
    }

    pub fn into_parts(self) -> (RasterImage, ValidityMask, SimilarityTransform) {
        (self.image, self.mask, self.transform)
    }
}
