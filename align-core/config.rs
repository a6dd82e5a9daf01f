use crate::error::{AlignError, AlignResult};
use crate::types::MIN_KEYPOINTS;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// ORB feature extraction settings.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct OrbConfig {
    /// FAST intensity threshold (1-127).
    pub threshold: u8,
    /// Diameter of the orientation / descriptor patch; must be odd.
    pub patch_size: usize,
    /// Maximum number of features retained per image.
    pub n_features: usize,
    /// Number of pyramid levels.
    pub n_levels: usize,
    /// Downscale factor between consecutive levels.
    pub scale_factor: f32,
    /// Gaussian sigma applied before descriptor sampling.
    pub blur_sigma: f32,
}

impl Default for OrbConfig {
    fn default() -> Self {
        Self {
            threshold: 20,
            patch_size: 31,
            n_features: 4000,
            n_levels: 8,
            scale_factor: 1.2,
            blur_sigma: 2.0,
        }
    }
}

impl OrbConfig {
    pub fn with_features(n_features: usize) -> Self {
        Self {
            n_features,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> AlignResult<()> {
        if self.threshold == 0 || self.threshold > 127 {
            return Err(AlignError::InvalidConfig(format!(
                "FAST threshold {} outside 1-127",
                self.threshold
            )));
        }
        if self.patch_size % 2 == 0 || self.patch_size < 7 {
            return Err(AlignError::InvalidConfig(format!(
                "patch size {} must be odd and at least 7",
                self.patch_size
            )));
        }
        if self.n_features == 0 {
            return Err(AlignError::InvalidConfig("feature count must be positive".into()));
        }
        if self.n_levels == 0 {
            return Err(AlignError::InvalidConfig("at least one pyramid level is required".into()));
        }
        if !(self.scale_factor > 1.0) {
            return Err(AlignError::InvalidConfig(format!(
                "scale factor {} must exceed 1.0",
                self.scale_factor
            )));
        }
        if !(self.blur_sigma > 0.0) {
            return Err(AlignError::InvalidConfig("blur sigma must be positive".into()));
        }
        Ok(())
    }
}

/// Descriptor matching settings.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct MatchConfig {
    /// Lowe ratio: accept when `best < ratio * second_best`.
    pub ratio: f32,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self { ratio: 0.75 }
    }
}

/// RANSAC similarity estimation settings.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct RansacConfig {
    /// Iteration budget.
    pub max_iterations: usize,
    /// Reprojection error threshold in pixels.
    pub threshold: f64,
    /// Target confidence for early termination.
    pub confidence: f64,
    /// Fewest inliers for a model to be accepted.
    pub min_inliers: usize,
    /// Random seed for reproducibility (None for OS entropy).
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub seed: Option<u64>,
}

impl Default for RansacConfig {
    fn default() -> Self {
        Self {
            max_iterations: 2000,
            threshold: 3.0,
            confidence: 0.995,
            min_inliers: 4,
            seed: None,
        }
    }
}

impl RansacConfig {
    pub fn validate(&self) -> AlignResult<()> {
        if self.max_iterations == 0 {
            return Err(AlignError::InvalidConfig("RANSAC needs at least one iteration".into()));
        }
        if !(self.threshold > 0.0) {
            return Err(AlignError::InvalidConfig("reprojection threshold must be positive".into()));
        }
        if !(self.confidence > 0.0 && self.confidence < 1.0) {
            return Err(AlignError::InvalidConfig(format!(
                "confidence {} outside (0, 1)",
                self.confidence
            )));
        }
        if self.min_inliers < 2 {
            return Err(AlignError::InvalidConfig("inlier floor must be at least 2".into()));
        }
        Ok(())
    }
}

/// Common-overlap settings.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct OverlapConfig {
    /// Half-width of the square erosion element; 0 disables erosion.
    pub erosion_radius: u8,
}

impl Default for OverlapConfig {
    fn default() -> Self {
        Self { erosion_radius: 2 }
    }
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct AlignConfig {
    /// Fewest keypoints an image needs to take part.
    pub min_keypoints: usize,
    /// Worker threads for per-candidate processing.
    pub n_threads: usize,
    pub orb: OrbConfig,
    pub matching: MatchConfig,
    pub ransac: RansacConfig,
    pub overlap: OverlapConfig,
}

impl Default for AlignConfig {
    fn default() -> Self {
        Self {
            min_keypoints: MIN_KEYPOINTS,
            n_threads: num_cpus::get().max(1),
            orb: OrbConfig::default(),
            matching: MatchConfig::default(),
            ransac: RansacConfig::default(),
            overlap: OverlapConfig::default(),
        }
    }
}

impl AlignConfig {
    /// Fewer features and a tighter iteration budget.
    pub fn fast_preset() -> Self {
        Self {
            orb: OrbConfig {
                threshold: 30,
                n_features: 1500,
                n_levels: 4,
                ..OrbConfig::default()
            },
            ransac: RansacConfig {
                max_iterations: 500,
                ..RansacConfig::default()
            },
            ..Self::default()
        }
    }

    /// More features, a stricter ratio test and a larger erosion margin.
    pub fn precise_preset() -> Self {
        Self {
            orb: OrbConfig {
                threshold: 12,
                n_features: 8000,
                ..OrbConfig::default()
            },
            matching: MatchConfig { ratio: 0.7 },
            ransac: RansacConfig {
                max_iterations: 5000,
                threshold: 2.0,
                confidence: 0.999,
                ..RansacConfig::default()
            },
            overlap: OverlapConfig { erosion_radius: 25 },
            ..Self::default()
        }
    }

    pub fn validate(&self) -> AlignResult<()> {
        self.orb.validate()?;
        self.ransac.validate()?;
        if !(self.matching.ratio > 0.0 && self.matching.ratio <= 1.0) {
            return Err(AlignError::InvalidConfig(format!(
                "ratio {} outside (0, 1]",
                self.matching.ratio
            )));
        }
        if self.min_keypoints < 2 {
            return Err(AlignError::InvalidConfig("keypoint floor must be at least 2".into()));
        }
        if self.n_threads == 0 {
            return Err(AlignError::InvalidConfig("thread count must be positive".into()));
        }
        Ok(())
    }

    /// Generate human-readable summary
    pub fn summary(&self) -> String {
        format!(
            "AlignConfig: features={}, fast_threshold={}, levels={}x{:.2}, ratio={:.2}, ransac=[iters:{}, thr:{:.1}px, conf:{:.3}, min_inliers:{}], erosion={}, threads={}",
            self.orb.n_features,
            self.orb.threshold,
            self.orb.n_levels,
            self.orb.scale_factor,
            self.matching.ratio,
            self.ransac.max_iterations,
            self.ransac.threshold,
            self.ransac.confidence,
            self.ransac.min_inliers,
            self.overlap.erosion_radius,
            self.n_threads
        )
    }

    /// Serialize to JSON string
    #[cfg(feature = "serde")]
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize from JSON string
    #[cfg(feature = "serde")]
    pub fn from_json(json: &str) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to TOML string
    #[cfg(feature = "serde")]
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Deserialize from TOML string
    #[cfg(feature = "serde")]
    pub fn from_toml(toml_str: &str) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a `.json` or `.toml` file, chosen by extension.
    #[cfg(feature = "serde")]
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&content),
            _ => Self::from_toml(&content),
        }
    }

    /// Save configuration as JSON or TOML, chosen by extension.
    #[cfg(feature = "serde")]
    pub fn save<P: AsRef<std::path::Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let path = path.as_ref();
        let content = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => self.to_json()?,
            _ => self.to_toml()?,
        };
        std::fs::write(path, content)?;
        Ok(())
    }
}
