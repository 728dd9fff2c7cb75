//! Configuration structures for augmentation pipelines.
//!
//! Every stage has a parameter struct with the defaults used in training.
//! A full pipeline is described by [`AugmentationConfig`], which loads from
//! TOML:
//!
//! ```toml
//! seed = 42
//!
//! [[stages_2d]]
//! kind = "flip"
//! mode = "hv"
//!
//! [[stages_2d]]
//! kind = "zoom"
//! scale = [0.8, 1.2]
//! ```

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{AffineMode, FlipMode};

fn check_probability(value: f64, name: &str) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(Error::invalid(format!(
            "{name} must be within [0, 1], got {value}"
        )));
    }
    Ok(())
}

fn check_range(range: (f64, f64), name: &str, positive: bool) -> Result<()> {
    let (lo, hi) = range;
    if !lo.is_finite() || !hi.is_finite() || lo > hi {
        return Err(Error::invalid(format!(
            "{name} range ({lo}, {hi}) is inverted or not finite"
        )));
    }
    if positive && lo <= 0.0 {
        return Err(Error::invalid(format!(
            "{name} range ({lo}, {hi}) must be strictly positive"
        )));
    }
    Ok(())
}

/// Random erase parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EraseParams {
    /// Erase window size (height, width) used to widen the ROI
    pub window_size: (usize, usize),
    /// Whether to shrink the window by a random factor in [0.5, 1) per call
    pub scale_flag: bool,
    /// Erase happens when a uniform draw exceeds this value
    pub prob: f64,
}

impl Default for EraseParams {
    fn default() -> Self {
        Self {
            window_size: (64, 64),
            scale_flag: true,
            prob: 0.5,
        }
    }
}

impl EraseParams {
    pub fn validate(&self) -> Result<()> {
        check_probability(self.prob, "erase prob")
    }
}

/// Flip parameters, shared by the 2D and 3D flip stages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FlipParams {
    pub mode: FlipMode,
}

/// Rotation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotateParams {
    /// Candidate angles in degrees, counter-clockwise
    pub degrees: Vec<f64>,
}

impl Default for RotateParams {
    fn default() -> Self {
        Self {
            degrees: vec![-15.0, -10.0, -5.0, 0.0, 5.0, 10.0, 15.0],
        }
    }
}

impl RotateParams {
    pub fn validate(&self) -> Result<()> {
        if self.degrees.is_empty() {
            return Err(Error::invalid("rotate needs at least one candidate angle"));
        }
        if let Some(d) = self.degrees.iter().find(|d| !d.is_finite()) {
            return Err(Error::invalid(format!("rotate angle {d} is not finite")));
        }
        Ok(())
    }
}

/// Zoom parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoomParams {
    /// Scale factor range; below 1 crops, above 1 pads
    pub scale: (f64, f64),
}

impl Default for ZoomParams {
    fn default() -> Self {
        Self { scale: (0.8, 1.2) }
    }
}

impl ZoomParams {
    pub fn validate(&self) -> Result<()> {
        check_range(self.scale, "zoom scale", true)
    }
}

/// Gamma adjustment parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GammaParams {
    /// Gamma range
    pub scale: (f64, f64),
    /// Multiplier applied after the power law
    pub gain: f64,
}

impl Default for GammaParams {
    fn default() -> Self {
        Self {
            scale: (0.2, 1.8),
            gain: 1.0,
        }
    }
}

impl GammaParams {
    pub fn validate(&self) -> Result<()> {
        check_range(self.scale, "gamma scale", true)?;
        if !self.gain.is_finite() {
            return Err(Error::invalid("gamma gain is not finite"));
        }
        Ok(())
    }
}

/// Salt-and-pepper noise parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaltPepperParams {
    /// Probability of the stage firing at all
    pub prob: f64,
    /// Fraction of pixels replaced
    pub amount: f64,
    /// Share of replaced pixels that become salt
    pub salt_vs_pepper: f64,
}

impl Default for SaltPepperParams {
    fn default() -> Self {
        Self {
            prob: 0.1,
            amount: 0.05,
            salt_vs_pepper: 0.5,
        }
    }
}

impl SaltPepperParams {
    pub fn validate(&self) -> Result<()> {
        check_probability(self.prob, "salt-and-pepper prob")?;
        check_probability(self.amount, "salt-and-pepper amount")?;
        check_probability(self.salt_vs_pepper, "salt_vs_pepper")
    }
}

/// Additive Gaussian noise parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GaussianNoiseParams {
    /// Probability of the stage firing at all
    pub prob: f64,
    /// Noise standard deviation
    pub std: f64,
}

impl Default for GaussianNoiseParams {
    fn default() -> Self {
        Self {
            prob: 0.1,
            std: 0.002,
        }
    }
}

impl GaussianNoiseParams {
    pub fn validate(&self) -> Result<()> {
        check_probability(self.prob, "gaussian noise prob")?;
        if !(self.std >= 0.0 && self.std.is_finite()) {
            return Err(Error::invalid(format!(
                "gaussian noise std must be non-negative, got {}",
                self.std
            )));
        }
        Ok(())
    }
}

/// Elastic distortion parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistortParams {
    /// Displacement magnitude at full resolution
    pub alpha: u32,
    /// Smoothing sigma at full resolution
    pub sigma: u32,
    /// Coarsening factor of the displacement grid
    pub grid_scale: u32,
    /// Probability of applying the distortion
    pub prob: f64,
}

impl Default for DistortParams {
    fn default() -> Self {
        Self {
            alpha: 200,
            sigma: 20,
            grid_scale: 4,
            prob: 0.5,
        }
    }
}

impl DistortParams {
    pub fn validate(&self) -> Result<()> {
        check_probability(self.prob, "distort prob")?;
        if self.grid_scale == 0 {
            return Err(Error::invalid("distort grid_scale must be at least 1"));
        }
        Ok(())
    }
}

/// Combined 3D translation/rotation/zoom parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AffineParams3d {
    /// Enabled components
    pub mode: AffineMode,
    /// Number of label classes including background
    pub num_class: u8,
    /// Maximum in-plane shift in voxels
    pub max_shift: f64,
    /// Maximum in-plane rotation in degrees
    pub max_angle_deg: f64,
    /// In-plane zoom range
    pub zoom_range: (f64, f64),
}

impl Default for AffineParams3d {
    fn default() -> Self {
        Self {
            mode: AffineMode::all(),
            num_class: 2,
            max_shift: 5.0,
            max_angle_deg: 5.0,
            zoom_range: (0.9, 1.1),
        }
    }
}

impl AffineParams3d {
    pub fn validate(&self) -> Result<()> {
        if self.num_class == 0 {
            return Err(Error::invalid("num_class must include background"));
        }
        if !(self.max_shift >= 0.0 && self.max_angle_deg >= 0.0) {
            return Err(Error::invalid(
                "max_shift and max_angle_deg must be non-negative",
            ));
        }
        check_range(self.zoom_range, "3d zoom", true)
    }
}

/// One stage of a 2D pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Stage2dConfig {
    Erase(EraseParams),
    Flip(FlipParams),
    Rotate(RotateParams),
    Zoom(ZoomParams),
    Gamma(GammaParams),
    SaltPepper(SaltPepperParams),
    GaussianNoise(GaussianNoiseParams),
    Distort(DistortParams),
}

impl Stage2dConfig {
    pub fn validate(&self) -> Result<()> {
        match self {
            Stage2dConfig::Erase(p) => p.validate(),
            Stage2dConfig::Flip(_) => Ok(()),
            Stage2dConfig::Rotate(p) => p.validate(),
            Stage2dConfig::Zoom(p) => p.validate(),
            Stage2dConfig::Gamma(p) => p.validate(),
            Stage2dConfig::SaltPepper(p) => p.validate(),
            Stage2dConfig::GaussianNoise(p) => p.validate(),
            Stage2dConfig::Distort(p) => p.validate(),
        }
    }
}

/// One stage of a 3D pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Stage3dConfig {
    TranslateRotateZoom(AffineParams3d),
    Flip(FlipParams),
}

impl Stage3dConfig {
    pub fn validate(&self) -> Result<()> {
        match self {
            Stage3dConfig::TranslateRotateZoom(p) => p.validate(),
            Stage3dConfig::Flip(_) => Ok(()),
        }
    }
}

/// Data augmentation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AugmentationConfig {
    /// Seed for the pipeline RNG; entropy when absent
    #[serde(default)]
    pub seed: Option<u64>,
    /// Ordered stages for image/mask slices
    #[serde(default)]
    pub stages_2d: Vec<Stage2dConfig>,
    /// Ordered stages for image/label volumes
    #[serde(default)]
    pub stages_3d: Vec<Stage3dConfig>,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            seed: None,
            stages_2d: vec![
                Stage2dConfig::Flip(FlipParams::default()),
                Stage2dConfig::Rotate(RotateParams::default()),
                Stage2dConfig::Zoom(ZoomParams::default()),
                Stage2dConfig::Distort(DistortParams::default()),
                Stage2dConfig::Gamma(GammaParams::default()),
                Stage2dConfig::SaltPepper(SaltPepperParams::default()),
                Stage2dConfig::GaussianNoise(GaussianNoiseParams::default()),
            ],
            stages_3d: vec![
                Stage3dConfig::TranslateRotateZoom(AffineParams3d::default()),
                Stage3dConfig::Flip(FlipParams::default()),
            ],
        }
    }
}

impl AugmentationConfig {
    /// Flips and small rotations only
    pub fn light() -> Self {
        Self {
            seed: None,
            stages_2d: vec![
                Stage2dConfig::Flip(FlipParams::default()),
                Stage2dConfig::Rotate(RotateParams {
                    degrees: vec![-5.0, 0.0, 5.0],
                }),
            ],
            stages_3d: vec![Stage3dConfig::Flip(FlipParams::default())],
        }
    }

    /// Balanced preset
    pub fn medium() -> Self {
        Self::default()
    }

    /// Everything, including ROI-aware erasing and stronger elastic warps
    pub fn heavy() -> Self {
        Self {
            seed: None,
            stages_2d: vec![
                Stage2dConfig::Erase(EraseParams::default()),
                Stage2dConfig::Flip(FlipParams::default()),
                Stage2dConfig::Rotate(RotateParams::default()),
                Stage2dConfig::Zoom(ZoomParams { scale: (0.7, 1.3) }),
                Stage2dConfig::Distort(DistortParams {
                    prob: 0.7,
                    ..DistortParams::default()
                }),
                Stage2dConfig::Gamma(GammaParams::default()),
                Stage2dConfig::SaltPepper(SaltPepperParams {
                    prob: 0.2,
                    ..SaltPepperParams::default()
                }),
                Stage2dConfig::GaussianNoise(GaussianNoiseParams {
                    prob: 0.2,
                    std: 0.01,
                }),
            ],
            stages_3d: vec![
                Stage3dConfig::TranslateRotateZoom(AffineParams3d {
                    max_shift: 10.0,
                    max_angle_deg: 10.0,
                    zoom_range: (0.8, 1.2),
                    ..AffineParams3d::default()
                }),
                Stage3dConfig::Flip(FlipParams::default()),
            ],
        }
    }

    /// No augmentation (for validation/inference)
    pub fn none() -> Self {
        Self {
            seed: None,
            stages_2d: Vec::new(),
            stages_3d: Vec::new(),
        }
    }

    /// Returns the preset with the given name.
    pub fn preset(name: &str) -> Result<Self> {
        match name {
            "light" => Ok(Self::light()),
            "medium" => Ok(Self::medium()),
            "heavy" => Ok(Self::heavy()),
            "none" => Ok(Self::none()),
            other => Err(Error::Config(format!("unknown augmentation preset '{other}'"))),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Validates every stage, reporting the first failure with its position.
    pub fn validate(&self) -> Result<()> {
        for (i, stage) in self.stages_2d.iter().enumerate() {
            stage
                .validate()
                .map_err(|e| Error::invalid(format!("stages_2d[{i}]: {e}")))?;
        }
        for (i, stage) in self.stages_3d.iter().enumerate() {
            stage
                .validate()
                .map_err(|e| Error::invalid(format!("stages_3d[{i}]: {e}")))?;
        }
        Ok(())
    }

    /// Reads and validates a pipeline description from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let config: Self = load_toml_config(path)?;
        config.validate()?;
        Ok(config)
    }
}

/// Reads any serde-deserializable config from a TOML file.
pub fn load_toml_config<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned,
{
    let content = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read config {}: {e}", path.display())))?;

    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse config {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_augmentation_config() {
        let config = AugmentationConfig::default();
        assert!(config.seed.is_none());
        assert_eq!(config.stages_2d.len(), 7);
        assert_eq!(config.stages_3d.len(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_presets_validate() {
        for name in ["light", "medium", "heavy", "none"] {
            let config = AugmentationConfig::preset(name).unwrap();
            assert!(config.validate().is_ok(), "preset {name} failed validation");
        }
        assert!(AugmentationConfig::preset("extreme").is_err());
    }

    #[test]
    fn test_stage_defaults() {
        assert_eq!(EraseParams::default().window_size, (64, 64));
        assert_eq!(RotateParams::default().degrees.len(), 7);
        assert_eq!(DistortParams::default().grid_scale, 4);
        assert_eq!(GaussianNoiseParams::default().std, 0.002);
        assert_eq!(AffineParams3d::default().mode, AffineMode::all());
    }

    #[test]
    fn test_invalid_parameters() {
        let inverted = ZoomParams { scale: (1.2, 0.8) };
        assert!(matches!(inverted.validate(), Err(Error::InvalidParameter(_))));

        let zero_scale = ZoomParams { scale: (0.0, 1.0) };
        assert!(zero_scale.validate().is_err());

        let empty = RotateParams { degrees: vec![] };
        assert!(empty.validate().is_err());

        let bad_prob = SaltPepperParams {
            prob: 1.5,
            ..SaltPepperParams::default()
        };
        assert!(bad_prob.validate().is_err());

        let no_grid = DistortParams {
            grid_scale: 0,
            ..DistortParams::default()
        };
        assert!(no_grid.validate().is_err());
    }

    #[test]
    fn test_validate_reports_stage_index() {
        let config = AugmentationConfig {
            seed: None,
            stages_2d: vec![
                Stage2dConfig::Flip(FlipParams::default()),
                Stage2dConfig::Gamma(GammaParams {
                    scale: (1.8, 0.2),
                    gain: 1.0,
                }),
            ],
            stages_3d: vec![],
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("stages_2d[1]"));
    }

    #[test]
    fn test_parse_toml_pipeline() {
        let text = r#"
            seed = 7

            [[stages_2d]]
            kind = "flip"
            mode = "h"

            [[stages_2d]]
            kind = "zoom"
            scale = [0.9, 1.1]

            [[stages_2d]]
            kind = "gaussian_noise"

            [[stages_3d]]
            kind = "translate_rotate_zoom"
            mode = "rz"
            num_class = 3
        "#;
        let config: AugmentationConfig = toml::from_str(text).unwrap();
        assert_eq!(config.seed, Some(7));
        assert_eq!(
            config.stages_2d[0],
            Stage2dConfig::Flip(FlipParams {
                mode: FlipMode::Horizontal
            })
        );
        assert_eq!(
            config.stages_2d[1],
            Stage2dConfig::Zoom(ZoomParams { scale: (0.9, 1.1) })
        );
        assert_eq!(
            config.stages_2d[2],
            Stage2dConfig::GaussianNoise(GaussianNoiseParams::default())
        );
        match &config.stages_3d[0] {
            Stage3dConfig::TranslateRotateZoom(p) => {
                assert!(!p.mode.translate && p.mode.rotate && p.mode.zoom);
                assert_eq!(p.num_class, 3);
                assert_eq!(p.max_shift, 5.0);
            }
            other => panic!("unexpected stage {other:?}"),
        }
    }

    #[test]
    fn test_bad_flip_mode_rejected_at_parse() {
        let text = r#"
            [[stages_2d]]
            kind = "flip"
            mode = "x"
        "#;
        assert!(toml::from_str::<AugmentationConfig>(text).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "seed = 3\n[[stages_3d]]\nkind = \"flip\"\nmode = \"v\"").unwrap();

        let config = AugmentationConfig::load(file.path()).unwrap();
        assert_eq!(config.seed, Some(3));
        assert_eq!(config.stages_3d.len(), 1);
        assert!(config.stages_2d.is_empty());
    }

    #[test]
    fn test_load_missing_file() {
        let err = AugmentationConfig::load(Path::new("/nonexistent/pipeline.toml")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
