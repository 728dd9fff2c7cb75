//! Core type definitions shared by the augmentation stages and the model table.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{Error, Result};

/// Segmentation network family
///
/// Written as `unet`, `att_unet`, `res_unet` or `deeplabv3+`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(try_from = "String", into = "String")]
pub enum ArchitectureFamily {
    /// Plain U-Net
    Unet,
    /// Attention U-Net
    AttUnet,
    /// Residual U-Net
    ResUnet,
    /// DeepLabV3+
    DeepLabV3Plus,
}

impl ArchitectureFamily {
    pub const ALL: [ArchitectureFamily; 4] = [
        ArchitectureFamily::Unet,
        ArchitectureFamily::AttUnet,
        ArchitectureFamily::ResUnet,
        ArchitectureFamily::DeepLabV3Plus,
    ];

    /// Whether entries of this family use a single decoder width and atrous rates
    pub fn is_deeplab(&self) -> bool {
        matches!(self, ArchitectureFamily::DeepLabV3Plus)
    }
}

impl std::fmt::Display for ArchitectureFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArchitectureFamily::Unet => write!(f, "unet"),
            ArchitectureFamily::AttUnet => write!(f, "att_unet"),
            ArchitectureFamily::ResUnet => write!(f, "res_unet"),
            ArchitectureFamily::DeepLabV3Plus => write!(f, "deeplabv3+"),
        }
    }
}

impl FromStr for ArchitectureFamily {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|family| family.to_string() == s)
            .ok_or_else(|| Error::invalid(format!("unknown architecture family '{s}'")))
    }
}

impl TryFrom<String> for ArchitectureFamily {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ArchitectureFamily> for String {
    fn from(value: ArchitectureFamily) -> Self {
        value.to_string()
    }
}

/// Encoder backbone
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(try_from = "String", into = "String")]
pub enum Backbone {
    /// Small plain convolutional encoder
    SimpleNet,
    /// Swin transformer encoder
    SwinTransformer,
    /// Swin transformer fused with a ResNet-18 stem
    SwinPlusR18,
    /// ResNet-18
    ResNet18,
}

impl Backbone {
    pub const ALL: [Backbone; 4] = [
        Backbone::SimpleNet,
        Backbone::SwinTransformer,
        Backbone::SwinPlusR18,
        Backbone::ResNet18,
    ];
}

impl std::fmt::Display for Backbone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backbone::SimpleNet => write!(f, "simplenet"),
            Backbone::SwinTransformer => write!(f, "swin_transformer"),
            Backbone::SwinPlusR18 => write!(f, "swinplusr18"),
            Backbone::ResNet18 => write!(f, "resnet18"),
        }
    }
}

impl FromStr for Backbone {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|backbone| backbone.to_string() == s)
            .ok_or_else(|| Error::invalid(format!("unknown backbone '{s}'")))
    }
}

impl TryFrom<String> for Backbone {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Backbone> for String {
    fn from(value: Backbone) -> Self {
        value.to_string()
    }
}

/// Which mirrorings a flip stage may choose from.
///
/// Written as a string of `h` and `v` characters in configs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(try_from = "String", into = "String")]
pub enum FlipMode {
    /// Left-right mirroring only
    Horizontal,
    /// Top-bottom mirroring only
    Vertical,
    /// Either mirroring, chosen per call
    #[default]
    Both,
}

/// Axis picked by a flip decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlipAxis {
    Horizontal,
    Vertical,
}

impl FlipMode {
    /// Maps a uniform draw in `[0, 1)` to the flip it selects.
    ///
    /// `Both` splits the unit interval 0.3 / 0.3 / 0.4 between horizontal,
    /// vertical and no flip. Single-axis modes flip when the draw exceeds 0.5.
    pub fn decide(&self, factor: f64) -> Option<FlipAxis> {
        match self {
            FlipMode::Both if factor < 0.3 => Some(FlipAxis::Horizontal),
            FlipMode::Both if factor < 0.6 => Some(FlipAxis::Vertical),
            FlipMode::Both => None,
            FlipMode::Horizontal if factor > 0.5 => Some(FlipAxis::Horizontal),
            FlipMode::Vertical if factor > 0.5 => Some(FlipAxis::Vertical),
            _ => None,
        }
    }
}

impl std::fmt::Display for FlipMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlipMode::Horizontal => write!(f, "h"),
            FlipMode::Vertical => write!(f, "v"),
            FlipMode::Both => write!(f, "hv"),
        }
    }
}

impl FromStr for FlipMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if let Some(c) = s.chars().find(|c| !matches!(c, 'h' | 'v')) {
            return Err(Error::invalid(format!("flip mode '{s}' contains '{c}'")));
        }
        match (s.contains('h'), s.contains('v')) {
            (true, true) => Ok(FlipMode::Both),
            (true, false) => Ok(FlipMode::Horizontal),
            (false, true) => Ok(FlipMode::Vertical),
            (false, false) => Err(Error::invalid("flip mode must contain 'h' or 'v'")),
        }
    }
}

impl TryFrom<String> for FlipMode {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<FlipMode> for String {
    fn from(mode: FlipMode) -> Self {
        mode.to_string()
    }
}

/// Components enabled in the combined 3D affine stage.
///
/// Written as any combination of `t` (translation), `r` (rotation) and
/// `z` (zoom). The empty string disables all three.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "String", into = "String")]
pub struct AffineMode {
    pub translate: bool,
    pub rotate: bool,
    pub zoom: bool,
}

impl AffineMode {
    pub fn all() -> Self {
        Self {
            translate: true,
            rotate: true,
            zoom: true,
        }
    }

    pub fn identity() -> Self {
        Self {
            translate: false,
            rotate: false,
            zoom: false,
        }
    }

    pub fn is_identity(&self) -> bool {
        !(self.translate || self.rotate || self.zoom)
    }
}

impl Default for AffineMode {
    fn default() -> Self {
        Self::all()
    }
}

impl std::fmt::Display for AffineMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.translate {
            write!(f, "t")?;
        }
        if self.rotate {
            write!(f, "r")?;
        }
        if self.zoom {
            write!(f, "z")?;
        }
        Ok(())
    }
}

impl FromStr for AffineMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut mode = AffineMode::identity();
        for c in s.chars() {
            match c {
                't' => mode.translate = true,
                'r' => mode.rotate = true,
                'z' => mode.zoom = true,
                other => {
                    return Err(Error::invalid(format!(
                        "affine mode '{s}' contains '{other}', expected t/r/z"
                    )))
                }
            }
        }
        Ok(mode)
    }
}

impl TryFrom<String> for AffineMode {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<AffineMode> for String {
    fn from(mode: AffineMode) -> Self {
        mode.to_string()
    }
}
