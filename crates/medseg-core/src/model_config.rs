//! Architecture hyperparameter table for the segmentation networks.
//!
//! The table maps an [`ArchitectureFamily`] and an encoder [`Backbone`] to the
//! record an external model builder needs. The built-in table is created once
//! per process and is read-only afterwards; user tables loaded from TOML go
//! through the same validation.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::config::load_toml_config;
use crate::error::{Error, Result};
use crate::types::{ArchitectureFamily, Backbone};

/// Decoder width specification.
///
/// U-Net variants list one width per decoder stage; DeepLabV3+ uses a
/// single width for its ASPP decoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DecoderChannels {
    Stages(Vec<usize>),
    Uniform(usize),
}

/// Hyperparameters of one (family, backbone) network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfigEntry {
    pub in_channels: usize,
    pub encoder_name: String,
    pub encoder_depth: usize,
    pub encoder_channels: Vec<usize>,
    #[serde(default)]
    pub encoder_weights: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decoder_use_batchnorm: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decoder_attention_type: Option<String>,
    pub decoder_channels: DecoderChannels,
    pub upsampling: usize,
    pub classes: usize,
    pub aux_classifier: bool,
    /// DeepLabV3+ only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoder_output_stride: Option<usize>,
    /// DeepLabV3+ only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decoder_atrous_rates: Option<(usize, usize, usize)>,
}

impl ModelConfigEntry {
    fn unet(
        encoder_name: &str,
        encoder_channels: &[usize],
        decoder_channels: &[usize],
        upsampling: usize,
    ) -> Self {
        Self {
            in_channels: 1,
            encoder_name: encoder_name.to_string(),
            encoder_depth: encoder_channels.len(),
            encoder_channels: encoder_channels.to_vec(),
            encoder_weights: None,
            decoder_use_batchnorm: Some(true),
            decoder_attention_type: None,
            decoder_channels: DecoderChannels::Stages(decoder_channels.to_vec()),
            upsampling,
            classes: 2,
            aux_classifier: false,
            encoder_output_stride: None,
            decoder_atrous_rates: None,
        }
    }

    fn deeplab(encoder_name: &str, encoder_channels: &[usize], upsampling: usize) -> Self {
        Self {
            in_channels: 1,
            encoder_name: encoder_name.to_string(),
            encoder_depth: encoder_channels.len(),
            encoder_channels: encoder_channels.to_vec(),
            encoder_weights: None,
            decoder_use_batchnorm: None,
            decoder_attention_type: None,
            decoder_channels: DecoderChannels::Uniform(256),
            upsampling,
            classes: 2,
            aux_classifier: false,
            encoder_output_stride: Some(32),
            decoder_atrous_rates: Some((12, 24, 36)),
        }
    }

    /// Checks internal consistency of the entry for the given family.
    pub fn validate(&self, family: ArchitectureFamily) -> Result<()> {
        if self.in_channels == 0 {
            return Err(Error::invalid("in_channels must be at least 1"));
        }
        if self.classes == 0 {
            return Err(Error::invalid("classes must be at least 1"));
        }
        if self.upsampling == 0 {
            return Err(Error::invalid("upsampling must be at least 1"));
        }
        if self.encoder_channels.len() != self.encoder_depth {
            return Err(Error::invalid(format!(
                "encoder_depth {} does not match {} encoder_channels",
                self.encoder_depth,
                self.encoder_channels.len()
            )));
        }

        match (&self.decoder_channels, family.is_deeplab()) {
            (DecoderChannels::Stages(stages), false) => {
                if stages.len() + 1 != self.encoder_depth {
                    return Err(Error::invalid(format!(
                        "{} decoder stages for encoder depth {}, expected {}",
                        stages.len(),
                        self.encoder_depth,
                        self.encoder_depth.saturating_sub(1)
                    )));
                }
            }
            (DecoderChannels::Uniform(_), true) => {
                match self.encoder_output_stride {
                    Some(8 | 16 | 32) => {}
                    other => {
                        return Err(Error::invalid(format!(
                            "encoder_output_stride must be 8, 16 or 32, got {other:?}"
                        )))
                    }
                }
                if self.decoder_atrous_rates.is_none() {
                    return Err(Error::invalid("decoder_atrous_rates missing"));
                }
            }
            (DecoderChannels::Stages(_), true) => {
                return Err(Error::invalid("deeplabv3+ takes a single decoder width"));
            }
            (DecoderChannels::Uniform(_), false) => {
                return Err(Error::invalid(format!(
                    "{family} needs one decoder width per stage"
                )));
            }
        }
        Ok(())
    }
}

/// Read-only lookup table of model hyperparameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelConfigTable {
    entries: BTreeMap<ArchitectureFamily, BTreeMap<Backbone, ModelConfigEntry>>,
}

impl ModelConfigTable {
    /// The table shipped with the crate.
    pub fn builtin() -> Self {
        use ArchitectureFamily::*;
        use Backbone::*;

        const SIMPLE_ENC: [usize; 5] = [32, 64, 128, 256, 512];
        const SWIN_ENC: [usize; 4] = [96, 192, 384, 768];
        const RES_ENC: [usize; 5] = [64, 64, 128, 256, 512];
        const DEC_4: [usize; 4] = [256, 128, 64, 32];
        const DEC_3: [usize; 3] = [256, 128, 64];

        let rows = [
            (Unet, SimpleNet, ModelConfigEntry::unet("simplenet", &SIMPLE_ENC, &DEC_4, 1)),
            (Unet, SwinTransformer, ModelConfigEntry::unet("swin_transformer", &SWIN_ENC, &DEC_3, 4)),
            (Unet, SwinPlusR18, ModelConfigEntry::unet("swinplusr18", &RES_ENC, &DEC_4, 2)),
            (AttUnet, SimpleNet, ModelConfigEntry::unet("simplenet", &SIMPLE_ENC, &DEC_4, 1)),
            (AttUnet, SwinTransformer, ModelConfigEntry::unet("swin_transformer", &SWIN_ENC, &DEC_3, 4)),
            (AttUnet, ResNet18, ModelConfigEntry::unet("resnet18", &RES_ENC, &DEC_4, 2)),
            (ResUnet, SimpleNet, ModelConfigEntry::unet("simplenet_res", &SIMPLE_ENC, &DEC_4, 1)),
            (ResUnet, ResNet18, ModelConfigEntry::unet("resnet18", &RES_ENC, &DEC_4, 2)),
            (ResUnet, SwinPlusR18, ModelConfigEntry::unet("swinplusr18", &RES_ENC, &DEC_4, 2)),
            (DeepLabV3Plus, SwinPlusR18, ModelConfigEntry::deeplab("swinplusr18", &RES_ENC, 4)),
        ];

        let mut entries: BTreeMap<_, BTreeMap<_, _>> = BTreeMap::new();
        for (family, backbone, entry) in rows {
            entries.entry(family).or_default().insert(backbone, entry);
        }
        Self { entries }
    }

    /// Looks up the entry for a typed key pair.
    pub fn get(&self, family: ArchitectureFamily, backbone: Backbone) -> Result<&ModelConfigEntry> {
        self.entries
            .get(&family)
            .and_then(|backbones| backbones.get(&backbone))
            .ok_or_else(|| Error::lookup(family, backbone))
    }

    /// Looks up the entry by family and backbone names.
    ///
    /// Names that do not parse are reported the same way as missing pairs.
    pub fn lookup(&self, family: &str, backbone: &str) -> Result<&ModelConfigEntry> {
        let parsed = family
            .parse::<ArchitectureFamily>()
            .and_then(|f| backbone.parse::<Backbone>().map(|b| (f, b)));
        match parsed {
            Ok((f, b)) => self.get(f, b),
            Err(_) => Err(Error::lookup(family, backbone)),
        }
    }

    pub fn contains(&self, family: ArchitectureFamily, backbone: Backbone) -> bool {
        self.get(family, backbone).is_ok()
    }

    pub fn families(&self) -> impl Iterator<Item = ArchitectureFamily> + '_ {
        self.entries.keys().copied()
    }

    pub fn backbones(&self, family: ArchitectureFamily) -> Vec<Backbone> {
        self.entries
            .get(&family)
            .map(|b| b.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Iterates over every (family, backbone, entry) triple in key order.
    pub fn iter(&self) -> impl Iterator<Item = (ArchitectureFamily, Backbone, &ModelConfigEntry)> {
        self.entries.iter().flat_map(|(family, backbones)| {
            backbones
                .iter()
                .map(move |(backbone, entry)| (*family, *backbone, entry))
        })
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Validates every entry, naming the offending key on failure.
    pub fn validate(&self) -> Result<()> {
        for (family, backbone, entry) in self.iter() {
            entry
                .validate(family)
                .map_err(|e| Error::invalid(format!("{family}/{backbone}: {e}")))?;
        }
        Ok(())
    }

    /// Parses and validates a table written as `[family.backbone]` sections.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let table: Self =
            toml::from_str(text).map_err(|e| Error::Config(format!("Failed to parse model table: {e}")))?;
        table.validate()?;
        Ok(table)
    }

    /// Reads and validates a table from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let table: Self = load_toml_config(path)?;
        table.validate()?;
        tracing::info!(
            "Loaded {} model configurations from {}",
            table.len(),
            path.display()
        );
        Ok(table)
    }

    /// Serializes the whole table as pretty JSON.
    ///
    /// U-Net family entries always carry `decoder_attention_type`, as `null`
    /// when unset; the model builder reads the key unconditionally.
    pub fn to_json(&self) -> Result<String> {
        let mut value = serde_json::to_value(self)?;
        for (family, backbone, _) in self.iter().filter(|(f, _, _)| !f.is_deeplab()) {
            if let Some(entry) = value
                .get_mut(family.to_string())
                .and_then(|backbones| backbones.get_mut(backbone.to_string()))
                .and_then(serde_json::Value::as_object_mut)
            {
                entry
                    .entry("decoder_attention_type")
                    .or_insert(serde_json::Value::Null);
            }
        }
        Ok(serde_json::to_string_pretty(&value)?)
    }
}

static MODEL_CONFIG: OnceLock<ModelConfigTable> = OnceLock::new();

/// Process-wide built-in table, created on first use.
pub fn model_config() -> &'static ModelConfigTable {
    MODEL_CONFIG.get_or_init(ModelConfigTable::builtin)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_is_valid() {
        let table = ModelConfigTable::builtin();
        assert_eq!(table.len(), 10);
        assert!(table.validate().is_ok());
    }

    #[test]
    fn test_unet_simplenet_lookup() {
        let entry = model_config().lookup("unet", "simplenet").unwrap();
        assert_eq!(entry.classes, 2);
        assert_eq!(entry.encoder_depth, 5);
        assert_eq!(entry.encoder_channels, vec![32, 64, 128, 256, 512]);
        assert_eq!(
            entry.decoder_channels,
            DecoderChannels::Stages(vec![256, 128, 64, 32])
        );
        assert_eq!(entry.decoder_use_batchnorm, Some(true));
        assert!(entry.encoder_weights.is_none());
    }

    #[test]
    fn test_unknown_backbone_is_lookup_error() {
        let err = model_config().lookup("unet", "nonexistent").unwrap_err();
        match err {
            Error::ConfigurationLookup { family, backbone } => {
                assert_eq!(family, "unet");
                assert_eq!(backbone, "nonexistent");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_missing_pair_is_lookup_error() {
        // resnet18 exists as a backbone but not under plain unet
        let err = model_config()
            .get(ArchitectureFamily::Unet, Backbone::ResNet18)
            .unwrap_err();
        assert!(matches!(err, Error::ConfigurationLookup { .. }));
        assert!(model_config().lookup("transunet", "simplenet").is_err());
    }

    #[test]
    fn test_res_unet_uses_residual_simplenet() {
        let entry = model_config()
            .get(ArchitectureFamily::ResUnet, Backbone::SimpleNet)
            .unwrap();
        assert_eq!(entry.encoder_name, "simplenet_res");
    }

    #[test]
    fn test_swin_entries_have_depth_four() {
        let entry = model_config().lookup("att_unet", "swin_transformer").unwrap();
        assert_eq!(entry.encoder_depth, 4);
        assert_eq!(entry.upsampling, 4);
        assert_eq!(entry.decoder_channels, DecoderChannels::Stages(vec![256, 128, 64]));
    }

    #[test]
    fn test_deeplab_entry() {
        let entry = model_config().lookup("deeplabv3+", "swinplusr18").unwrap();
        assert_eq!(entry.decoder_channels, DecoderChannels::Uniform(256));
        assert_eq!(entry.encoder_output_stride, Some(32));
        assert_eq!(entry.decoder_atrous_rates, Some((12, 24, 36)));
        assert!(entry.decoder_use_batchnorm.is_none());
        assert_eq!(
            model_config().backbones(ArchitectureFamily::DeepLabV3Plus),
            vec![Backbone::SwinPlusR18]
        );
    }

    #[test]
    fn test_json_field_names() {
        let table = ModelConfigTable::builtin();
        let value: serde_json::Value = serde_json::from_str(&table.to_json().unwrap()).unwrap();

        let unet = &value["unet"]["simplenet"];
        assert_eq!(unet["classes"], 2);
        assert_eq!(unet["decoder_channels"], serde_json::json!([256, 128, 64, 32]));
        assert!(unet["encoder_weights"].is_null());
        assert!(unet.get("encoder_output_stride").is_none());

        for (family, backbone, _) in table.iter().filter(|(f, _, _)| !f.is_deeplab()) {
            let entry = &value[family.to_string()][backbone.to_string()];
            let attention = entry.get("decoder_attention_type");
            assert!(
                attention.is_some_and(serde_json::Value::is_null),
                "{family}/{backbone} lacks a null decoder_attention_type"
            );
        }

        let deeplab = &value["deeplabv3+"]["swinplusr18"];
        assert_eq!(deeplab["decoder_channels"], 256);
        assert_eq!(deeplab["decoder_atrous_rates"], serde_json::json!([12, 24, 36]));
        assert!(deeplab.get("decoder_attention_type").is_none());
        assert!(deeplab.get("decoder_use_batchnorm").is_none());
    }

    #[test]
    fn test_toml_table_round_trip_through_validation() {
        let text = r#"
            [unet.simplenet]
            in_channels = 3
            encoder_name = "simplenet"
            encoder_depth = 3
            encoder_channels = [16, 32, 64]
            decoder_use_batchnorm = false
            decoder_channels = [32, 16]
            upsampling = 1
            classes = 4
            aux_classifier = true
        "#;
        let table = ModelConfigTable::from_toml_str(text).unwrap();
        let entry = table.lookup("unet", "simplenet").unwrap();
        assert_eq!(entry.in_channels, 3);
        assert_eq!(entry.classes, 4);
        assert!(entry.aux_classifier);
        assert!(table.lookup("att_unet", "simplenet").is_err());
    }

    #[test]
    fn test_toml_table_rejects_inconsistent_depth() {
        let text = r#"
            [unet.simplenet]
            in_channels = 1
            encoder_name = "simplenet"
            encoder_depth = 5
            encoder_channels = [16, 32, 64]
            decoder_channels = [32, 16]
            upsampling = 1
            classes = 2
            aux_classifier = false
        "#;
        let err = ModelConfigTable::from_toml_str(text).unwrap_err();
        assert!(err.to_string().contains("unet/simplenet"));
    }

    #[test]
    fn test_toml_table_rejects_unknown_backbone() {
        let text = r#"
            [unet.vgg16]
            in_channels = 1
            encoder_name = "vgg16"
            encoder_depth = 1
            encoder_channels = [16]
            decoder_channels = []
            upsampling = 1
            classes = 2
            aux_classifier = false
        "#;
        assert!(matches!(
            ModelConfigTable::from_toml_str(text),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_deeplab_stride_validation() {
        let mut entry = model_config()
            .get(ArchitectureFamily::DeepLabV3Plus, Backbone::SwinPlusR18)
            .unwrap()
            .clone();
        entry.encoder_output_stride = Some(4);
        assert!(entry.validate(ArchitectureFamily::DeepLabV3Plus).is_err());
        entry.encoder_output_stride = Some(16);
        assert!(entry.validate(ArchitectureFamily::DeepLabV3Plus).is_ok());
        assert!(entry.validate(ArchitectureFamily::Unet).is_err());
    }
}
