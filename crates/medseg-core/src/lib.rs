//! Core types and utilities for segmentation data augmentation.
//!
//! This crate provides the error type, augmentation configuration, logging
//! setup, and the model hyperparameter table shared across the workspace.

pub mod config;
pub mod error;
pub mod logging;
pub mod model_config;
pub mod types;

pub use config::*;
pub use error::{Error, Result};
pub use logging::{init_logging, LogConfig};
pub use model_config::{model_config, DecoderChannels, ModelConfigEntry, ModelConfigTable};
pub use types::*;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::*;
    pub use crate::error::{Error, Result};
    pub use crate::model_config::*;
    pub use crate::types::*;
}
