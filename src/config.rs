use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ParityError, Result};
use crate::quantization::RoundingMode;
use crate::scaling::AffineScaler;

/// Integer kernels available both in the embedded runtime's op resolver
/// and in the desktop interpreter. Recurrent, control-flow and explicit
/// (de)quantize ops are left out: the desktop interpreter cannot load them,
/// so converting to them would pass here and fail at `predict`.
pub const DEFAULT_SUPPORTED_OPS: &[&str] = &[
    "ADD",
    "AVERAGE_POOL_2D",
    "CONCATENATION",
    "CONV_2D",
    "DEPTHWISE_CONV_2D",
    "EXPAND_DIMS",
    "FULLY_CONNECTED",
    "LOGISTIC",
    "MAX_POOL_2D",
    "MEAN",
    "MUL",
    "PAD",
    "RELU",
    "RESHAPE",
    "SHAPE",
    "SOFTMAX",
    "SQUEEZE",
    "STRIDED_SLICE",
    "SUB",
    "TANH",
    "TRANSPOSE",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Number of representative samples fed to the converter.
    pub samples: usize,
    pub seed: u64,
    pub low: f32,
    pub high: f32,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        CalibrationConfig {
            samples: 100,
            seed: 0,
            low: 0.0,
            high: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParityConfig {
    pub input_min: f32,
    pub input_max: f32,
    pub sample_len: usize,
    pub rounding: RoundingMode,
    pub calibration: CalibrationConfig,
    pub supported_ops: Vec<String>,
}

impl Default for ParityConfig {
    fn default() -> Self {
        ParityConfig {
            input_min: -5.0,
            input_max: 25.0,
            sample_len: 48,
            rounding: RoundingMode::default(),
            calibration: CalibrationConfig::default(),
            supported_ops: DEFAULT_SUPPORTED_OPS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ParityConfig {
    /// Loads a JSON config; absent fields keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: ParityConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.scaler()?;
        if self.sample_len == 0 {
            return Err(ParityError::Domain("sample_len must be at least 1".into()));
        }
        if self.calibration.samples == 0 {
            return Err(ParityError::Domain(
                "calibration.samples must be at least 1".into(),
            ));
        }
        if !(self.calibration.low < self.calibration.high) {
            return Err(ParityError::Domain(format!(
                "calibration range [{}, {}) is empty",
                self.calibration.low, self.calibration.high
            )));
        }
        Ok(())
    }

    pub fn scaler(&self) -> Result<AffineScaler> {
        AffineScaler::new(self.input_min, self.input_max)
    }

    /// Model input shape for one window: `[1, sample_len, 1]`.
    pub fn input_shape(&self) -> [usize; 3] {
        [1, self.sample_len, 1]
    }
}
