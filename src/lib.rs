//! Tooling for int8 model deployment: quantized conversion, artifact
//! embedding, and numeric parity checks between desktop and board inference.

pub mod byte_array;
pub mod config;
pub mod conversion;
pub mod error;
pub mod model;
pub mod predict;
pub mod quantization;
pub mod sample;
pub mod scaling;
pub mod sweep;

pub use config::ParityConfig;
pub use error::{ParityError, Result};
pub use model::{Interpreter, ModelArtifact};
pub use predict::{Prediction, Predictor};
pub use quantization::{AffineQuantizer, QuantParams, RoundingMode, TensorDescriptor};
pub use sample::PhysicalSample;
pub use scaling::AffineScaler;
