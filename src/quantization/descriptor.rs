use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ParityError, Result};

use super::{AffineQuantizer, QuantParams, RoundingMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    Int8,
    UInt8,
    Float32,
}

impl ElementType {
    pub fn is_integer(self) -> bool {
        !matches!(self, ElementType::Float32)
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementType::Int8 => write!(f, "int8"),
            ElementType::UInt8 => write!(f, "uint8"),
            ElementType::Float32 => write!(f, "float32"),
        }
    }
}

/// Metadata of one model input or output, as read from a loaded artifact.
///
/// The quantization parameters belong to the artifact they were read from and
/// change whenever the model is reconverted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorDescriptor {
    pub name: String,
    pub index: usize,
    pub element_type: ElementType,
    pub shape: Vec<usize>,
    pub quantization: Option<QuantParams>,
}

impl TensorDescriptor {
    pub fn element_count(&self) -> usize {
        self.shape.iter().product()
    }

    /// Quantizer for an integer tensor. Integer tensors without parameters
    /// cannot be mapped to reals.
    pub fn quantizer(&self, rounding: RoundingMode) -> Result<AffineQuantizer> {
        match self.quantization {
            Some(params) => Ok(AffineQuantizer::new(params, rounding)),
            None => Err(ParityError::Domain(format!(
                "tensor `{}` ({}) carries no quantization parameters",
                self.name, self.element_type
            ))),
        }
    }

    pub fn check_shape(&self, actual: &[usize]) -> Result<()> {
        if actual != self.shape.as_slice() {
            return Err(ParityError::Shape {
                context: format!("tensor `{}`", self.name),
                expected: self.shape.clone(),
                actual: actual.to_vec(),
            });
        }
        Ok(())
    }

    pub fn check_element_type(&self, actual: ElementType) -> Result<()> {
        if actual != self.element_type {
            return Err(ParityError::ElementType {
                context: format!("tensor `{}`", self.name),
                expected: self.element_type.to_string(),
                actual: actual.to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for TensorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} `{}` dtype={} shape={:?}",
            self.index, self.name, self.element_type, self.shape
        )?;
        match &self.quantization {
            Some(params) => write!(f, " quantization: {params}"),
            None => write!(f, " quantization: none"),
        }
    }
}
