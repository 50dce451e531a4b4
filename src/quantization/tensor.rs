use log::{debug, warn};

use crate::error::{ParityError, Result};

use super::{ElementType, RoundingMode, TensorDescriptor};

#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    Int8(Vec<i8>),
    UInt8(Vec<u8>),
    Float32(Vec<f32>),
}

impl TensorData {
    pub fn len(&self) -> usize {
        match self {
            TensorData::Int8(v) => v.len(),
            TensorData::UInt8(v) => v.len(),
            TensorData::Float32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            TensorData::Int8(_) => ElementType::Int8,
            TensorData::UInt8(_) => ElementType::UInt8,
            TensorData::Float32(_) => ElementType::Float32,
        }
    }

    /// Raw stored value, widened for printing.
    pub fn get(&self, i: usize) -> Option<f32> {
        match self {
            TensorData::Int8(v) => v.get(i).map(|&x| x as f32),
            TensorData::UInt8(v) => v.get(i).map(|&x| x as f32),
            TensorData::Float32(v) => v.get(i).copied(),
        }
    }
}

/// A tensor in the representation a model slot expects: integers for
/// quantized slots, reals for float slots.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedTensor {
    pub shape: Vec<usize>,
    pub data: TensorData,
}

impl QuantizedTensor {
    pub fn new(shape: Vec<usize>, data: TensorData) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(ParityError::Shape {
                context: "tensor data".into(),
                expected: shape,
                actual: vec![data.len()],
            });
        }
        Ok(QuantizedTensor { shape, data })
    }

    pub fn element_type(&self) -> ElementType {
        self.data.element_type()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn first(&self) -> Option<f32> {
        self.data.get(0)
    }

    pub fn last(&self) -> Option<f32> {
        self.len().checked_sub(1).and_then(|i| self.data.get(i))
    }

    /// Prepare normalized values for the slot described by `desc`.
    ///
    /// Integer slots are quantized with the descriptor's own parameters and
    /// saturated to the element type's range. Float slots take the values as is.
    pub fn encode(normalized: &[f32], desc: &TensorDescriptor, rounding: RoundingMode) -> Result<Self> {
        if normalized.len() != desc.element_count() {
            return Err(ParityError::Shape {
                context: format!("input for tensor `{}`", desc.name),
                expected: desc.shape.clone(),
                actual: vec![normalized.len()],
            });
        }

        let data = match desc.element_type {
            ElementType::Float32 => TensorData::Float32(normalized.to_vec()),
            ElementType::Int8 => {
                let (values, saturated) = desc.quantizer(rounding)?.quantize_all::<i8>(normalized);
                report_saturation(desc, saturated);
                TensorData::Int8(values)
            }
            ElementType::UInt8 => {
                let (values, saturated) = desc.quantizer(rounding)?.quantize_all::<u8>(normalized);
                report_saturation(desc, saturated);
                TensorData::UInt8(values)
            }
        };
        debug!("encoded {} values for `{}` ({})", data.len(), desc.name, desc.element_type);

        Ok(QuantizedTensor {
            shape: desc.shape.clone(),
            data,
        })
    }

    /// Map the stored values back to reals using `desc`.
    pub fn decode(&self, desc: &TensorDescriptor) -> Result<Vec<f32>> {
        desc.check_element_type(self.element_type())?;
        desc.check_shape(&self.shape)?;

        match &self.data {
            TensorData::Float32(v) => Ok(v.clone()),
            TensorData::Int8(v) => Ok(desc.quantizer(RoundingMode::default())?.dequantize_all(v)),
            TensorData::UInt8(v) => Ok(desc.quantizer(RoundingMode::default())?.dequantize_all(v)),
        }
    }
}

fn report_saturation(desc: &TensorDescriptor, saturated: usize) {
    if saturated > 0 {
        warn!(
            "{saturated} value(s) saturated while quantizing tensor `{}` to {}",
            desc.name, desc.element_type
        );
    }
}
