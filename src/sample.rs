use std::fs;
use std::path::Path;

use crate::error::{ParityError, Result};

/// Temperature window used when comparing the desktop and board outputs.
pub const REFERENCE_SAMPLE: [f32; 48] = [
    11.8, 11.8, 11.8, 11.8, 11.8, 11.8, 11.8, 11.8, //
    11.7, 11.7, 11.7, 11.7, 11.6, 11.5, 11.5, 11.5, //
    11.5, 11.6, 11.6, 11.7, 11.8, 11.9, 11.9, 12.0, 12.1, //
    12.1, 12.3, 12.4, 12.4, 12.5, 12.4, 12.4, 12.4, //
    12.4, 12.6, 12.6, 12.6, 12.7, 12.8, 12.9, 13.1, //
    13.2, 13.3, 13.2, 13.1, 13.1, 12.9, 13.0,
];

/// A window of physical measurements with a fixed length.
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalSample {
    values: Vec<f32>,
}

impl PhysicalSample {
    pub fn new(values: Vec<f32>, expected_len: usize) -> Result<Self> {
        if values.len() != expected_len {
            return Err(ParityError::SampleLength {
                expected: expected_len,
                actual: values.len(),
            });
        }
        Ok(PhysicalSample { values })
    }

    pub fn reference() -> Self {
        PhysicalSample {
            values: REFERENCE_SAMPLE.to_vec(),
        }
    }

    /// Reads a JSON array of numbers.
    pub fn from_json_file(path: impl AsRef<Path>, expected_len: usize) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let values: Vec<f32> = serde_json::from_str(&text)?;
        Self::new(values, expected_len)
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
