pub mod descriptor;
pub mod tensor;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ParityError, Result};

pub use descriptor::{ElementType, TensorDescriptor};
pub use tensor::{QuantizedTensor, TensorData};

/// How `y / scale` is rounded before the zero point is added.
///
/// `HalfToEven` reproduces the desktop reference scripts (`np.round`).
/// `HalfAwayFromZero` reproduces the embedded runtime's quantize kernel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundingMode {
    #[default]
    HalfToEven,
    HalfAwayFromZero,
}

impl RoundingMode {
    pub fn round(self, v: f32) -> f32 {
        match self {
            RoundingMode::HalfToEven => v.round_ties_even(),
            RoundingMode::HalfAwayFromZero => v.round(),
        }
    }
}

impl fmt::Display for RoundingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundingMode::HalfToEven => write!(f, "half_to_even"),
            RoundingMode::HalfAwayFromZero => write!(f, "half_away_from_zero"),
        }
    }
}

impl FromStr for RoundingMode {
    type Err = ParityError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "half_to_even" | "even" => Ok(RoundingMode::HalfToEven),
            "half_away_from_zero" | "away" => Ok(RoundingMode::HalfAwayFromZero),
            other => Err(ParityError::Domain(format!(
                "unknown rounding mode `{other}` (expected half_to_even or half_away_from_zero)"
            ))),
        }
    }
}

/// Fixed-width integer types a quantized tensor is stored in.
pub trait QuantizedInt: Copy {
    const MIN: i32;
    const MAX: i32;

    /// Caller guarantees `MIN <= v <= MAX`.
    fn from_clamped(v: i32) -> Self;
    fn to_i32(self) -> i32;
}

impl QuantizedInt for i8 {
    const MIN: i32 = i8::MIN as i32;
    const MAX: i32 = i8::MAX as i32;

    fn from_clamped(v: i32) -> Self {
        v as i8
    }

    fn to_i32(self) -> i32 {
        self as i32
    }
}

impl QuantizedInt for u8 {
    const MIN: i32 = u8::MIN as i32;
    const MAX: i32 = u8::MAX as i32;

    fn from_clamped(v: i32) -> Self {
        v as u8
    }

    fn to_i32(self) -> i32 {
        self as i32
    }
}

/// Per-tensor affine parameters: `real = (q - zero_point) * scale`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantParams {
    scale: f32,
    zero_point: i32,
}

impl QuantParams {
    pub fn new(scale: f32, zero_point: i32) -> Result<Self> {
        if !(scale.is_finite() && scale > 0.0) {
            return Err(ParityError::Domain(format!(
                "quantization scale must be positive and finite, got {scale}"
            )));
        }
        Ok(QuantParams { scale, zero_point })
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn zero_point(&self) -> i32 {
        self.zero_point
    }
}

impl fmt::Display for QuantParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scale={}, zero_point={}", self.scale, self.zero_point)
    }
}

/// Saturating affine quantizer for one tensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineQuantizer {
    pub params: QuantParams,
    pub rounding: RoundingMode,
}

impl AffineQuantizer {
    pub fn new(params: QuantParams, rounding: RoundingMode) -> Self {
        AffineQuantizer { params, rounding }
    }

    /// `clip(round(y / scale) + zero_point, T::MIN, T::MAX)`
    pub fn quantize<T: QuantizedInt>(&self, y: f32) -> T {
        self.quantize_saturating::<T>(y).0
    }

    /// Like [`quantize`](Self::quantize), also reporting whether the value was clipped.
    pub fn quantize_saturating<T: QuantizedInt>(&self, y: f32) -> (T, bool) {
        // float -> int casts saturate and send NaN to 0
        let rounded = self.rounding.round(y / self.params.scale) as i64;
        let shifted = rounded.saturating_add(self.params.zero_point as i64);
        let clamped = shifted.clamp(T::MIN as i64, T::MAX as i64);
        (T::from_clamped(clamped as i32), clamped != shifted)
    }

    /// `(q - zero_point) * scale`. Not an inverse of `quantize` once rounding
    /// or clipping happened.
    pub fn dequantize<T: QuantizedInt>(&self, q: T) -> f32 {
        (q.to_i32() - self.params.zero_point) as f32 * self.params.scale
    }

    pub fn quantize_all<T: QuantizedInt>(&self, ys: &[f32]) -> (Vec<T>, usize) {
        let mut saturated = 0;
        let values = ys
            .iter()
            .map(|&y| {
                let (q, clipped) = self.quantize_saturating::<T>(y);
                saturated += clipped as usize;
                q
            })
            .collect();
        (values, saturated)
    }

    pub fn dequantize_all<T: QuantizedInt>(&self, qs: &[T]) -> Vec<f32> {
        qs.iter().map(|&q| self.dequantize(q)).collect()
    }
}

pub fn quantize<T: QuantizedInt>(y: f32, params: QuantParams, rounding: RoundingMode) -> T {
    AffineQuantizer::new(params, rounding).quantize(y)
}

pub fn dequantize<T: QuantizedInt>(q: T, params: QuantParams) -> f32 {
    AffineQuantizer::new(params, RoundingMode::default()).dequantize(q)
}
