use crate::error::{ParityError, Result};
use crate::quantization::{ElementType, RoundingMode, TensorDescriptor};
use crate::scaling::AffineScaler;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepPoint {
    pub physical: f32,
    pub recovered: f32,
    pub error: f32,
}

/// Quantize/dequantize round-trip error, in physical units, for `steps`
/// evenly spaced values across the scaler's range.
pub fn quantization_error_sweep(
    desc: &TensorDescriptor,
    scaler: &AffineScaler,
    rounding: RoundingMode,
    steps: usize,
) -> Result<Vec<SweepPoint>> {
    if steps < 2 {
        return Err(ParityError::Domain(format!(
            "a sweep needs at least 2 steps, got {steps}"
        )));
    }

    let round_trip: Box<dyn Fn(f32) -> f32> = match desc.element_type {
        ElementType::Float32 => Box::new(|y| y),
        ElementType::Int8 => {
            let quantizer = desc.quantizer(rounding)?;
            Box::new(move |y| quantizer.dequantize(quantizer.quantize::<i8>(y)))
        }
        ElementType::UInt8 => {
            let quantizer = desc.quantizer(rounding)?;
            Box::new(move |y| quantizer.dequantize(quantizer.quantize::<u8>(y)))
        }
    };

    let step = scaler.width() / (steps - 1) as f32;
    Ok((0..steps)
        .map(|i| {
            let physical = scaler.lo() + step * i as f32;
            let recovered = scaler.denormalize(round_trip(scaler.normalize(physical)));
            SweepPoint {
                physical,
                recovered,
                error: (recovered - physical).abs(),
            }
        })
        .collect())
}

pub fn max_error(points: &[SweepPoint]) -> f32 {
    points.iter().map(|p| p.error).fold(0.0, f32::max)
}
