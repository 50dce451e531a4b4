use crate::error::{ParityError, Result};

/// Min-max scaling between a physical range and [0, 1].
///
/// Values outside `[lo, hi]` map outside `[0, 1]`; nothing is clamped, so an
/// out-of-range reading stays visible after normalization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineScaler {
    lo: f32,
    hi: f32,
}

impl AffineScaler {
    pub fn new(lo: f32, hi: f32) -> Result<Self> {
        if !lo.is_finite() || !hi.is_finite() {
            return Err(ParityError::Domain(format!(
                "scaler range must be finite, got [{lo}, {hi}]"
            )));
        }
        if lo == hi {
            return Err(ParityError::Domain(format!(
                "scaler range has zero width ({lo} == {hi})"
            )));
        }
        Ok(AffineScaler { lo, hi })
    }

    pub fn lo(&self) -> f32 {
        self.lo
    }

    pub fn hi(&self) -> f32 {
        self.hi
    }

    pub fn width(&self) -> f32 {
        self.hi - self.lo
    }

    pub fn normalize(&self, x: f32) -> f32 {
        (x - self.lo) / self.width()
    }

    pub fn denormalize(&self, y: f32) -> f32 {
        y * self.width() + self.lo
    }

    pub fn normalize_all(&self, xs: &[f32]) -> Vec<f32> {
        xs.iter().map(|&x| self.normalize(x)).collect()
    }
}

/// `(x - lo) / (hi - lo)`
pub fn normalize(x: f32, lo: f32, hi: f32) -> Result<f32> {
    Ok(AffineScaler::new(lo, hi)?.normalize(x))
}

/// `y * (hi - lo) + lo`
pub fn denormalize(y: f32, lo: f32, hi: f32) -> Result<f32> {
    Ok(AffineScaler::new(lo, hi)?.denormalize(y))
}
