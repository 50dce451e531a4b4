use std::fmt;

use log::{debug, info, warn};

use crate::config::ParityConfig;
use crate::error::{ParityError, Result};
use crate::model::Interpreter;
use crate::quantization::{QuantParams, QuantizedInt, QuantizedTensor, RoundingMode, TensorDescriptor};
use crate::sample::PhysicalSample;
use crate::scaling::AffineScaler;

/// Everything needed to compare one prediction against the board's trace.
#[derive(Debug, Clone)]
pub struct Prediction {
    pub input: TensorDescriptor,
    pub output: TensorDescriptor,
    pub first_normalized: f32,
    pub last_normalized: f32,
    pub quantized_input: QuantizedTensor,
    /// First element of the output tensor as stored (integer or float).
    pub raw_output: f32,
    /// Dequantized output, in the normalized domain.
    pub normalized_output: f32,
    /// Output mapped back to physical units.
    pub value: f32,
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "IN:  {}", self.input)?;
        writeln!(f, "OUT: {}", self.output)?;
        writeln!(
            f,
            "Scaled input: first {:.4}, last {:.4}",
            self.first_normalized, self.last_normalized
        )?;
        if let (Some(first), Some(last)) = (self.quantized_input.first(), self.quantized_input.last()) {
            writeln!(f, "Quantized input: first {first}, last {last}")?;
        }
        writeln!(f, "Raw output: {}", self.raw_output)?;
        writeln!(f, "Dequantized scaled output [0..1]: {:.6}", self.normalized_output)?;
        write!(f, "Final value: {:.4}", self.value)
    }
}

/// Scales, quantizes and runs physical samples through a loaded model.
pub struct Predictor {
    interpreter: Interpreter,
    scaler: AffineScaler,
    sample_len: usize,
    rounding: RoundingMode,
}

impl Predictor {
    pub fn new(interpreter: Interpreter, config: &ParityConfig) -> Result<Self> {
        config.validate()?;
        let scaler = config.scaler()?;
        let input = interpreter.input(0)?;
        if input.element_count() != config.sample_len {
            return Err(ParityError::Shape {
                context: format!("model input `{}` vs configured sample length", input.name),
                expected: config.input_shape().to_vec(),
                actual: input.shape.clone(),
            });
        }
        interpreter.output_descriptor(0)?;

        Ok(Predictor {
            interpreter,
            scaler,
            sample_len: config.sample_len,
            rounding: config.rounding,
        })
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    /// Parses raw values into a sample of the configured length.
    pub fn sample(&self, values: Vec<f32>) -> Result<PhysicalSample> {
        PhysicalSample::new(values, self.sample_len)
    }

    pub fn predict(&mut self, sample: &PhysicalSample) -> Result<Prediction> {
        if sample.len() != self.sample_len {
            return Err(ParityError::SampleLength {
                expected: self.sample_len,
                actual: sample.len(),
            });
        }

        let input = self.interpreter.input(0)?.clone();
        let output = self.interpreter.output_descriptor(0)?.clone();

        let normalized = self.scaler.normalize_all(sample.values());
        if normalized.iter().any(|y| !(0.0..=1.0).contains(y)) {
            warn!(
                "sample leaves the configured range [{}, {}]",
                self.scaler.lo(),
                self.scaler.hi()
            );
        }

        let quantized_input = QuantizedTensor::encode(&normalized, &input, self.rounding)?;
        debug!(
            "first quantized input {:?}, last {:?}",
            quantized_input.first(),
            quantized_input.last()
        );

        self.interpreter.set_input(0, &quantized_input)?;
        self.interpreter.invoke()?;
        let result = self.interpreter.output(0)?;

        let raw_output = result.first().ok_or_else(|| ParityError::Shape {
            context: format!("output `{}`", output.name),
            expected: output.shape.clone(),
            actual: result.shape.clone(),
        })?;
        let normalized_output = result.decode(&output)?[0];
        let value = self.scaler.denormalize(normalized_output);
        info!("prediction: raw {raw_output} -> {normalized_output:.6} -> {value:.4}");

        Ok(Prediction {
            first_normalized: normalized[0],
            last_normalized: normalized[normalized.len() - 1],
            input,
            output,
            quantized_input,
            raw_output,
            normalized_output,
            value,
        })
    }
}

/// Maps a raw quantized model output straight to physical units:
/// `(q - zero_point) * scale * (hi - lo) + lo`.
pub fn dequantize_reading<T: QuantizedInt>(q: T, params: QuantParams, scaler: &AffineScaler) -> f32 {
    scaler.denormalize(crate::quantization::dequantize(q, params))
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::model::fixtures::tanh_window;
    use crate::model::ModelArtifact;
    use crate::quantization::AffineQuantizer;
    use crate::sample::REFERENCE_SAMPLE;

    fn scaler() -> AffineScaler {
        AffineScaler::new(-5.0, 25.0).unwrap()
    }

    #[test]
    fn board_trace_output_dequantizes_to_1013() {
        let params = QuantParams::new(0.005667, -97).unwrap();
        let value = dequantize_reading(-8i8, params, &scaler());
        assert_relative_eq!(value, 10.13089, epsilon = 1e-3);
        assert_eq!(format!("{value:.2}"), "10.13");
    }

    #[test]
    fn desktop_output_dequantizes_to_1251() {
        let params = QuantParams::new(0.005667, -97).unwrap();
        let value = dequantize_reading(6i8, params, &scaler());
        assert_relative_eq!(value, 12.51103, epsilon = 1e-3);
    }

    #[test]
    fn reference_sample_scales_and_quantizes_like_the_trace() {
        let scaler = scaler();
        let quantizer = AffineQuantizer::new(
            QuantParams::new(0.003919, -128).unwrap(),
            RoundingMode::HalfToEven,
        );
        let normalized = scaler.normalize_all(&REFERENCE_SAMPLE);
        assert_relative_eq!(normalized[0], 0.56, epsilon = 1e-6);
        assert_eq!(quantizer.quantize::<i8>(normalized[0]), 15);
        // 13.0 degrees -> 0.6 -> round(153.1) - 128
        assert_eq!(quantizer.quantize::<i8>(normalized[47]), 25);
    }

    fn tanh_predictor(len: i32) -> Result<Predictor> {
        let interpreter = Interpreter::load(&ModelArtifact::new(tanh_window(len)).unwrap()).unwrap();
        Predictor::new(interpreter, &ParityConfig::default())
    }

    #[test]
    fn predict_runs_a_sample_end_to_end() {
        let mut predictor = tanh_predictor(48).unwrap();
        let sample = predictor.sample(REFERENCE_SAMPLE.to_vec()).unwrap();
        let prediction = predictor.predict(&sample).unwrap();

        let scaler = scaler();
        assert_relative_eq!(prediction.first_normalized, 0.56, epsilon = 1e-6);
        assert_relative_eq!(prediction.last_normalized, 0.6, epsilon = 1e-6);
        assert_eq!(prediction.quantized_input.shape, vec![1, 48, 1]);

        let decoded = predictor
            .interpreter()
            .output(0)
            .unwrap()
            .decode(&prediction.output)
            .unwrap();
        assert_eq!(prediction.normalized_output, decoded[0]);
        assert_eq!(prediction.value, scaler.denormalize(decoded[0]));
        assert_relative_eq!(prediction.normalized_output, 0.56f32.tanh(), epsilon = 1e-4);
        assert_relative_eq!(prediction.raw_output, prediction.normalized_output);
    }

    #[test]
    fn predict_rejects_samples_of_the_wrong_length() {
        let mut predictor = tanh_predictor(48).unwrap();
        let short = PhysicalSample::new(vec![10.0; 47], 47).unwrap();
        assert!(matches!(
            predictor.predict(&short),
            Err(ParityError::SampleLength { expected: 48, actual: 47 })
        ));
    }

    #[test]
    fn model_input_must_match_the_sample_length() {
        assert!(matches!(tanh_predictor(47), Err(ParityError::Shape { .. })));
    }
}
