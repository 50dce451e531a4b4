use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::config::{CalibrationConfig, ParityConfig};
use crate::error::{ParityError, Result};
use crate::model::ModelArtifact;
use crate::quantization::ElementType;

/// Synthetic inputs used to calibrate activation ranges during conversion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepresentativeDataset {
    shape: Vec<usize>,
    samples: Vec<Vec<f32>>,
}

impl RepresentativeDataset {
    /// `config.samples` tensors of `shape`, drawn uniformly from
    /// `[config.low, config.high)` with a seeded generator.
    pub fn uniform(config: &CalibrationConfig, shape: &[usize]) -> Result<Self> {
        if config.samples == 0 || !(config.low < config.high) {
            return Err(ParityError::Domain(format!(
                "cannot draw {} calibration samples from [{}, {})",
                config.samples, config.low, config.high
            )));
        }

        let mut rng = StdRng::seed_from_u64(config.seed);
        let count: usize = shape.iter().product();
        let samples = (0..config.samples)
            .map(|_| {
                (0..count)
                    .map(|_| rng.random_range(config.low..config.high))
                    .collect::<Vec<f32>>()
            })
            .collect();

        Ok(RepresentativeDataset {
            shape: shape.to_vec(),
            samples,
        })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn samples(&self) -> &[Vec<f32>] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// What the converter is asked to produce.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionRequest {
    pub input_type: ElementType,
    pub output_type: ElementType,
    /// Only these kernels may appear in the converted graph.
    pub supported_ops: Vec<String>,
}

impl ConversionRequest {
    /// Full integer quantization with int8 model input and output.
    pub fn int8(config: &ParityConfig) -> Self {
        ConversionRequest {
            input_type: ElementType::Int8,
            output_type: ElementType::Int8,
            supported_ops: config.supported_ops.clone(),
        }
    }
}

/// Loads a floating-point model and turns it into a quantized artifact.
pub trait QuantizingConverter {
    type Source;

    fn load(&self, path: &Path) -> Result<Self::Source>;

    fn summary(&self, source: &Self::Source) -> String;

    fn convert(
        &self,
        source: &Self::Source,
        request: &ConversionRequest,
        dataset: &RepresentativeDataset,
    ) -> Result<Vec<u8>>;
}

/// Fails on the first operation without a supported integer kernel.
pub fn check_kernel_support<'a, I>(operators: I, supported: &[String]) -> Result<()>
where
    I: IntoIterator<Item = &'a String>,
{
    for op in operators {
        if !supported.iter().any(|s| s == op) {
            return Err(ParityError::UnsupportedOp { op: op.clone() });
        }
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct ConversionReport {
    pub summary: String,
    pub artifact: ModelArtifact,
    pub operators: BTreeSet<String>,
}

impl ConversionReport {
    pub fn size_kib(&self) -> f64 {
        self.artifact.len() as f64 / 1024.0
    }
}

pub struct ConversionPipeline<C> {
    converter: C,
    config: ParityConfig,
}

impl<C: QuantizingConverter> ConversionPipeline<C> {
    pub fn new(converter: C, config: ParityConfig) -> Result<Self> {
        config.validate()?;
        Ok(ConversionPipeline { converter, config })
    }

    /// Converts `source` and writes the artifact to `output`.
    ///
    /// Nothing is written unless every operation in the converted graph has
    /// a supported integer kernel.
    pub fn run(&self, source: &Path, output: &Path) -> Result<ConversionReport> {
        let model = self.converter.load(source)?;
        let summary = self.converter.summary(&model);
        info!("source model: {summary}");

        let dataset = RepresentativeDataset::uniform(&self.config.calibration, &self.config.input_shape())?;
        debug!(
            "calibrating with {} samples of shape {:?}",
            dataset.len(),
            dataset.shape()
        );

        let request = ConversionRequest::int8(&self.config);
        let artifact = ModelArtifact::new(self.converter.convert(&model, &request, &dataset)?)?;

        let operators = artifact.operator_kinds()?;
        info!("model operations:");
        for op in &operators {
            info!("  - {op}");
        }
        check_kernel_support(&operators, &self.config.supported_ops)?;

        artifact.write_to(output)?;
        let report = ConversionReport {
            summary,
            artifact,
            operators,
        };
        info!("wrote {} ({:.2} KiB)", output.display(), report.size_kib());
        Ok(report)
    }
}

/// Delegates conversion to an external program invoked as
/// `<program> [args..] <source> <dataset.json> <output>`.
///
/// The requested input/output types are passed in `INT8_PARITY_INPUT_TYPE`
/// and `INT8_PARITY_OUTPUT_TYPE`, the op allow-list in
/// `INT8_PARITY_SUPPORTED_OPS` (comma separated).
#[derive(Debug, Clone)]
pub struct ExternalConverter {
    program: PathBuf,
    args: Vec<String>,
    scratch_dir: PathBuf,
}

impl ExternalConverter {
    pub fn new(program: impl Into<PathBuf>, scratch_dir: impl Into<PathBuf>) -> Self {
        ExternalConverter {
            program: program.into(),
            args: Vec::new(),
            scratch_dir: scratch_dir.into(),
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

impl QuantizingConverter for ExternalConverter {
    type Source = PathBuf;

    fn load(&self, path: &Path) -> Result<PathBuf> {
        if !fs::metadata(path)?.is_file() {
            return Err(ParityError::Converter(format!(
                "source model {} is not a file",
                path.display()
            )));
        }
        Ok(path.to_path_buf())
    }

    fn summary(&self, source: &PathBuf) -> String {
        let size = fs::metadata(source).map(|m| m.len()).unwrap_or_default();
        format!("{} ({} bytes)", source.display(), size)
    }

    fn convert(
        &self,
        source: &PathBuf,
        request: &ConversionRequest,
        dataset: &RepresentativeDataset,
    ) -> Result<Vec<u8>> {
        fs::create_dir_all(&self.scratch_dir)?;
        let dataset_path = self.scratch_dir.join("representative_dataset.json");
        let output_path = self.scratch_dir.join("converted.tflite");
        fs::write(&dataset_path, serde_json::to_vec(dataset)?)?;

        let result = Command::new(&self.program)
            .args(&self.args)
            .arg(source)
            .arg(&dataset_path)
            .arg(&output_path)
            .env("INT8_PARITY_INPUT_TYPE", request.input_type.to_string())
            .env("INT8_PARITY_OUTPUT_TYPE", request.output_type.to_string())
            .env("INT8_PARITY_SUPPORTED_OPS", request.supported_ops.join(","))
            .output()
            .map_err(|e| {
                ParityError::Converter(format!("failed to start {}: {e}", self.program.display()))
            });
        let _ = fs::remove_file(&dataset_path);
        let result = result?;

        if !result.status.success() {
            let _ = fs::remove_file(&output_path);
            return Err(ParityError::Converter(format!(
                "{} exited with {}: {}",
                self.program.display(),
                result.status,
                String::from_utf8_lossy(&result.stderr).trim()
            )));
        }

        let bytes = fs::read(&output_path)?;
        fs::remove_file(&output_path)?;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use tract_tflite::tflite::BuiltinOperator;

    use super::*;
    use crate::model::fixtures::{tanh_window, unary_model, OpCode};

    struct FakeConverter {
        artifact: Vec<u8>,
        seen: RefCell<Option<(ConversionRequest, usize)>>,
    }

    impl QuantizingConverter for FakeConverter {
        type Source = String;

        fn load(&self, path: &Path) -> Result<String> {
            Ok(path.display().to_string())
        }

        fn summary(&self, source: &String) -> String {
            format!("fake model from {source}")
        }

        fn convert(
            &self,
            _source: &String,
            request: &ConversionRequest,
            dataset: &RepresentativeDataset,
        ) -> Result<Vec<u8>> {
            *self.seen.borrow_mut() = Some((request.clone(), dataset.len()));
            Ok(self.artifact.clone())
        }
    }

    fn scratch(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("int8-parity-{name}-{}", std::process::id()))
    }

    #[test]
    fn dataset_has_configured_count_shape_and_range() {
        let config = CalibrationConfig::default();
        let dataset = RepresentativeDataset::uniform(&config, &[1, 48, 1]).unwrap();
        assert_eq!(dataset.len(), 100);
        assert_eq!(dataset.shape(), &[1, 48, 1]);
        for sample in dataset.samples() {
            assert_eq!(sample.len(), 48);
            assert!(sample.iter().all(|v| (0.0..1.0).contains(v)));
        }
    }

    #[test]
    fn dataset_is_reproducible_per_seed() {
        let config = CalibrationConfig {
            samples: 5,
            ..CalibrationConfig::default()
        };
        let a = RepresentativeDataset::uniform(&config, &[1, 8, 1]).unwrap();
        let b = RepresentativeDataset::uniform(&config, &[1, 8, 1]).unwrap();
        assert_eq!(a, b);

        let other_seed = CalibrationConfig { seed: 7, ..config };
        let c = RepresentativeDataset::uniform(&other_seed, &[1, 8, 1]).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn dataset_rejects_empty_configs() {
        let empty = CalibrationConfig {
            samples: 0,
            ..CalibrationConfig::default()
        };
        assert!(RepresentativeDataset::uniform(&empty, &[1, 48, 1]).is_err());

        let inverted = CalibrationConfig {
            low: 1.0,
            high: 0.0,
            ..CalibrationConfig::default()
        };
        assert!(RepresentativeDataset::uniform(&inverted, &[1, 48, 1]).is_err());
    }

    #[test]
    fn kernel_check_names_the_missing_op() {
        let supported = vec!["FULLY_CONNECTED".to_string(), "RESHAPE".to_string()];
        let ok: BTreeSet<String> = ["FULLY_CONNECTED".to_string()].into();
        assert!(check_kernel_support(&ok, &supported).is_ok());

        let missing: BTreeSet<String> = ["FULLY_CONNECTED".to_string(), "WHILE".to_string()].into();
        match check_kernel_support(&missing, &supported) {
            Err(ParityError::UnsupportedOp { op }) => assert_eq!(op, "WHILE"),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn int8_request_fixes_io_types() {
        let request = ConversionRequest::int8(&ParityConfig::default());
        assert_eq!(request.input_type, ElementType::Int8);
        assert_eq!(request.output_type, ElementType::Int8);
        assert!(!request.supported_ops.is_empty());
    }

    #[test]
    fn pipeline_refuses_to_write_malformed_artifacts() {
        let converter = FakeConverter {
            artifact: b"garbage".to_vec(),
            seen: RefCell::new(None),
        };
        let config = ParityConfig {
            calibration: CalibrationConfig {
                samples: 3,
                ..CalibrationConfig::default()
            },
            ..ParityConfig::default()
        };
        let pipeline = ConversionPipeline::new(converter, config).unwrap();
        let output = scratch("malformed.tflite");

        let err = pipeline.run(Path::new("model.keras"), &output).unwrap_err();
        assert!(matches!(err, ParityError::Load(_)));
        assert!(!output.exists());

        let (request, samples) = pipeline.converter.seen.borrow().clone().unwrap();
        assert_eq!(request.input_type, ElementType::Int8);
        assert_eq!(samples, 3);
    }

    #[test]
    fn pipeline_refuses_to_write_unsupported_ops() {
        let converter = FakeConverter {
            artifact: unary_model(OpCode::Builtin(BuiltinOperator::WHILE), &[1, 48, 1]),
            seen: RefCell::new(None),
        };
        let pipeline = ConversionPipeline::new(converter, ParityConfig::default()).unwrap();
        let output = scratch("unsupported.tflite");

        match pipeline.run(Path::new("model.keras"), &output) {
            Err(ParityError::UnsupportedOp { op }) => assert_eq!(op, "WHILE"),
            Err(other) => panic!("expected an unsupported op, got {other:?}"),
            Ok(report) => panic!("conversion passed with {:?}", report.operators),
        }
        assert!(!output.exists());
    }

    #[test]
    fn pipeline_writes_supported_artifacts() {
        let converter = FakeConverter {
            artifact: tanh_window(48),
            seen: RefCell::new(None),
        };
        let pipeline = ConversionPipeline::new(converter, ParityConfig::default()).unwrap();
        let output = scratch("supported.tflite");

        let report = pipeline.run(Path::new("model.keras"), &output).unwrap();
        assert_eq!(report.operators.iter().collect::<Vec<_>>(), vec!["TANH"]);
        assert_eq!(ModelArtifact::from_file(&output).unwrap(), report.artifact);
        assert!(report.summary.contains("model.keras"));
        fs::remove_file(output).unwrap();
    }

    #[test]
    fn pipeline_propagates_empty_converter_output() {
        let converter = FakeConverter {
            artifact: Vec::new(),
            seen: RefCell::new(None),
        };
        let pipeline = ConversionPipeline::new(converter, ParityConfig::default()).unwrap();
        let err = pipeline.run(Path::new("model.keras"), &scratch("empty.tflite")).unwrap_err();
        assert!(matches!(err, ParityError::Load(_)));
    }

    #[test]
    fn missing_converter_program_is_reported() {
        let source = scratch("missing-program-source");
        fs::write(&source, b"weights").unwrap();
        let converter = ExternalConverter::new("/nonexistent/int8-converter", scratch("missing-program"));
        let dataset = RepresentativeDataset::uniform(&CalibrationConfig::default(), &[1, 4, 1]).unwrap();
        let request = ConversionRequest::int8(&ParityConfig::default());

        let loaded = converter.load(&source).unwrap();
        let err = converter.convert(&loaded, &request, &dataset).unwrap_err();
        assert!(matches!(err, ParityError::Converter(_)));
        fs::remove_file(source).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn external_converter_runs_the_program() {
        let source = scratch("external-source");
        fs::write(&source, [0x1c, 0x00, 0x54, 0x46]).unwrap();
        let converter = ExternalConverter::new("sh", scratch("external"))
            .with_args(["-c", "test -s \"$2\" && test \"$INT8_PARITY_INPUT_TYPE\" = int8 && cp \"$1\" \"$3\"", "convert"]);
        let dataset = RepresentativeDataset::uniform(&CalibrationConfig::default(), &[1, 4, 1]).unwrap();
        let request = ConversionRequest::int8(&ParityConfig::default());

        let loaded = converter.load(&source).unwrap();
        assert!(converter.summary(&loaded).contains("4 bytes"));
        let bytes = converter.convert(&loaded, &request, &dataset).unwrap();
        assert_eq!(bytes, vec![0x1c, 0x00, 0x54, 0x46]);
        fs::remove_file(source).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn failing_converter_surfaces_stderr() {
        let source = scratch("failing-source");
        fs::write(&source, b"weights").unwrap();
        let converter = ExternalConverter::new("sh", scratch("failing"))
            .with_args(["-c", "echo 'no int8 kernel for WHILE' >&2; exit 3", "convert"]);
        let dataset = RepresentativeDataset::uniform(&CalibrationConfig::default(), &[1, 4, 1]).unwrap();
        let request = ConversionRequest::int8(&ParityConfig::default());

        let loaded = converter.load(&source).unwrap();
        match converter.convert(&loaded, &request, &dataset) {
            Err(ParityError::Converter(message)) => assert!(message.contains("WHILE")),
            other => panic!("unexpected result {other:?}"),
        }
        fs::remove_file(source).unwrap();
    }

    #[test]
    fn missing_source_model_is_an_io_error() {
        let converter = ExternalConverter::new("sh", scratch("no-source"));
        assert!(matches!(
            converter.load(Path::new("/nonexistent/model.keras")),
            Err(ParityError::Io(_))
        ));
    }
}
