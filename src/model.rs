use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use log::{debug, info};
use tract_core::prelude::*;
use tract_tflite::{tflite, Tflite};

use crate::byte_array::{extract_bytes, to_c_array, CArrayOptions};
use crate::error::{ParityError, Result};
use crate::quantization::{ElementType, QuantParams, QuantizedTensor, TensorData, TensorDescriptor};

#[cfg(test)]
pub(crate) mod fixtures;

fn load_error(e: TractError) -> ParityError {
    ParityError::Load(format!("{e:#}"))
}

fn inference_error(e: TractError) -> ParityError {
    ParityError::Inference(format!("{e:#}"))
}

/// A serialized quantized network. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelArtifact {
    bytes: Vec<u8>,
}

impl ModelArtifact {
    pub fn new(bytes: Vec<u8>) -> Result<Self> {
        if bytes.is_empty() {
            return Err(ParityError::Load("artifact is empty".into()));
        }
        Ok(ModelArtifact { bytes })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let artifact = Self::new(fs::read(path)?)?;
        info!("read {} bytes from {}", artifact.len(), path.display());
        Ok(artifact)
    }

    /// Decodes the `0xNN` literals of a C source embedding.
    pub fn from_embedded_source(text: &str) -> Result<Self> {
        Self::new(extract_bytes(text)?)
    }

    pub fn from_embedded_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let artifact = Self::from_embedded_source(&fs::read_to_string(path)?)?;
        info!("extracted {} bytes from {}", artifact.len(), path.display());
        Ok(artifact)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, &self.bytes)?;
        Ok(())
    }

    pub fn to_c_array(&self, options: &CArrayOptions) -> Result<String> {
        to_c_array(&self.bytes, options)
    }

    /// Distinct operation kinds used by the graph, sorted by name.
    pub fn operator_kinds(&self) -> Result<BTreeSet<String>> {
        let proto = Tflite::default()
            .proto_model_for_read(&mut self.bytes())
            .map_err(load_error)?;
        let root = proto.root();

        let mut kinds = BTreeSet::new();
        if let Some(codes) = root.operator_codes() {
            for code in codes.iter() {
                kinds.insert(operator_name(&code));
            }
        }
        Ok(kinds)
    }
}

/// Legacy writers only fill `deprecated_builtin_code`; `builtin_code` is
/// authoritative only when the deprecated field holds the placeholder.
fn operator_name(code: &tflite::OperatorCode) -> String {
    if let Some(custom) = code.custom_code() {
        return custom.to_string();
    }
    let deprecated = code.deprecated_builtin_code() as i32;
    let builtin = if deprecated == tflite::BuiltinOperator::PLACEHOLDER_FOR_GREATER_OP_CODES.0 {
        code.builtin_code()
    } else {
        tflite::BuiltinOperator(deprecated)
    };
    match builtin.variant_name() {
        Some(name) => name.to_string(),
        None => format!("BUILTIN_{}", builtin.0),
    }
}

fn describe(name: String, index: usize, fact: &TypedFact) -> Result<TensorDescriptor> {
    let shape = fact
        .shape
        .as_concrete()
        .ok_or_else(|| ParityError::Load(format!("tensor `{name}` has a symbolic shape {:?}", fact.shape)))?
        .to_vec();

    let element_type = match fact.datum_type.unquantized() {
        DatumType::I8 => ElementType::Int8,
        DatumType::U8 => ElementType::UInt8,
        DatumType::F32 => ElementType::Float32,
        other => {
            return Err(ParityError::Load(format!(
                "tensor `{name}` has unsupported element type {other:?}"
            )))
        }
    };

    let quantization = if fact.datum_type.is_quantized() {
        let (zero_point, scale) = fact.datum_type.zp_scale();
        Some(QuantParams::new(scale, zero_point)?)
    } else {
        None
    };

    Ok(TensorDescriptor {
        name,
        index,
        element_type,
        shape,
        quantization,
    })
}

fn to_tract(tensor: &QuantizedTensor, desc: &TensorDescriptor) -> Result<Tensor> {
    let plain = match &tensor.data {
        TensorData::Int8(v) => Tensor::from_shape(&tensor.shape, v.as_slice()),
        TensorData::UInt8(v) => Tensor::from_shape(&tensor.shape, v.as_slice()),
        TensorData::Float32(v) => Tensor::from_shape(&tensor.shape, v.as_slice()),
    }
    .map_err(inference_error)?;

    let quantized_dt = match (desc.element_type, desc.quantization) {
        (ElementType::Int8, Some(q)) => DatumType::I8.with_zp_scale(q.zero_point(), q.scale()),
        (ElementType::UInt8, Some(q)) => DatumType::U8.with_zp_scale(q.zero_point(), q.scale()),
        _ => return Ok(plain),
    };
    Ok(plain.cast_to_dt(quantized_dt).map_err(inference_error)?.into_owned())
}

fn from_tract(tensor: &Tensor, desc: &TensorDescriptor) -> Result<QuantizedTensor> {
    let data = match tensor.datum_type().unquantized() {
        DatumType::I8 => TensorData::Int8(tensor.as_slice::<i8>().map_err(inference_error)?.to_vec()),
        DatumType::U8 => TensorData::UInt8(tensor.as_slice::<u8>().map_err(inference_error)?.to_vec()),
        DatumType::F32 => TensorData::Float32(tensor.as_slice::<f32>().map_err(inference_error)?.to_vec()),
        other => {
            return Err(ParityError::ElementType {
                context: format!("output `{}`", desc.name),
                expected: desc.element_type.to_string(),
                actual: format!("{other:?}"),
            })
        }
    };
    let tensor = QuantizedTensor::new(tensor.shape().to_vec(), data)?;
    desc.check_element_type(tensor.element_type())?;
    Ok(tensor)
}

/// A loaded model ready to execute: bind inputs, invoke, read outputs.
///
/// Runtime buffers are owned by the handle and released when it is dropped.
pub struct Interpreter {
    plan: TypedRunnableModel<TypedModel>,
    inputs: Vec<TensorDescriptor>,
    outputs: Vec<TensorDescriptor>,
    bound: Vec<Option<TValue>>,
    results: Vec<TValue>,
}

impl Interpreter {
    pub fn load(artifact: &ModelArtifact) -> Result<Self> {
        let model = tflite()
            .model_for_read(&mut artifact.bytes())
            .map_err(|e| match artifact.operator_kinds() {
                Ok(kinds) => ParityError::Load(format!(
                    "{e:#} (model operations: {})",
                    kinds.into_iter().collect::<Vec<_>>().join(", ")
                )),
                Err(_) => load_error(e),
            })?;

        let mut inputs = Vec::new();
        for (index, outlet) in model.input_outlets().map_err(load_error)?.iter().enumerate() {
            let fact = model.outlet_fact(*outlet).map_err(load_error)?;
            inputs.push(describe(model.node(outlet.node).name.clone(), index, fact)?);
        }
        let mut outputs = Vec::new();
        for (index, outlet) in model.output_outlets().map_err(load_error)?.iter().enumerate() {
            let fact = model.outlet_fact(*outlet).map_err(load_error)?;
            outputs.push(describe(model.node(outlet.node).name.clone(), index, fact)?);
        }

        let plan = model
            .into_optimized()
            .map_err(load_error)?
            .into_runnable()
            .map_err(load_error)?;

        info!(
            "loaded model: {} input(s), {} output(s)",
            inputs.len(),
            outputs.len()
        );
        for desc in inputs.iter().chain(outputs.iter()) {
            debug!("  {desc}");
        }

        Ok(Interpreter {
            plan,
            bound: vec![None; inputs.len()],
            results: Vec::new(),
            inputs,
            outputs,
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::load(&ModelArtifact::from_file(path)?)
    }

    pub fn inputs(&self) -> &[TensorDescriptor] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[TensorDescriptor] {
        &self.outputs
    }

    pub fn input(&self, index: usize) -> Result<&TensorDescriptor> {
        self.inputs.get(index).ok_or(ParityError::Slot {
            kind: "input",
            index,
            count: self.inputs.len(),
        })
    }

    pub fn output_descriptor(&self, index: usize) -> Result<&TensorDescriptor> {
        self.outputs.get(index).ok_or(ParityError::Slot {
            kind: "output",
            index,
            count: self.outputs.len(),
        })
    }

    pub fn set_input(&mut self, index: usize, tensor: &QuantizedTensor) -> Result<()> {
        let desc = self.input(index)?;
        desc.check_element_type(tensor.element_type())?;
        desc.check_shape(&tensor.shape)?;
        let value = to_tract(tensor, desc)?;
        self.bound[index] = Some(value.into());
        Ok(())
    }

    /// Runs one forward pass over the bound inputs.
    pub fn invoke(&mut self) -> Result<()> {
        let mut inputs: TVec<TValue> = tvec!();
        for (index, slot) in self.bound.iter().enumerate() {
            inputs.push(slot.clone().ok_or(ParityError::Unbound(index))?);
        }
        let outputs = self.plan.run(inputs).map_err(inference_error)?;
        self.results = outputs.into_iter().collect();
        Ok(())
    }

    pub fn output(&self, index: usize) -> Result<QuantizedTensor> {
        let desc = self.output_descriptor(index)?;
        let value = self
            .results
            .get(index)
            .ok_or_else(|| ParityError::Inference(format!("output {index} is not available before invoke")))?;
        from_tract(value, desc)
    }
}
