//! Small flatbuffer artifacts for exercising the loader without a converter.

use flatbuffers::FlatBufferBuilder;
use tract_tflite::tflite::{
    finish_model_buffer, Buffer, BufferArgs, BuiltinOperator, Model, ModelArgs, Operator, OperatorArgs,
    OperatorCode, OperatorCodeArgs, SubGraph, SubGraphArgs, Tensor, TensorArgs, TensorType,
};

/// How an operator code is written to the `operator_codes` table.
#[derive(Debug, Clone, Copy)]
pub enum OpCode {
    /// Current schema: `builtin_code` set, deprecated code capped at 127.
    Builtin(BuiltinOperator),
    /// Legacy schema: only `deprecated_builtin_code` is written.
    Legacy(i8),
}

impl OpCode {
    fn args(self) -> OperatorCodeArgs<'static> {
        match self {
            OpCode::Builtin(op) => OperatorCodeArgs {
                deprecated_builtin_code: op.0.min(BuiltinOperator::PLACEHOLDER_FOR_GREATER_OP_CODES.0) as i8,
                custom_code: None,
                version: 1,
                builtin_code: op,
            },
            OpCode::Legacy(code) => OperatorCodeArgs {
                deprecated_builtin_code: code,
                version: 1,
                ..Default::default()
            },
        }
    }
}

/// One float32 operator from tensor `input` to tensor `output`, both of `shape`.
pub fn unary_model(code: OpCode, shape: &[i32]) -> Vec<u8> {
    let mut fbb = FlatBufferBuilder::new();

    let sentinel = Buffer::create(&mut fbb, &BufferArgs { data: None });
    let buffers = fbb.create_vector(&[sentinel]);

    let mut tensors = Vec::new();
    for name in ["input", "output"] {
        let dims = fbb.create_vector(shape);
        let name = fbb.create_string(name);
        tensors.push(Tensor::create(
            &mut fbb,
            &TensorArgs {
                shape: Some(dims),
                type_: TensorType::FLOAT32,
                buffer: 0,
                name: Some(name),
                ..Default::default()
            },
        ));
    }
    let tensors = fbb.create_vector(&tensors);

    let op_inputs = fbb.create_vector(&[0i32]);
    let op_outputs = fbb.create_vector(&[1i32]);
    let operator = Operator::create(
        &mut fbb,
        &OperatorArgs {
            opcode_index: 0,
            inputs: Some(op_inputs),
            outputs: Some(op_outputs),
            ..Default::default()
        },
    );
    let operators = fbb.create_vector(&[operator]);

    let graph_inputs = fbb.create_vector(&[0i32]);
    let graph_outputs = fbb.create_vector(&[1i32]);
    let subgraph = SubGraph::create(
        &mut fbb,
        &SubGraphArgs {
            tensors: Some(tensors),
            inputs: Some(graph_inputs),
            outputs: Some(graph_outputs),
            operators: Some(operators),
            name: None,
        },
    );
    let subgraphs = fbb.create_vector(&[subgraph]);

    let operator_code = OperatorCode::create(&mut fbb, &code.args());
    let operator_codes = fbb.create_vector(&[operator_code]);

    let model = Model::create(
        &mut fbb,
        &ModelArgs {
            version: 3,
            operator_codes: Some(operator_codes),
            subgraphs: Some(subgraphs),
            buffers: Some(buffers),
            ..Default::default()
        },
    );
    finish_model_buffer(&mut fbb, model);
    fbb.finished_data().to_vec()
}

/// `output = tanh(input)` over one `[1, len, 1]` window.
pub fn tanh_window(len: i32) -> Vec<u8> {
    unary_model(OpCode::Builtin(BuiltinOperator::TANH), &[1, len, 1])
}
