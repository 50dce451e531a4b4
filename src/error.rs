use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParityError {
    /// Invalid numeric parameters: zero-width range, non-positive scale.
    #[error("domain error: {0}")]
    Domain(String),

    /// Nothing usable could be extracted from a textual artifact.
    #[error("integrity error: {0}")]
    Integrity(String),

    #[error("shape mismatch for {context}: expected {expected:?}, got {actual:?}")]
    Shape {
        context: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("element type mismatch for {context}: expected {expected}, got {actual}")]
    ElementType {
        context: String,
        expected: String,
        actual: String,
    },

    #[error("no {kind} slot {index} (model has {count})")]
    Slot {
        kind: &'static str,
        index: usize,
        count: usize,
    },

    #[error("input slot {0} was not bound before invoke")]
    Unbound(usize),

    #[error("failed to load model artifact: {0}")]
    Load(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("operation `{op}` has no supported integer kernel")]
    UnsupportedOp { op: String },

    #[error("sample must contain exactly {expected} values, got {actual}")]
    SampleLength { expected: usize, actual: usize },

    #[error("converter failed: {0}")]
    Converter(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ParityError>;
