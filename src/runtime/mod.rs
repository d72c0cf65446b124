//! Seam for the external tensor-execution runtime.
//!
//! The serving core never interprets model formats or runs numeric
//! kernels itself. Given one (already decrypted) model blob and ordered
//! input tensors, a backend returns ordered output tensors; it also
//! exposes the model's declared input/output tensor names so the graph
//! builder can wire partitions together before any execution happens.
//!
//! Real backends plug in behind [`InferenceRuntime`]; the crate ships
//! [`mock::MockRuntime`], a deterministic in-memory backend used by the
//! test suite and for local development.

pub mod mock;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("invalid model blob: {0}")]
    InvalidModel(String),

    #[error("execution failed: {0}")]
    Execution(String),

    #[error("operation not supported by this backend: {0}")]
    Unsupported(String),
}

/// A named-tensor value exchanged with the runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorValue {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl TensorValue {
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Self {
        Self { shape, data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Declared IO names of one partition, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionSignature {
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

/// The external inference runtime, specified at its interface only.
pub trait InferenceRuntime: Send + Sync {
    /// Model introspection: declared input/output tensor names, queried
    /// once per partition before any execution.
    fn introspect(&self, blob: &[u8]) -> Result<PartitionSignature, RuntimeError>;

    /// Run one partition with its assembled, ordered inputs.
    fn run(&self, blob: &[u8], inputs: &[TensorValue]) -> Result<Vec<TensorValue>, RuntimeError>;

    /// Single-model text path for tokenizer payloads.
    fn run_text(&self, blob: &[u8], tokenizer: &[u8]) -> Result<String, RuntimeError>;
}
