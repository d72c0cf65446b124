//! Deterministic in-memory backend.
//!
//! A "model blob" for this backend is a small UTF-8 manifest:
//!
//! ```text
//! inputs: x, y
//! outputs: z
//! ```
//!
//! Running a partition produces, per declared output, a 1000-element
//! classification vector whose peak index is a deterministic function of
//! the input data, so tests can assert exact categories end to end.

use super::{InferenceRuntime, PartitionSignature, RuntimeError, TensorValue};

pub const CATEGORIES: usize = 1000;

#[derive(Debug, Default, Clone, Copy)]
pub struct MockRuntime;

impl MockRuntime {
    pub fn new() -> Self {
        Self
    }

    /// Build a manifest blob for tests and local registration.
    pub fn manifest(inputs: &[&str], outputs: &[&str]) -> Vec<u8> {
        format!("inputs: {}\noutputs: {}\n", inputs.join(", "), outputs.join(", ")).into_bytes()
    }

    fn parse(blob: &[u8]) -> Result<PartitionSignature, RuntimeError> {
        let text = std::str::from_utf8(blob)
            .map_err(|_| RuntimeError::InvalidModel("manifest is not UTF-8".into()))?;

        let mut inputs = None;
        let mut outputs = None;
        for line in text.lines() {
            let line = line.trim();
            if let Some(rest) = line.strip_prefix("inputs:") {
                inputs = Some(split_names(rest));
            } else if let Some(rest) = line.strip_prefix("outputs:") {
                outputs = Some(split_names(rest));
            }
        }

        match (inputs, outputs) {
            (Some(inputs), Some(outputs)) => Ok(PartitionSignature { inputs, outputs }),
            _ => Err(RuntimeError::InvalidModel(
                "manifest missing inputs/outputs lines".into(),
            )),
        }
    }
}

fn split_names(list: &str) -> Vec<String> {
    list.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl InferenceRuntime for MockRuntime {
    fn introspect(&self, blob: &[u8]) -> Result<PartitionSignature, RuntimeError> {
        Self::parse(blob)
    }

    fn run(&self, blob: &[u8], inputs: &[TensorValue]) -> Result<Vec<TensorValue>, RuntimeError> {
        let signature = Self::parse(blob)?;
        if inputs.len() != signature.inputs.len() {
            return Err(RuntimeError::Execution(format!(
                "expected {} inputs, got {}",
                signature.inputs.len(),
                inputs.len()
            )));
        }

        let seed: f32 = inputs.iter().flat_map(|t| &t.data).sum();
        let mut outputs = Vec::with_capacity(signature.outputs.len());
        for (oi, _) in signature.outputs.iter().enumerate() {
            let peak = (seed.abs() as usize + oi) % CATEGORIES;
            let mut data = vec![0.0f32; CATEGORIES];
            for (j, v) in data.iter_mut().enumerate() {
                *v = (j % 7) as f32 * 1e-4;
            }
            data[peak] = 1.0;
            outputs.push(TensorValue::new(vec![1, CATEGORIES], data));
        }
        Ok(outputs)
    }

    fn run_text(&self, blob: &[u8], tokenizer: &[u8]) -> Result<String, RuntimeError> {
        Self::parse(blob)?;
        Ok(format!("tokenized {} bytes", tokenizer.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn introspect_parses_manifest() {
        let blob = MockRuntime::manifest(&["x", "y"], &["z"]);
        let sig = MockRuntime::new().introspect(&blob).unwrap();
        assert_eq!(sig.inputs, vec!["x", "y"]);
        assert_eq!(sig.outputs, vec!["z"]);
    }

    #[test]
    fn introspect_rejects_garbage() {
        assert!(MockRuntime::new().introspect(b"\xff\xfe").is_err());
        assert!(MockRuntime::new().introspect(b"no manifest here").is_err());
    }

    #[test]
    fn run_is_deterministic() {
        let rt = MockRuntime::new();
        let blob = MockRuntime::manifest(&["x"], &["y"]);
        let input = TensorValue::new(vec![1, 3], vec![1.0, 2.0, 3.0]);
        let a = rt.run(&blob, std::slice::from_ref(&input)).unwrap();
        let b = rt.run(&blob, std::slice::from_ref(&input)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].data.len(), CATEGORIES);
        // Peak at sum(inputs) % 1000 = 6.
        assert_eq!(a[0].data[6], 1.0);
    }

    #[test]
    fn run_rejects_arity_mismatch() {
        let rt = MockRuntime::new();
        let blob = MockRuntime::manifest(&["x", "y"], &["z"]);
        let input = TensorValue::new(vec![1], vec![0.0]);
        assert!(rt.run(&blob, std::slice::from_ref(&input)).is_err());
    }

    #[test]
    fn run_text_reports_tokenizer_size() {
        let rt = MockRuntime::new();
        let blob = MockRuntime::manifest(&["ids"], &["logits"]);
        let text = rt.run_text(&blob, &[0u8; 12]).unwrap();
        assert!(text.contains("12"));
    }
}
