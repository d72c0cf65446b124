//! Response payloads.
//!
//! All responses travel as UTF-8 text in a single channel: a positive
//! result or a descriptive error in the same slot. Callers pattern-match
//! on content; that is a documented weakness of the protocol, kept for
//! compatibility.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Register succeeded: the assigned identifier, plus the per-partition
    /// hex tags when the deployment returns them (durable mode).
    Registered { id: String, tags: Vec<String> },

    /// Infer succeeded: the last partition's top-1 result.
    Prediction {
        partition: String,
        score: f32,
        category: usize,
    },

    /// Tokenizer-path inference result, passed through from the runtime.
    Text(String),

    /// Any failure, rendered as a descriptive message.
    Error(String),
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Registered { id, tags } => {
                write!(f, "{id}")?;
                for tag in tags {
                    write!(f, " {tag}")?;
                }
                Ok(())
            }
            Response::Prediction {
                partition,
                score,
                category,
            } => write!(
                f,
                "Model {partition}, Inference: Max is {score:.6} for category {category}!"
            ),
            Response::Text(text) => write!(f, "{text}"),
            Response::Error(message) => write!(f, "{message}"),
        }
    }
}

impl Response {
    pub fn into_bytes(self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_without_tags_is_bare_id() {
        let r = Response::Registered {
            id: "3".into(),
            tags: vec![],
        };
        assert_eq!(r.to_string(), "3");
    }

    #[test]
    fn registered_with_tags_is_space_separated() {
        let r = Response::Registered {
            id: "1".into(),
            tags: vec!["aa".repeat(16), "bb".repeat(16)],
        };
        let text = r.to_string();
        let parts: Vec<&str> = text.split(' ').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "1");
        assert_eq!(parts[1].len(), 32);
    }

    #[test]
    fn prediction_format() {
        let r = Response::Prediction {
            partition: "resnet_part2.onnx".into(),
            score: 0.75,
            category: 281,
        };
        let text = r.to_string();
        assert!(text.contains("resnet_part2.onnx"));
        assert!(text.contains("Inference: Max is"));
        assert!(text.contains("category 281!"));
    }
}
