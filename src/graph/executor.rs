//! Dependency-ordered graph execution.
//!
//! Iterative DFS from the synthetic root with an explicit stack; a node
//! runs only once all its ancestors on every path have completed. There
//! is no intra-request parallelism: partitions execute one at a time even
//! where the graph would permit concurrent branches.

use std::time::Instant;

use thiserror::Error;
use tracing::{debug, warn};

use crate::runtime::{InferenceRuntime, RuntimeError, TensorValue};

use super::{NodeId, OperatorGraph, ROOT};

/// Classification categories scanned for the top-1 result.
const MAX_CATEGORIES: usize = 1000;

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("model authentication is incorrect for partition '{partition}'")]
    AuthenticationFailed { partition: String },

    #[error("partition '{partition}' failed: {source}")]
    Runtime {
        partition: String,
        source: RuntimeError,
    },

    #[error("partition '{partition}' produced no usable output")]
    MissingOutput { partition: String },
}

/// Per-node execution state. `Failed` is terminal: the failed branch is
/// not descended, though siblings already scheduled are still attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Unvisited,
    Running,
    Completed,
    Failed,
}

/// Top-1 result read from the last partition in registration order.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub partition: String,
    pub score: f32,
    pub category: usize,
}

/// Walk the graph in dependency order, invoking the runtime once per
/// partition. `open` supplies the plaintext blob for a partition index
/// and is where authenticated decryption happens; its failure marks the
/// node `Failed` without touching the rest of the already-scheduled
/// frontier. Any failure fails the whole run and drops partial outputs.
pub fn execute(
    graph: &OperatorGraph,
    runtime: &dyn InferenceRuntime,
    client_inputs: &[TensorValue],
    mut open: impl FnMut(usize) -> Result<Vec<u8>, ExecutionError>,
) -> Result<Prediction, ExecutionError> {
    let mut states = vec![NodeState::Unvisited; graph.len()];
    let mut outputs: Vec<Vec<TensorValue>> = vec![Vec::new(); graph.len()];

    states[ROOT.0] = NodeState::Completed;
    let mut stack: Vec<NodeId> = graph.node(ROOT).children.iter().rev().copied().collect();
    let mut first_error: Option<ExecutionError> = None;

    while let Some(id) = stack.pop() {
        if states[id.0] != NodeState::Unvisited {
            continue;
        }
        let node = graph.node(id);

        if node
            .parents
            .iter()
            .any(|p| states[p.0] == NodeState::Failed)
        {
            // Branch below a failure is halted, not attempted.
            states[id.0] = NodeState::Failed;
            continue;
        }
        if node
            .parents
            .iter()
            .any(|p| states[p.0] != NodeState::Completed)
        {
            // Some ancestor path is still pending; the last parent to
            // complete re-schedules this node.
            continue;
        }

        states[id.0] = NodeState::Running;

        let mut inputs: Vec<TensorValue> = Vec::with_capacity(node.num_inputs);
        if node.input_sources.is_empty() {
            // Zero declared inputs: fed the full client tensor list.
            inputs.extend_from_slice(client_inputs);
        } else {
            for source in &node.input_sources {
                if source.parent == ROOT {
                    // The root slot stands for the whole client list.
                    inputs.extend_from_slice(client_inputs);
                    continue;
                }
                match outputs[source.parent.0].get(source.output_index) {
                    Some(tensor) => inputs.push(tensor.clone()),
                    None => {
                        return Err(ExecutionError::MissingOutput {
                            partition: graph.node(source.parent).name.clone(),
                        })
                    }
                }
            }
        }

        let partition_index = graph.partition_index(id);
        let started = Instant::now();
        let result = open(partition_index)
            .and_then(|blob| {
                runtime
                    .run(&blob, &inputs)
                    .map_err(|source| ExecutionError::Runtime {
                        partition: node.name.clone(),
                        source,
                    })
            });

        match result {
            Ok(produced) => {
                debug!(
                    partition = %node.name,
                    index = partition_index,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "partition executed"
                );
                outputs[id.0] = produced;
                states[id.0] = NodeState::Completed;
                for child in node.children.iter().rev() {
                    stack.push(*child);
                }
            }
            Err(error) => {
                warn!(partition = %node.name, %error, "partition execution failed");
                states[id.0] = NodeState::Failed;
                if first_error.is_none() {
                    first_error = Some(error);
                }
            }
        }
    }

    if let Some(error) = first_error {
        // Partial outputs go down with this frame.
        return Err(error);
    }

    let last = graph.partition_node(graph.partition_count() - 1);
    let last_node = graph.node(last);
    let final_output = outputs[last.0]
        .last()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ExecutionError::MissingOutput {
            partition: last_node.name.clone(),
        })?;

    let scan = &final_output.data[..final_output.data.len().min(MAX_CATEGORIES)];
    let (category, score) = scan
        .iter()
        .enumerate()
        .fold((0usize, scan[0]), |(bi, bv), (i, &v)| {
            if v > bv {
                (i, v)
            } else {
                (bi, bv)
            }
        });

    Ok(Prediction {
        partition: last_node.name.clone(),
        score,
        category,
    })
}
