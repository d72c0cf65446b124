//! Dependency graph construction from partition IO signatures.
//!
//! Each partition's declared input names are resolved against the output
//! names of preceding partitions by leading-substring match (runtimes
//! append mangling suffixes to tensor names, so exact equality is too
//! strict). Among equally valid matches the nearest preceding partition
//! wins; that tie-break is deliberate policy, not accident.

use thiserror::Error;

use super::{NodeId, ROOT};

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("partition '{partition}': input '{input}' cannot be resolved from any preceding output")]
    UnresolvableInput { partition: String, input: String },

    #[error("pipeline has no partitions")]
    Empty,
}

/// Construction-time record for one partition: its name and declared IO
/// tensor names. Discarded once the graph is built.
#[derive(Debug, Clone)]
pub struct OperatorIo {
    pub name: String,
    pub input_names: Vec<String>,
    pub output_names: Vec<String>,
}

/// Where one input slot gets its tensor from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputSource {
    pub parent: NodeId,
    /// Index into the parent's output list. For the synthetic root the
    /// executor splices in the whole client tensor list instead.
    pub output_index: usize,
}

#[derive(Debug)]
pub struct OperatorNode {
    pub name: String,
    pub num_inputs: usize,
    pub num_outputs: usize,
    pub parents: Vec<NodeId>,
    pub children: Vec<NodeId>,
    /// One resolved source per declared input slot, in slot order.
    pub input_sources: Vec<InputSource>,
}

/// Arena of operator nodes. Index 0 is the synthetic root; partition `i`
/// (registration order) is node `i + 1`.
#[derive(Debug)]
pub struct OperatorGraph {
    nodes: Vec<OperatorNode>,
}

impl OperatorGraph {
    pub fn node(&self, id: NodeId) -> &OperatorNode {
        &self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of partitions (nodes minus the synthetic root).
    pub fn partition_count(&self) -> usize {
        self.nodes.len() - 1
    }

    /// Node id of partition `index` in registration order.
    pub fn partition_node(&self, index: usize) -> NodeId {
        NodeId(index + 1)
    }

    /// Partition index of a non-root node.
    pub fn partition_index(&self, id: NodeId) -> usize {
        debug_assert!(id != ROOT);
        id.0 - 1
    }
}

/// Build the dependency graph for an ordered list of partitions.
///
/// The synthetic root's output-name list is the first partition's declared
/// input names, so that partition is always satisfied by client-supplied
/// tensors. Registration must abort on [`BuildError`] before any store
/// mutation.
pub fn build_graph(ios: &[OperatorIo]) -> Result<OperatorGraph, BuildError> {
    if ios.is_empty() {
        return Err(BuildError::Empty);
    }

    let mut nodes = Vec::with_capacity(ios.len() + 1);
    nodes.push(OperatorNode {
        name: "input".to_string(),
        num_inputs: 0,
        num_outputs: ios[0].input_names.len(),
        parents: Vec::new(),
        children: Vec::new(),
        input_sources: Vec::new(),
    });

    // Output-name lists visible to the backward scan: entry 0 is the root
    // (client tensors named after the first partition's inputs), then one
    // entry per partition.
    let mut visible_outputs: Vec<&[String]> = Vec::with_capacity(ios.len() + 1);
    visible_outputs.push(&ios[0].input_names);

    for (i, io) in ios.iter().enumerate() {
        let child = NodeId(i + 1);
        let mut input_sources = Vec::with_capacity(io.input_names.len());

        for input in &io.input_names {
            // Most recent producer first; entry 0 (the root) is the last
            // resort.
            let source = (0..=i).rev().find_map(|entry| {
                visible_outputs[entry]
                    .iter()
                    .position(|output| input.starts_with(output.as_str()))
                    .map(|output_index| InputSource {
                        parent: NodeId(entry),
                        output_index,
                    })
            });

            match source {
                Some(source) => input_sources.push(source),
                None => {
                    return Err(BuildError::UnresolvableInput {
                        partition: io.name.clone(),
                        input: input.clone(),
                    })
                }
            }
        }

        // Zero-input partitions hang directly off the synthetic root.
        let parent_ids: Vec<NodeId> = if input_sources.is_empty() {
            vec![ROOT]
        } else {
            let mut seen = Vec::new();
            for source in &input_sources {
                if !seen.contains(&source.parent) {
                    seen.push(source.parent);
                }
            }
            seen
        };

        nodes.push(OperatorNode {
            name: io.name.clone(),
            num_inputs: io.input_names.len(),
            num_outputs: io.output_names.len(),
            parents: parent_ids.clone(),
            children: Vec::new(),
            input_sources,
        });
        for parent in parent_ids {
            nodes[parent.0].children.push(child);
        }

        visible_outputs.push(&io.output_names);
    }

    Ok(OperatorGraph { nodes })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn io(name: &str, inputs: &[&str], outputs: &[&str]) -> OperatorIo {
        OperatorIo {
            name: name.to_string(),
            input_names: inputs.iter().map(|s| s.to_string()).collect(),
            output_names: outputs.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn empty_pipeline_rejected() {
        assert!(matches!(build_graph(&[]), Err(BuildError::Empty)));
    }

    #[test]
    fn single_partition_hangs_off_root() {
        let graph = build_graph(&[io("p0", &["x"], &["y"])]).unwrap();
        assert_eq!(graph.partition_count(), 1);
        let node = graph.node(graph.partition_node(0));
        assert_eq!(node.parents, vec![ROOT]);
        assert_eq!(node.input_sources[0].parent, ROOT);
        assert_eq!(graph.node(ROOT).children, vec![NodeId(1)]);
    }

    #[test]
    fn prefix_match_links_parent_with_routing_index() {
        // Partition 1's sole input is a prefix-extension of partition 0's
        // sole output, so 0 must be the parent with routing index 0.
        let graph = build_graph(&[
            io("p0", &["x"], &["mid"]),
            io("p1", &["mid_quantized:0"], &["out"]),
        ])
        .unwrap();

        let p1 = graph.node(graph.partition_node(1));
        assert_eq!(p1.parents, vec![graph.partition_node(0)]);
        assert_eq!(
            p1.input_sources[0],
            InputSource {
                parent: graph.partition_node(0),
                output_index: 0
            }
        );

        let p0 = graph.node(graph.partition_node(0));
        assert_eq!(p0.parents, vec![ROOT]);
    }

    #[test]
    fn three_partition_chain() {
        let graph = build_graph(&[
            io("p0", &["x"], &["a"]),
            io("p1", &["a:0"], &["b"]),
            io("p2", &["b:0"], &["c"]),
        ])
        .unwrap();
        for i in 1..3 {
            let node = graph.node(graph.partition_node(i));
            assert_eq!(node.parents, vec![graph.partition_node(i - 1)]);
        }
    }

    #[test]
    fn nearest_preceding_producer_wins() {
        // Both p0 and p1 expose an output named "t"; p2 must link to p1.
        let graph = build_graph(&[
            io("p0", &["x"], &["t"]),
            io("p1", &["t"], &["t"]),
            io("p2", &["t:0"], &["out"]),
        ])
        .unwrap();
        let p2 = graph.node(graph.partition_node(2));
        assert_eq!(p2.parents, vec![graph.partition_node(1)]);
    }

    #[test]
    fn routing_index_tracks_output_position() {
        let graph = build_graph(&[
            io("p0", &["x"], &["left", "right"]),
            io("p1", &["right:0", "left:0"], &["out"]),
        ])
        .unwrap();
        let p1 = graph.node(graph.partition_node(1));
        assert_eq!(p1.input_sources[0].output_index, 1);
        assert_eq!(p1.input_sources[1].output_index, 0);
        // One parent edge even though two slots resolve to it.
        assert_eq!(p1.parents.len(), 1);
    }

    #[test]
    fn zero_input_partition_depends_on_root() {
        let graph = build_graph(&[
            io("p0", &["x"], &["a"]),
            io("const", &[], &["k"]),
        ])
        .unwrap();
        let node = graph.node(graph.partition_node(1));
        assert_eq!(node.parents, vec![ROOT]);
        assert!(node.input_sources.is_empty());
    }

    #[test]
    fn unresolvable_input_is_error() {
        let result = build_graph(&[
            io("p0", &["x"], &["a"]),
            io("p1", &["nowhere"], &["out"]),
        ]);
        assert!(matches!(
            result,
            Err(BuildError::UnresolvableInput { ref partition, ref input })
                if partition == "p1" && input == "nowhere"
        ));
    }
}
