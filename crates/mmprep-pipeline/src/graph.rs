// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Operator graph: ingestion, path discovery and linking.
//!
//! A graph goes through two generations. Specs are first ingested as-is (each
//! node only knows its own outputs). [`Graph::build`] then keeps the nodes
//! needed for the requested outputs, optionally fuses them, and returns a new
//! linked graph whose node ids `0..n` are a topological order.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use tracing::debug;

use mmprep_structures::{OpSpec, PipelineError, PipelineResult};

use crate::fusion;
use crate::operator::Operator;
use crate::registry::OperatorRegistry;

pub type OpNodeId = usize;
pub type DataNodeId = usize;

/// One operator instance in the graph
pub struct OpNode {
    op: Box<dyn Operator>,
    parents: BTreeSet<OpNodeId>,
    children: BTreeSet<OpNodeId>,
    /// Regular inputs first, then argument-inputs in spec order
    inputs: Vec<DataNodeId>,
    outputs: Vec<DataNodeId>,
}

impl OpNode {
    fn new(op: Box<dyn Operator>) -> Self {
        Self {
            op,
            parents: BTreeSet::new(),
            children: BTreeSet::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn op(&self) -> &dyn Operator {
        self.op.as_ref()
    }

    pub fn spec(&self) -> &OpSpec {
        self.op.spec()
    }

    pub fn parents(&self) -> &BTreeSet<OpNodeId> {
        &self.parents
    }

    pub fn children(&self) -> &BTreeSet<OpNodeId> {
        &self.children
    }

    pub fn inputs(&self) -> &[DataNodeId] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[DataNodeId] {
        &self.outputs
    }
}

/// A named, single-producer data slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataNode {
    pub name: String,
    pub producer: OpNodeId,
    pub consumers: Vec<OpNodeId>,
}

#[derive(Default)]
pub struct Graph {
    op_nodes: Vec<OpNode>,
    data_nodes: Vec<DataNode>,
    name_index: HashMap<String, DataNodeId>,
    outputs: Vec<DataNodeId>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest every spec in order.
    pub fn from_specs<I>(registry: &OperatorRegistry, specs: I) -> PipelineResult<Self>
    where
        I: IntoIterator<Item = OpSpec>,
    {
        let mut graph = Self::new();
        for spec in specs {
            graph.add_node(registry, spec)?;
        }
        Ok(graph)
    }

    /// Validate and instantiate `spec`, registering its outputs as data nodes.
    ///
    /// Inputs are resolved later, so specs may be added in any order.
    pub fn add_node(&mut self, registry: &OperatorRegistry, spec: OpSpec) -> PipelineResult<OpNodeId> {
        spec.validate()?;
        let op = registry.create(spec)?;
        self.push_op(op)
    }

    fn push_op(&mut self, op: Box<dyn Operator>) -> PipelineResult<OpNodeId> {
        let id = self.op_nodes.len();
        let mut node = OpNode::new(op);
        for output in node.op.spec().outputs() {
            if self.name_index.contains_key(&output.name) {
                return Err(PipelineError::Build(format!(
                    "data node '{}' is produced twice",
                    output.name
                )));
            }
            let data_id = self.data_nodes.len();
            self.data_nodes.push(DataNode {
                name: output.name.clone(),
                producer: id,
                consumers: Vec::new(),
            });
            self.name_index.insert(output.name.clone(), data_id);
            node.outputs.push(data_id);
        }
        self.op_nodes.push(node);
        Ok(id)
    }

    /// Keep the nodes needed for `outputs`, fuse them if asked, and link.
    pub fn build(
        self,
        registry: &OperatorRegistry,
        outputs: &[String],
        enable_fusion: bool,
    ) -> PipelineResult<Graph> {
        for name in outputs {
            if !self.name_index.contains_key(name) {
                return Err(PipelineError::Build(format!("output '{}' is not produced by any operator", name)));
            }
        }

        let path = self.path_to_outputs(outputs)?;
        debug!(nodes = path.len(), "found path to outputs");

        let plan = if enable_fusion {
            fusion::plan(&self, &path, registry, outputs)
        } else {
            None
        };
        match plan {
            Some(plan) => {
                debug!(tiles = ?plan.tiles, "fusing operator chains");
                let fused = fusion::rewrite(self, registry, &plan, outputs)?;
                let fused_path = fused.path_to_outputs(outputs)?;
                fused.keep_path(&fused_path, outputs)
            }
            None => self.keep_path(&path, outputs),
        }
    }

    /// Operator ids needed for `outputs`, in dependency order.
    pub fn path_to_outputs(&self, outputs: &[String]) -> PipelineResult<Vec<OpNodeId>> {
        let mut path = Vec::new();
        let mut on_path = HashSet::new();
        let mut in_progress = HashSet::new();
        for name in outputs {
            self.traverse(name, &mut path, &mut on_path, &mut in_progress)?;
        }
        if path.is_empty() {
            return Err(PipelineError::Build("no operator leads to the requested outputs".to_string()));
        }
        Ok(path)
    }

    /// Post-order walk from the producer of `data_name`.
    fn traverse(
        &self,
        data_name: &str,
        path: &mut Vec<OpNodeId>,
        on_path: &mut HashSet<OpNodeId>,
        in_progress: &mut HashSet<OpNodeId>,
    ) -> PipelineResult<()> {
        let data_id = self.name_index.get(data_name).ok_or_else(|| {
            PipelineError::Build(format!("data node '{}' is not produced by any operator", data_name))
        })?;
        let op_id = self.data_nodes[*data_id].producer;
        if on_path.contains(&op_id) {
            return Ok(());
        }
        if !in_progress.insert(op_id) {
            return Err(PipelineError::Build(format!(
                "cycle through operator {} while resolving '{}'",
                self.op_nodes[op_id].spec().name(),
                data_name
            )));
        }

        let spec = self.op_nodes[op_id].spec();
        for input in spec.inputs() {
            self.traverse(&input.name, path, on_path, in_progress)?;
        }
        for (_, data_node) in spec.arg_inputs() {
            self.traverse(data_node, path, on_path, in_progress)?;
        }

        in_progress.remove(&op_id);
        on_path.insert(op_id);
        path.push(op_id);
        Ok(())
    }

    /// New graph holding only the operators of `path`, renumbered in path order.
    fn keep_path(self, path: &[OpNodeId], outputs: &[String]) -> PipelineResult<Graph> {
        let mut ops: Vec<Option<Box<dyn Operator>>> = self.op_nodes.into_iter().map(|n| Some(n.op)).collect();
        let kept = path
            .iter()
            .map(|id| {
                ops.get_mut(*id)
                    .and_then(Option::take)
                    .ok_or_else(|| PipelineError::Build(format!("operator {} is not in the graph", id)))
            })
            .collect::<PipelineResult<Vec<_>>>()?;
        Graph::from_ops(kept, outputs)
    }

    /// Linked graph over `ops`: data nodes, consumers, parents/children and
    /// the declared outputs.
    pub fn from_ops(ops: Vec<Box<dyn Operator>>, outputs: &[String]) -> PipelineResult<Graph> {
        let mut graph = Graph::new();
        for op in ops {
            graph.push_op(op)?;
        }

        for id in 0..graph.op_nodes.len() {
            let spec = graph.op_nodes[id].spec();
            let names: Vec<String> = spec
                .inputs()
                .iter()
                .map(|input| input.name.clone())
                .chain(spec.arg_inputs().map(|(_, node)| node.to_string()))
                .collect();
            for name in names {
                let data_id = *graph.name_index.get(&name).ok_or_else(|| {
                    PipelineError::Build(format!(
                        "input '{}' of {} is not produced by any operator",
                        name,
                        graph.op_nodes[id].spec().name()
                    ))
                })?;
                let producer = graph.data_nodes[data_id].producer;
                graph.data_nodes[data_id].consumers.push(id);
                graph.op_nodes[id].inputs.push(data_id);
                graph.op_nodes[id].parents.insert(producer);
                graph.op_nodes[producer].children.insert(id);
            }
        }

        graph.outputs = outputs
            .iter()
            .map(|name| {
                graph.name_index.get(name).copied().ok_or_else(|| {
                    PipelineError::Build(format!("output '{}' is not produced by any operator", name))
                })
            })
            .collect::<PipelineResult<Vec<_>>>()?;
        Ok(graph)
    }

    /// Take the operators out of the graph, in id order.
    pub(crate) fn into_ops(self) -> Vec<Box<dyn Operator>> {
        self.op_nodes.into_iter().map(|n| n.op).collect()
    }

    pub fn op_nodes(&self) -> &[OpNode] {
        &self.op_nodes
    }

    pub fn op_node(&self, id: OpNodeId) -> Option<&OpNode> {
        self.op_nodes.get(id)
    }

    pub fn data_nodes(&self) -> &[DataNode] {
        &self.data_nodes
    }

    pub fn data_node_id(&self, name: &str) -> Option<DataNodeId> {
        self.name_index.get(name).copied()
    }

    /// Declared outputs, in request order.
    pub fn output_ids(&self) -> &[DataNodeId] {
        &self.outputs
    }

    pub fn is_output(&self, id: DataNodeId) -> bool {
        self.outputs.contains(&id)
    }
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = |ids: &[DataNodeId]| -> Vec<&str> {
            ids.iter()
                .filter_map(|id| self.data_nodes.get(*id).map(|d| d.name.as_str()))
                .collect()
        };
        writeln!(f, "=== Graph details ===")?;
        for (id, node) in self.op_nodes.iter().enumerate() {
            writeln!(
                f,
                "[{}] {}: inputs {:?} -> outputs {:?}, parents {:?}, children {:?}",
                id,
                node.spec().name(),
                names(&node.inputs),
                names(&node.outputs),
                node.parents,
                node.children
            )?;
        }
        write!(f, "outputs {:?}", names(&self.outputs))
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
