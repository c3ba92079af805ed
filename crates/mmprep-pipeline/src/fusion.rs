// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Operator fusion planner.
//!
//! The path to the outputs is treated as one string: the concatenation of its
//! operator names. A fusion operator is registered under the concatenated
//! names of the chain it replaces, so covering that string with the fewest
//! candidate names (each path operator's own name, plus every registered fusion
//! name) yields the smallest graph. The tiling is then checked against the
//! path node by node; anything that does not line up exactly falls back to the
//! unfused path.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::debug;

use mmprep_structures::{OpSpec, PipelineError, PipelineResult};

use crate::graph::{Graph, OpNodeId};
use crate::operator::Operator;
use crate::registry::OperatorRegistry;

/// An accepted fusion of one path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FusionPlan {
    /// Operator name of each resulting node
    pub tiles: Vec<String>,
    /// Operators (ids of the unfused graph) covered by each tile, in path order
    pub groups: Vec<Vec<OpNodeId>>,
    /// Last operator of every tile
    pub boundaries: Vec<OpNodeId>,
}

/// Cover `target` with the fewest `candidates`, in order.
///
/// Ties keep the first cover found, scanning candidates in the given order.
/// Returns `None` when no cover exists.
pub fn min_tiling(target: &str, candidates: &[String]) -> Option<Vec<String>> {
    let bytes = target.as_bytes();
    let n = bytes.len();
    let mut dp: Vec<Option<usize>> = vec![None; n + 1];
    let mut prev: Vec<Option<usize>> = vec![None; n + 1];
    dp[0] = Some(0);

    for i in 1..=n {
        for (ci, candidate) in candidates.iter().enumerate() {
            let len = candidate.len();
            if len == 0 || len > i || &bytes[i - len..i] != candidate.as_bytes() {
                continue;
            }
            let Some(tiles) = dp[i - len] else {
                continue;
            };
            if dp[i].map_or(true, |best| tiles + 1 < best) {
                dp[i] = Some(tiles + 1);
                prev[i] = Some(ci);
            }
        }
    }

    dp[n]?;
    let mut tiling = Vec::new();
    let mut i = n;
    while i > 0 {
        let candidate = &candidates[prev[i]?];
        tiling.push(candidate.clone());
        i -= candidate.len();
    }
    tiling.reverse();
    Some(tiling)
}

/// Tiling candidates: path operator names first, then the fusion names that do
/// not swallow a boundary operator.
///
/// A fusion name may contain a boundary operator's name only as its suffix,
/// judged by the first occurrence.
pub fn candidates(path_names: &[&str], fusion_names: &[String], boundary_names: &[&str]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for name in path_names {
        if !out.iter().any(|c| c == name) {
            out.push(name.to_string());
        }
    }
    for fusion in fusion_names {
        let swallows_boundary = boundary_names.iter().any(|boundary| {
            fusion
                .find(boundary)
                .is_some_and(|pos| pos + boundary.len() != fusion.len())
        });
        if !swallows_boundary && !out.contains(fusion) {
            out.push(fusion.clone());
        }
    }
    out
}

/// Operators that must end a tile: producers of declared outputs, operators
/// with several outputs, and operators whose output feeds several consumers.
fn mandatory_boundaries(graph: &Graph, path: &[OpNodeId], outputs: &[String]) -> BTreeSet<OpNodeId> {
    let mut consumers: HashMap<&str, usize> = HashMap::new();
    for id in path {
        let spec = graph.op_nodes()[*id].spec();
        let names = spec
            .inputs()
            .iter()
            .map(|input| input.name.as_str())
            .chain(spec.arg_inputs().map(|(_, node)| node));
        for name in names {
            *consumers.entry(name).or_default() += 1;
        }
    }

    let mut boundaries: BTreeSet<OpNodeId> = outputs
        .iter()
        .filter_map(|name| graph.data_node_id(name))
        .map(|data_id| graph.data_nodes()[data_id].producer)
        .collect();
    for id in path {
        let spec = graph.op_nodes()[*id].spec();
        let fans_out = spec
            .outputs()
            .iter()
            .any(|o| consumers.get(o.name.as_str()).copied().unwrap_or(0) > 1);
        if spec.num_outputs() > 1 || fans_out {
            boundaries.insert(*id);
        }
    }
    boundaries
}

/// Split `path` into the operators of each tile, or `None` if the tile names
/// do not line up with whole operator names.
fn match_tiles(names: &[&str], path: &[OpNodeId], tiles: &[String]) -> Option<Vec<Vec<OpNodeId>>> {
    let mut groups = Vec::with_capacity(tiles.len());
    let mut current = Vec::new();
    let mut acc = String::new();

    for (name, id) in names.iter().zip(path) {
        let tile = tiles.get(groups.len())?;
        acc.push_str(name);
        current.push(*id);
        if acc == *tile {
            groups.push(std::mem::take(&mut current));
            acc.clear();
        } else if !tile.starts_with(acc.as_str()) {
            return None;
        }
    }
    (groups.len() == tiles.len() && acc.is_empty()).then_some(groups)
}

/// Each operator of a fused group must consume exactly what the previous one
/// produced, and no argument-input may point inside the group.
fn is_chain(graph: &Graph, group: &[OpNodeId]) -> bool {
    let mut interior: HashSet<&str> = HashSet::new();
    for pair in group.windows(2) {
        let producer = graph.op_nodes()[pair[0]].spec();
        let consumer = graph.op_nodes()[pair[1]].spec();
        let produced: HashSet<&str> = producer.outputs().iter().map(|o| o.name.as_str()).collect();
        if consumer.num_inputs() == 0 || !consumer.inputs().iter().all(|i| produced.contains(i.name.as_str())) {
            return false;
        }
        interior.extend(produced);
    }
    group.iter().all(|id| {
        graph.op_nodes()[*id]
            .spec()
            .arg_inputs()
            .all(|(_, node)| !interior.contains(node))
    })
}

/// Plan fusion of `path`; `None` means "run the path unfused".
pub fn plan(
    graph: &Graph,
    path: &[OpNodeId],
    registry: &OperatorRegistry,
    outputs: &[String],
) -> Option<FusionPlan> {
    let names: Vec<&str> = path.iter().map(|id| graph.op_nodes()[*id].spec().name()).collect();
    let mandatory = mandatory_boundaries(graph, path, outputs);
    let boundary_names: Vec<&str> = mandatory
        .iter()
        .map(|id| graph.op_nodes()[*id].spec().name())
        .collect();
    let candidates = candidates(&names, registry.fusion_op_names(), &boundary_names);

    let Some(tiles) = min_tiling(&names.concat(), &candidates) else {
        debug!("no tiling covers the path; running unfused");
        return None;
    };
    if tiles.len() == path.len() {
        return None;
    }
    let Some(groups) = match_tiles(&names, path, &tiles) else {
        debug!(?tiles, "tiling does not follow operator boundaries; running unfused");
        return None;
    };

    let boundaries: Vec<OpNodeId> = groups.iter().filter_map(|g| g.last().copied()).collect();
    if !mandatory.iter().all(|id| boundaries.contains(id)) {
        debug!(?tiles, "tiling fuses past a mandatory boundary; running unfused");
        return None;
    }
    for (tile, group) in tiles.iter().zip(&groups) {
        if group.len() > 1 && (!registry.is_fusion(tile) || !is_chain(graph, group)) {
            debug!(tile = %tile, "tile is not a fusable chain; running unfused");
            return None;
        }
    }

    Some(FusionPlan {
        tiles,
        groups,
        boundaries,
    })
}

/// Spec of the operator replacing `specs`: the first one's inputs, the last
/// one's outputs, and every argument and argument-input, later ones winning.
pub fn fused_spec(name: &str, specs: &[&OpSpec]) -> OpSpec {
    let mut fused = OpSpec::new(name);
    if let Some(first) = specs.first() {
        for input in first.inputs() {
            fused.add_input(&input.name, &input.device);
        }
    }
    if let Some(last) = specs.last() {
        for output in last.outputs() {
            fused.add_output(&output.name, &output.device);
        }
    }
    for spec in specs {
        for (name, data_node) in spec.arg_inputs() {
            fused.set_arg_input(name, data_node, true);
        }
        for (name, value) in spec.args() {
            fused.set_arg(name, value.clone(), true);
        }
    }
    fused
}

/// Replace every multi-operator tile of `plan` with its fusion operator.
///
/// Consumes the unfused graph and returns a linked graph over the fused
/// operator list.
pub fn rewrite(
    graph: Graph,
    registry: &OperatorRegistry,
    plan: &FusionPlan,
    outputs: &[String],
) -> PipelineResult<Graph> {
    let mut ops: Vec<Option<Box<dyn Operator>>> = graph.into_ops().into_iter().map(Some).collect();
    let missing = |id: OpNodeId| PipelineError::Build(format!("fusion references missing operator {}", id));

    let mut rewritten: Vec<Box<dyn Operator>> = Vec::with_capacity(plan.groups.len());
    for (tile, group) in plan.tiles.iter().zip(&plan.groups) {
        if let [single] = group.as_slice() {
            let op = ops.get_mut(*single).and_then(Option::take).ok_or_else(|| missing(*single))?;
            rewritten.push(op);
            continue;
        }
        let specs = group
            .iter()
            .map(|id| {
                ops.get(*id)
                    .and_then(Option::as_ref)
                    .map(|op| op.spec())
                    .ok_or_else(|| missing(*id))
            })
            .collect::<PipelineResult<Vec<&OpSpec>>>()?;
        let spec = fused_spec(tile, &specs);
        spec.validate()?;
        debug!(fused = %tile, operators = group.len(), "created fused operator");
        rewritten.push(registry.create(spec)?);
    }
    Graph::from_ops(rewritten, outputs)
}
