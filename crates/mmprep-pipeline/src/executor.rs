// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Pipelined executor: Build -> Run -> Outputs.
//!
//! A run takes a free slot, feeds its inputs, runs every operator of the built
//! graph in id order against that slot's workspaces and publishes the slot as
//! ready. Inputs are fed only once a slot is held, so a run that times out
//! leaves the `ExternalSource` queues untouched. `outputs`
//! hands the oldest ready slot to the caller and returns the one it held
//! before. Interior buffers are shared by every slot, so operator passes of
//! concurrent runs are serialized by a pass lock; slot acquisition and output
//! consumption stay concurrent.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use mmprep_runtime::WorkerPool;
use mmprep_structures::{PipelineError, PipelineResult, SharedTensorList, TensorList};

use crate::context::PipelineContext;
use crate::graph::Graph;
use crate::operators::ExternalSource;
use crate::workspace_manager::{QueueStats, SlotIdx, WorkspaceManager};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    Init,
    Built,
    /// A run failed; the executor refuses further work.
    Error,
}

impl fmt::Display for ExecutorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecutorState::Init => "INIT",
            ExecutorState::Built => "BUILT",
            ExecutorState::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// Everything that exists only once the executor is built
struct Plan {
    graph: Graph,
    manager: WorkspaceManager,
    pool: Arc<WorkerPool>,
}

pub struct Executor {
    context: Arc<PipelineContext>,
    max_batch_size: usize,
    num_threads: usize,
    queue_depth: usize,
    state: Mutex<ExecutorState>,
    plan: Option<Plan>,
    pass_lock: Mutex<()>,
}

impl Executor {
    pub fn new(context: Arc<PipelineContext>, max_batch_size: usize, num_threads: usize, queue_depth: usize) -> Self {
        Self {
            context,
            max_batch_size,
            num_threads,
            queue_depth,
            state: Mutex::new(ExecutorState::Init),
            plan: None,
            pass_lock: Mutex::new(()),
        }
    }

    pub fn state(&self) -> ExecutorState {
        *self.state.lock()
    }

    fn expect_state(&self, expected: ExecutorState, operation: &str) -> PipelineResult<()> {
        let state = self.state();
        if state != expected {
            return Err(PipelineError::State(format!(
                "{} needs the executor in state {}, it is {}",
                operation, expected, state
            )));
        }
        Ok(())
    }

    fn plan(&self) -> PipelineResult<&Plan> {
        self.plan
            .as_ref()
            .ok_or_else(|| PipelineError::State("executor is not built".to_string()))
    }

    /// Allocate the pool and run slots for a built graph.
    ///
    /// Declared outputs get a ring as deep as the queue depth; every other
    /// data node gets a single buffer.
    pub fn build(&mut self, graph: Graph) -> PipelineResult<()> {
        self.expect_state(ExecutorState::Init, "build")?;
        if self.num_threads == 0 {
            return Err(PipelineError::InvalidConfig(
                "executor needs at least one worker thread".to_string(),
            ));
        }

        let pool = Arc::new(WorkerPool::new(self.num_threads, "mmprep")?);
        let depths: Vec<usize> = (0..graph.data_nodes().len())
            .map(|id| if graph.is_output(id) { self.queue_depth } else { 1 })
            .collect();
        let manager = WorkspaceManager::new(
            &graph,
            &depths,
            self.max_batch_size,
            Arc::clone(&pool),
            self.context.acquire_timeout,
        )?;

        info!(
            operators = graph.op_nodes().len(),
            slots = manager.num_slots(),
            threads = pool.num_threads(),
            "executor built"
        );
        self.plan = Some(Plan { graph, manager, pool });
        *self.state.get_mut() = ExecutorState::Built;
        Ok(())
    }

    /// Execute the whole graph once into a free slot, consuming data fed
    /// earlier through [`Executor::feed_input`].
    pub fn run(&self) -> PipelineResult<()> {
        self.run_with_inputs(HashMap::new(), false)
    }

    /// Take a free slot, feed `inputs` to their `ExternalSource`s and execute
    /// the whole graph once into that slot.
    ///
    /// # Errors
    /// [`PipelineError::Timeout`] if no slot frees up within the acquire
    /// window; nothing is fed in that case. An operator failure recycles the
    /// slot and moves the executor to [`ExecutorState::Error`].
    pub fn run_with_inputs(&self, inputs: HashMap<String, TensorList>, copy: bool) -> PipelineResult<()> {
        self.expect_state(ExecutorState::Built, "run")?;
        let plan = self.plan()?;
        let slot = plan.manager.try_acquire_free_idx().ok_or_else(|| {
            PipelineError::Timeout(format!(
                "no free run slot within {:?}",
                self.context.acquire_timeout
            ))
        })?;

        let result = {
            let _pass = self.pass_lock.lock();
            for (name, data) in inputs {
                if let Some(source) = Self::external_source(&plan.graph, &name) {
                    source.feed(data, copy);
                }
            }
            Self::run_slot(plan, slot)
        };
        match result {
            Ok(()) => {
                plan.manager.release(slot)?;
                debug!(slot, "run finished");
                Ok(())
            }
            Err(err) => {
                error!(slot, error = %err, "run failed");
                plan.manager.recycle(slot)?;
                *self.state.lock() = ExecutorState::Error;
                Err(err)
            }
        }
    }

    fn run_slot(plan: &Plan, slot: SlotIdx) -> PipelineResult<()> {
        for (id, node) in plan.graph.op_nodes().iter().enumerate() {
            debug!(slot, operator = node.spec().name(), "running operator");
            node.op().run(plan.manager.workspace(slot, id)?)?;
        }
        Ok(())
    }

    /// Buffers of the next ready slot, in declared output order.
    ///
    /// The slot handed out by the previous call goes back to the free queue,
    /// so the returned buffers stay valid until the next call.
    pub fn outputs(&self) -> PipelineResult<Vec<SharedTensorList>> {
        self.expect_state(ExecutorState::Built, "outputs")?;
        let manager = &self.plan()?.manager;
        manager.release_output_idx()?;
        let slot = manager.try_acquire_output_idx()?.ok_or_else(|| {
            PipelineError::Timeout(format!(
                "no ready run slot within {:?}",
                self.context.acquire_timeout
            ))
        })?;
        Ok(manager.output_buffers(slot))
    }

    /// Queue `data` on the `ExternalSource` producing `name`.
    ///
    /// Names that do not resolve to an `ExternalSource` of the built graph are
    /// ignored with a warning; they usually belong to a branch pruned from the
    /// path to the outputs. A run that then finds its source empty fails.
    pub fn feed_input(&self, name: &str, data: TensorList, copy: bool) -> PipelineResult<()> {
        self.expect_state(ExecutorState::Built, "feed_input")?;
        if let Some(source) = Self::external_source(&self.plan()?.graph, name) {
            source.feed(data, copy);
        }
        Ok(())
    }

    fn external_source<'g>(graph: &'g Graph, name: &str) -> Option<&'g ExternalSource> {
        let Some(data_id) = graph.data_node_id(name) else {
            warn!(input = name, "input is not part of the built graph; ignoring it");
            return None;
        };
        let op = graph.op_nodes()[graph.data_nodes()[data_id].producer].op();
        let source = op.as_any().downcast_ref::<ExternalSource>();
        if source.is_none() {
            warn!(input = name, producer = op.name(), "input is not produced by an ExternalSource; ignoring it");
        }
        source
    }

    pub fn graph(&self) -> Option<&Graph> {
        self.plan.as_ref().map(|p| &p.graph)
    }

    pub fn num_threads(&self) -> usize {
        self.plan.as_ref().map_or(self.num_threads, |p| p.pool.num_threads())
    }

    pub fn queue_stats(&self) -> Option<QueueStats> {
        self.plan.as_ref().map(|p| p.manager.queue_stats())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use mmprep_structures::OpSpec;

    fn context() -> Arc<PipelineContext> {
        Arc::new(
            PipelineContext::with_builtin_ops()
                .unwrap()
                .with_acquire_timeout(Duration::from_millis(20)),
        )
    }

    fn source_graph(context: &PipelineContext) -> Graph {
        let registry = &context.registry;
        Graph::from_specs(registry, vec![OpSpec::new("ExternalSource").with_output("raw", "cpu")])
            .unwrap()
            .build(registry, &["raw".to_string()], false)
            .unwrap()
    }

    fn batch() -> TensorList {
        TensorList::from_tensors(vec![mmprep_structures::Tensor::from_i64_slice(&[1, 2])])
    }

    #[test]
    fn test_lifecycle_order() {
        let context = context();
        let mut executor = Executor::new(Arc::clone(&context), 4, 1, 2);
        assert!(matches!(executor.run(), Err(PipelineError::State(_))));
        assert!(matches!(executor.outputs(), Err(PipelineError::State(_))));

        executor.build(source_graph(&context)).unwrap();
        assert_eq!(executor.state(), ExecutorState::Built);
        assert!(matches!(
            executor.build(source_graph(&context)),
            Err(PipelineError::State(_))
        ));
    }

    #[test]
    fn test_pipelined_runs() {
        let context = context();
        let mut executor = Executor::new(Arc::clone(&context), 4, 1, 2);
        executor.build(source_graph(&context)).unwrap();

        executor.feed_input("raw", batch(), false).unwrap();
        executor.feed_input("raw", batch(), true).unwrap();
        executor.run().unwrap();
        executor.run().unwrap();
        // both slots are ready; nothing is free
        assert!(matches!(executor.run(), Err(PipelineError::Timeout(_))));

        let first = executor.outputs().unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].read().len(), 1);
        let second = executor.outputs().unwrap();
        assert!(!Arc::ptr_eq(&first[0], &second[0]));
        assert!(matches!(executor.outputs(), Err(PipelineError::Timeout(_))));
    }

    #[test]
    fn test_failed_run_moves_to_error() {
        let context = context();
        let mut executor = Executor::new(Arc::clone(&context), 4, 1, 2);
        executor.build(source_graph(&context)).unwrap();

        let err = executor.run().unwrap_err();
        assert_eq!(err.code(), 5);
        assert_eq!(executor.state(), ExecutorState::Error);
        assert!(matches!(executor.run(), Err(PipelineError::State(_))));
    }

    fn queued(executor: &Executor) -> usize {
        let graph = executor.graph().unwrap();
        graph.op_nodes()[0]
            .op()
            .as_any()
            .downcast_ref::<ExternalSource>()
            .unwrap()
            .queued()
    }

    #[test]
    fn test_timed_out_run_feeds_nothing() {
        let context = context();
        let mut executor = Executor::new(Arc::clone(&context), 4, 1, 2);
        executor.build(source_graph(&context)).unwrap();

        let inputs = || HashMap::from([("raw".to_string(), batch())]);
        executor.run_with_inputs(inputs(), false).unwrap();
        executor.run_with_inputs(inputs(), true).unwrap();
        assert_eq!(queued(&executor), 0);

        assert!(matches!(
            executor.run_with_inputs(inputs(), false),
            Err(PipelineError::Timeout(_))
        ));
        assert_eq!(queued(&executor), 0);
        assert_eq!(executor.state(), ExecutorState::Built);
    }

    #[test]
    fn test_feed_non_source_output_is_ignored() {
        let context = context();
        let registry = &context.registry;
        let graph = Graph::from_specs(
            registry,
            vec![
                OpSpec::new("ExternalSource").with_output("raw", "cpu"),
                OpSpec::new("ToTensor")
                    .with_input("raw", "cpu")
                    .with_output("t", "cpu")
                    .with_arg("layout", 0i64),
            ],
        )
        .unwrap()
        .build(registry, &["t".to_string()], false)
        .unwrap();
        let mut executor = Executor::new(Arc::clone(&context), 4, 1, 2);
        executor.build(graph).unwrap();

        executor.feed_input("t", batch(), false).unwrap();
        assert_eq!(queued(&executor), 0);
        // the source was never fed, so the run fails
        assert_eq!(executor.run().unwrap_err().code(), 5);
    }

    #[test]
    fn test_feed_unknown_input_is_ignored() {
        let context = context();
        let mut executor = Executor::new(Arc::clone(&context), 4, 1, 2);
        executor.build(source_graph(&context)).unwrap();
        executor.feed_input("pruned", batch(), false).unwrap();
    }
}
