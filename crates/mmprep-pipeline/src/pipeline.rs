// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Caller-facing pipeline.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use mmprep_config::validation::{MAX_BATCH_SIZE, MAX_QUEUE_DEPTH, MIN_BATCH_SIZE, MIN_QUEUE_DEPTH};
use mmprep_config::PipelineConfig;
use mmprep_structures::{OpSpec, PipelineError, PipelineResult, SharedTensorList, TensorList};

use crate::context::PipelineContext;
use crate::executor::{Executor, ExecutorState};
use crate::graph::Graph;

/// A preprocessing pipeline: build once from operator specs, then feed, run
/// and fetch repeatedly.
///
/// # Examples
/// ```no_run
/// use std::collections::HashMap;
/// use std::sync::Arc;
/// use mmprep_pipeline::{Pipeline, PipelineContext};
/// use mmprep_structures::OpSpec;
///
/// let context = Arc::new(PipelineContext::with_builtin_ops().unwrap());
/// let mut pipeline = Pipeline::new(context, 8, 2, 2, true).unwrap();
/// pipeline
///     .build(
///         vec![
///             OpSpec::new("ExternalSource").with_output("raw", "cpu"),
///             OpSpec::new("ToTensor")
///                 .with_input("raw", "cpu")
///                 .with_output("t", "cpu")
///                 .with_arg("layout", 0i64),
///         ],
///         &["t"],
///     )
///     .unwrap();
/// let outputs = pipeline.run_and_fetch(HashMap::new(), false);
/// ```
pub struct Pipeline {
    context: Arc<PipelineContext>,
    batch_size: usize,
    num_threads: usize,
    queue_depth: usize,
    enable_fusion: bool,
    executor: Executor,
    summary: Option<String>,
}

fn check_range(name: &str, value: usize, min: usize, max: usize) -> PipelineResult<()> {
    if value < min || value > max {
        return Err(PipelineError::InvalidConfig(format!(
            "{} = {} is outside valid range ({}-{})",
            name, value, min, max
        )));
    }
    Ok(())
}

impl Pipeline {
    /// # Errors
    /// [`PipelineError::InvalidConfig`] unless batch size is in 1-1024, worker
    /// count in 1-(online CPUs) and queue depth in 2-128.
    pub fn new(
        context: Arc<PipelineContext>,
        batch_size: usize,
        num_threads: usize,
        queue_depth: usize,
        enable_fusion: bool,
    ) -> PipelineResult<Self> {
        check_range("batch_size", batch_size, MIN_BATCH_SIZE, MAX_BATCH_SIZE)?;
        check_range("num_threads", num_threads, 1, mmprep_runtime::online_cpus())?;
        check_range("queue_depth", queue_depth, MIN_QUEUE_DEPTH, MAX_QUEUE_DEPTH)?;

        let executor = Executor::new(Arc::clone(&context), batch_size, num_threads, queue_depth);
        Ok(Self {
            context,
            batch_size,
            num_threads,
            queue_depth,
            enable_fusion,
            executor,
            summary: None,
        })
    }

    /// Pipeline sized by a loaded config; its acquire window replaces the
    /// context's.
    pub fn from_config(context: Arc<PipelineContext>, config: &PipelineConfig) -> PipelineResult<Self> {
        let context = if config.acquire_timeout_ms > 0 {
            let timeout = Duration::from_millis(config.acquire_timeout_ms);
            Arc::new(context.as_ref().clone().with_acquire_timeout(timeout))
        } else {
            context
        };
        Self::new(
            context,
            config.batch_size,
            config.resolved_threads(),
            config.queue_depth,
            config.enable_fusion,
        )
    }

    /// Ingest `specs`, keep what `outputs` need, fuse if enabled and allocate
    /// the run slots. A pipeline builds once.
    pub fn build(&mut self, specs: Vec<OpSpec>, outputs: &[&str]) -> PipelineResult<()> {
        if self.executor.state() != ExecutorState::Init {
            return Err(PipelineError::State("pipeline is already built".to_string()));
        }
        let outputs: Vec<String> = outputs.iter().map(|s| s.to_string()).collect();
        let registry = &self.context.registry;
        let graph = Graph::from_specs(registry, specs)?.build(registry, &outputs, self.enable_fusion)?;

        let summary = graph.to_string();
        debug!("{}", summary);
        info!(
            operators = graph.op_nodes().len(),
            outputs = ?outputs,
            fusion = self.enable_fusion,
            "pipeline graph built"
        );
        self.executor.build(graph)?;
        self.summary = Some(summary);
        Ok(())
    }

    /// Feed `inputs` to their `ExternalSource`s and run the graph once.
    ///
    /// Nothing is fed unless a run slot is free, so a timed-out call can be
    /// retried with the same inputs.
    pub fn run(&self, inputs: HashMap<String, TensorList>, copy: bool) -> PipelineResult<()> {
        self.executor.run_with_inputs(inputs, copy)
    }

    /// Output buffers of the oldest finished run, in declared order.
    pub fn outputs(&self) -> PipelineResult<Vec<SharedTensorList>> {
        self.executor.outputs()
    }

    pub fn run_and_fetch(
        &self,
        inputs: HashMap<String, TensorList>,
        copy: bool,
    ) -> PipelineResult<Vec<SharedTensorList>> {
        self.run(inputs, copy)?;
        self.outputs()
    }

    /// Text dump of the built graph.
    pub fn graph_summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    pub fn state(&self) -> ExecutorState {
        self.executor.state()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    pub fn queue_depth(&self) -> usize {
        self.queue_depth
    }

    pub fn fusion_enabled(&self) -> bool {
        self.enable_fusion
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }
}
