// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

use std::any::Any;
use std::collections::VecDeque;

use parking_lot::Mutex;
use tracing::debug;

use mmprep_structures::{OpSpec, PipelineError, PipelineResult, TensorList};

use super::kernels::{check_outputs, write_output};
use crate::operator::Operator;
use crate::workspace::Workspace;

/// Entry point for caller-provided data.
///
/// Fed batches queue up in FIFO order; each run moves the oldest one into
/// output 0.
pub struct ExternalSource {
    spec: OpSpec,
    queue: Mutex<VecDeque<TensorList>>,
}

impl ExternalSource {
    pub fn new(spec: OpSpec) -> Self {
        Self {
            spec,
            queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Enqueue a batch. With `copy` the tensors are deep-copied, otherwise the
    /// caller's storage is shared.
    pub fn feed(&self, data: TensorList, copy: bool) {
        let data = if copy { data.deep_copy() } else { data };
        let mut queue = self.queue.lock();
        queue.push_back(data);
        debug!(source = ?self.spec.output(0).map(|o| &o.name), queued = queue.len(), "fed external input");
    }

    /// Batches fed but not yet consumed.
    pub fn queued(&self) -> usize {
        self.queue.lock().len()
    }
}

impl Operator for ExternalSource {
    fn spec(&self) -> &OpSpec {
        &self.spec
    }

    fn run(&self, ws: &Workspace) -> PipelineResult<()> {
        check_outputs(&self.spec, ws)?;
        let data = self
            .queue
            .lock()
            .pop_front()
            .ok_or_else(|| PipelineError::operator(self.spec.name(), "ExternalSource is empty"))?;

        for tensor in data.iter() {
            let samples = tensor.shape().first().copied().unwrap_or(0);
            if samples > ws.max_batch_size() {
                return Err(PipelineError::Tensor(format!(
                    "fed batch of {} samples exceeds the batch size {}",
                    samples,
                    ws.max_batch_size()
                )));
            }
        }
        write_output(ws, 0, data)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use mmprep_runtime::WorkerPool;
    use mmprep_structures::{shared_tensor_list, Tensor, TensorLayout};
    use ndarray::{ArrayD, IxDyn};

    fn frames(batch: usize) -> TensorList {
        TensorList::from_tensors(vec![Tensor::new(
            ArrayD::<u8>::zeros(IxDyn(&[batch, 2, 2, 3])),
            TensorLayout::Nhwc,
        )])
    }

    fn bound_workspace(max_batch: usize) -> Workspace {
        let mut ws = Workspace::new(Arc::new(WorkerPool::new(1, "src").unwrap()), max_batch);
        ws.add_output(shared_tensor_list(TensorList::new()));
        ws
    }

    #[test]
    fn test_fifo_order_and_empty_error() {
        let source = ExternalSource::new(OpSpec::new("ExternalSource").with_output("raw", "cpu"));
        let ws = bound_workspace(4);
        source.feed(frames(1), false);
        source.feed(frames(2), true);
        assert_eq!(source.queued(), 2);

        source.run(&ws).unwrap();
        assert_eq!(ws.output(0).unwrap().read().tensors()[0].shape()[0], 1);
        source.run(&ws).unwrap();
        assert_eq!(ws.output(0).unwrap().read().tensors()[0].shape()[0], 2);

        let err = source.run(&ws).unwrap_err();
        assert_eq!(
            err,
            PipelineError::operator("ExternalSource", "ExternalSource is empty")
        );
    }

    #[test]
    fn test_oversized_batch_rejected() {
        let source = ExternalSource::new(OpSpec::new("ExternalSource").with_output("raw", "cpu"));
        let ws = bound_workspace(1);
        source.feed(frames(2), false);
        assert!(matches!(source.run(&ws), Err(PipelineError::Tensor(_))));
    }
}
