// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Run slots and the buffers behind them.
//!
//! Every data node owns a ring of buffers; the ring of a declared output is as
//! deep as the output queue, every other ring holds one buffer. A run slot is
//! one full set of workspaces, one per operator, bound to ring entry
//! `slot % ring_len` of each data node.
//!
//! Slot indices circulate as tokens:
//!
//! ```text
//!  free --acquire--> (running) --release--> ready --acquire_output--> shared
//!   ^                    |                                              |
//!   +------recycle-------+-------------release_output_idx---------------+
//! ```
//!
//! Free and ready are bounded channels sized to the slot count, so returning a
//! token never blocks. At most one slot is shared with the caller at a time.

use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{debug, warn};

use mmprep_runtime::{create_bounded, ChannelStats, WorkerPool};
use mmprep_structures::{shared_tensor_list, PipelineError, PipelineResult, SharedTensorList, TensorList};

use crate::graph::{DataNodeId, Graph, OpNodeId};
use crate::workspace::Workspace;

pub type SlotIdx = usize;

/// Occupancy of the token queues
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    pub free: ChannelStats,
    pub ready: ChannelStats,
    pub shared: Option<SlotIdx>,
}

pub struct WorkspaceManager {
    /// `stores[data_node][ring_idx]`
    stores: Vec<Vec<SharedTensorList>>,
    /// `workspaces[slot][op_node]`
    workspaces: Vec<Vec<Workspace>>,
    outputs: Vec<DataNodeId>,
    free_tx: Sender<SlotIdx>,
    free_rx: Receiver<SlotIdx>,
    ready_tx: Sender<SlotIdx>,
    ready_rx: Receiver<SlotIdx>,
    shared: Mutex<Option<SlotIdx>>,
    acquire_timeout: Duration,
}

impl WorkspaceManager {
    /// Allocate the buffer rings and `max(depths)` slot workspaces for a built
    /// graph. `depths[i]` is the ring length of data node `i`.
    pub fn new(
        graph: &Graph,
        depths: &[usize],
        max_batch_size: usize,
        pool: Arc<WorkerPool>,
        acquire_timeout: Duration,
    ) -> PipelineResult<Self> {
        if depths.len() != graph.data_nodes().len() {
            return Err(PipelineError::Build(format!(
                "got {} buffer depths for {} data nodes",
                depths.len(),
                graph.data_nodes().len()
            )));
        }
        if let Some(id) = depths.iter().position(|d| *d == 0) {
            return Err(PipelineError::InvalidConfig(format!(
                "buffer depth of '{}' must be positive",
                graph.data_nodes()[id].name
            )));
        }
        let num_slots = depths.iter().copied().max().unwrap_or(0);
        if num_slots == 0 {
            return Err(PipelineError::Build("graph has no data nodes".to_string()));
        }

        let stores: Vec<Vec<SharedTensorList>> = depths
            .iter()
            .map(|depth| (0..*depth).map(|_| shared_tensor_list(TensorList::new())).collect())
            .collect();
        let buffer = |data_id: DataNodeId, slot: SlotIdx| {
            let ring = &stores[data_id];
            Arc::clone(&ring[slot % ring.len()])
        };

        let mut workspaces = Vec::with_capacity(num_slots);
        for slot in 0..num_slots {
            let mut slot_workspaces = Vec::with_capacity(graph.op_nodes().len());
            for node in graph.op_nodes() {
                let spec = node.spec();
                let (regular, arg_inputs) = node.inputs().split_at(spec.num_inputs().min(node.inputs().len()));
                let mut ws = Workspace::new(Arc::clone(&pool), max_batch_size);
                for data_id in regular {
                    ws.add_input(buffer(*data_id, slot));
                }
                for ((name, _), data_id) in spec.arg_inputs().zip(arg_inputs) {
                    ws.add_arg_input(name, buffer(*data_id, slot));
                }
                for data_id in node.outputs() {
                    ws.add_output(buffer(*data_id, slot));
                }
                slot_workspaces.push(ws);
            }
            workspaces.push(slot_workspaces);
        }

        let (free_tx, free_rx) = create_bounded(num_slots);
        let (ready_tx, ready_rx) = create_bounded(num_slots);
        for slot in 0..num_slots {
            free_tx
                .try_send(slot)
                .map_err(|e| PipelineError::Build(format!("failed to seed free slots: {}", e)))?;
        }

        debug!(slots = num_slots, data_nodes = stores.len(), "allocated run slots");
        Ok(Self {
            stores,
            workspaces,
            outputs: graph.output_ids().to_vec(),
            free_tx,
            free_rx,
            ready_tx,
            ready_rx,
            shared: Mutex::new(None),
            acquire_timeout,
        })
    }

    pub fn num_slots(&self) -> usize {
        self.workspaces.len()
    }

    /// Block until a free slot is available.
    pub fn acquire(&self) -> PipelineResult<SlotIdx> {
        self.free_rx
            .recv()
            .map_err(|_| PipelineError::State("free slot queue closed".to_string()))
    }

    /// Free slot, or `None` if none frees up within the acquire window.
    pub fn try_acquire_free_idx(&self) -> Option<SlotIdx> {
        self.free_rx.recv_timeout(self.acquire_timeout).ok()
    }

    /// Publish a finished slot as ready.
    pub fn release(&self, idx: SlotIdx) -> PipelineResult<()> {
        self.ready_tx
            .try_send(idx)
            .map_err(|_| PipelineError::State(format!("slot {} released while the ready queue is full", idx)))
    }

    /// Block until a slot is ready and share it with the caller.
    pub fn acquire_output_idx(&self) -> PipelineResult<SlotIdx> {
        let idx = self
            .ready_rx
            .recv()
            .map_err(|_| PipelineError::State("ready slot queue closed".to_string()))?;
        self.share(idx)?;
        Ok(idx)
    }

    /// Like [`Self::acquire_output_idx`], giving up after the acquire window.
    pub fn try_acquire_output_idx(&self) -> PipelineResult<Option<SlotIdx>> {
        match self.ready_rx.recv_timeout(self.acquire_timeout) {
            Ok(idx) => {
                self.share(idx)?;
                Ok(Some(idx))
            }
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(PipelineError::State("ready slot queue closed".to_string())),
        }
    }

    fn share(&self, idx: SlotIdx) -> PipelineResult<()> {
        let mut shared = self.shared.lock();
        if let Some(previous) = shared.replace(idx) {
            warn!(slot = previous, "slot was still shared; recycling it");
            self.recycle(previous)?;
        }
        Ok(())
    }

    /// Hand the shared slot, if any, back to the free queue.
    pub fn release_output_idx(&self) -> PipelineResult<()> {
        let previous = self.shared.lock().take();
        match previous {
            Some(idx) => self.recycle(idx),
            None => Ok(()),
        }
    }

    /// Return a slot straight to the free queue.
    pub fn recycle(&self, idx: SlotIdx) -> PipelineResult<()> {
        self.free_tx
            .try_send(idx)
            .map_err(|_| PipelineError::State(format!("slot {} recycled while the free queue is full", idx)))
    }

    pub fn workspace(&self, slot: SlotIdx, op: OpNodeId) -> PipelineResult<&Workspace> {
        self.workspaces
            .get(slot)
            .and_then(|ws| ws.get(op))
            .ok_or_else(|| PipelineError::State(format!("no workspace for operator {} in slot {}", op, slot)))
    }

    pub fn data_store(&self, slot: SlotIdx, data_node: DataNodeId) -> Option<&SharedTensorList> {
        let ring = self.stores.get(data_node)?;
        ring.get(slot % ring.len())
    }

    /// Buffers of the declared outputs of `slot`, in declaration order.
    pub fn output_buffers(&self, slot: SlotIdx) -> Vec<SharedTensorList> {
        self.outputs
            .iter()
            .filter_map(|id| self.data_store(slot, *id))
            .cloned()
            .collect()
    }

    pub fn queue_stats(&self) -> QueueStats {
        QueueStats {
            free: ChannelStats::from_sender(&self.free_tx),
            ready: ChannelStats::from_sender(&self.ready_tx),
            shared: *self.shared.lock(),
        }
    }
}
