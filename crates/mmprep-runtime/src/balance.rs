// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Even partitioning of `n` items across `m` members.
//!
//! Member `i` receives a contiguous range. The first `n % m` members get one
//! extra item, so range lengths differ by at most one and the ranges cover
//! `[0, n)` exactly.

use std::ops::Range;

use mmprep_structures::{PipelineError, PipelineResult};

/// Range of items assigned to `member_id`.
pub fn assign(num_tasks: usize, num_members: usize, member_id: usize) -> PipelineResult<Range<usize>> {
    if num_members == 0 {
        return Err(PipelineError::WorkerPool(
            "cannot balance tasks across zero members".to_string(),
        ));
    }
    if member_id >= num_members {
        return Err(PipelineError::WorkerPool(format!(
            "member id {} out of range for {} members",
            member_id, num_members
        )));
    }
    if num_members == 1 || num_tasks == 0 {
        return Ok(0..num_tasks);
    }

    let avg = num_tasks / num_members;
    let rem = num_tasks % num_members;
    let len = avg + usize::from(member_id < rem);
    let begin = member_id * avg + member_id.min(rem);
    Ok(begin..begin + len)
}

/// All `num_members` ranges in member order.
pub fn ranges(num_tasks: usize, num_members: usize) -> PipelineResult<Vec<Range<usize>>> {
    (0..num_members)
        .map(|id| assign(num_tasks, num_members, id))
        .collect()
}
