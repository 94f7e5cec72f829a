// SPDX-FileCopyrightText: Copyright (c) 2025 The ectrans authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Transition solution: the finalized per-group decisions expanded into an
//! ordered task list, plus aggregate load statistics.
//!
//! Building a solution is the last step of planning. It first validates
//! the final placement (no node may appear twice within a post-transition
//! stripe — the terminal correctness gate), then emits per-group tasks:
//!
//! * re-encoding: read all `k_f` data blocks, transfer the non-resident
//!   ones to the compute node, compute and write each parity;
//! * parity merging: per parity index, read and transfer the `lambda_i`
//!   contributing original parities, compute and write the result;
//! * every original parity block is deleted once its replacement exists;
//! * every block whose final destination differs from its current
//!   residence is read, transferred, written and deleted, in that order.

mod task;

pub use task::{StripeRef, TaskKind, TransTask};

use log::debug;

use crate::model::{EncodeScheme, StripeBatch};
use crate::planner::{intended_placement, PlanError};

/// The complete, validated task list for one transition epoch.
#[derive(Debug, Clone)]
pub struct TransitionSolution {
    num_nodes: u16,
    tasks: Vec<TransTask>,
}

impl TransitionSolution {
    /// Certifies that every post-transition stripe has `n_f` distinct,
    /// assigned node ids. Must pass before any task is emitted.
    pub fn validate_final_placement(batch: &StripeBatch) -> Result<(), PlanError> {
        let code = batch.code();
        for group in batch.groups() {
            let post = batch.post_stripe_of(group);
            if !post.is_assigned() || post.num_blocks() != usize::from(code.n_f) {
                return Err(PlanError::UnassignedPostStripe { group: group.id });
            }
            let mut seen = vec![false; usize::from(batch.num_nodes())];
            for &node in post.placement() {
                if seen[usize::from(node)] {
                    return Err(PlanError::DuplicateNodeInStripe {
                        group: group.id,
                        node,
                    });
                }
                seen[usize::from(node)] = true;
            }
        }
        Ok(())
    }

    /// Validates the batch and expands every group's decision into tasks.
    pub fn build(batch: &StripeBatch) -> Result<Self, PlanError> {
        Self::validate_final_placement(batch)?;

        let code = *batch.code();
        let mut tasks = Vec::new();

        for group in batch.groups() {
            let group_id = group.id;
            let intended = intended_placement(batch, group_id)?;
            let final_placement = batch.post_stripe_of(group).placement();

            match &group.applied.scheme {
                EncodeScheme::Unassigned => {
                    return Err(PlanError::UnassignedScheme { group: group_id })
                }
                EncodeScheme::ReEncode { nodes } => {
                    let compute = nodes[0];
                    // Collect all k_f data blocks at the compute node.
                    for (member, &sid) in group.pre_stripes.iter().enumerate() {
                        let stripe_ref = StripeRef::Pre {
                            global: sid,
                            member: member as u8,
                        };
                        let stripe = batch.pre_stripe(sid);
                        for block_id in 0..code.k_i {
                            let src = stripe.node_of(usize::from(block_id));
                            tasks.push(TransTask::local(
                                TaskKind::Read,
                                group_id,
                                stripe_ref,
                                block_id,
                                src,
                            ));
                            if src != compute {
                                tasks.push(TransTask::transfer(
                                    group_id, stripe_ref, block_id, src, compute,
                                ));
                            }
                        }
                    }
                    for parity_id in 0..code.m_f {
                        let block_id = code.k_f + parity_id;
                        tasks.push(TransTask::local(
                            TaskKind::Compute,
                            group_id,
                            StripeRef::Post,
                            block_id,
                            compute,
                        ));
                        tasks.push(TransTask::local(
                            TaskKind::Write,
                            group_id,
                            StripeRef::Post,
                            block_id,
                            compute,
                        ));
                    }
                }
                EncodeScheme::ParityMerge { nodes } => {
                    for (parity_id, &compute) in nodes.iter().enumerate() {
                        // Gather the lambda_i contributing parities.
                        for (member, &sid) in group.pre_stripes.iter().enumerate() {
                            let stripe_ref = StripeRef::Pre {
                                global: sid,
                                member: member as u8,
                            };
                            let block_id = code.k_i + parity_id as u8;
                            let src = batch.pre_stripe(sid).node_of(usize::from(block_id));
                            tasks.push(TransTask::local(
                                TaskKind::Read,
                                group_id,
                                stripe_ref,
                                block_id,
                                src,
                            ));
                            if src != compute {
                                tasks.push(TransTask::transfer(
                                    group_id, stripe_ref, block_id, src, compute,
                                ));
                            }
                        }
                        let block_id = code.k_f + parity_id as u8;
                        tasks.push(TransTask::local(
                            TaskKind::Compute,
                            group_id,
                            StripeRef::Post,
                            block_id,
                            compute,
                        ));
                        tasks.push(TransTask::local(
                            TaskKind::Write,
                            group_id,
                            StripeRef::Post,
                            block_id,
                            compute,
                        ));
                    }
                }
            }

            // All original parity blocks are obsolete once their
            // replacements exist.
            for (member, &sid) in group.pre_stripes.iter().enumerate() {
                let stripe_ref = StripeRef::Pre {
                    global: sid,
                    member: member as u8,
                };
                let stripe = batch.pre_stripe(sid);
                for parity_id in 0..code.m_i {
                    let block_id = code.k_i + parity_id;
                    tasks.push(TransTask::local(
                        TaskKind::Delete,
                        group_id,
                        stripe_ref,
                        block_id,
                        stripe.node_of(usize::from(block_id)),
                    ));
                }
            }

            // Relocate every block whose final destination differs from
            // where it currently sits.
            for (block_id, (&residence, &dest)) in
                intended.iter().zip(final_placement).enumerate()
            {
                if residence == dest {
                    continue;
                }
                let stripe_ref = if block_id < usize::from(code.k_f) {
                    let member = block_id / usize::from(code.k_i);
                    StripeRef::Pre {
                        global: group.pre_stripes[member],
                        member: member as u8,
                    }
                } else {
                    StripeRef::Post
                };
                let task_block_id = if block_id < usize::from(code.k_f) {
                    (block_id % usize::from(code.k_i)) as u8
                } else {
                    block_id as u8
                };
                tasks.push(TransTask::local(
                    TaskKind::Read,
                    group_id,
                    stripe_ref,
                    task_block_id,
                    residence,
                ));
                tasks.push(TransTask::transfer(
                    group_id,
                    stripe_ref,
                    task_block_id,
                    residence,
                    dest,
                ));
                tasks.push(TransTask::local(
                    TaskKind::Write,
                    group_id,
                    stripe_ref,
                    task_block_id,
                    dest,
                ));
                tasks.push(TransTask::local(
                    TaskKind::Delete,
                    group_id,
                    stripe_ref,
                    task_block_id,
                    residence,
                ));
            }
        }

        debug!("built {} transition tasks", tasks.len());
        Ok(Self {
            num_nodes: batch.num_nodes(),
            tasks,
        })
    }

    pub fn tasks(&self) -> &[TransTask] {
        &self.tasks
    }

    pub fn tasks_of_kind(&self, kind: TaskKind) -> impl Iterator<Item = &TransTask> {
        self.tasks.iter().filter(move |t| t.kind == kind)
    }

    /// Per-node (send, receive) counts over the transfer tasks.
    pub fn transfer_load_distribution(&self) -> (Vec<u64>, Vec<u64>) {
        let mut send = vec![0u64; usize::from(self.num_nodes)];
        let mut recv = vec![0u64; usize::from(self.num_nodes)];
        for task in self.tasks_of_kind(TaskKind::Transfer) {
            send[usize::from(task.src_node)] += 1;
            recv[usize::from(task.dst_node)] += 1;
        }
        (send, recv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConvertibleCode, GroupingTarget, Stripe};
    use crate::planner::{GreedyPlanner, TransitionPlanner};

    fn planned_batch() -> StripeBatch {
        let code = ConvertibleCode::new(3, 2, 6, 2).expect("valid code");
        let stripes = (0..4u16)
            .map(|sid| Stripe::new((0..5).map(|b| (sid * 2 + b) % 10).collect()))
            .collect();
        let mut batch = StripeBatch::new(code, 10, stripes).expect("valid batch");
        GreedyPlanner::new(17, GroupingTarget::ParityMerge)
            .plan(&mut batch)
            .expect("plan");
        batch
    }

    #[test]
    fn test_build_counts_per_group() {
        let batch = planned_batch();
        let solution = TransitionSolution::build(&batch).expect("build");
        let code = batch.code();

        for group in batch.groups() {
            let group_tasks: Vec<_> = solution
                .tasks()
                .iter()
                .filter(|t| t.group == group.id)
                .collect();
            // Per parity index: lambda_i reads, one compute, one write.
            let reads = group_tasks
                .iter()
                .filter(|t| t.kind == TaskKind::Read && matches!(t.stripe, StripeRef::Pre { .. }))
                .count();
            assert!(reads >= (code.lambda_i * u32::from(code.m_f)) as usize);
            let computes = group_tasks
                .iter()
                .filter(|t| t.kind == TaskKind::Compute)
                .count();
            assert_eq!(computes, usize::from(code.m_f));
            // Every original parity is deleted exactly once.
            let parity_deletes = group_tasks
                .iter()
                .filter(|t| {
                    t.kind == TaskKind::Delete
                        && matches!(t.stripe, StripeRef::Pre { .. })
                        && t.block_id >= code.k_i
                })
                .count();
            assert_eq!(
                parity_deletes,
                (code.lambda_i * u32::from(code.m_i)) as usize
            );
        }
    }

    #[test]
    fn test_transfer_load_sums_match() {
        let batch = planned_batch();
        let solution = TransitionSolution::build(&batch).expect("build");
        let (send, recv) = solution.transfer_load_distribution();
        let transfers = solution.tasks_of_kind(TaskKind::Transfer).count() as u64;
        assert_eq!(send.iter().sum::<u64>(), transfers);
        assert_eq!(recv.iter().sum::<u64>(), transfers);
        assert!(transfers > 0);
    }

    #[test]
    fn test_duplicate_placement_rejected() {
        let code = ConvertibleCode::new(3, 2, 6, 2).expect("valid code");
        let stripes = (0..2u16)
            .map(|sid| Stripe::new((0..5).map(|b| (sid + b) % 10).collect()))
            .collect();
        let mut batch = StripeBatch::new(code, 10, stripes).expect("valid batch");
        batch.construct_in_sequence();
        // Node 4 appears twice in the forged placement.
        batch.assign_post_placement(0, vec![0, 1, 2, 3, 4, 5, 6, 4]);
        assert!(matches!(
            TransitionSolution::validate_final_placement(&batch),
            Err(PlanError::DuplicateNodeInStripe { group: 0, node: 4 })
        ));
    }

    #[test]
    fn test_unassigned_placement_rejected() {
        let code = ConvertibleCode::new(3, 2, 6, 2).expect("valid code");
        let stripes = (0..2u16)
            .map(|sid| Stripe::new((0..5).map(|b| (sid + b) % 10).collect()))
            .collect();
        let mut batch = StripeBatch::new(code, 10, stripes).expect("valid batch");
        batch.construct_in_sequence();
        assert!(matches!(
            TransitionSolution::validate_final_placement(&batch),
            Err(PlanError::UnassignedPostStripe { group: 0 })
        ));
    }
}
