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

//! Transition planners: strategies that choose parity-compute nodes and
//! block relocation destinations for every stripe group.
//!
//! All planners produce the same artifacts on the batch: a committed
//! [`EncodeScheme`](crate::model::EncodeScheme) and load table per group,
//! and an assigned post-transition stripe placement. They differ in how
//! hard they work for it:
//!
//! * [`RandomPlanner`] — throwaway baseline, random compute nodes;
//! * [`GreedyPlanner`] — per-group minimum bandwidth, ignoring balance;
//! * [`StripeMergePlanner`] — exhaustive grouping and per-group merge-node
//!   enumeration, bandwidth-optimal per group;
//! * [`BalancedPlanner`] — global load balancing across all groups with
//!   greedy initialization and local-search refinement.

mod balanced;
mod greedy;
mod random;
mod stripe_merge;

pub use balanced::BalancedPlanner;
pub use greedy::GreedyPlanner;
pub use random::RandomPlanner;
pub use stripe_merge::StripeMergePlanner;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use thiserror::Error;

use crate::model::{
    ClusterConfig, ConfigError, EncodeScheme, GroupingTarget, LoadTable, StripeBatch,
};
use crate::{GroupId, NodeId};

/// Fatal planning failures. These indicate an internal inconsistency or an
/// impossible instance; the engine stops rather than emit a wrong plan.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("group construction round {round} claimed {actual} stripes, expected {expected}")]
    GroupConstructionMismatch {
        round: usize,
        expected: usize,
        actual: usize,
    },
    #[error("post stripe of group {group} places node {node} more than once")]
    DuplicateNodeInStripe { group: GroupId, node: NodeId },
    #[error("group {group} has no committed parity-compute scheme")]
    UnassignedScheme { group: GroupId },
    #[error("post stripe of group {group} was never assigned a placement")]
    UnassignedPostStripe { group: GroupId },
    #[error("group {group} has more blocks to relocate than free nodes")]
    NoRelocationTarget { group: GroupId },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Planner selected by an external string token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannerKind {
    RandomReEncode,
    RandomParityMerge,
    GreedyReEncode,
    GreedyParityMerge,
    StripeMerge,
    Balanced,
    BalancedWeighted,
}

impl PlannerKind {
    pub const TOKENS: [&'static str; 7] = [
        "random-re",
        "random-pm",
        "greedy-re",
        "greedy-pm",
        "stripe-merge",
        "balanced",
        "balanced-weighted",
    ];

    pub fn from_token(token: &str) -> Result<Self, ConfigError> {
        match token {
            "random-re" => Ok(PlannerKind::RandomReEncode),
            "random-pm" => Ok(PlannerKind::RandomParityMerge),
            "greedy-re" => Ok(PlannerKind::GreedyReEncode),
            "greedy-pm" => Ok(PlannerKind::GreedyParityMerge),
            "stripe-merge" => Ok(PlannerKind::StripeMerge),
            "balanced" => Ok(PlannerKind::Balanced),
            "balanced-weighted" => Ok(PlannerKind::BalancedWeighted),
            other => Err(ConfigError::UnknownPlanner(other.to_string())),
        }
    }

    pub fn token(&self) -> &'static str {
        match self {
            PlannerKind::RandomReEncode => "random-re",
            PlannerKind::RandomParityMerge => "random-pm",
            PlannerKind::GreedyReEncode => "greedy-re",
            PlannerKind::GreedyParityMerge => "greedy-pm",
            PlannerKind::StripeMerge => "stripe-merge",
            PlannerKind::Balanced => "balanced",
            PlannerKind::BalancedWeighted => "balanced-weighted",
        }
    }
}

/// Summary of a finished planning run.
#[derive(Debug, Clone)]
pub struct PlanReport {
    pub re_encode_groups: u32,
    pub parity_merge_groups: u32,
    /// Committed parity-generation load across all groups.
    pub aggregate: LoadTable,
    /// Local-search passes run (zero for non-iterative planners).
    pub local_search_iterations: u64,
}

impl PlanReport {
    pub(crate) fn from_batch(batch: &StripeBatch, local_search_iterations: u64) -> Self {
        let mut aggregate = LoadTable::new(batch.num_nodes());
        let mut re_encode_groups = 0;
        let mut parity_merge_groups = 0;
        for group in batch.groups() {
            aggregate.accumulate(&group.applied);
            match group.applied.scheme {
                EncodeScheme::ReEncode { .. } => re_encode_groups += 1,
                EncodeScheme::ParityMerge { .. } => parity_merge_groups += 1,
                EncodeScheme::Unassigned => {}
            }
        }
        Self {
            re_encode_groups,
            parity_merge_groups,
            aggregate,
            local_search_iterations,
        }
    }
}

/// A strategy that fixes every group's encode scheme and final placement.
pub trait TransitionPlanner {
    fn plan(&mut self, batch: &mut StripeBatch) -> Result<PlanReport, PlanError>;
}

/// Builds the planner selected by `kind`. Weighted planners require the
/// cluster to carry a bandwidth profile.
pub fn build_planner(
    kind: PlannerKind,
    cluster: &ClusterConfig,
    seed: u64,
    max_iterations: Option<u64>,
) -> Result<Box<dyn TransitionPlanner>, ConfigError> {
    let planner: Box<dyn TransitionPlanner> = match kind {
        PlannerKind::RandomReEncode => {
            Box::new(RandomPlanner::new(seed, GroupingTarget::ReEncode))
        }
        PlannerKind::RandomParityMerge => {
            Box::new(RandomPlanner::new(seed, GroupingTarget::ParityMerge))
        }
        PlannerKind::GreedyReEncode => {
            Box::new(GreedyPlanner::new(seed, GroupingTarget::ReEncode))
        }
        PlannerKind::GreedyParityMerge => {
            Box::new(GreedyPlanner::new(seed, GroupingTarget::ParityMerge))
        }
        PlannerKind::StripeMerge => Box::new(StripeMergePlanner::new(seed)),
        PlannerKind::Balanced => Box::new(BalancedPlanner::new(seed, max_iterations)),
        PlannerKind::BalancedWeighted => {
            let profile = cluster
                .bw_profile
                .clone()
                .ok_or(ConfigError::MissingBandwidthProfile("balanced-weighted"))?;
            Box::new(BalancedPlanner::new_weighted(seed, max_iterations, profile))
        }
    };
    Ok(planner)
}

/// The final placement a group implies before relocation: data blocks keep
/// their source node, new parity blocks sit at their compute node. Final
/// block id `b < k_f` maps to member stripe `b / k_i`, block `b % k_i`.
pub(crate) fn intended_placement(
    batch: &StripeBatch,
    group_id: GroupId,
) -> Result<Vec<NodeId>, PlanError> {
    let code = *batch.code();
    let group = batch.group(group_id);
    let compute_nodes = group
        .applied
        .scheme
        .nodes()
        .ok_or(PlanError::UnassignedScheme { group: group_id })?;
    let mut placement = Vec::with_capacity(usize::from(code.n_f));
    for &sid in &group.pre_stripes {
        let stripe = batch.pre_stripe(sid);
        for block_id in 0..usize::from(code.k_i) {
            placement.push(stripe.node_of(block_id));
        }
    }
    placement.extend_from_slice(compute_nodes);
    Ok(placement)
}

/// Moves every colliding block of a group onto a uniformly random free
/// node, then commits the post-stripe placement. The cheap relocation used
/// by every planner except the balanced one.
pub(crate) fn relocate_by_shuffle(
    batch: &mut StripeBatch,
    group_id: GroupId,
    rng: &mut StdRng,
) -> Result<(), PlanError> {
    let mut placement = intended_placement(batch, group_id)?;
    let num_nodes = usize::from(batch.num_nodes());

    let mut is_node_placed = vec![false; num_nodes];
    let mut blocks_to_reloc = Vec::new();
    for (block_id, &node) in placement.iter().enumerate() {
        if is_node_placed[usize::from(node)] {
            blocks_to_reloc.push(block_id);
        } else {
            is_node_placed[usize::from(node)] = true;
        }
    }

    let mut available: Vec<NodeId> = (0..num_nodes as NodeId)
        .filter(|&n| !is_node_placed[usize::from(n)])
        .collect();
    if available.len() < blocks_to_reloc.len() {
        return Err(PlanError::NoRelocationTarget { group: group_id });
    }
    available.shuffle(rng);
    for (dst, &block_id) in available.iter().zip(&blocks_to_reloc) {
        placement[block_id] = *dst;
    }

    batch.assign_post_placement(group_id, placement);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_round_trip() {
        for token in PlannerKind::TOKENS {
            let kind = PlannerKind::from_token(token).expect("known token");
            assert_eq!(kind.token(), token);
        }
    }

    #[test]
    fn test_unknown_token_rejected() {
        assert!(matches!(
            PlannerKind::from_token("simulated-annealing"),
            Err(ConfigError::UnknownPlanner(_))
        ));
    }
}
