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

//! Stripe batch: the arena of pre/post stripes plus the algorithms that
//! partition all pre-transition stripes into non-overlapping groups of
//! `lambda_i`.
//!
//! Four construction strategies, cheapest first:
//!
//! * in sequence — contiguous chunks, O(num_stripes);
//! * random pick — shuffled chunks;
//! * bandwidth pairwise — repeated greedy pairwise merging, the practical
//!   default for bandwidth-aware grouping;
//! * bandwidth exhaustive — full C(num_stripes, lambda_i) enumeration,
//!   only usable for small batches.
//!
//! Groups hold stable stripe ids into the batch-owned arena; nothing
//! outside the batch stores references into it.

use std::collections::BTreeMap;

use log::{debug, info};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::planner::PlanError;
use crate::{GroupId, NodeId, StripeId};

use super::load::LoadTable;
use super::stripe_group::{
    block_distributions, min_parity_merge_scheme_from, min_re_encode_bw_from,
};
use super::{ConfigError, ConvertibleCode, Stripe, StripeGroup};

/// Which method's bandwidth model drives bandwidth-aware group
/// construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupingTarget {
    ReEncode,
    ParityMerge,
}

/// The full collection of pre/post stripes and the constructed groups.
#[derive(Debug, Clone)]
pub struct StripeBatch {
    code: ConvertibleCode,
    num_nodes: u16,
    pre_stripes: Vec<Stripe>,
    post_stripes: Vec<Stripe>,
    groups: Vec<StripeGroup>,
}

impl StripeBatch {
    pub fn new(
        code: ConvertibleCode,
        num_nodes: u16,
        pre_stripes: Vec<Stripe>,
    ) -> Result<Self, ConfigError> {
        if pre_stripes.len() as u32 % code.lambda_i != 0 {
            return Err(ConfigError::StripeCountNotMultiple {
                num_stripes: pre_stripes.len() as u32,
                lambda_i: code.lambda_i,
            });
        }
        Ok(Self {
            code,
            num_nodes,
            pre_stripes,
            post_stripes: Vec::new(),
            groups: Vec::new(),
        })
    }

    pub fn code(&self) -> &ConvertibleCode {
        &self.code
    }

    pub fn num_nodes(&self) -> u16 {
        self.num_nodes
    }

    pub fn num_groups(&self) -> u32 {
        self.pre_stripes.len() as u32 / self.code.lambda_i
    }

    pub fn pre_stripes(&self) -> &[Stripe] {
        &self.pre_stripes
    }

    pub fn pre_stripe(&self, id: StripeId) -> &Stripe {
        &self.pre_stripes[id as usize]
    }

    pub fn post_stripes(&self) -> &[Stripe] {
        &self.post_stripes
    }

    pub fn groups(&self) -> &[StripeGroup] {
        &self.groups
    }

    pub fn group(&self, id: GroupId) -> &StripeGroup {
        &self.groups[id as usize]
    }

    /// Commits a parity-compute decision onto a group.
    pub fn commit_scheme(&mut self, id: GroupId, applied: LoadTable) {
        self.groups[id as usize].applied = applied;
    }

    /// Commits the final placement of a group's post-transition stripe.
    pub fn assign_post_placement(&mut self, id: GroupId, placement: Vec<NodeId>) {
        let post_id = self.groups[id as usize].post_stripe;
        self.post_stripes[post_id as usize].assign(placement);
    }

    pub fn post_stripe_of(&self, group: &StripeGroup) -> &Stripe {
        &self.post_stripes[group.post_stripe as usize]
    }

    // -----------------------------------------------------------------------
    // Group construction
    // -----------------------------------------------------------------------

    /// Contiguous chunks of `lambda_i` stripes in id order.
    pub fn construct_in_sequence(&mut self) {
        let order: Vec<StripeId> = (0..self.pre_stripes.len() as StripeId).collect();
        self.build_groups_from_order(&order);
    }

    /// Shuffled chunks of `lambda_i` stripes.
    pub fn construct_by_random_pick(&mut self, rng: &mut StdRng) {
        let mut order: Vec<StripeId> = (0..self.pre_stripes.len() as StripeId).collect();
        order.shuffle(rng);
        self.build_groups_from_order(&order);
    }

    /// Enumerates every size-`lambda_i` combination of stripes, buckets by
    /// minimum transition bandwidth for the target method, then accepts
    /// buckets in ascending order skipping combinations that reuse a
    /// claimed stripe. Combinatorial; logs progress every 10^7 candidates.
    pub fn construct_by_bandwidth_exhaustive(&mut self, target: GroupingTarget) {
        let num_stripes = self.pre_stripes.len();
        let lambda_i = self.code.lambda_i as usize;
        let num_groups = self.num_groups() as usize;

        let mut buckets: BTreeMap<u64, Vec<Vec<StripeId>>> = BTreeMap::new();
        let mut combo: Vec<usize> = (0..lambda_i).collect();
        let mut candidates = 0u64;
        loop {
            let members: Vec<StripeId> = combo.iter().map(|&i| i as StripeId).collect();
            let bw = self.subset_bandwidth(target, &members);
            buckets.entry(bw).or_default().push(members);

            candidates += 1;
            if candidates % 10_000_000 == 0 {
                info!("enumerated {} candidate groups", candidates);
            }

            if !next_combination(&mut combo, num_stripes) {
                break;
            }
        }
        debug!(
            "exhaustive enumeration: {} candidates in {} buckets",
            candidates,
            buckets.len()
        );

        let mut claimed = vec![false; num_stripes];
        let mut selected: Vec<Vec<StripeId>> = Vec::with_capacity(num_groups);
        'outer: for (_, combos) in &buckets {
            for members in combos {
                if members.iter().any(|&sid| claimed[sid as usize]) {
                    continue;
                }
                for &sid in members {
                    claimed[sid as usize] = true;
                }
                selected.push(members.clone());
                if selected.len() == num_groups {
                    break 'outer;
                }
            }
        }
        self.finalize_groups(selected);
    }

    /// Builds groups by repeated pairwise merging: round 1 pins the
    /// lowest-bandwidth disjoint pairs, every later round extends each
    /// pinned partial group with one unused stripe, cheapest extensions
    /// first. `O(lambda_i * num_stripes^2)` candidate evaluations.
    ///
    /// After round `r` exactly `(r + 1) * num_groups` stripes must be
    /// claimed; any other count is a fatal internal error.
    pub fn construct_by_bandwidth_pairwise(
        &mut self,
        target: GroupingTarget,
    ) -> Result<(), PlanError> {
        let num_stripes = self.pre_stripes.len();
        let lambda_i = self.code.lambda_i as usize;
        let num_groups = self.num_groups() as usize;

        if lambda_i == 1 {
            self.construct_in_sequence();
            return Ok(());
        }

        let mut claimed = vec![false; num_stripes];
        let mut partial: Vec<Vec<StripeId>> = Vec::with_capacity(num_groups);

        // Round 1: all unordered pairs, cheapest disjoint pairs pinned.
        let mut buckets: BTreeMap<u64, Vec<(StripeId, StripeId)>> = BTreeMap::new();
        for a in 0..num_stripes as StripeId {
            for b in (a + 1)..num_stripes as StripeId {
                let bw = self.subset_bandwidth(target, &[a, b]);
                buckets.entry(bw).or_default().push((a, b));
            }
        }
        'pairs: for (_, pairs) in &buckets {
            for &(a, b) in pairs {
                if claimed[a as usize] || claimed[b as usize] {
                    continue;
                }
                claimed[a as usize] = true;
                claimed[b as usize] = true;
                partial.push(vec![a, b]);
                if partial.len() == num_groups {
                    break 'pairs;
                }
            }
        }
        self.check_round_claims(&claimed, 1, num_groups)?;

        // Rounds 2..lambda_i-1: extend every partial group by one stripe.
        for round in 2..lambda_i {
            let mut buckets: BTreeMap<u64, Vec<(usize, StripeId)>> = BTreeMap::new();
            for (group_idx, members) in partial.iter().enumerate() {
                let mut extended = members.clone();
                extended.push(0);
                let last = extended.len() - 1;
                for sid in 0..num_stripes as StripeId {
                    if claimed[sid as usize] {
                        continue;
                    }
                    extended[last] = sid;
                    let bw = self.subset_bandwidth(target, &extended);
                    buckets.entry(bw).or_default().push((group_idx, sid));
                }
            }

            let mut extended_this_round = vec![false; num_groups];
            let mut remaining = num_groups;
            'extend: for (_, candidates) in &buckets {
                for &(group_idx, sid) in candidates {
                    if extended_this_round[group_idx] || claimed[sid as usize] {
                        continue;
                    }
                    extended_this_round[group_idx] = true;
                    claimed[sid as usize] = true;
                    partial[group_idx].push(sid);
                    remaining -= 1;
                    if remaining == 0 {
                        break 'extend;
                    }
                }
            }
            self.check_round_claims(&claimed, round, num_groups)?;
            debug!("pairwise round {} complete", round);
        }

        self.finalize_groups(partial);
        Ok(())
    }

    /// Rebuilds groups from explicit member sets, as when reloading stored
    /// stripe-group metadata.
    pub fn construct_from_member_sets(&mut self, member_sets: Vec<Vec<StripeId>>) {
        self.finalize_groups(member_sets);
    }

    fn check_round_claims(
        &self,
        claimed: &[bool],
        round: usize,
        num_groups: usize,
    ) -> Result<(), PlanError> {
        let actual = claimed.iter().filter(|&&c| c).count();
        let expected = (round + 1) * num_groups;
        if actual != expected {
            return Err(PlanError::GroupConstructionMismatch {
                round,
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// Minimum transition bandwidth of a (possibly partial) member set, for
    /// the targeted method.
    fn subset_bandwidth(&self, target: GroupingTarget, members: &[StripeId]) -> u64 {
        let stripes: Vec<&Stripe> = members
            .iter()
            .map(|&sid| &self.pre_stripes[sid as usize])
            .collect();
        let (data_dist, parity_dists) = block_distributions(&self.code, self.num_nodes, &stripes);
        match target {
            GroupingTarget::ReEncode => min_re_encode_bw_from(&self.code, &data_dist),
            GroupingTarget::ParityMerge => {
                min_parity_merge_scheme_from(&self.code, &data_dist, &parity_dists).0
            }
        }
    }

    fn build_groups_from_order(&mut self, order: &[StripeId]) {
        let member_sets = order
            .chunks(self.code.lambda_i as usize)
            .map(|chunk| chunk.to_vec())
            .collect();
        self.finalize_groups(member_sets);
    }

    fn finalize_groups(&mut self, member_sets: Vec<Vec<StripeId>>) {
        self.groups.clear();
        self.post_stripes.clear();
        for (idx, members) in member_sets.into_iter().enumerate() {
            let group_id = idx as GroupId;
            self.post_stripes.push(Stripe::empty());
            self.groups.push(StripeGroup::new(
                group_id,
                &self.code,
                self.num_nodes,
                members,
                group_id,
                &self.pre_stripes,
            ));
        }
        debug!("constructed {} stripe groups", self.groups.len());
    }
}

/// Advances a lexicographic size-k combination over `0..n`. Returns false
/// once the last combination has been visited.
fn next_combination(combo: &mut [usize], n: usize) -> bool {
    let k = combo.len();
    let mut i = k;
    while i > 0 {
        i -= 1;
        if combo[i] != n - k + i {
            combo[i] += 1;
            for j in (i + 1)..k {
                combo[j] = combo[j - 1] + 1;
            }
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn make_batch(num_stripes: u32, num_nodes: u16, code: ConvertibleCode) -> StripeBatch {
        // Deterministic pre placements with distinct nodes per stripe.
        let mut stripes = Vec::new();
        for sid in 0..num_stripes {
            let placement: Vec<NodeId> = (0..u16::from(code.n_i))
                .map(|b| (sid as u16 + b) % num_nodes)
                .collect();
            stripes.push(Stripe::new(placement));
        }
        StripeBatch::new(code, num_nodes, stripes).expect("valid batch")
    }

    #[test]
    fn test_sequential_grouping() {
        let code = ConvertibleCode::new(3, 2, 6, 2).expect("valid code");
        let mut batch = make_batch(4, 8, code);
        batch.construct_in_sequence();
        assert_eq!(batch.groups().len(), 2);
        assert_eq!(batch.group(0).pre_stripes, vec![0, 1]);
        assert_eq!(batch.group(1).pre_stripes, vec![2, 3]);
    }

    #[test]
    fn test_random_pick_covers_all_stripes() {
        let code = ConvertibleCode::new(3, 2, 6, 2).expect("valid code");
        let mut batch = make_batch(8, 8, code);
        let mut rng = StdRng::seed_from_u64(7);
        batch.construct_by_random_pick(&mut rng);
        let mut seen = vec![false; 8];
        for group in batch.groups() {
            assert_eq!(group.pre_stripes.len(), 2);
            for &sid in &group.pre_stripes {
                assert!(!seen[sid as usize], "stripe {} claimed twice", sid);
                seen[sid as usize] = true;
            }
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn test_pairwise_grouping_partitions_exactly() {
        // lambda_i = 3 exercises the extension rounds.
        let code = ConvertibleCode::new(2, 2, 6, 2).expect("valid code");
        assert_eq!(code.lambda_i, 3);
        let mut batch = make_batch(9, 10, code);
        batch
            .construct_by_bandwidth_pairwise(GroupingTarget::ParityMerge)
            .expect("pairwise construction");
        assert_eq!(batch.groups().len(), 3);
        let mut seen = vec![false; 9];
        for group in batch.groups() {
            assert_eq!(group.pre_stripes.len(), 3);
            for &sid in &group.pre_stripes {
                assert!(!seen[sid as usize]);
                seen[sid as usize] = true;
            }
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn test_exhaustive_grouping_no_worse_than_sequential() {
        let code = ConvertibleCode::new(3, 2, 6, 2).expect("valid code");
        let mut sequential = make_batch(6, 6, code);
        sequential.construct_in_sequence();
        let seq_bw: u64 = sequential
            .groups()
            .iter()
            .map(|g| g.min_parity_merge_bandwidth(sequential.code()))
            .sum();

        let mut exhaustive = make_batch(6, 6, code);
        exhaustive.construct_by_bandwidth_exhaustive(GroupingTarget::ParityMerge);
        assert_eq!(exhaustive.groups().len(), 3);
        let exh_bw: u64 = exhaustive
            .groups()
            .iter()
            .map(|g| g.min_parity_merge_bandwidth(exhaustive.code()))
            .sum();
        assert!(exh_bw <= seq_bw);
    }

    #[test]
    fn test_next_combination_enumerates_all() {
        let mut combo = vec![0, 1];
        let mut count = 1;
        while next_combination(&mut combo, 4) {
            count += 1;
        }
        assert_eq!(count, 6); // C(4, 2)
    }
}
