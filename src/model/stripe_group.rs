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

//! Stripe groups and their bandwidth/distribution queries.
//!
//! A stripe group is a fixed set of `lambda_i` pre-transition stripes that
//! jointly produce one post-transition stripe. The group caches two
//! per-node distributions computed once at construction:
//!
//! * data distribution — how many data blocks of the group each node holds;
//! * parity distributions — per final parity index, how many same-offset
//!   original parity blocks each node holds.
//!
//! From these the group answers the planning questions: what does data
//! relocation cost, what is the cheapest way to produce the new parities by
//! re-encoding, and what is the cheapest way by parity merging.

use log::trace;

use crate::{GroupId, NodeId, StripeId};

use super::load::{EncodeScheme, LoadTable, MethodTag};
use super::{ConvertibleCode, Stripe};

// ---------------------------------------------------------------------------
// Distribution and scoring helpers
// ---------------------------------------------------------------------------

/// Computes the data and per-parity-offset distributions of a (possibly
/// partial) set of member stripes.
pub(crate) fn block_distributions(
    code: &ConvertibleCode,
    num_nodes: u16,
    stripes: &[&Stripe],
) -> (Vec<u32>, Vec<Vec<u32>>) {
    let mut data_dist = vec![0u32; usize::from(num_nodes)];
    let mut parity_dists = vec![vec![0u32; usize::from(num_nodes)]; usize::from(code.m_f)];
    for stripe in stripes {
        for block_id in 0..usize::from(code.k_i) {
            data_dist[usize::from(stripe.node_of(block_id))] += 1;
        }
        // Only the first m_f parity offsets contribute to merging; extra
        // original parities (m_i > m_f) are simply deleted.
        for parity_id in 0..usize::from(code.m_f.min(stripe.num_blocks() as u8 - code.k_i)) {
            let node = stripe.node_of(usize::from(code.k_i) + parity_id);
            parity_dists[parity_id][usize::from(node)] += 1;
        }
    }
    (data_dist, parity_dists)
}

/// Minimum bandwidth to produce the new parities by re-encoding, given the
/// member data distribution. For each of the `lambda_f` final sub-stripes
/// the node holding the most resident data blocks collects the rest
/// (`k_f - resident` transfers) and sends out the `m_f` computed parities.
pub(crate) fn min_re_encode_bw_from(code: &ConvertibleCode, data_dist: &[u32]) -> u64 {
    let mut counts: Vec<u32> = data_dist.to_vec();
    counts.sort_unstable_by(|a, b| b.cmp(a));
    let mut bandwidth = 0u64;
    for sub_stripe in 0..code.lambda_f as usize {
        let resident = counts.get(sub_stripe).copied().unwrap_or(0).min(u32::from(code.k_f));
        bandwidth += u64::from(u32::from(code.k_f) - resident) + u64::from(code.m_f);
    }
    bandwidth
}

/// Minimum bandwidth to produce the new parities by merging, with the
/// per-parity greedy minimizer, plus the chosen compute nodes.
///
/// The cost of computing parity `p` at node `v` is the number of missing
/// same-offset parities (`alpha - resident`) plus one relocation unit when
/// `v` already holds another block of the group (the computed parity must
/// then move away). Occupancy is updated after each choice so later parity
/// indices see earlier decisions.
pub(crate) fn min_parity_merge_scheme_from(
    code: &ConvertibleCode,
    data_dist: &[u32],
    parity_dists: &[Vec<u32>],
) -> (u64, Vec<NodeId>) {
    let num_nodes = data_dist.len();
    let mut occupancy: Vec<u32> = data_dist.to_vec();
    let mut bandwidth = 0u64;
    let mut nodes = Vec::with_capacity(usize::from(code.m_f));
    for parity_dist in parity_dists.iter().take(usize::from(code.m_f)) {
        let mut best_node = 0usize;
        let mut best_cost = u64::MAX;
        for node in 0..num_nodes {
            let missing = u64::from(u32::from(code.alpha).saturating_sub(parity_dist[node]));
            let collision = u64::from(occupancy[node] > 0);
            let cost = missing + collision;
            if cost < best_cost {
                best_cost = cost;
                best_node = node;
            }
        }
        occupancy[best_node] += 1;
        bandwidth += best_cost;
        nodes.push(best_node as NodeId);
    }
    (bandwidth, nodes)
}

// ---------------------------------------------------------------------------
// StripeGroup
// ---------------------------------------------------------------------------

/// A group of `lambda_i` pre-transition stripes slated to merge into one
/// post-transition stripe, with its cached distributions and the committed
/// planning decision.
#[derive(Debug, Clone)]
pub struct StripeGroup {
    pub id: GroupId,
    /// Global ids of the member pre-transition stripes, in member order.
    pub pre_stripes: Vec<StripeId>,
    /// Global id of the produced post-transition stripe.
    pub post_stripe: StripeId,
    data_dist: Vec<u32>,
    parity_dists: Vec<Vec<u32>>,
    /// The committed decision for this group. `EncodeScheme::Unassigned`
    /// until a planner commits one.
    pub applied: LoadTable,
}

impl StripeGroup {
    pub fn new(
        id: GroupId,
        code: &ConvertibleCode,
        num_nodes: u16,
        pre_stripes: Vec<StripeId>,
        post_stripe: StripeId,
        stripes: &[Stripe],
    ) -> Self {
        let members: Vec<&Stripe> = pre_stripes
            .iter()
            .map(|&sid| &stripes[sid as usize])
            .collect();
        let (data_dist, parity_dists) = block_distributions(code, num_nodes, &members);
        Self {
            id,
            pre_stripes,
            post_stripe,
            data_dist,
            parity_dists,
            applied: LoadTable::new(num_nodes),
        }
    }

    /// Per-node count of the group's data blocks.
    pub fn data_dist(&self) -> &[u32] {
        &self.data_dist
    }

    /// Per-node count of same-offset original parity blocks, per final
    /// parity index.
    pub fn parity_dists(&self) -> &[Vec<u32>] {
        &self.parity_dists
    }

    /// Blocks that must leave their node because it holds more data blocks
    /// than the post-transition stripe allows.
    pub fn data_relocation_cost(&self, code: &ConvertibleCode) -> u64 {
        self.data_dist
            .iter()
            .map(|&count| u64::from(count.saturating_sub(code.lambda_f)))
            .sum()
    }

    pub fn min_re_encode_bandwidth(&self, code: &ConvertibleCode) -> u64 {
        min_re_encode_bw_from(code, &self.data_dist)
    }

    /// The re-encode compute nodes: the node with the most resident data
    /// blocks computes all `m_f` parities (merge-eligible codes produce a
    /// single post stripe, so there is one collection site).
    pub fn re_encode_nodes(&self, code: &ConvertibleCode) -> Vec<NodeId> {
        let node = self
            .data_dist
            .iter()
            .enumerate()
            .max_by_key(|&(_, count)| count)
            .map(|(node, _)| node as NodeId)
            .unwrap_or(0);
        vec![node; usize::from(code.m_f)]
    }

    pub fn min_parity_merge_bandwidth(&self, code: &ConvertibleCode) -> u64 {
        self.parity_merge_scheme(code).0
    }

    /// Greedy per-parity merge-node selection. See
    /// [`min_parity_merge_scheme_from`] for the cost rule.
    pub fn parity_merge_scheme(&self, code: &ConvertibleCode) -> (u64, Vec<NodeId>) {
        min_parity_merge_scheme_from(code, &self.data_dist, &self.parity_dists)
    }

    /// Exhaustive merge-node selection over all `num_nodes ^ m_f`
    /// assignments. Exponential in `m_f`; only meant for small clusters.
    pub fn min_parity_merge_exhaustive(&self, code: &ConvertibleCode) -> (u64, Vec<NodeId>) {
        let num_nodes = self.data_dist.len();
        let mut choice = vec![0usize; usize::from(code.m_f)];
        let mut best_bw = u64::MAX;
        let mut best_nodes: Vec<NodeId> = choice.iter().map(|&n| n as NodeId).collect();
        loop {
            let mut occupancy = self.data_dist.clone();
            let mut bandwidth = 0u64;
            for (parity_id, &node) in choice.iter().enumerate() {
                let missing =
                    u64::from(u32::from(code.alpha).saturating_sub(self.parity_dists[parity_id][node]));
                bandwidth += missing + u64::from(occupancy[node] > 0);
                occupancy[node] += 1;
            }
            if bandwidth < best_bw {
                best_bw = bandwidth;
                best_nodes = choice.iter().map(|&n| n as NodeId).collect();
            }
            // Odometer increment over the m_f-digit base-num_nodes counter.
            let mut digit = 0usize;
            loop {
                if digit == choice.len() {
                    return (best_bw, best_nodes);
                }
                choice[digit] += 1;
                if choice[digit] < num_nodes {
                    break;
                }
                choice[digit] = 0;
                digit += 1;
            }
        }
    }

    /// Whether parity index `parity_id` can be merged at zero cost.
    pub fn is_perfect_merge(&self, code: &ConvertibleCode, parity_id: usize) -> bool {
        self.perfect_merge_node(code, parity_id).is_some()
    }

    /// The node at which parity `parity_id` merges for free: it holds all
    /// `alpha` required same-offset parities and no data block of the group.
    pub fn perfect_merge_node(&self, code: &ConvertibleCode, parity_id: usize) -> Option<NodeId> {
        self.parity_dists[parity_id]
            .iter()
            .enumerate()
            .find(|&(node, &count)| count == u32::from(code.alpha) && self.data_dist[node] == 0)
            .map(|(node, _)| node as NodeId)
    }

    /// The cheaper of re-encoding and parity merging (merging considered
    /// only for merge-eligible codes), with the winning method. Ties go to
    /// parity merging, which moves no data blocks.
    pub fn min_transition_bandwidth(&self, code: &ConvertibleCode) -> (u64, MethodTag) {
        let re_bw = self.min_re_encode_bandwidth(code);
        if !code.is_merge_eligible() {
            return (re_bw, MethodTag::ReEncode);
        }
        let pm_bw = self.min_parity_merge_bandwidth(code);
        if pm_bw <= re_bw {
            (pm_bw, MethodTag::ParityMerge)
        } else {
            (re_bw, MethodTag::ReEncode)
        }
    }

    /// Builds the load table implied by a full parity-compute scheme:
    /// retrieval sends at the source nodes, receives at the compute nodes,
    /// and one outbound unit per computed parity that cannot stay where it
    /// was computed. Relocation receive load is assigned later, by the
    /// relocation phase.
    pub fn partial_load_table(&self, code: &ConvertibleCode, scheme: EncodeScheme) -> LoadTable {
        let num_nodes = self.data_dist.len();
        let mut lt = LoadTable::new(num_nodes as u16);
        match &scheme {
            EncodeScheme::Unassigned => {}
            EncodeScheme::ReEncode { nodes } => {
                let compute = usize::from(nodes[0]);
                let resident = self.data_dist[compute].min(u32::from(code.k_f));
                for node in 0..num_nodes {
                    if node != compute {
                        lt.send[node] += u64::from(self.data_dist[node]);
                    }
                }
                lt.recv[compute] += u64::from(u32::from(code.k_f) - resident);
                // All m_f computed parities leave the collection site.
                lt.send[compute] += u64::from(code.m_f);
                lt.bandwidth += u64::from(u32::from(code.k_f) - resident) + u64::from(code.m_f);
            }
            EncodeScheme::ParityMerge { nodes } => {
                let mut occupancy = self.data_dist.clone();
                for (parity_id, &compute_node) in nodes.iter().enumerate() {
                    let compute = usize::from(compute_node);
                    let parity_dist = &self.parity_dists[parity_id];
                    let missing = u64::from(u32::from(code.alpha).saturating_sub(parity_dist[compute]));
                    for node in 0..num_nodes {
                        if node != compute {
                            lt.send[node] += u64::from(parity_dist[node]);
                        }
                    }
                    lt.recv[compute] += missing;
                    lt.bandwidth += missing;
                    if occupancy[compute] > 0 {
                        lt.send[compute] += 1;
                        lt.bandwidth += 1;
                    }
                    occupancy[compute] += 1;
                }
            }
        }
        trace!(
            "group {}: partial load table bw = {} for {:?}",
            self.id,
            lt.bandwidth,
            scheme
        );
        lt.scheme = scheme;
        lt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_code() -> ConvertibleCode {
        ConvertibleCode::new(3, 2, 6, 2).expect("valid code")
    }

    // Two (3,2) stripes over 4 nodes, as in the reference scenario: data on
    // nodes 0..3, parities stacked so offset 0 piles onto node 3.
    fn make_stripes() -> Vec<Stripe> {
        vec![
            Stripe::new(vec![0, 1, 2, 3, 0]),
            Stripe::new(vec![1, 2, 0, 3, 1]),
        ]
    }

    fn make_group() -> (ConvertibleCode, Vec<Stripe>, StripeGroup) {
        let code = make_code();
        let stripes = make_stripes();
        let group = StripeGroup::new(0, &code, 4, vec![0, 1], 2, &stripes);
        (code, stripes, group)
    }

    #[test]
    fn test_distributions() {
        let (_, _, group) = make_group();
        assert_eq!(group.data_dist(), &[2, 2, 2, 0]);
        assert_eq!(group.parity_dists()[0], vec![0, 0, 0, 2]);
        assert_eq!(group.parity_dists()[1], vec![1, 1, 0, 0]);
    }

    #[test]
    fn test_data_relocation_cost() {
        let (code, _, group) = make_group();
        // lambda_f = 1: every node keeps one data block, three move.
        assert_eq!(group.data_relocation_cost(&code), 3);
    }

    #[test]
    fn test_min_re_encode_bandwidth() {
        let (code, _, group) = make_group();
        // Best collection site holds 2 of 6 data blocks: 4 transfers + 2
        // parity relocations.
        assert_eq!(group.min_re_encode_bandwidth(&code), 6);
    }

    #[test]
    fn test_parity_merge_scheme() {
        let (code, _, group) = make_group();
        let (bw, nodes) = group.parity_merge_scheme(&code);
        // Parity 0 merges perfectly at node 3 (both offset-0 parities, no
        // data). Parity 1 then costs 1 missing parity + 1 collision at
        // nodes 0/1, or 2 missing at nodes 2/3 (+1 collision at 3).
        assert_eq!(nodes[0], 3);
        assert_eq!(bw, 2);
    }

    #[test]
    fn test_exhaustive_matches_greedy_here() {
        let (code, _, group) = make_group();
        let (greedy_bw, _) = group.parity_merge_scheme(&code);
        let (exhaustive_bw, _) = group.min_parity_merge_exhaustive(&code);
        assert_eq!(exhaustive_bw, greedy_bw);
    }

    #[test]
    fn test_perfect_merge_detection() {
        let (code, _, group) = make_group();
        assert_eq!(group.perfect_merge_node(&code, 0), Some(3));
        assert_eq!(group.perfect_merge_node(&code, 1), None);
    }

    #[test]
    fn test_min_transition_picks_lower() {
        let (code, _, group) = make_group();
        let (bw, method) = group.min_transition_bandwidth(&code);
        assert_eq!(bw, 2);
        assert_eq!(method, MethodTag::ParityMerge);
    }

    #[test]
    fn test_partial_load_table_merge() {
        let (code, _, group) = make_group();
        let (_, nodes) = group.parity_merge_scheme(&code);
        let lt = group.partial_load_table(&code, EncodeScheme::ParityMerge { nodes });
        assert_eq!(lt.bandwidth, 2);
        assert_eq!(lt.send.iter().sum::<u64>(), lt.bandwidth);
    }

    #[test]
    fn test_partial_load_table_re_encode() {
        let (code, _, group) = make_group();
        let nodes = group.re_encode_nodes(&code);
        let lt = group.partial_load_table(&code, EncodeScheme::ReEncode { nodes });
        assert_eq!(lt.bandwidth, 6);
        assert_eq!(lt.send.iter().sum::<u64>(), lt.bandwidth);
    }
}
