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

//! Bipartite relocation graph: blocks that must move on the left, cluster
//! nodes on the right.
//!
//! Each left vertex is one colliding block of one stripe group; its edges
//! reach exactly the nodes still available to that group, so any matching
//! keeps the final stripe collision-free. Right-vertex in-degrees are
//! seeded with receive load already committed by parity generation, so
//! relocation decisions account for load the plan has already imposed.
//!
//! The semi-matching assigns every left vertex to one neighbor while
//! minimizing the maximum right in-degree: greedy least-loaded assignment
//! followed by alternating-path improvement (move a chain of assignments
//! away from a maximally loaded node whenever some reachable node could
//! absorb one more unit at lower cost). The weighted variant compares
//! `in_degree / download_capacity` instead of raw in-degree.

use std::collections::{HashSet, VecDeque};

use log::trace;

use crate::{GroupId, NodeId};

/// One block that must relocate, with the nodes it may move to.
#[derive(Debug, Clone)]
pub struct LeftVertex {
    pub group: GroupId,
    /// Block index within the final post-transition stripe.
    pub final_block_id: usize,
    /// Node currently holding the block.
    pub src_node: NodeId,
    /// Nodes available to this block's group.
    pub candidates: Vec<NodeId>,
}

/// Relocation graph for one planning pass. Rebuilt per pass, never
/// persisted.
#[derive(Debug, Clone)]
pub struct BipartiteGraph {
    num_nodes: u16,
    left: Vec<LeftVertex>,
    /// Seeded per-node receive load, before any relocation assignment.
    seed_in_degree: Vec<u64>,
}

impl BipartiteGraph {
    pub fn new(num_nodes: u16, seed_in_degree: Vec<u64>) -> Self {
        debug_assert_eq!(seed_in_degree.len(), usize::from(num_nodes));
        Self {
            num_nodes,
            left: Vec::new(),
            seed_in_degree,
        }
    }

    pub fn add_block(&mut self, vertex: LeftVertex) {
        self.left.push(vertex);
    }

    pub fn left_vertices(&self) -> &[LeftVertex] {
        &self.left
    }

    /// Optimal semi-matching by raw in-degree. Returns the destination
    /// node per left vertex, in insertion order.
    pub fn semi_matching(&self) -> Vec<NodeId> {
        self.solve(|_, degree| degree as f64)
    }

    /// Semi-matching for heterogeneous clusters: in-degrees are divided by
    /// per-node download capacity before comparison.
    pub fn semi_matching_weighted(&self, download: &[f64]) -> Vec<NodeId> {
        self.solve(|node, degree| degree as f64 / download[node])
    }

    fn solve<F>(&self, load: F) -> Vec<NodeId>
    where
        F: Fn(usize, u64) -> f64,
    {
        let num_nodes = usize::from(self.num_nodes);
        let mut in_degree = self.seed_in_degree.clone();
        let mut assignment: Vec<usize> = Vec::with_capacity(self.left.len());
        // Lefts assigned to each right vertex, for the alternating search.
        let mut assigned: Vec<Vec<usize>> = vec![Vec::new(); num_nodes];
        // Two blocks of the same group must land on different nodes.
        let mut group_used: HashSet<(GroupId, usize)> = HashSet::new();

        // Greedy pass: each block goes to its least-loaded candidate still
        // free for its group.
        for (left_id, vertex) in self.left.iter().enumerate() {
            let mut best: Option<usize> = None;
            let mut best_load = f64::INFINITY;
            let mut best_degree = u64::MAX;
            for &cand in &vertex.candidates {
                let cand = usize::from(cand);
                if group_used.contains(&(vertex.group, cand)) {
                    continue;
                }
                let cand_load = load(cand, in_degree[cand] + 1);
                // Exact weighted-load ties fall back to raw in-degree.
                if cand_load < best_load
                    || (cand_load == best_load && in_degree[cand] < best_degree)
                {
                    best = Some(cand);
                    best_load = cand_load;
                    best_degree = in_degree[cand];
                }
            }
            let best = match best {
                Some(node) => node,
                // Over-constrained group; placement validation reports it.
                None => usize::from(vertex.candidates[0]),
            };
            assignment.push(best);
            assigned[best].push(left_id);
            in_degree[best] += 1;
            group_used.insert((vertex.group, best));
        }

        // Alternating-path improvement: while some maximally loaded node
        // can shed a unit onto a cheaper reachable node, flip the path.
        loop {
            let source = match (0..num_nodes)
                .filter(|&n| !assigned[n].is_empty())
                .max_by(|&a, &b| {
                    load(a, in_degree[a])
                        .partial_cmp(&load(b, in_degree[b]))
                        .unwrap_or(std::cmp::Ordering::Equal)
                }) {
                Some(n) => n,
                None => break,
            };

            let mut improved = false;
            // Try every node at the current maximum load level.
            let max_load = load(source, in_degree[source]);
            for start in 0..num_nodes {
                if assigned[start].is_empty() {
                    continue;
                }
                if load(start, in_degree[start]) < max_load {
                    continue;
                }
                if let Some(path) =
                    self.find_shedding_path(start, &assigned, &in_degree, &group_used, &load)
                {
                    trace!("relocation path of length {} from node {}", path.len(), start);
                    // Entry i is (node, left vertex that moves from that
                    // node to the next one); the final entry absorbs a unit.
                    for i in 0..path.len() - 1 {
                        let (from, left_id) = path[i];
                        let to = path[i + 1].0;
                        if let Some(pos) = assigned[from].iter().position(|&l| l == left_id) {
                            assigned[from].swap_remove(pos);
                        }
                        assigned[to].push(left_id);
                        assignment[left_id] = to;
                        let group = self.left[left_id].group;
                        group_used.remove(&(group, from));
                        group_used.insert((group, to));
                    }
                    in_degree[start] -= 1;
                    if let Some(&(last, _)) = path.last() {
                        in_degree[last] += 1;
                    }
                    improved = true;
                    break;
                }
            }
            if !improved {
                break;
            }
        }

        assignment.into_iter().map(|n| n as NodeId).collect()
    }

    /// BFS over alternating edges from `start`, looking for a node that can
    /// take one more unit at strictly lower cost than `start` currently
    /// carries. Returns the path as (node, left vertex assigned there)
    /// pairs; the final absorbing entry carries a sentinel left vertex.
    fn find_shedding_path<F>(
        &self,
        start: usize,
        assigned: &[Vec<usize>],
        in_degree: &[u64],
        group_used: &HashSet<(GroupId, usize)>,
        load: &F,
    ) -> Option<Vec<(usize, usize)>>
    where
        F: Fn(usize, u64) -> f64,
    {
        let num_nodes = usize::from(self.num_nodes);
        let start_load = load(start, in_degree[start]);
        let mut parent: Vec<Option<(usize, usize)>> = vec![None; num_nodes];
        let mut visited = vec![false; num_nodes];
        visited[start] = true;
        let mut queue = VecDeque::new();
        queue.push_back(start);

        while let Some(node) = queue.pop_front() {
            for &left_id in &assigned[node] {
                for &cand in &self.left[left_id].candidates {
                    let cand = usize::from(cand);
                    if visited[cand] || group_used.contains(&(self.left[left_id].group, cand)) {
                        continue;
                    }
                    visited[cand] = true;
                    parent[cand] = Some((node, left_id));
                    if load(cand, in_degree[cand] + 1) < start_load {
                        // Walk parents back to start. Each recorded tuple is
                        // (node, left vertex assigned to that node), so after
                        // reversal entry i moves its left vertex to the node
                        // in entry i + 1.
                        let mut path = vec![(cand, usize::MAX)];
                        let mut cur = cand;
                        while let Some((prev, left)) = parent[cur] {
                            path.push((prev, left));
                            cur = prev;
                        }
                        path.reverse();
                        return Some(path);
                    }
                    queue.push_back(cand);
                }
            }
        }
        None
    }
}
