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

use crate::NodeId;

/// How the new parity blocks of a stripe group are produced, and where.
///
/// Starts `Unassigned`; a planner commits exactly one of the two concrete
/// variants per group. The node vector always has `m_f` entries, one per
/// final parity index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeScheme {
    Unassigned,
    /// Collect all `k_f` data blocks at each listed node and recompute the
    /// parity from scratch.
    ReEncode { nodes: Vec<NodeId> },
    /// Combine `alpha` same-offset original parities algebraically at each
    /// listed node.
    ParityMerge { nodes: Vec<NodeId> },
}

impl EncodeScheme {
    pub fn is_assigned(&self) -> bool {
        !matches!(self, EncodeScheme::Unassigned)
    }

    /// The chosen compute nodes, if a decision has been committed.
    pub fn nodes(&self) -> Option<&[NodeId]> {
        match self {
            EncodeScheme::Unassigned => None,
            EncodeScheme::ReEncode { nodes } | EncodeScheme::ParityMerge { nodes } => Some(nodes),
        }
    }
}

/// Integer method tag used in the stripe-group metadata file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodTag {
    ReEncode = 0,
    ParityMerge = 1,
}

impl MethodTag {
    pub fn from_int(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(MethodTag::ReEncode),
            1 => Some(MethodTag::ParityMerge),
            _ => None,
        }
    }
}

/// Per-node load accounting for one stripe group's transition, plus the
/// encode decision it represents.
///
/// Value type: candidate evaluation during search always works on a clone
/// and only the selected candidate is committed back. For a fully built
/// table `bandwidth == send.iter().sum()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTable {
    pub send: Vec<u64>,
    pub recv: Vec<u64>,
    pub bandwidth: u64,
    pub scheme: EncodeScheme,
}

impl LoadTable {
    pub fn new(num_nodes: u16) -> Self {
        Self {
            send: vec![0; usize::from(num_nodes)],
            recv: vec![0; usize::from(num_nodes)],
            bandwidth: 0,
            scheme: EncodeScheme::Unassigned,
        }
    }

    /// Maximum of all send and receive entries.
    pub fn max_load(&self) -> u64 {
        let max_send = self.send.iter().copied().max().unwrap_or(0);
        let max_recv = self.recv.iter().copied().max().unwrap_or(0);
        max_send.max(max_recv)
    }

    /// Maximum capacity-normalized load, for heterogeneous clusters.
    pub fn max_weighted_load(&self, upload: &[f64], download: &[f64]) -> f64 {
        let mut max = 0.0f64;
        for (i, &s) in self.send.iter().enumerate() {
            max = max.max(s as f64 / upload[i]);
        }
        for (i, &r) in self.recv.iter().enumerate() {
            max = max.max(r as f64 / download[i]);
        }
        max
    }

    /// Adds another table's loads into this one (bandwidth included).
    pub fn accumulate(&mut self, other: &LoadTable) {
        for (a, b) in self.send.iter_mut().zip(&other.send) {
            *a += b;
        }
        for (a, b) in self.recv.iter_mut().zip(&other.recv) {
            *a += b;
        }
        self.bandwidth += other.bandwidth;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_load_covers_both_directions() {
        let mut lt = LoadTable::new(3);
        lt.send = vec![1, 4, 0];
        lt.recv = vec![0, 2, 6];
        assert_eq!(lt.max_load(), 6);
    }

    #[test]
    fn test_weighted_load_divides_by_capacity() {
        let mut lt = LoadTable::new(2);
        lt.send = vec![4, 0];
        lt.recv = vec![0, 3];
        // Node 0 sends 4 at capacity 2.0 -> 2.0; node 1 receives 3 at 1.0.
        let max = lt.max_weighted_load(&[2.0, 1.0], &[1.0, 1.0]);
        assert!((max - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_accumulate() {
        let mut total = LoadTable::new(2);
        let mut part = LoadTable::new(2);
        part.send = vec![1, 2];
        part.recv = vec![3, 0];
        part.bandwidth = 3;
        total.accumulate(&part);
        total.accumulate(&part);
        assert_eq!(total.send, vec![2, 4]);
        assert_eq!(total.recv, vec![6, 0]);
        assert_eq!(total.bandwidth, 6);
    }

    #[test]
    fn test_method_tag_round_trip() {
        assert_eq!(MethodTag::from_int(0), Some(MethodTag::ReEncode));
        assert_eq!(MethodTag::from_int(1), Some(MethodTag::ParityMerge));
        assert_eq!(MethodTag::from_int(7), None);
    }
}
