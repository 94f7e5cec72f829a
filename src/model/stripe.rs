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

/// One codeword's block-to-node placement.
///
/// Position encodes block role: the first `k` entries are data blocks, the
/// remaining `m` are parity blocks in parity-index order. Pre-transition
/// stripes are loaded once and never mutated; post-transition stripes start
/// empty and are committed exactly once by the planner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stripe {
    placement: Vec<NodeId>,
}

impl Stripe {
    pub fn new(placement: Vec<NodeId>) -> Self {
        Self { placement }
    }

    /// An unassigned post-transition stripe.
    pub fn empty() -> Self {
        Self {
            placement: Vec::new(),
        }
    }

    pub fn is_assigned(&self) -> bool {
        !self.placement.is_empty()
    }

    pub fn placement(&self) -> &[NodeId] {
        &self.placement
    }

    pub fn num_blocks(&self) -> usize {
        self.placement.len()
    }

    /// Node holding the block at `block_id`.
    pub fn node_of(&self, block_id: usize) -> NodeId {
        self.placement[block_id]
    }

    /// Commits the final placement of a post-transition stripe.
    pub fn assign(&mut self, placement: Vec<NodeId>) {
        debug_assert!(self.placement.is_empty(), "stripe assigned twice");
        self.placement = placement;
    }
}
