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

use crate::{GroupId, NodeId, StripeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Read,
    Transfer,
    Compute,
    Write,
    Delete,
}

/// Which stripe a task's block belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StripeRef {
    /// A block of a pre-transition member stripe.
    Pre {
        global: StripeId,
        /// Member index within the stripe group.
        member: u8,
    },
    /// A block of the group's post-transition stripe.
    Post,
}

/// One step of the transition plan.
///
/// Carries enough addressing (group, stripe, block, source and destination
/// node) for the execution layer to serialize each task independently onto
/// its wire commands. Non-transfer tasks have `src_node == dst_node`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransTask {
    pub kind: TaskKind,
    pub group: GroupId,
    pub stripe: StripeRef,
    /// Block index within the referenced stripe.
    pub block_id: u8,
    pub src_node: NodeId,
    pub dst_node: NodeId,
}

impl TransTask {
    /// A task that happens on a single node.
    pub fn local(
        kind: TaskKind,
        group: GroupId,
        stripe: StripeRef,
        block_id: u8,
        node: NodeId,
    ) -> Self {
        Self {
            kind,
            group,
            stripe,
            block_id,
            src_node: node,
            dst_node: node,
        }
    }

    pub fn transfer(
        group: GroupId,
        stripe: StripeRef,
        block_id: u8,
        src_node: NodeId,
        dst_node: NodeId,
    ) -> Self {
        Self {
            kind: TaskKind::Transfer,
            group,
            stripe,
            block_id,
            src_node,
            dst_node,
        }
    }
}
