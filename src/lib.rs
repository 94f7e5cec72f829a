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

//! Planning engine for live redundancy transitioning of erasure-coded
//! storage clusters.
//!
//! The crate converts the placement of stripes coded under `(k_i, m_i)` into
//! a placement coded under `(k_f, m_f)` without bulk re-ingestion. Planning
//! proceeds in three phases:
//!
//! 1. **Stripe grouping** — partition the pre-transition stripes into
//!    non-overlapping groups of `lambda_i` stripes that jointly form one
//!    post-transition stripe ([`model::StripeBatch`]).
//! 2. **Parity generation scheduling** — decide, per group and per parity
//!    index, whether the new parity blocks are produced by re-encoding or
//!    by parity merging, and on which node ([`planner`]).
//! 3. **Block relocation** — move colliding blocks onto free nodes via an
//!    optimal semi-matching over a bipartite relocation graph ([`graph`]),
//!    then expand the finalized decisions into an ordered task list
//!    ([`solution::TransitionSolution`]).
//!
//! The engine is single-threaded and CPU-bound; it performs no network I/O.
//! All randomness is drawn from a generator owned by the planning run, so
//! identical inputs and seeds produce identical plans.

pub mod graph;
pub mod io;
pub mod model;
pub mod planner;
pub mod report;
pub mod solution;

/// Cluster node identifier. Nodes are dense integers `0..num_nodes`.
pub type NodeId = u16;

/// Global pre-transition stripe identifier (index into the batch arena).
pub type StripeId = u32;

/// Stripe group identifier (index into the batch's group list).
pub type GroupId = u32;
