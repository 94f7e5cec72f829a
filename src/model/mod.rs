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

//! Core data model: code parameters, cluster description, stripes, load
//! tables and stripe groups/batches.

mod cluster;
mod code;
mod load;
mod stripe;
mod stripe_batch;
mod stripe_group;

pub use cluster::{BandwidthProfile, ClusterConfig};
pub use code::ConvertibleCode;
pub use load::{EncodeScheme, LoadTable, MethodTag};
pub use stripe::Stripe;
pub use stripe_batch::{GroupingTarget, StripeBatch};
pub use stripe_group::StripeGroup;

use thiserror::Error;

/// Errors detected before planning starts. None of these are retryable: the
/// caller must correct the configuration and re-run.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("code parameters must all be nonzero: ({k_i}, {m_i}) -> ({k_f}, {m_f})")]
    ZeroCodeParameter {
        k_i: u8,
        m_i: u8,
        k_f: u8,
        m_f: u8,
    },
    #[error("stripe widths k + m must fit in 255 blocks: ({k_i}, {m_i}) -> ({k_f}, {m_f})")]
    StripeWidthOverflow {
        k_i: u8,
        m_i: u8,
        k_f: u8,
        m_f: u8,
    },
    #[error("code ({k_i}, {m_i}) -> ({k_f}, {m_f}) is not parity-merging eligible (requires k_f % k_i == 0 and m_f <= m_i)")]
    NotMergeEligible {
        k_i: u8,
        m_i: u8,
        k_f: u8,
        m_f: u8,
    },
    #[error("cluster must have at least one node and one stripe")]
    EmptyCluster,
    #[error("stripe count {num_stripes} is not a multiple of lambda_i = {lambda_i}")]
    StripeCountNotMultiple { num_stripes: u32, lambda_i: u32 },
    #[error("bandwidth profile length {profile_len} does not match node count {num_nodes}")]
    ProfileLengthMismatch { profile_len: usize, num_nodes: u16 },
    #[error("bandwidth profile contains a zero capacity for node {node}")]
    ZeroCapacity { node: u16 },
    #[error("planner '{0}' requires a bandwidth profile")]
    MissingBandwidthProfile(&'static str),
    #[error("unknown planner token '{0}'")]
    UnknownPlanner(String),
}
