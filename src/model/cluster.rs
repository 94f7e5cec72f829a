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

use serde::{Deserialize, Serialize};

use super::{ConfigError, ConvertibleCode};

/// Per-node network capacities for heterogeneous clusters.
///
/// Weighted planner variants divide each node's load by its capacity before
/// comparing, so capacities only matter relative to one another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandwidthProfile {
    pub upload: Vec<f64>,
    pub download: Vec<f64>,
}

impl BandwidthProfile {
    /// A profile where every node has the same capacity.
    pub fn homogeneous(num_nodes: u16) -> Self {
        Self {
            upload: vec![1.0; usize::from(num_nodes)],
            download: vec![1.0; usize::from(num_nodes)],
        }
    }
}

/// Static description of the cluster a transition is planned for: node
/// count, stripe count and an optional asymmetric bandwidth profile.
///
/// The planner assumes a fixed, known node set; membership changes and
/// failure detection are outside its scope.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub num_nodes: u16,
    pub num_stripes: u32,
    pub bw_profile: Option<BandwidthProfile>,
}

impl ClusterConfig {
    pub fn new(num_nodes: u16, num_stripes: u32) -> Self {
        Self {
            num_nodes,
            num_stripes,
            bw_profile: None,
        }
    }

    pub fn with_bandwidth_profile(mut self, profile: BandwidthProfile) -> Self {
        self.bw_profile = Some(profile);
        self
    }

    /// Checks the cluster parameters against the code. Must be called (and
    /// must succeed) before any planning starts.
    pub fn validate(&self, code: &ConvertibleCode) -> Result<(), ConfigError> {
        if self.num_nodes == 0 || self.num_stripes == 0 {
            return Err(ConfigError::EmptyCluster);
        }
        if self.num_stripes % code.lambda_i != 0 {
            return Err(ConfigError::StripeCountNotMultiple {
                num_stripes: self.num_stripes,
                lambda_i: code.lambda_i,
            });
        }
        if let Some(profile) = &self.bw_profile {
            for vec in [&profile.upload, &profile.download] {
                if vec.len() != usize::from(self.num_nodes) {
                    return Err(ConfigError::ProfileLengthMismatch {
                        profile_len: vec.len(),
                        num_nodes: self.num_nodes,
                    });
                }
                if let Some(node) = vec.iter().position(|&c| c <= 0.0) {
                    return Err(ConfigError::ZeroCapacity { node: node as u16 });
                }
            }
        }
        Ok(())
    }
}
