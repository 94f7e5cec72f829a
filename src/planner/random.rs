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

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::model::{EncodeScheme, GroupingTarget, StripeBatch};
use crate::NodeId;

use super::{relocate_by_shuffle, PlanError, PlanReport, TransitionPlanner};

/// Baseline planner: sequential grouping, uniformly random compute nodes,
/// random relocation. Exists to put the optimizing planners' numbers in
/// perspective.
pub struct RandomPlanner {
    rng: StdRng,
    target: GroupingTarget,
}

impl RandomPlanner {
    pub fn new(seed: u64, target: GroupingTarget) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            target,
        }
    }
}

impl TransitionPlanner for RandomPlanner {
    fn plan(&mut self, batch: &mut StripeBatch) -> Result<PlanReport, PlanError> {
        let code = *batch.code();
        code.require_merge_eligible()?;
        let num_nodes = batch.num_nodes();

        batch.construct_in_sequence();
        debug!(
            "random planner: {} groups, target {:?}",
            batch.num_groups(),
            self.target
        );

        for group_id in 0..batch.num_groups() {
            let scheme = match self.target {
                GroupingTarget::ReEncode => {
                    let node: NodeId = self.rng.gen_range(0..num_nodes);
                    EncodeScheme::ReEncode {
                        nodes: vec![node; usize::from(code.m_f)],
                    }
                }
                GroupingTarget::ParityMerge => EncodeScheme::ParityMerge {
                    nodes: (0..code.m_f)
                        .map(|_| self.rng.gen_range(0..num_nodes))
                        .collect(),
                },
            };
            let applied = batch.group(group_id).partial_load_table(&code, scheme);
            batch.commit_scheme(group_id, applied);
            relocate_by_shuffle(batch, group_id, &mut self.rng)?;
        }

        Ok(PlanReport::from_batch(batch, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConvertibleCode, Stripe};
    use crate::solution::TransitionSolution;

    fn make_batch() -> StripeBatch {
        let code = ConvertibleCode::new(3, 2, 6, 2).expect("valid code");
        let stripes = (0..4u16)
            .map(|sid| Stripe::new((0..5).map(|b| (sid + b) % 10).collect()))
            .collect();
        StripeBatch::new(code, 10, stripes).expect("valid batch")
    }

    #[test]
    fn test_random_pm_produces_valid_placement() {
        let mut batch = make_batch();
        let mut planner = RandomPlanner::new(11, GroupingTarget::ParityMerge);
        let report = planner.plan(&mut batch).expect("plan");
        assert_eq!(report.parity_merge_groups, 2);
        TransitionSolution::validate_final_placement(&batch).expect("distinct placement");
    }

    #[test]
    fn test_random_re_produces_valid_placement() {
        let mut batch = make_batch();
        let mut planner = RandomPlanner::new(11, GroupingTarget::ReEncode);
        let report = planner.plan(&mut batch).expect("plan");
        assert_eq!(report.re_encode_groups, 2);
        TransitionSolution::validate_final_placement(&batch).expect("distinct placement");
    }

    #[test]
    fn test_same_seed_same_plan() {
        let mut a = make_batch();
        let mut b = make_batch();
        RandomPlanner::new(3, GroupingTarget::ParityMerge)
            .plan(&mut a)
            .expect("plan");
        RandomPlanner::new(3, GroupingTarget::ParityMerge)
            .plan(&mut b)
            .expect("plan");
        assert_eq!(a.post_stripes(), b.post_stripes());
    }
}
