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

//! Human-readable load-distribution tables and the machine-readable plan
//! summary.

use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use serde::{Deserialize, Serialize};

use crate::model::ConvertibleCode;
use crate::planner::PlanReport;

/// Machine-readable summary of one planning run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanSummary {
    pub planner: String,
    pub k_i: u8,
    pub m_i: u8,
    pub k_f: u8,
    pub m_f: u8,
    pub num_nodes: u16,
    pub num_stripes: u32,
    pub re_encode_groups: u32,
    pub parity_merge_groups: u32,
    pub total_bandwidth: u64,
    pub max_send_load: u64,
    pub max_recv_load: u64,
    pub local_search_iterations: u64,
    pub transfer_send_dist: Vec<u64>,
    pub transfer_recv_dist: Vec<u64>,
}

impl PlanSummary {
    pub fn new(
        planner: &str,
        code: &ConvertibleCode,
        num_nodes: u16,
        num_stripes: u32,
        report: &PlanReport,
        transfer_dist: (Vec<u64>, Vec<u64>),
    ) -> Self {
        let (transfer_send_dist, transfer_recv_dist) = transfer_dist;
        Self {
            planner: planner.to_string(),
            k_i: code.k_i,
            m_i: code.m_i,
            k_f: code.k_f,
            m_f: code.m_f,
            num_nodes,
            num_stripes,
            re_encode_groups: report.re_encode_groups,
            parity_merge_groups: report.parity_merge_groups,
            total_bandwidth: report.aggregate.bandwidth,
            max_send_load: report.aggregate.send.iter().max().copied().unwrap_or(0),
            max_recv_load: report.aggregate.recv.iter().max().copied().unwrap_or(0),
            local_search_iterations: report.local_search_iterations,
            transfer_send_dist,
            transfer_recv_dist,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Renders a per-node send/receive table with utilization bars scaled to
/// the maximum per-node load.
pub fn make_load_distribution_table(send: &[u64], recv: &[u64]) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Node"),
            Cell::new("Send"),
            Cell::new("Recv"),
            Cell::new("Send load"),
            Cell::new("Recv load"),
        ]);

    let max_load = send.iter().chain(recv.iter()).max().copied().unwrap_or(0);
    for (node, (&s, &r)) in send.iter().zip(recv).enumerate() {
        table.add_row(vec![
            Cell::new(node),
            Cell::new(s),
            Cell::new(r),
            Cell::new(create_bar_chart(s as f32, max_load as f32, 20)),
            Cell::new(create_bar_chart(r as f32, max_load as f32, 20)),
        ]);
    }
    table.add_row(vec![
        Cell::new("total"),
        Cell::new(send.iter().sum::<u64>()),
        Cell::new(recv.iter().sum::<u64>()),
        Cell::new(""),
        Cell::new(""),
    ]);

    table.to_string()
}

/// ASCII bar of `used` against `total`, `width` characters wide.
fn create_bar_chart(used: f32, total: f32, width: usize) -> String {
    if total <= 0.0 {
        return format!("[{}] {used:.0}/{total:.0}", "-".repeat(width));
    }
    let filled = ((used / total).clamp(0.0, 1.0) * width as f32) as usize;
    format!(
        "[{}{}] {used:.0}/{total:.0}",
        "#".repeat(filled),
        "-".repeat(width - filled)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bar_chart_bounds() {
        assert_eq!(create_bar_chart(4.0, 4.0, 10), "[##########] 4/4");
        assert_eq!(create_bar_chart(0.0, 4.0, 10), "[----------] 0/4");
        assert_eq!(create_bar_chart(1.0, 0.0, 4), "[----] 1/0");
    }

    #[test]
    fn test_table_lists_every_node() {
        let rendered = make_load_distribution_table(&[3, 1, 0], &[0, 2, 2]);
        for needle in ["Node", "Send", "Recv", "total"] {
            assert!(rendered.contains(needle));
        }
        // Three node rows plus header and total.
        assert!(rendered.lines().filter(|l| l.contains('#')).count() >= 2);
    }

    #[test]
    fn test_summary_serializes() {
        let code = ConvertibleCode::new(3, 2, 6, 2).expect("valid code");
        let report = PlanReport {
            re_encode_groups: 0,
            parity_merge_groups: 2,
            aggregate: crate::model::LoadTable::new(4),
            local_search_iterations: 3,
        };
        let summary = PlanSummary::new(
            "balanced",
            &code,
            4,
            4,
            &report,
            (vec![1, 0, 0, 0], vec![0, 1, 0, 0]),
        );
        let json = summary.to_json().expect("serialize");
        assert!(json.contains("\"planner\": \"balanced\""));
        assert!(json.contains("\"parity_merge_groups\": 2"));
    }
}
