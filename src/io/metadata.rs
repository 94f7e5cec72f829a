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

//! Stripe-group metadata: which pre-transition stripes form each group and
//! how its new parities are computed.
//!
//! One line per group: `lambda_i` global stripe ids, the integer method tag
//! (0 re-encode, 1 parity merge), then `m_f` compute node ids. Together with
//! the post placement file this reconstructs a planned batch exactly.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use log::info;

use crate::model::{EncodeScheme, MethodTag, StripeBatch};
use crate::{GroupId, NodeId, StripeId};

use super::PlacementFileError;

/// One group's line of the metadata file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMeta {
    pub pre_stripes: Vec<StripeId>,
    pub method: MethodTag,
    pub compute_nodes: Vec<NodeId>,
}

pub fn store_metadata(path: &Path, batch: &StripeBatch) -> Result<(), PlacementFileError> {
    let mut writer = BufWriter::new(File::create(path)?);
    for group in batch.groups() {
        let (tag, nodes) = match &group.applied.scheme {
            EncodeScheme::ReEncode { nodes } => (MethodTag::ReEncode as u32, nodes),
            EncodeScheme::ParityMerge { nodes } => (MethodTag::ParityMerge as u32, nodes),
            EncodeScheme::Unassigned => {
                return Err(PlacementFileError::UnassignedGroup { group: group.id })
            }
        };
        let mut fields: Vec<String> = group.pre_stripes.iter().map(|s| s.to_string()).collect();
        fields.push(tag.to_string());
        fields.extend(nodes.iter().map(|n| n.to_string()));
        writeln!(writer, "{}", fields.join(" "))?;
    }
    writer.flush()?;
    info!(
        "wrote metadata for {} stripe groups to {}",
        batch.groups().len(),
        path.display()
    );
    Ok(())
}

/// Parses a metadata file written for a `(lambda_i, m_f)` batch shape.
pub fn load_metadata(
    path: &Path,
    lambda_i: usize,
    m_f: usize,
) -> Result<Vec<GroupMeta>, PlacementFileError> {
    let expected = lambda_i + 1 + m_f;
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() != expected {
            return Err(PlacementFileError::TruncatedLine {
                line: idx + 1,
                expected,
                actual: tokens.len(),
            });
        }
        let parse_int = |token: &str| -> Result<u32, PlacementFileError> {
            token.parse().map_err(|_| PlacementFileError::InvalidToken {
                line: idx + 1,
                token: token.to_string(),
            })
        };
        let mut pre_stripes = Vec::with_capacity(lambda_i);
        for token in &tokens[..lambda_i] {
            pre_stripes.push(parse_int(token)? as StripeId);
        }
        let tag_value = parse_int(tokens[lambda_i])?;
        let method = MethodTag::from_int(tag_value).ok_or(
            PlacementFileError::UnknownMethodTag {
                line: idx + 1,
                value: tag_value,
            },
        )?;
        let mut compute_nodes = Vec::with_capacity(m_f);
        for token in &tokens[lambda_i + 1..] {
            compute_nodes.push(parse_int(token)? as NodeId);
        }
        records.push(GroupMeta {
            pre_stripes,
            method,
            compute_nodes,
        });
    }
    info!(
        "loaded metadata for {} stripe groups from {}",
        records.len(),
        path.display()
    );
    Ok(records)
}

/// Rebuilds the batch's groups and committed schemes from reloaded
/// metadata. Load tables are recomputed, so the batch ends up identical to
/// the one that was stored.
pub fn apply_metadata(batch: &mut StripeBatch, records: &[GroupMeta]) {
    let member_sets = records.iter().map(|r| r.pre_stripes.clone()).collect();
    batch.construct_from_member_sets(member_sets);
    let code = *batch.code();
    for (idx, record) in records.iter().enumerate() {
        let scheme = match record.method {
            MethodTag::ReEncode => EncodeScheme::ReEncode {
                nodes: record.compute_nodes.clone(),
            },
            MethodTag::ParityMerge => EncodeScheme::ParityMerge {
                nodes: record.compute_nodes.clone(),
            },
        };
        let group_id = idx as GroupId;
        let applied = batch.group(group_id).partial_load_table(&code, scheme);
        batch.commit_scheme(group_id, applied);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{read_placement, write_placement};
    use crate::model::{ConvertibleCode, GroupingTarget, Stripe};
    use crate::planner::{GreedyPlanner, TransitionPlanner};

    fn planned_batch() -> StripeBatch {
        let code = ConvertibleCode::new(3, 2, 6, 2).expect("valid code");
        let stripes = (0..4u16)
            .map(|sid| Stripe::new((0..5).map(|b| (sid * 2 + b) % 10).collect()))
            .collect();
        let mut batch = StripeBatch::new(code, 10, stripes).expect("valid batch");
        GreedyPlanner::new(23, GroupingTarget::ParityMerge)
            .plan(&mut batch)
            .expect("plan");
        batch
    }

    #[test]
    fn test_metadata_round_trip_rebuilds_batch() {
        let batch = planned_batch();
        let code = *batch.code();

        let dir = tempfile::tempdir().expect("tempdir");
        let meta_path = dir.path().join("sg_meta");
        let post_path = dir.path().join("post_placement");
        store_metadata(&meta_path, &batch).expect("store meta");
        write_placement(&post_path, batch.post_stripes()).expect("store post");

        let mut reloaded = StripeBatch::new(code, 10, batch.pre_stripes().to_vec())
            .expect("valid batch");
        let records = load_metadata(
            &meta_path,
            code.lambda_i as usize,
            usize::from(code.m_f),
        )
        .expect("load meta");
        apply_metadata(&mut reloaded, &records);
        let post_stripes =
            read_placement(&post_path, usize::from(code.n_f)).expect("load post");
        for (group_id, stripe) in post_stripes.into_iter().enumerate() {
            reloaded.assign_post_placement(group_id as GroupId, stripe.placement().to_vec());
        }

        assert_eq!(reloaded.groups().len(), batch.groups().len());
        for (orig, back) in batch.groups().iter().zip(reloaded.groups()) {
            assert_eq!(orig.pre_stripes, back.pre_stripes);
            assert_eq!(orig.applied.scheme, back.applied.scheme);
            assert_eq!(orig.applied.send, back.applied.send);
            assert_eq!(orig.applied.recv, back.applied.recv);
            assert_eq!(orig.applied.bandwidth, back.applied.bandwidth);
            assert_eq!(
                batch.post_stripe_of(orig).placement(),
                reloaded.post_stripe_of(back).placement()
            );
        }
    }

    #[test]
    fn test_unknown_method_tag_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("sg_meta");
        std::fs::write(&path, "0 1 7 3 4\n").expect("seed file");
        assert!(matches!(
            load_metadata(&path, 2, 2),
            Err(PlacementFileError::UnknownMethodTag { line: 1, value: 7 })
        ));
    }

    #[test]
    fn test_unassigned_group_not_storable() {
        let code = ConvertibleCode::new(3, 2, 6, 2).expect("valid code");
        let stripes = (0..2u16)
            .map(|sid| Stripe::new((0..5).map(|b| (sid + b) % 10).collect()))
            .collect();
        let mut batch = StripeBatch::new(code, 10, stripes).expect("valid batch");
        batch.construct_in_sequence();

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("sg_meta");
        assert!(matches!(
            store_metadata(&path, &batch),
            Err(PlacementFileError::UnassignedGroup { group: 0 })
        ));
    }
}
