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

//! Placement files: one line per stripe, one node id per block.
//!
//! Pre-transition files carry `n_i` columns, post-transition files `n_f`;
//! the caller passes the expected width.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use log::info;
use rand::rngs::StdRng;
use rand::Rng;

use crate::model::{ConvertibleCode, Stripe};
use crate::NodeId;

use super::PlacementFileError;

pub fn write_placement(path: &Path, stripes: &[Stripe]) -> Result<(), PlacementFileError> {
    let mut writer = BufWriter::new(File::create(path)?);
    for stripe in stripes {
        let line = stripe
            .placement()
            .iter()
            .map(|n| n.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(writer, "{}", line)?;
    }
    writer.flush()?;
    info!("wrote {} stripes to {}", stripes.len(), path.display());
    Ok(())
}

/// Reads a placement file with exactly `num_blocks` columns per line.
pub fn read_placement(path: &Path, num_blocks: usize) -> Result<Vec<Stripe>, PlacementFileError> {
    let reader = BufReader::new(File::open(path)?);
    let mut stripes = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() != num_blocks {
            return Err(PlacementFileError::TruncatedLine {
                line: idx + 1,
                expected: num_blocks,
                actual: tokens.len(),
            });
        }
        let mut placement = Vec::with_capacity(num_blocks);
        for token in tokens {
            let node: NodeId =
                token
                    .parse()
                    .map_err(|_| PlacementFileError::InvalidToken {
                        line: idx + 1,
                        token: token.to_string(),
                    })?;
            placement.push(node);
        }
        stripes.push(Stripe::new(placement));
    }
    info!("loaded {} stripes from {}", stripes.len(), path.display());
    Ok(stripes)
}

/// Draws `num_stripes` random pre-transition placements, each over `n_i`
/// distinct nodes.
pub fn generate_random_placement(
    code: &ConvertibleCode,
    num_nodes: u16,
    num_stripes: u32,
    rng: &mut StdRng,
) -> Vec<Stripe> {
    let mut stripes = Vec::with_capacity(num_stripes as usize);
    for _ in 0..num_stripes {
        let mut placement: Vec<NodeId> = Vec::with_capacity(usize::from(code.n_i));
        while placement.len() < usize::from(code.n_i) {
            let node = rng.gen_range(0..num_nodes);
            if !placement.contains(&node) {
                placement.push(node);
            }
        }
        stripes.push(Stripe::new(placement));
    }
    stripes
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_placement_round_trip() {
        let code = ConvertibleCode::new(3, 2, 6, 2).expect("valid code");
        let mut rng = StdRng::seed_from_u64(7);
        let stripes = generate_random_placement(&code, 10, 8, &mut rng);

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("pre_placement");
        write_placement(&path, &stripes).expect("write");
        let reloaded = read_placement(&path, usize::from(code.n_i)).expect("read");

        assert_eq!(reloaded.len(), stripes.len());
        for (orig, back) in stripes.iter().zip(&reloaded) {
            assert_eq!(orig.placement(), back.placement());
        }
    }

    #[test]
    fn test_random_placement_is_distinct() {
        let code = ConvertibleCode::new(3, 2, 6, 2).expect("valid code");
        let mut rng = StdRng::seed_from_u64(11);
        for stripe in generate_random_placement(&code, 6, 20, &mut rng) {
            let mut nodes = stripe.placement().to_vec();
            nodes.sort_unstable();
            nodes.dedup();
            assert_eq!(nodes.len(), usize::from(code.n_i));
        }
    }

    #[test]
    fn test_truncated_line_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("pre_placement");
        std::fs::write(&path, "0 1 2 3 4\n5 6 7\n").expect("seed file");
        assert!(matches!(
            read_placement(&path, 5),
            Err(PlacementFileError::TruncatedLine {
                line: 2,
                expected: 5,
                actual: 3,
            })
        ));
    }

    #[test]
    fn test_non_integer_token_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("pre_placement");
        std::fs::write(&path, "0 1 x 3 4\n").expect("seed file");
        assert!(matches!(
            read_placement(&path, 5),
            Err(PlacementFileError::InvalidToken { line: 1, .. })
        ));
    }
}
