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

//! Placement and metadata files: the on-disk interchange between planning
//! runs and the external execution layer.
//!
//! All files are plain text, one record per line, whitespace-separated
//! integer fields. Parsing is fail-fast: a truncated line or a non-integer
//! token aborts the load with a diagnostic naming the offending line.

mod metadata;
mod placement;

pub use metadata::{apply_metadata, load_metadata, store_metadata, GroupMeta};
pub use placement::{generate_random_placement, read_placement, write_placement};

use thiserror::Error;

use crate::GroupId;

#[derive(Debug, Error)]
pub enum PlacementFileError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("line {line}: expected {expected} fields, found {actual}")]
    TruncatedLine {
        line: usize,
        expected: usize,
        actual: usize,
    },
    #[error("line {line}: `{token}` is not a valid integer field")]
    InvalidToken { line: usize, token: String },
    #[error("line {line}: unknown parity-compute method tag {value}")]
    UnknownMethodTag { line: usize, value: u32 },
    #[error("group {group} has no committed scheme to store")]
    UnassignedGroup { group: GroupId },
}
