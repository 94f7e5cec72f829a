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

//! Command-line front end: generate random pre-transition placements and
//! plan transitions over them.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use log::{error, info};
use rand::rngs::StdRng;
use rand::SeedableRng;

use ectrans::io::{
    generate_random_placement, read_placement, store_metadata, write_placement,
};
use ectrans::model::{BandwidthProfile, ClusterConfig, ConvertibleCode, StripeBatch};
use ectrans::planner::{build_planner, PlannerKind};
use ectrans::report::{make_load_distribution_table, PlanSummary};
use ectrans::solution::TransitionSolution;

#[derive(Parser)]
#[command(name = "ectrans", version, about = "Erasure-coded transition planner")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a random pre-transition placement file.
    GenPlacement(GenPlacementArgs),
    /// Plan a transition over an existing pre-transition placement.
    Plan(PlanArgs),
}

#[derive(Args)]
struct CodeArgs {
    /// Initial number of data blocks per stripe.
    #[arg(long)]
    k_i: u8,
    /// Initial number of parity blocks per stripe.
    #[arg(long)]
    m_i: u8,
    /// Final number of data blocks per stripe.
    #[arg(long)]
    k_f: u8,
    /// Final number of parity blocks per stripe.
    #[arg(long)]
    m_f: u8,
    /// Number of storage nodes in the cluster.
    #[arg(long)]
    nodes: u16,
    /// Number of pre-transition stripes.
    #[arg(long)]
    stripes: u32,
}

#[derive(Args)]
struct GenPlacementArgs {
    #[command(flatten)]
    code: CodeArgs,
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Placement file to write.
    #[arg(long)]
    output: PathBuf,
}

#[derive(Args)]
struct PlanArgs {
    #[command(flatten)]
    code: CodeArgs,
    /// Planner token: random-re, random-pm, greedy-re, greedy-pm,
    /// stripe-merge, balanced, balanced-weighted.
    #[arg(long)]
    planner: String,
    /// Pre-transition placement file to read.
    #[arg(long)]
    pre: PathBuf,
    /// Post-transition placement file to write.
    #[arg(long)]
    post: PathBuf,
    /// Stripe-group metadata file to write.
    #[arg(long)]
    meta: PathBuf,
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Cap on balanced local-search passes.
    #[arg(long)]
    max_iterations: Option<u64>,
    /// Per-node upload capacities, comma separated.
    #[arg(long, value_delimiter = ',')]
    upload_profile: Option<Vec<f64>>,
    /// Per-node download capacities, comma separated.
    #[arg(long, value_delimiter = ',')]
    download_profile: Option<Vec<f64>>,
    /// Write a JSON planning summary to this file.
    #[arg(long)]
    summary: Option<PathBuf>,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let result = match cli.command {
        Command::GenPlacement(args) => gen_placement(args),
        Command::Plan(args) => plan(args),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            error!("{}", msg);
            ExitCode::FAILURE
        }
    }
}

fn gen_placement(args: GenPlacementArgs) -> Result<(), String> {
    let code = ConvertibleCode::new(args.code.k_i, args.code.m_i, args.code.k_f, args.code.m_f)
        .map_err(|e| e.to_string())?;
    let cluster = ClusterConfig::new(args.code.nodes, args.code.stripes);
    cluster.validate(&code).map_err(|e| e.to_string())?;

    let mut rng = StdRng::seed_from_u64(args.seed);
    let stripes = generate_random_placement(&code, args.code.nodes, args.code.stripes, &mut rng);
    write_placement(&args.output, &stripes).map_err(|e| e.to_string())?;
    Ok(())
}

fn plan(args: PlanArgs) -> Result<(), String> {
    let code = ConvertibleCode::new(args.code.k_i, args.code.m_i, args.code.k_f, args.code.m_f)
        .map_err(|e| e.to_string())?;
    let mut cluster = ClusterConfig::new(args.code.nodes, args.code.stripes);
    if let (Some(upload), Some(download)) = (args.upload_profile, args.download_profile) {
        cluster = cluster.with_bandwidth_profile(BandwidthProfile { upload, download });
    }
    cluster.validate(&code).map_err(|e| e.to_string())?;

    let kind = PlannerKind::from_token(&args.planner).map_err(|e| e.to_string())?;
    let pre_stripes =
        read_placement(&args.pre, usize::from(code.n_i)).map_err(|e| e.to_string())?;
    if pre_stripes.len() as u32 != args.code.stripes {
        return Err(format!(
            "placement file holds {} stripes, --stripes says {}",
            pre_stripes.len(),
            args.code.stripes
        ));
    }
    let mut batch =
        StripeBatch::new(code, args.code.nodes, pre_stripes).map_err(|e| e.to_string())?;

    let mut planner = build_planner(kind, &cluster, args.seed, args.max_iterations)
        .map_err(|e| e.to_string())?;
    let report = planner.plan(&mut batch).map_err(|e| e.to_string())?;
    info!(
        "planned {} groups: {} re-encode, {} parity-merge, bandwidth {}",
        batch.num_groups(),
        report.re_encode_groups,
        report.parity_merge_groups,
        report.aggregate.bandwidth
    );

    let solution = TransitionSolution::build(&batch).map_err(|e| e.to_string())?;
    write_placement(&args.post, batch.post_stripes()).map_err(|e| e.to_string())?;
    store_metadata(&args.meta, &batch).map_err(|e| e.to_string())?;

    println!("parity-generation load:");
    println!(
        "{}",
        make_load_distribution_table(&report.aggregate.send, &report.aggregate.recv)
    );
    let (send, recv) = solution.transfer_load_distribution();
    println!("overall transfer load:");
    println!("{}", make_load_distribution_table(&send, &recv));

    if let Some(path) = args.summary {
        let summary = PlanSummary::new(
            kind.token(),
            &code,
            args.code.nodes,
            args.code.stripes,
            &report,
            (send, recv),
        );
        let json = summary.to_json().map_err(|e| e.to_string())?;
        std::fs::write(&path, json).map_err(|e| e.to_string())?;
        info!("wrote planning summary to {}", path.display());
    }
    Ok(())
}
